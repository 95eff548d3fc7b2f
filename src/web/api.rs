use std::path::Path;

use actix_web::{HttpResponse, Responder, Scope, get, post, web};
use serde::Deserialize;
use tracing::{error, info};

use crate::marketplace::{SearchQuery, item_id_from_filename};
use crate::pipeline::SortPipeline;
use crate::web::AppState;
use crate::web::response::{ImageLink, JobResponse};

const LISTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub fn initialize() -> Scope {
    web::scope("")
        .service(fetch_ebay)
        .service(run_yolo)
        .service(get_images)
}

#[derive(Debug, Default, Deserialize)]
pub struct FetchRequest {
    pub category: Option<String>,
    pub keyword: Option<String>,
}

#[post("/fetch_ebay")]
async fn fetch_ebay(
    state: web::Data<AppState>,
    body: Option<web::Json<FetchRequest>>,
) -> impl Responder {
    let Some(collector) = &state.collector else {
        return HttpResponse::ServiceUnavailable()
            .json(JobResponse::error("Marketplace credentials are not configured"));
    };
    let request = body.map(|b| b.into_inner()).unwrap_or_default();
    let query = SearchQuery {
        keyword: request.keyword,
        category: request.category,
    };

    // held for the whole run so concurrent fetches cannot interleave log writes
    let mut collector = collector.lock().await;
    match collector.run(query).await {
        Ok(summary) => HttpResponse::Ok().json(JobResponse::success(
            format!("Fetched {} new images", summary.downloaded),
            summary,
        )),
        Err(e) => {
            error!("Fetch failed: {}", e);
            HttpResponse::BadGateway().json(JobResponse::error(e.to_string()))
        }
    }
}

#[post("/run_yolo")]
async fn run_yolo(state: web::Data<AppState>) -> impl Responder {
    let Some(detector) = state.detector.clone() else {
        return HttpResponse::ServiceUnavailable()
            .json(JobResponse::error("No detection model is loaded"));
    };
    let config = &state.config;
    let pipeline = SortPipeline::new(detector, config.sort_dirs())
        .with_settings(config.sort_settings());
    let input = config.paths.images_dir.clone();

    match web::block(move || pipeline.run(&input)).await {
        Ok(Ok(summary)) => {
            info!(
                "Sort finished: {} with tabs, {} without",
                summary.present, summary.absent
            );
            HttpResponse::Ok().json(JobResponse::success(
                format!(
                    "Sorted {} images ({} with tabs, {} without)",
                    summary.batch.processed, summary.present, summary.absent
                ),
                summary,
            ))
        }
        Ok(Err(e)) => {
            error!("Sort failed: {}", e);
            HttpResponse::InternalServerError().json(JobResponse::error(e.to_string()))
        }
        Err(e) => HttpResponse::InternalServerError().json(JobResponse::error(e.to_string())),
    }
}

#[get("/get_images")]
async fn get_images(state: web::Data<AppState>) -> impl Responder {
    let dir = state.config.sort_dirs().present;
    match list_images(&dir, &state.config.marketplace.item_url_base) {
        Ok(images) => HttpResponse::Ok().json(images),
        Err(e) => {
            error!("Cannot list {}: {}", dir.display(), e);
            HttpResponse::InternalServerError().json(JobResponse::error(e.to_string()))
        }
    }
}

/// Image files of `dir` with their listing links, sorted by name. A missing directory
/// lists as empty.
pub fn list_images(dir: &Path, item_url_base: &str) -> std::io::Result<Vec<ImageLink>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| {
            Path::new(name)
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| LISTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    names.sort();

    let base = item_url_base.trim_end_matches('/');
    Ok(names
        .into_iter()
        .map(|filename| ImageLink {
            link: format!("{}/{}", base, item_id_from_filename(&filename)),
            filename,
        })
        .collect())
}
