//! HTTP front end for the fetch and sort jobs.

pub mod api;
pub mod response;

use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use tokio::sync::Mutex;
use tracing::info;

use crate::config::Config;
use crate::detection::Detector;
use crate::marketplace::Collector;

/// Shared by every worker. Either job is unavailable when its dependency is missing.
pub struct AppState {
    pub config: Arc<Config>,
    pub detector: Option<Arc<dyn Detector>>,
    pub collector: Option<Mutex<Collector>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            detector: None,
            collector: None,
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn with_collector(mut self, collector: Collector) -> Self {
        self.collector = Some(Mutex::new(collector));
        self
    }
}

pub async fn serve(state: AppState, bind: &str) -> std::io::Result<()> {
    let state = web::Data::new(state);
    info!("Listening on http://{}", bind);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .service(api::initialize())
    })
    .bind(bind)?
    .run()
    .await
}
