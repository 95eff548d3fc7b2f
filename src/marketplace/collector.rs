use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{PipelineError, Result};
use crate::marketplace::asset_log::AssetLog;
use crate::marketplace::client::{MarketplaceClient, SearchQuery};

/// What happened to one image URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded(PathBuf),
    AlreadyDownloaded,
}

/// Counts from one collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchSummary {
    pub items: usize,
    pub downloaded: usize,
    pub already_present: usize,
    pub failed: usize,
    pub total_logged: usize,
}

/// File name for image `index` of `item_id`. Item ids contain `|`, which is not
/// welcome in file names.
pub fn image_filename(item_id: &str, index: usize) -> String {
    let sanitized: String = item_id
        .chars()
        .map(|c| if c == '|' || c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{}_{}.jpg", sanitized, index)
}

/// Listing id behind a downloaded file name.
///
/// Browse ids look like `v1|<legacy id>|<variation>` and are saved as
/// `v1_<legacy id>_<variation>_<index>.jpg`; the legacy id is what the public listing
/// URL takes. Other names fall back to the stem without its `_<index>` suffix.
pub fn item_id_from_filename(filename: &str) -> String {
    let stem = filename.split('.').next().unwrap_or(filename);
    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() >= 4 && parts[0] == "v1" {
        return parts[1].to_string();
    }
    match stem.rsplit_once('_') {
        Some((id, index)) if !id.is_empty() && index.chars().all(|c| c.is_ascii_digit()) => {
            id.to_string()
        }
        _ => stem.to_string(),
    }
}

/// Searches listings and downloads their images exactly once.
pub struct Collector {
    client: MarketplaceClient,
    log: AssetLog,
    images_dir: PathBuf,
    image_delay: Duration,
    item_delay: Duration,
}

impl Collector {
    pub fn new(client: MarketplaceClient, log: AssetLog, images_dir: impl Into<PathBuf>) -> Self {
        let image_delay = Duration::from_millis(client.config().image_delay_ms);
        let item_delay = Duration::from_millis(client.config().item_delay_ms);
        Self {
            client,
            log,
            images_dir: images_dir.into(),
            image_delay,
            item_delay,
        }
    }

    pub fn with_delays(mut self, image_delay: Duration, item_delay: Duration) -> Self {
        self.image_delay = image_delay;
        self.item_delay = item_delay;
        self
    }

    pub fn log(&self) -> &AssetLog {
        &self.log
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// `query` with blank filters dropped; when neither filter is given, the configured
    /// default keyword and category are used together.
    pub fn resolve_query(&self, query: SearchQuery) -> SearchQuery {
        let keyword = query.keyword.filter(|k| !k.trim().is_empty());
        let category = query.category.filter(|c| !c.trim().is_empty());
        if keyword.is_none() && category.is_none() {
            let config = self.client.config();
            return SearchQuery {
                keyword: Some(config.default_keyword.clone()),
                category: Some(config.default_category.clone()),
            };
        }
        SearchQuery { keyword, category }
    }

    /// Download one image unless its key is already logged.
    ///
    /// The log is updated only after the file is on disk.
    pub async fn download_image(
        &mut self,
        url: &str,
        item_id: &str,
        index: usize,
    ) -> Result<DownloadOutcome> {
        let key = AssetLog::key(item_id, index);
        if self.log.contains(&key) {
            info!("Image {} already downloaded, skipping", key);
            return Ok(DownloadOutcome::AlreadyDownloaded);
        }

        let bytes = self.client.fetch_bytes(url).await?;

        fs::create_dir_all(&self.images_dir)
            .map_err(|e| PipelineError::io(&self.images_dir, e))?;
        let target = self.images_dir.join(image_filename(item_id, index));
        fs::write(&target, &bytes).map_err(|e| PipelineError::io(&target, e))?;

        self.log.record(key, url)?;
        info!("Downloaded {}", target.display());
        Ok(DownloadOutcome::Downloaded(target))
    }

    /// Search, then download every image of every result.
    ///
    /// Token failures end the run; per-item and per-image failures are counted.
    pub async fn run(&mut self, query: SearchQuery) -> Result<FetchSummary> {
        let query = self.resolve_query(query);
        info!(
            "Searching listings (keyword: {:?}, category: {:?})",
            query.keyword, query.category
        );

        self.client.fetch_token().await?;
        let items = self.client.search(&query).await?;
        info!("Found {} items", items.len());

        let mut summary = FetchSummary {
            items: items.len(),
            ..FetchSummary::default()
        };

        for item in &items {
            let details = match self.client.item_details(&item.item_id).await {
                Ok(details) => details,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!("Failed to get details for {}: {}", item.item_id, e);
                    summary.failed += 1;
                    continue;
                }
            };

            let urls = details.image_urls();
            if urls.is_empty() {
                warn!("Item {} has no images", item.item_id);
            }
            for (index, url) in urls {
                match self.download_image(&url, &item.item_id, index).await {
                    Ok(DownloadOutcome::Downloaded(_)) => {
                        summary.downloaded += 1;
                        tokio::time::sleep(self.image_delay).await;
                    }
                    Ok(DownloadOutcome::AlreadyDownloaded) => summary.already_present += 1,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        error!("Failed to download {}: {}", url, e);
                        summary.failed += 1;
                    }
                }
            }
            tokio::time::sleep(self.item_delay).await;
        }

        summary.total_logged = self.log.len();
        info!(
            "Fetch complete: {} downloaded, {} already present, {} failed",
            summary.downloaded, summary.already_present, summary.failed
        );
        Ok(summary)
    }
}
