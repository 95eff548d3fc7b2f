//! Run configuration.
//!
//! Everything has a default, so a missing file means "use the defaults". Components take
//! the section they need at construction; nothing below `main` reads the environment.

use std::path::{Path, PathBuf};

use anyhow::Context;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::dataset::{DEFAULT_BATCH_SIZE, SplitRatios};
use crate::detection::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_TARGET_SIZE};
use crate::pipeline::SortSettings;
use crate::sorting::SortDirs;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub sort: SortConfig,
    pub pad: PadConfig,
    pub dataset: DatasetConfig,
    pub marketplace: MarketplaceConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Where fetched images land and where the sort run reads from.
    pub images_dir: PathBuf,
    /// Parent of the two sort bins.
    pub sorted_dir: PathBuf,
    pub asset_log: PathBuf,
    pub model: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            images_dir: PathBuf::from("static/images"),
            sorted_dir: PathBuf::from("static/images"),
            asset_log: PathBuf::from("image_log.json"),
            model: PathBuf::from("models/best.rten"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortConfig {
    pub image_size: u32,
    pub confidence_threshold: f32,
    pub filter: ResizeFilter,
    pub present_dir: String,
    pub absent_dir: String,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            image_size: DEFAULT_TARGET_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            filter: ResizeFilter::Triangle,
            present_dir: "with_tabs".to_string(),
            absent_dir: "without_tabs".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PadConfig {
    pub size: u32,
    pub filter: ResizeFilter,
}

impl Default for PadConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_TARGET_SIZE,
            filter: ResizeFilter::Lanczos3,
        }
    }
}

/// Serializable mirror of [`FilterType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub train: f64,
    pub val: f64,
    pub test: f64,
    pub seed: u64,
    pub batch_size: usize,
    pub output_dir: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        let ratios = SplitRatios::default();
        Self {
            train: ratios.train,
            val: ratios.val,
            test: ratios.test,
            seed: 42,
            batch_size: DEFAULT_BATCH_SIZE,
            output_dir: PathBuf::from("data"),
        }
    }
}

impl DatasetConfig {
    pub fn ratios(&self) -> SplitRatios {
        SplitRatios {
            train: self.train,
            val: self.val,
            test: self.test,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceConfig {
    pub identity_url: String,
    pub browse_url: String,
    pub scope: String,
    pub marketplace_id: String,
    /// Public listing URL prefix; the item id is appended.
    pub item_url_base: String,
    pub default_keyword: String,
    pub default_category: String,
    pub search_limit: u32,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub image_delay_ms: u64,
    pub item_delay_ms: u64,
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self {
            identity_url: "https://api.ebay.com/identity/v1/oauth2/token".to_string(),
            browse_url: "https://api.ebay.com/buy/browse/v1".to_string(),
            scope: "https://api.ebay.com/oauth/api_scope".to_string(),
            marketplace_id: "EBAY_US".to_string(),
            item_url_base: "https://www.ebay.com/itm".to_string(),
            default_keyword: "beverage can".to_string(),
            default_category: "564".to_string(),
            search_limit: 100,
            max_retries: 3,
            initial_backoff_ms: 500,
            request_timeout_secs: 30,
            image_delay_ms: 500,
            item_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Config {
    /// Load from a TOML file, or defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml(&text)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sort.image_size == 0 || self.pad.size == 0 {
            anyhow::bail!("image size must be positive");
        }
        if !(0.0..=1.0).contains(&self.sort.confidence_threshold) {
            anyhow::bail!(
                "confidence threshold {} is outside [0, 1]",
                self.sort.confidence_threshold
            );
        }
        if self.dataset.batch_size == 0 {
            anyhow::bail!("batch size must be positive");
        }
        if self.sort.present_dir == self.sort.absent_dir {
            anyhow::bail!("present and absent directories must differ");
        }
        self.dataset.ratios().validate()?;
        Ok(())
    }

    pub fn sort_dirs(&self) -> SortDirs {
        SortDirs::new(
            &self.paths.sorted_dir,
            &self.sort.present_dir,
            &self.sort.absent_dir,
        )
    }

    pub fn sort_settings(&self) -> SortSettings {
        SortSettings {
            image_size: self.sort.image_size,
            threshold: self.sort.confidence_threshold,
            filter: self.sort.filter.into(),
        }
    }
}
