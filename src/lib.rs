pub mod config;
pub mod dataset;
pub mod detection;
pub mod error;
pub mod logging;
pub mod marketplace;
pub mod models;
pub mod pipeline;
pub mod sorting;
pub mod web;

pub use config::Config;
pub use error::{PipelineError, Result};
pub use models::{BoundingBox, Detection, TabLabel};
pub use pipeline::{BatchSummary, DebugConfig, PipelineContext, SortPipeline, SortSummary};
