//! Listing search and image collection against the marketplace Browse API.

pub mod asset_log;
pub mod client;
pub mod collector;

pub use asset_log::{AssetLog, AssetRecord};
pub use client::{Credentials, ItemDetails, ItemSummary, MarketplaceClient, SearchQuery};
pub use collector::{
    Collector, DownloadOutcome, FetchSummary, image_filename, item_id_from_filename,
};
