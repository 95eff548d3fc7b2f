use std::path::Path;

use tracing::info;

use crate::error::{PipelineError, Result};
use crate::pipeline::BatchSummary;
use crate::sorting::{list_files, move_into};

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Name of the `index`th batch folder, counting from 1.
pub fn batch_name(index: usize) -> String {
    format!("batch_{:03}", index)
}

/// Move the files of `source_dir` (sorted by name) into `dest_dir/batch_001`,
/// `batch_002`, … with at most `batch_size` files each.
pub fn create_batches(
    source_dir: &Path,
    dest_dir: &Path,
    batch_size: usize,
) -> Result<BatchSummary> {
    if batch_size == 0 {
        return Err(PipelineError::Config("batch size must be positive".into()));
    }
    if !source_dir.is_dir() {
        return Err(PipelineError::Config(format!(
            "source directory does not exist: {}",
            source_dir.display()
        )));
    }

    let files = list_files(source_dir)?;
    info!("Total files found: {}", files.len());

    let mut summary = BatchSummary::default();
    let mut batches = 0;
    for (idx, chunk) in files.chunks(batch_size).enumerate() {
        let batch_dir = dest_dir.join(batch_name(idx + 1));
        for file in chunk {
            match move_into(file, &batch_dir) {
                Ok(_) => summary.processed += 1,
                Err(e) => summary.record_error(file, &e),
            }
        }
        info!("Batch {} created with {} files", idx + 1, chunk.len());
        batches += 1;
    }

    info!("All files have been split into {} batches", batches);
    Ok(summary)
}
