use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{PipelineError, Result};

/// Image extensions considered when matching labels.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
pub const LABEL_EXTENSION: &str = "txt";

/// An image and its YOLO label file. Both exist and share a stem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilePair {
    pub image: PathBuf,
    pub label: PathBuf,
}

/// Outcome of a pair scan: matched pairs plus images that had no label.
#[derive(Debug, Clone, Default)]
pub struct PairScan {
    pub pairs: Vec<FilePair>,
    pub missing: Vec<PathBuf>,
}

impl PairScan {
    fn extend(&mut self, other: PairScan) {
        self.pairs.extend(other.pairs);
        self.missing.extend(other.missing);
    }

    /// Missing labels as errors, for reporting.
    pub fn missing_errors(&self) -> Vec<PipelineError> {
        self.missing
            .iter()
            .map(|image| PipelineError::MissingPair {
                image: image.clone(),
            })
            .collect()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Match every image in `image_dir` with `<stem>.txt` in `label_dir`.
pub fn collect_pairs(image_dir: &Path, label_dir: &Path) -> Result<PairScan> {
    let mut images: Vec<PathBuf> = fs::read_dir(image_dir)
        .map_err(|e| PipelineError::io(image_dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image(p))
        .collect();
    images.sort();

    let mut scan = PairScan::default();
    for image in images {
        let Some(stem) = image.file_stem() else {
            continue;
        };
        let label = label_dir.join(format!("{}.{}", stem.to_string_lossy(), LABEL_EXTENSION));
        if label.is_file() {
            scan.pairs.push(FilePair { image, label });
        } else {
            let err = PipelineError::MissingPair {
                image: image.clone(),
            };
            warn!("Removing {} from dataset: {}", image.display(), err);
            scan.missing.push(image);
        }
    }

    Ok(scan)
}

/// `batch_*` subdirectory names of `root`.
pub fn batch_folders(root: &Path) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for entry in fs::read_dir(root).map_err(|e| PipelineError::io(root, e))? {
        let entry = entry.map_err(|e| PipelineError::io(root, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("batch_") && entry.path().is_dir() {
            names.insert(name);
        }
    }
    Ok(names)
}

/// Match images under `pre_batch/batch_*` with labels under `post_batch/batch_*`.
///
/// Both roots must contain the same batch folder names.
pub fn collect_batched_pairs(pre_batch: &Path, post_batch: &Path) -> Result<PairScan> {
    let pre = batch_folders(pre_batch)?;
    let post = batch_folders(post_batch)?;
    if pre != post {
        let only_pre: Vec<_> = pre.difference(&post).cloned().collect();
        let only_post: Vec<_> = post.difference(&pre).cloned().collect();
        return Err(PipelineError::Config(format!(
            "batch folders in {} and {} do not match (only in images: {:?}, only in labels: {:?})",
            pre_batch.display(),
            post_batch.display(),
            only_pre,
            only_post
        )));
    }

    let mut scan = PairScan::default();
    for batch in &pre {
        scan.extend(collect_pairs(&pre_batch.join(batch), &post_batch.join(batch))?);
    }
    info!(
        "Matched {} pairs across {} batches ({} without labels)",
        scan.pairs.len(),
        pre.len(),
        scan.missing.len()
    );
    Ok(scan)
}
