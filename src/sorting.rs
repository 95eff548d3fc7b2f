use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::models::TabLabel;
use crate::pipeline::BatchSummary;

/// Directory names for the two sort bins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDirs {
    pub present: PathBuf,
    pub absent: PathBuf,
}

impl SortDirs {
    pub fn new(root: &Path, present: &str, absent: &str) -> Self {
        Self {
            present: root.join(present),
            absent: root.join(absent),
        }
    }

    pub fn for_label(&self, label: TabLabel) -> &Path {
        match label {
            TabLabel::Present => &self.present,
            TabLabel::Absent => &self.absent,
        }
    }

    pub fn create(&self) -> Result<()> {
        for dir in [&self.present, &self.absent] {
            fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
        }
        Ok(())
    }
}

/// Move `file` into `dest_dir`, keeping its name. Never overwrites.
///
/// Returns the new path. Falls back to copy + remove when a rename is not possible
/// (e.g. across filesystems).
pub fn move_into(file: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let name = file.file_name().ok_or_else(|| PipelineError::Move {
        from: file.to_path_buf(),
        to: dest_dir.to_path_buf(),
        reason: "source has no file name".into(),
    })?;
    fs::create_dir_all(dest_dir).map_err(|e| PipelineError::io(dest_dir, e))?;

    let target = dest_dir.join(name);
    if target.exists() {
        return Err(PipelineError::Move {
            from: file.to_path_buf(),
            to: target,
            reason: "destination already exists".into(),
        });
    }

    if fs::rename(file, &target).is_err() {
        fs::copy(file, &target).map_err(|e| PipelineError::Move {
            from: file.to_path_buf(),
            to: target.clone(),
            reason: e.to_string(),
        })?;
        fs::remove_file(file).map_err(|e| PipelineError::io(file, e))?;
    }

    Ok(target)
}

/// Move an image into the bin for `label`.
pub fn relocate(file: &Path, label: TabLabel, dirs: &SortDirs) -> Result<PathBuf> {
    move_into(file, dirs.for_label(label))
}

/// Undo a sort: move every `.jpg` in both bins back into `parent`.
pub fn revert_sorted(parent: &Path, dirs: &SortDirs) -> Result<BatchSummary> {
    if !dirs.present.is_dir() || !dirs.absent.is_dir() {
        return Err(PipelineError::Config(format!(
            "'{}' or '{}' not found",
            dirs.present.display(),
            dirs.absent.display()
        )));
    }

    let mut summary = BatchSummary::default();
    for dir in [&dirs.present, &dirs.absent] {
        for file in list_files(dir)? {
            let is_jpg = file
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("jpg"))
                .unwrap_or(false);
            if !is_jpg {
                continue;
            }
            match move_into(&file, parent) {
                Ok(_) => {
                    info!("Moved {} back to {}", file.display(), parent.display());
                    summary.processed += 1;
                }
                Err(e) => summary.record_error(&file, &e),
            }
        }
    }

    if summary.skipped + summary.failed > 0 {
        warn!(
            "{} files could not be moved back",
            summary.skipped + summary.failed
        );
    }
    Ok(summary)
}

/// Regular files directly inside `dir`, sorted by name.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))? {
        let entry = entry.map_err(|e| PipelineError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
