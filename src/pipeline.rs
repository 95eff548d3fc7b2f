use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result as AnyResult;
use image::imageops::FilterType;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::detection::annotate::draw_detections;
use crate::detection::preprocessing::{self, DEFAULT_TARGET_SIZE};
use crate::detection::threshold::{DEFAULT_CONFIDENCE_THRESHOLD, classify};
use crate::detection::yolo::Detector;
use crate::error::{PipelineError, Result};
use crate::models::{Detection, TabLabel};
use crate::sorting::{self, SortDirs};

/// Extensions the sort run picks up from the input directory.
const SORT_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Whether an item was skipped (expected, e.g. a corrupt file) or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemIssue {
    pub path: PathBuf,
    pub kind: IssueKind,
    pub message: String,
}

/// Per-run counts: processed / skipped / failed, plus what went wrong.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub issues: Vec<ItemIssue>,
}

impl BatchSummary {
    /// Count and log a per-item error.
    pub fn record_error(&mut self, path: &Path, err: &PipelineError) {
        let kind = if err.is_skip() {
            warn!("Skipping {}: {}", path.display(), err);
            self.skipped += 1;
            IssueKind::Skipped
        } else {
            error!("Failed on {}: {}", path.display(), err);
            self.failed += 1;
            IssueKind::Failed
        };
        self.issues.push(ItemIssue {
            path: path.to_path_buf(),
            kind,
            message: err.to_string(),
        });
    }

    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed
    }
}

/// Result of a sort run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SortSummary {
    #[serde(flatten)]
    pub batch: BatchSummary,
    pub present: usize,
    pub absent: usize,
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

/// Context available to every sort step
#[derive(Clone, Debug, Default)]
pub struct PipelineContext {
    pub verbose: bool,
    pub debug: Option<DebugConfig>,
}

/// Tunables of a sort run.
#[derive(Debug, Clone, Copy)]
pub struct SortSettings {
    pub image_size: u32,
    pub threshold: f32,
    pub filter: FilterType,
}

impl Default for SortSettings {
    fn default() -> Self {
        Self {
            image_size: DEFAULT_TARGET_SIZE,
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            filter: FilterType::Triangle,
        }
    }
}

/// Detect tabs in every image of a directory and move each into its bin.
pub struct SortPipeline {
    detector: Arc<dyn Detector>,
    dirs: SortDirs,
    settings: SortSettings,
    context: PipelineContext,
}

impl SortPipeline {
    pub fn new(detector: Arc<dyn Detector>, dirs: SortDirs) -> Self {
        Self {
            detector,
            dirs,
            settings: SortSettings::default(),
            context: PipelineContext::default(),
        }
    }

    pub fn with_settings(mut self, settings: SortSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.settings.threshold = threshold;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.context.verbose = verbose;
        self
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> AnyResult<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.context.debug = Some(DebugConfig { output_dir });

        Ok(self)
    }

    pub fn dirs(&self) -> &SortDirs {
        &self.dirs
    }

    /// Letterbox, run the detector and label one file. Does not move it.
    pub fn classify_file(&self, path: &Path) -> Result<(TabLabel, Vec<Detection>)> {
        let source = preprocessing::load_rgb(path)?;
        let boxed = preprocessing::letterbox_rgb(
            &source,
            self.settings.image_size,
            self.settings.filter,
        )
        .map_err(|e| match e {
            PipelineError::Decode { reason, .. } => PipelineError::decode(path, reason),
            other => other,
        })?;
        debug!(
            "{}: {}x{} scaled by {:.3}, padding ({}, {})",
            path.display(),
            source.width(),
            source.height(),
            boxed.geometry.scale,
            boxed.geometry.pad_x,
            boxed.geometry.pad_y
        );

        let tensor = preprocessing::to_tensor(&boxed.image);
        let detections = self.detector.detect(&tensor, self.settings.image_size)?;
        let label = classify(&detections, self.settings.threshold);

        self.save_debug_output(path, &source, &boxed, &detections)?;

        Ok((label, detections))
    }

    /// Classify one file and move it into its bin.
    pub fn sort_file(&self, path: &Path) -> Result<(TabLabel, PathBuf)> {
        let (label, _) = self.classify_file(path)?;
        let moved = sorting::relocate(path, label, &self.dirs)?;
        Ok((label, moved))
    }

    /// Sort every image directly inside `input_dir`.
    ///
    /// Only a missing input directory or an uncreatable bin aborts the run.
    pub fn run(&self, input_dir: &Path) -> Result<SortSummary> {
        if !input_dir.is_dir() {
            return Err(PipelineError::Config(format!(
                "input directory does not exist: {}",
                input_dir.display()
            )));
        }
        self.dirs.create()?;

        let files: Vec<PathBuf> = sorting::list_files(input_dir)?
            .into_iter()
            .filter(|p| has_sort_extension(p))
            .collect();
        info!(
            "Sorting {} images from {} with {} (threshold {:.2})",
            files.len(),
            input_dir.display(),
            self.detector.name(),
            self.settings.threshold
        );

        let mut summary = SortSummary::default();
        for (idx, path) in files.iter().enumerate() {
            if self.context.verbose {
                debug!("[{}/{}] {}", idx + 1, files.len(), path.display());
            }
            match self.sort_file(path) {
                Ok((label, moved)) => {
                    info!("{} -> {} ({})", path.display(), moved.display(), label);
                    summary.batch.processed += 1;
                    match label {
                        TabLabel::Present => summary.present += 1,
                        TabLabel::Absent => summary.absent += 1,
                    }
                }
                Err(e) => summary.batch.record_error(path, &e),
            }
        }

        Ok(summary)
    }

    fn save_debug_output(
        &self,
        path: &Path,
        source: &image::RgbImage,
        boxed: &preprocessing::Letterboxed,
        detections: &[Detection],
    ) -> Result<()> {
        let Some(debug_config) = &self.context.debug else {
            return Ok(());
        };

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let letterbox_dir = debug_config.output_dir.join("01_letterbox");
        let detections_dir = debug_config.output_dir.join("02_detections");
        for dir in [&letterbox_dir, &detections_dir] {
            std::fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
        }

        let letterbox_path = letterbox_dir.join(format!("{}.png", stem));
        boxed
            .image
            .save(&letterbox_path)
            .map_err(|e| PipelineError::io(&letterbox_path, std::io::Error::other(e)))?;

        let annotated = draw_detections(
            source,
            detections,
            &boxed.geometry,
            self.settings.threshold,
        );
        let annotated_path = detections_dir.join(format!("{}.png", stem));
        annotated
            .save(&annotated_path)
            .map_err(|e| PipelineError::io(&annotated_path, std::io::Error::other(e)))?;

        debug!("Debug: saved {} and {}", letterbox_path.display(), annotated_path.display());
        Ok(())
    }
}

fn has_sort_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SORT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
