use std::fs;
use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::dataset::pairs::FilePair;
use crate::error::{PipelineError, Result};

const RATIO_EPSILON: f64 = 1e-6;

/// Fractions of the dataset for train / val / test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    pub train: f64,
    pub val: f64,
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.8,
            val: 0.1,
            test: 0.1,
        }
    }
}

impl SplitRatios {
    pub fn new(train: f64, val: f64, test: f64) -> Result<Self> {
        let ratios = Self { train, val, test };
        ratios.validate()?;
        Ok(ratios)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("train", self.train), ("val", self.val), ("test", self.test)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineError::Config(format!(
                    "{} fraction {} is outside [0, 1]",
                    name, value
                )));
            }
        }
        let sum = self.train + self.val + self.test;
        if (sum - 1.0).abs() > RATIO_EPSILON {
            return Err(PipelineError::Config(format!(
                "split fractions sum to {}, expected 1.0",
                sum
            )));
        }
        Ok(())
    }

    /// `(train, val, test)` sizes for `total` items. Val and test are floored;
    /// train takes the remainder.
    pub fn sizes(&self, total: usize) -> (usize, usize, usize) {
        // 0.29 * 100.0 is 28.999999999999996 in f64
        let floor = |fraction: f64| ((total as f64) * fraction + 1e-9).floor() as usize;
        let val = floor(self.val).min(total);
        let test = floor(self.test).min(total - val);
        (total - val - test, val, test)
    }
}

/// Three disjoint subsets of the matched pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetSplit {
    pub train: Vec<FilePair>,
    pub val: Vec<FilePair>,
    pub test: Vec<FilePair>,
}

impl DatasetSplit {
    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn subsets(&self) -> [(&'static str, &[FilePair]); 3] {
        [
            ("train", self.train.as_slice()),
            ("val", self.val.as_slice()),
            ("test", self.test.as_slice()),
        ]
    }
}

/// Shuffle `pairs` with `seed` and cut them into train / val / test.
///
/// Input order does not matter: pairs are sorted before shuffling, so the same set
/// and seed always give the same split.
pub fn partition(mut pairs: Vec<FilePair>, ratios: SplitRatios, seed: u64) -> Result<DatasetSplit> {
    ratios.validate()?;

    pairs.sort();
    let mut rng = StdRng::seed_from_u64(seed);
    pairs.shuffle(&mut rng);

    let (train_size, val_size, _) = ratios.sizes(pairs.len());
    let test = pairs.split_off(train_size + val_size);
    let val = pairs.split_off(train_size);

    Ok(DatasetSplit {
        train: pairs,
        val,
        test,
    })
}

/// Counts from writing a split to disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SplitReport {
    pub train: usize,
    pub val: usize,
    pub test: usize,
    pub copied: usize,
    pub failed: usize,
}

/// Output directories for one subset: `images/<name>` and `labels/<name>`.
pub fn subset_dirs(output_root: &Path, subset: &str) -> (PathBuf, PathBuf) {
    (
        output_root.join("images").join(subset),
        output_root.join("labels").join(subset),
    )
}

/// Copy each pair into `output_root/{images,labels}/{train,val,test}`.
///
/// Source files are left in place. A pair that fails to copy is logged and counted.
/// The subset directories must be empty, so two runs never share an output.
pub fn write_split(split: &DatasetSplit, output_root: &Path) -> Result<SplitReport> {
    for (name, _) in split.subsets() {
        let (image_dir, label_dir) = subset_dirs(output_root, name);
        for dir in [&image_dir, &label_dir] {
            ensure_empty(dir)?;
        }
    }

    let mut report = SplitReport {
        train: split.train.len(),
        val: split.val.len(),
        test: split.test.len(),
        ..SplitReport::default()
    };

    for (name, pairs) in split.subsets() {
        let (image_dir, label_dir) = subset_dirs(output_root, name);
        for dir in [&image_dir, &label_dir] {
            fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
        }

        for pair in pairs {
            match copy_pair(pair, &image_dir, &label_dir) {
                Ok(()) => report.copied += 1,
                Err(e) => {
                    error!("Skipping pair {}: {}", pair.image.display(), e);
                    report.failed += 1;
                }
            }
        }
    }

    info!(
        "Split written to {}: train {}, val {}, test {}",
        output_root.display(),
        report.train,
        report.val,
        report.test
    );
    Ok(report)
}

fn ensure_empty(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    let mut entries = fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;
    if entries.next().is_some() {
        return Err(PipelineError::Config(format!(
            "output directory {} is not empty",
            dir.display()
        )));
    }
    Ok(())
}

/// Copy both files of a pair, or neither. Existing targets are never overwritten.
fn copy_pair(pair: &FilePair, image_dir: &Path, label_dir: &Path) -> Result<()> {
    let image_target = copy_target(&pair.image, image_dir)?;
    let label_target = copy_target(&pair.label, label_dir)?;

    copy_file(&pair.image, &image_target)?;
    if let Err(e) = copy_file(&pair.label, &label_target) {
        if let Err(cleanup) = fs::remove_file(&image_target) {
            warn!(
                "Could not remove unpaired {}: {}",
                image_target.display(),
                cleanup
            );
        }
        return Err(e);
    }
    Ok(())
}

fn copy_target(file: &Path, dir: &Path) -> Result<PathBuf> {
    let name = file.file_name().ok_or_else(|| PipelineError::Copy {
        from: file.to_path_buf(),
        to: dir.to_path_buf(),
        reason: "source has no file name".into(),
    })?;
    let target = dir.join(name);
    if target.exists() {
        return Err(PipelineError::Copy {
            from: file.to_path_buf(),
            to: target,
            reason: "destination already exists".into(),
        });
    }
    Ok(target)
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to).map_err(|e| PipelineError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(())
}
