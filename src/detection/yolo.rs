use std::path::Path;

use rten::Model;
use rten_tensor::NdTensor;
use rten_tensor::prelude::*;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::models::{BoundingBox, Detection};

/// Inference provider: a square RGB canvas in, detection records out.
///
/// `tensor` is the CHW, [0, 1] buffer from
/// [`to_tensor`](crate::detection::preprocessing::to_tensor) for a `size`×`size` canvas.
pub trait Detector: Send + Sync {
    fn detect(&self, tensor: &[f32], size: u32) -> Result<Vec<Detection>>;

    fn name(&self) -> &str;
}

/// YOLO detector exported to the `.rten` format.
///
/// Expects the Ultralytics head layout `[1, 4 + classes, anchors]` with boxes in
/// center form; the transposed `[1, anchors, 4 + classes]` layout is accepted too.
pub struct YoloDetector {
    model: Model,
    /// Anchors scoring below this are dropped before thresholding.
    pub min_confidence: f32,
}

impl YoloDetector {
    pub fn load(model_path: &Path) -> anyhow::Result<Self> {
        if !model_path.exists() {
            anyhow::bail!(
                "Detection model not found at {}. Export the trained weights to .rten first.",
                model_path.display()
            );
        }
        let model = Model::load_file(model_path)?;
        Ok(Self {
            model,
            min_confidence: 0.01,
        })
    }
}

impl Detector for YoloDetector {
    fn detect(&self, tensor: &[f32], size: u32) -> Result<Vec<Detection>> {
        let side = size as usize;
        if tensor.len() != 3 * side * side {
            return Err(PipelineError::Inference(format!(
                "expected {} input values, got {}",
                3 * side * side,
                tensor.len()
            )));
        }

        let input = NdTensor::from_data([1, 3, side, side], tensor.to_vec());
        let output = self
            .model
            .run_one(input.view().into(), None)
            .map_err(|e| PipelineError::Inference(e.to_string()))?;
        let output: NdTensor<f32, 3> = output
            .try_into()
            .map_err(|e| PipelineError::Inference(format!("unexpected output: {:?}", e)))?;

        let [_, rows, cols] = output.shape();
        let mut values = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                values.push(output[[0, r, c]]);
            }
        }

        let detections = decode_head(&values, rows, cols, self.min_confidence)?;
        debug!("{} anchors above {:.2}", detections.len(), self.min_confidence);
        Ok(detections)
    }

    fn name(&self) -> &str {
        "yolo"
    }
}

/// Turn a raw YOLO head (row-major `rows`×`cols`, batch dimension removed) into detections.
///
/// The smaller dimension is the attribute axis (`4 + classes`); the larger one
/// enumerates anchors. Confidence is the best class score.
pub fn decode_head(
    values: &[f32],
    rows: usize,
    cols: usize,
    min_confidence: f32,
) -> Result<Vec<Detection>> {
    if values.len() != rows * cols {
        return Err(PipelineError::Inference(format!(
            "head has {} values, expected {}x{}",
            values.len(),
            rows,
            cols
        )));
    }

    let attributes_first = rows <= cols;
    let (attrs, anchors) = if attributes_first {
        (rows, cols)
    } else {
        (cols, rows)
    };
    if attrs < 5 {
        return Err(PipelineError::Inference(format!(
            "head has {} attributes per anchor, need at least 5",
            attrs
        )));
    }

    let at = |anchor: usize, attr: usize| -> f32 {
        if attributes_first {
            values[attr * cols + anchor]
        } else {
            values[anchor * cols + attr]
        }
    };

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let (class_id, confidence) = (4..attrs)
            .map(|a| (a - 4, at(anchor, a)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if confidence < min_confidence {
            continue;
        }

        let bbox = BoundingBox::from_center(
            at(anchor, 0),
            at(anchor, 1),
            at(anchor, 2),
            at(anchor, 3),
        );
        detections.push(Detection::new(confidence, bbox, class_id));
    }

    Ok(detections)
}
