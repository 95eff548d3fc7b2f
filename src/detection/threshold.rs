use crate::models::{Detection, TabLabel};

/// Confidence at or above which a single detection marks the image as having a tab.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.51;

/// Label a whole image from its detections.
///
/// `Present` as soon as one record reaches `threshold`; an empty list is `Absent`.
pub fn classify(detections: &[Detection], threshold: f32) -> TabLabel {
    if detections.iter().any(|d| d.confidence >= threshold) {
        TabLabel::Present
    } else {
        TabLabel::Absent
    }
}
