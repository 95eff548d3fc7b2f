pub mod annotate;
pub mod preprocessing;
pub mod threshold;
pub mod yolo;

pub use preprocessing::{
    DEFAULT_TARGET_SIZE, LetterboxGeometry, Letterboxed, letterbox, letterbox_file, load_rgb,
    pad_directory, to_tensor,
};
pub use threshold::{DEFAULT_CONFIDENCE_THRESHOLD, classify};
pub use yolo::{Detector, YoloDetector};
