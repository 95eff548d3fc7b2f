use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{PipelineError, Result};
use crate::models::BoundingBox;
use crate::pipeline::BatchSummary;

/// Square side used by the tab detector.
pub const DEFAULT_TARGET_SIZE: u32 = 640;

/// Extensions accepted by the padding job.
const PAD_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "bmp"];

/// How a source image was placed on the square canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxGeometry {
    pub source_width: u32,
    pub source_height: u32,
    pub size: u32,
    pub scale: f32,
    pub resized_width: u32,
    pub resized_height: u32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl LetterboxGeometry {
    /// Compute the placement of a `width`×`height` image on a `size`×`size` canvas.
    ///
    /// The constraining side is set to `size` exactly and the other side is
    /// `floor(side * size / constraining_side)`, computed in integers so the long
    /// side never loses a pixel to float rounding.
    pub fn compute(width: u32, height: u32, size: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(PipelineError::decode(
                PathBuf::new(),
                format!("image has zero extent ({}x{})", width, height),
            ));
        }
        if size == 0 {
            return Err(PipelineError::Config("target size must be positive".into()));
        }

        let (resized_width, resized_height) = if width >= height {
            let h = (height as u64 * size as u64 / width as u64) as u32;
            (size, h.clamp(1, size))
        } else {
            let w = (width as u64 * size as u64 / height as u64) as u32;
            (w.clamp(1, size), size)
        };

        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);

        Ok(Self {
            source_width: width,
            source_height: height,
            size,
            scale,
            resized_width,
            resized_height,
            pad_x: (size - resized_width) / 2,
            pad_y: (size - resized_height) / 2,
        })
    }

    /// Map a box from canvas coordinates back onto the source image.
    pub fn to_source(&self, bbox: &BoundingBox) -> BoundingBox {
        let sx = self.resized_width as f32 / self.source_width as f32;
        let sy = self.resized_height as f32 / self.source_height as f32;
        let max_x = self.source_width as f32;
        let max_y = self.source_height as f32;
        BoundingBox {
            x1: ((bbox.x1 - self.pad_x as f32) / sx).clamp(0.0, max_x),
            y1: ((bbox.y1 - self.pad_y as f32) / sy).clamp(0.0, max_y),
            x2: ((bbox.x2 - self.pad_x as f32) / sx).clamp(0.0, max_x),
            y2: ((bbox.y2 - self.pad_y as f32) / sy).clamp(0.0, max_y),
        }
    }
}

/// A letterboxed canvas and the geometry that produced it.
#[derive(Debug, Clone)]
pub struct Letterboxed {
    pub image: RgbImage,
    pub geometry: LetterboxGeometry,
}

/// Decode an image file into 8-bit RGB.
pub fn load_rgb(path: &Path) -> Result<RgbImage> {
    let reader = ImageReader::open(path)
        .map_err(|e| PipelineError::decode(path, e))?
        .with_guessed_format()
        .map_err(|e| PipelineError::decode(path, e))?;
    let img = reader.decode().map_err(|e| PipelineError::decode(path, e))?;
    if img.width() == 0 || img.height() == 0 {
        return Err(PipelineError::decode(path, "image has zero extent"));
    }
    Ok(img.to_rgb8())
}

/// Resize with preserved aspect ratio and center on a black `size`×`size` canvas.
///
/// Any color type is accepted; the result is always 3-channel RGB.
pub fn letterbox(img: &DynamicImage, size: u32, filter: FilterType) -> Result<Letterboxed> {
    let geometry = LetterboxGeometry::compute(img.width(), img.height(), size)?;
    let rgb = img.to_rgb8();
    Ok(place_on_canvas(&rgb, geometry, filter))
}

/// Same as [`letterbox`] for an image already in RGB.
pub fn letterbox_rgb(img: &RgbImage, size: u32, filter: FilterType) -> Result<Letterboxed> {
    let geometry = LetterboxGeometry::compute(img.width(), img.height(), size)?;
    Ok(place_on_canvas(img, geometry, filter))
}

/// Load a file and letterbox it; decode problems carry the file path.
pub fn letterbox_file(path: &Path, size: u32, filter: FilterType) -> Result<Letterboxed> {
    let rgb = load_rgb(path)?;
    letterbox_rgb(&rgb, size, filter).map_err(|e| match e {
        PipelineError::Decode { reason, .. } => PipelineError::decode(path, reason),
        other => other,
    })
}

fn place_on_canvas(rgb: &RgbImage, geometry: LetterboxGeometry, filter: FilterType) -> Letterboxed {
    let resized = if rgb.dimensions() == (geometry.resized_width, geometry.resized_height) {
        rgb.clone()
    } else {
        imageops::resize(rgb, geometry.resized_width, geometry.resized_height, filter)
    };

    // ImageBuffer::new is zero-filled, i.e. black
    let mut canvas = RgbImage::new(geometry.size, geometry.size);
    imageops::overlay(
        &mut canvas,
        &resized,
        geometry.pad_x as i64,
        geometry.pad_y as i64,
    );

    Letterboxed {
        image: canvas,
        geometry,
    }
}

/// Convert an RGB canvas into a CHW `f32` buffer scaled to [0, 1].
///
/// The buffer holds `3 * width * height` values, matching an input of shape
/// `[1, 3, height, width]`.
pub fn to_tensor(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in img.enumerate_pixels() {
        let idx = (y * width + x) as usize;
        for c in 0..3 {
            data[c * plane + idx] = pixel[c] as f32 / 255.0;
        }
    }

    data
}

fn has_pad_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| PAD_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_apple_double(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("._"))
        .unwrap_or(false)
}

/// Letterbox every image under `input_dir` and save it as JPEG under `output_dir`,
/// keeping the relative layout.
///
/// Files that fail to decode or save are recorded in the summary; the walk continues.
pub fn pad_directory(
    input_dir: &Path,
    output_dir: &Path,
    size: u32,
    filter: FilterType,
) -> Result<BatchSummary> {
    if !input_dir.is_dir() {
        return Err(PipelineError::Config(format!(
            "input directory does not exist: {}",
            input_dir.display()
        )));
    }

    let mut summary = BatchSummary::default();

    for entry in WalkDir::new(input_dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                summary.record_error(&path, &PipelineError::io(&path, source));
                continue;
            }
        };
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if is_apple_double(path) || !has_pad_extension(path) {
            debug!("Skipping {}", path.display());
            continue;
        }

        let relative = path.strip_prefix(input_dir).unwrap_or(path);
        let output_path = output_dir.join(relative).with_extension("jpg");

        match pad_one(path, &output_path, size, filter) {
            Ok(()) => {
                info!("Padded {} -> {}", path.display(), output_path.display());
                summary.processed += 1;
            }
            Err(e) => summary.record_error(path, &e),
        }
    }

    Ok(summary)
}

fn pad_one(input: &Path, output: &Path, size: u32, filter: FilterType) -> Result<()> {
    let boxed = letterbox_file(input, size, filter)?;
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    DynamicImage::ImageRgb8(boxed.image)
        .save_with_format(output, ImageFormat::Jpeg)
        .map_err(|e| PipelineError::io(output, std::io::Error::other(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, Rgba, RgbaImage};

    fn solid(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 100, 50])))
    }

    #[test]
    fn test_tall_image_pads_left_and_right() {
        let out = letterbox(&solid(300, 600), 640, FilterType::Triangle).unwrap();
        let g = out.geometry;
        assert_eq!(out.image.dimensions(), (640, 640));
        assert_eq!((g.resized_width, g.resized_height), (320, 640));
        assert_eq!((g.pad_x, g.pad_y), (160, 0));

        // border columns are black, content columns are not
        assert_eq!(out.image.get_pixel(0, 320), &Rgb([0, 0, 0]));
        assert_eq!(out.image.get_pixel(159, 320), &Rgb([0, 0, 0]));
        assert_eq!(out.image.get_pixel(480, 320), &Rgb([0, 0, 0]));
        assert_eq!(out.image.get_pixel(639, 0), &Rgb([0, 0, 0]));
        assert_ne!(out.image.get_pixel(320, 320), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_wide_image_pads_top_and_bottom() {
        let out = letterbox(&solid(1000, 500), 640, FilterType::Triangle).unwrap();
        let g = out.geometry;
        assert_eq!((g.resized_width, g.resized_height), (640, 320));
        assert_eq!((g.pad_x, g.pad_y), (0, 160));
        assert_eq!(out.image.get_pixel(320, 0), &Rgb([0, 0, 0]));
        assert_eq!(out.image.get_pixel(320, 639), &Rgb([0, 0, 0]));
        assert_ne!(out.image.get_pixel(320, 320), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_aspect_ratio_within_one_pixel() {
        for &(w, h) in &[(1, 1), (3, 7), (640, 480), (1920, 1080), (333, 1001), (5000, 17)] {
            let g = LetterboxGeometry::compute(w, h, 640).unwrap();
            assert!(g.resized_width <= 640 && g.resized_height <= 640);
            assert!(g.resized_width == 640 || g.resized_height == 640);
            let expected_h = g.resized_width as f64 * h as f64 / w as f64;
            let expected_w = g.resized_height as f64 * w as f64 / h as f64;
            assert!(
                (g.resized_height as f64 - expected_h).abs() <= 1.0
                    || (g.resized_width as f64 - expected_w).abs() <= 1.0,
                "{}x{} -> {}x{}",
                w,
                h,
                g.resized_width,
                g.resized_height
            );
        }
    }

    #[test]
    fn test_extreme_aspect_keeps_one_pixel() {
        let g = LetterboxGeometry::compute(5000, 1, 640).unwrap();
        assert_eq!((g.resized_width, g.resized_height), (640, 1));
        assert_eq!(g.pad_y, 319);
    }

    #[test]
    fn test_zero_extent_is_decode_error() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(0, 10));
        let err = letterbox(&img, 640, FilterType::Triangle).unwrap_err();
        assert!(matches!(err, PipelineError::Decode { .. }));
    }

    #[test]
    fn test_non_rgb_sources_become_rgb() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_pixel(10, 10, Luma([90])));
        let out = letterbox(&gray, 20, FilterType::Nearest).unwrap();
        assert_eq!(out.image.get_pixel(10, 10), &Rgb([90, 90, 90]));

        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 2, Rgba([1, 2, 3, 255])));
        let out = letterbox(&rgba, 8, FilterType::Nearest).unwrap();
        assert_eq!(out.image.get_pixel(4, 4), &Rgb([1, 2, 3]));
        assert_eq!(out.image.get_pixel(4, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_to_source_inverts_placement() {
        let g = LetterboxGeometry::compute(300, 600, 640).unwrap();
        let canvas_box = BoundingBox {
            x1: 160.0,
            y1: 0.0,
            x2: 480.0,
            y2: 640.0,
        };
        let src = g.to_source(&canvas_box);
        assert!((src.x1 - 0.0).abs() < 1e-3);
        assert!((src.x2 - 300.0).abs() < 1e-3);
        assert!((src.y2 - 600.0).abs() < 1e-3);
    }

    #[test]
    fn test_tensor_is_chw_normalized() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 51]));
        img.put_pixel(1, 0, Rgb([0, 255, 0]));
        let t = to_tensor(&img);
        assert_eq!(t.len(), 6);
        assert_eq!(t[0], 1.0); // R plane
        assert_eq!(t[1], 0.0);
        assert_eq!(t[2], 0.0); // G plane
        assert_eq!(t[3], 1.0);
        assert!((t[4] - 0.2).abs() < 1e-6); // B plane
        assert!(t.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_pad_directory_writes_jpegs_and_skips_bad_files() {
        let input = tempfile::TempDir::new().unwrap();
        let output = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(input.path().join("sub")).unwrap();

        RgbImage::from_pixel(40, 20, Rgb([10, 200, 10]))
            .save(input.path().join("sub/can.png"))
            .unwrap();
        std::fs::write(input.path().join("broken.jpg"), b"not an image").unwrap();
        std::fs::write(input.path().join("._can.png"), b"resource fork").unwrap();
        std::fs::write(input.path().join("notes.txt"), b"hello").unwrap();

        let summary = pad_directory(input.path(), output.path(), 32, FilterType::Triangle).unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);

        let written = image::open(output.path().join("sub/can.jpg")).unwrap();
        assert_eq!((written.width(), written.height()), (32, 32));
    }
}
