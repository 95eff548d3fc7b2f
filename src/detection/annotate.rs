use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detection::preprocessing::LetterboxGeometry;
use crate::models::Detection;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Draw detections at or above `threshold` onto a copy of the source image.
///
/// Boxes come from the model in canvas space and are mapped back through `geometry`.
/// Each box is drawn twice, one pixel apart, for a 2px outline.
pub fn draw_detections(
    source: &RgbImage,
    detections: &[Detection],
    geometry: &LetterboxGeometry,
    threshold: f32,
) -> RgbImage {
    let mut out = source.clone();

    for det in detections.iter().filter(|d| d.confidence >= threshold) {
        let b = geometry.to_source(&det.bbox);
        let width = b.width().round() as u32;
        let height = b.height().round() as u32;
        if width < 3 || height < 3 {
            continue;
        }
        let x = b.x1.round() as i32;
        let y = b.y1.round() as i32;
        draw_hollow_rect_mut(&mut out, Rect::at(x, y).of_size(width, height), BOX_COLOR);
        draw_hollow_rect_mut(
            &mut out,
            Rect::at(x + 1, y + 1).of_size(width - 2, height - 2),
            BOX_COLOR,
        );
    }

    out
}
