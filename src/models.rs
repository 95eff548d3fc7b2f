use serde::{Deserialize, Serialize};

/// Axis-aligned box in corner form, in model-input pixel space unless noted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// Build from YOLO center form.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

/// One detector output record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub class_id: usize,
}

impl Detection {
    pub fn new(confidence: f32, bbox: BoundingBox, class_id: usize) -> Self {
        Self {
            confidence,
            bbox,
            class_id,
        }
    }
}

/// Whole-image classification: does the can show a pull tab?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabLabel {
    Present,
    Absent,
}

impl TabLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TabLabel::Present => "present",
            TabLabel::Absent => "absent",
        }
    }
}

impl std::fmt::Display for TabLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_center() {
        let b = BoundingBox::from_center(50.0, 40.0, 20.0, 10.0);
        assert_eq!(b.x1, 40.0);
        assert_eq!(b.y1, 35.0);
        assert_eq!(b.x2, 60.0);
        assert_eq!(b.y2, 45.0);
        assert_eq!(b.area(), 200.0);
    }

    #[test]
    fn test_degenerate_box_has_zero_area() {
        let b = BoundingBox {
            x1: 10.0,
            y1: 10.0,
            x2: 5.0,
            y2: 20.0,
        };
        assert_eq!(b.width(), 0.0);
        assert_eq!(b.area(), 0.0);
    }
}
