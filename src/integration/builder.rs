//! Builder for creating Detection objects from various input formats.

use crate::tracker::{Detection, Rect};

/// Builder for creating `Detection` objects from various input formats.
#[derive(Debug, Clone, Default)]
pub struct DetectionBuilder {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    confidence: f64,
    label: Option<String>,
    class_id: Option<usize>,
}

impl DetectionBuilder {
    /// Create a new detection builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bounding box in TLBR format (x1, y1, x2, y2).
    pub fn tlbr(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.x1 = x1;
        self.y1 = y1;
        self.x2 = x2;
        self.y2 = y2;
        self
    }

    /// Set bounding box in XYWH format (center_x, center_y, width, height).
    pub fn xywh(mut self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.x1 = cx - w / 2.0;
        self.y1 = cy - h / 2.0;
        self.x2 = cx + w / 2.0;
        self.y2 = cy + h / 2.0;
        self
    }

    /// Set bounding box from integer pixel corners.
    pub fn pixels(self, corners: [i32; 4]) -> Self {
        let [x1, y1, x2, y2] = corners;
        self.tlbr(x1 as f32, y1 as f32, x2 as f32, y2 as f32)
    }

    /// Set the confidence score.
    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Set the class label directly.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the class by index; resolved against the model's names in `build_with`.
    pub fn class_id(mut self, class_id: usize) -> Self {
        self.class_id = Some(class_id);
        self
    }

    /// Build the final `Detection`.
    pub fn build(self) -> Detection {
        self.build_with::<&str>(&[])
    }

    /// Build the final `Detection`, resolving a class index against `names`.
    ///
    /// An explicit label wins. An index with no matching name becomes
    /// `cls<index>`; with neither, the label is empty.
    pub fn build_with<S: AsRef<str>>(self, names: &[S]) -> Detection {
        let label = match (self.label, self.class_id) {
            (Some(label), _) => label,
            (None, Some(id)) => names
                .get(id)
                .map(|name| name.as_ref().to_owned())
                .unwrap_or_else(|| format!("cls{id}")),
            (None, None) => String::new(),
        };
        Detection::new(
            label,
            self.confidence.clamp(0.0, 1.0),
            Rect::from_tlbr(self.x1, self.y1, self.x2, self.y2),
        )
    }
}
