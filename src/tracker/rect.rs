use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel space.
///
/// Detectors report boxes as TLBR (top-left x, top-left y, bottom-right x,
/// bottom-right y); the tracker only ever looks at the box midpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Top-left x coordinate
    pub x: f32,
    /// Top-left y coordinate
    pub y: f32,
    /// Width of the bounding box
    pub width: f32,
    /// Height of the bounding box
    pub height: f32,
}

impl Rect {
    /// Create a new Rect from top-left coordinates and dimensions (TLWH format).
    #[inline]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a Rect from TLBR format (top-left x, top-left y, bottom-right x, bottom-right y).
    #[inline]
    pub fn from_tlbr(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        }
    }

    /// Create a Rect from integer pixel corners as reported by a detector.
    #[inline]
    pub fn from_pixels(corners: [i32; 4]) -> Self {
        let [x1, y1, x2, y2] = corners;
        Self::from_tlbr(x1 as f32, y1 as f32, x2 as f32, y2 as f32)
    }

    /// Convert to TLBR format: (x1, y1, x2, y2).
    #[inline]
    pub fn to_tlbr(&self) -> [f32; 4] {
        [self.x, self.y, self.x + self.width, self.y + self.height]
    }

    /// Midpoint of the box.
    #[inline]
    pub fn center(&self) -> Point2<f32> {
        Point2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Clip the box to an image of the given size, returning integer corners.
    ///
    /// Returns `None` when nothing of the box is left inside the image.
    pub fn clip_to(&self, width: u32, height: u32) -> Option<(i32, i32, u32, u32)> {
        let [x1, y1, x2, y2] = self.to_tlbr();
        let left = x1.max(0.0).round() as i32;
        let top = y1.max(0.0).round() as i32;
        let right = x2.min(width as f32).round() as i32;
        let bottom = y2.min(height as f32).round() as i32;
        if right <= left || bottom <= top {
            return None;
        }
        Some((left, top, (right - left) as u32, (bottom - top) as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_tlbr() {
        let rect = Rect::from_tlbr(10.0, 20.0, 40.0, 60.0);
        assert_eq!(rect, Rect::new(10.0, 20.0, 30.0, 40.0));
        assert_eq!(rect.to_tlbr(), [10.0, 20.0, 40.0, 60.0]);
    }

    #[test]
    fn test_center() {
        let rect = Rect::from_pixels([10, 10, 20, 20]);
        assert_eq!(rect.center(), Point2::new(15.0, 15.0));

        let odd = Rect::from_pixels([0, 0, 5, 7]);
        assert_eq!(odd.center(), Point2::new(2.5, 3.5));
    }

    #[test]
    fn test_clip_to() {
        let rect = Rect::from_tlbr(-5.0, 10.0, 50.0, 200.0);
        assert_eq!(rect.clip_to(40, 100), Some((0, 10, 40, 90)));

        let outside = Rect::from_tlbr(120.0, 120.0, 140.0, 140.0);
        assert_eq!(outside.clip_to(100, 100), None);
    }
}
