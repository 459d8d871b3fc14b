use std::collections::BTreeMap;

use image::RgbImage;
use nalgebra::Point2;

use crate::metrics::MetricsSnapshot;
use crate::tracker::{Detection, TrackId};

/// Everything produced for one frame, handed to every sink.
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    /// Zero-based position in the session, in acquisition order
    pub index: u64,
    /// Source frame with overlays drawn on it
    pub image: RgbImage,
    pub detections: Vec<Detection>,
    /// Identities matched or created this frame; empty when tracking is off
    pub tracks: BTreeMap<TrackId, Point2<f32>>,
    pub metrics: MetricsSnapshot,
}
