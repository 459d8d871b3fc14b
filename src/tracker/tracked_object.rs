//! A single identity followed by the centroid tracker.

use nalgebra::Point2;
use serde::Serialize;

/// Identity assigned to a tracked object.
///
/// Allocated sequentially from zero by each tracker instance and never reused
/// within that instance.
pub type TrackId = u64;

/// Object followed across frames by its last known centre.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedObject {
    /// Stable identity
    pub id: TrackId,
    /// Centre of the most recent matched detection
    pub center: Point2<f32>,
    /// Consecutive frames without a matching detection
    pub misses: u32,
}

impl TrackedObject {
    pub fn new(id: TrackId, center: Point2<f32>) -> Self {
        Self {
            id,
            center,
            misses: 0,
        }
    }

    /// Refresh the object with a matched detection centre.
    pub fn update(&mut self, center: Point2<f32>) {
        self.center = center;
        self.misses = 0;
    }

    pub fn mark_missed(&mut self) {
        self.misses = self.misses.saturating_add(1);
    }

    /// Whether the object has gone unmatched for longer than `max_misses` frames.
    pub fn is_expired(&self, max_misses: u32) -> bool {
        self.misses > max_misses
    }
}
