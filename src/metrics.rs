//! Per-frame metrics: smoothed frame rate and class presence for the live legend.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

use crate::tracker::Detection;

/// Weight kept from the previous smoothed value on each tick.
const FPS_DECAY: f64 = 0.8;

/// Exponentially smoothed frames-per-second estimate.
#[derive(Debug, Clone)]
pub struct FpsMeter {
    smoothed: Option<f64>,
    last: Instant,
}

impl FpsMeter {
    /// Start measuring from `start`; the first tick measures against it.
    pub fn new(start: Instant) -> Self {
        Self {
            smoothed: None,
            last: start,
        }
    }

    /// Record a frame completed at `now` and return the smoothed rate.
    ///
    /// The first tick takes the instantaneous rate as is. A zero interval
    /// counts as an instantaneous rate of zero.
    pub fn tick(&mut self, now: Instant) -> f64 {
        let dt = now.saturating_duration_since(self.last).as_secs_f64();
        let instant = if dt > 0.0 { 1.0 / dt } else { 0.0 };
        self.last = now;

        let smoothed = match self.smoothed {
            Some(prev) => prev * FPS_DECAY + instant * (1.0 - FPS_DECAY),
            None => instant,
        };
        self.smoothed = Some(smoothed);
        smoothed
    }

    /// Current smoothed rate, zero before the first frame.
    pub fn smoothed(&self) -> f64 {
        self.smoothed.unwrap_or(0.0)
    }

    pub fn last_frame(&self) -> Instant {
        self.last
    }
}

/// Which class labels were seen in the current frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ClassPresence(BTreeMap<String, bool>);

impl ClassPresence {
    /// Mark every known label as absent, then flag the labels present in
    /// `detections`. Labels the detector reports but did not announce up
    /// front are added as present.
    pub fn from_detections<S: AsRef<str>>(known: &[S], detections: &[Detection]) -> Self {
        let mut presence: BTreeMap<String, bool> = known
            .iter()
            .map(|label| (label.as_ref().to_owned(), false))
            .collect();
        for det in detections {
            presence.insert(det.label.clone(), true);
        }
        Self(presence)
    }

    pub fn seen(&self, label: &str) -> bool {
        self.0.get(label).copied().unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(label, seen)| (label.as_str(), *seen))
    }

    pub fn seen_count(&self) -> usize {
        self.0.values().filter(|seen| **seen).count()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Read-only view of the metrics for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub frame_index: u64,
    pub fps: f64,
    pub detections: usize,
    pub tracked: usize,
    pub presence: ClassPresence,
}
