//! Centroid tracker: nearest-neighbour identity assignment with miss tolerance.

use std::collections::BTreeMap;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::tracker::matching::{self, AssignmentResult, Detection};
use crate::tracker::rect::Rect;
use crate::tracker::tracked_object::{TrackId, TrackedObject};

/// Configuration for the CentroidTracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Consecutive misses tolerated before an identity is retired
    pub max_misses: u32,
    /// Match radius in pixels; a detection must be strictly closer than this
    pub gate_radius: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_misses: 30,
            gate_radius: 50.0,
        }
    }
}

impl TrackerConfig {
    /// Squared distance cutoff used for gating.
    pub fn gate_squared(&self) -> f32 {
        self.gate_radius * self.gate_radius
    }
}

pub struct CentroidTracker {
    objects: BTreeMap<TrackId, TrackedObject>,
    next_id: TrackId,
    config: TrackerConfig,
}

impl Default for CentroidTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl CentroidTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            objects: BTreeMap::new(),
            next_id: 0,
            config,
        }
    }

    /// Assign this frame's boxes to identities.
    ///
    /// Returns the identities matched or created by this frame together with
    /// their current centres. Objects that went unmatched keep their last
    /// centre inside the tracker until they exceed `max_misses`, but are not
    /// part of the returned map.
    pub fn update(&mut self, boxes: &[Rect]) -> BTreeMap<TrackId, Point2<f32>> {
        let det_centers: Vec<Point2<f32>> = boxes.iter().map(Rect::center).collect();

        // BTreeMap iteration gives ascending identities, which fixes the
        // order in which objects claim contested detections.
        let ids: Vec<TrackId> = self.objects.keys().copied().collect();
        let track_centers: Vec<Point2<f32>> = self.objects.values().map(|o| o.center).collect();

        let dists = matching::center_distance(&track_centers, &det_centers);
        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = matching::greedy_assignment(&dists, self.config.gate_squared());

        let mut current = BTreeMap::new();

        for (itracked, idet) in matches {
            let id = ids[itracked];
            if let Some(obj) = self.objects.get_mut(&id) {
                obj.update(det_centers[idet]);
                current.insert(id, obj.center);
            }
        }

        for itracked in unmatched_tracks {
            if let Some(obj) = self.objects.get_mut(&ids[itracked]) {
                obj.mark_missed();
            }
        }

        let max_misses = self.config.max_misses;
        self.objects.retain(|_, obj| !obj.is_expired(max_misses));

        for idet in unmatched_detections {
            let id = self.allocate_id();
            let center = det_centers[idet];
            self.objects.insert(id, TrackedObject::new(id, center));
            current.insert(id, center);
        }

        current
    }

    /// Same as [`update`](Self::update), taking full detections.
    pub fn update_detections(&mut self, detections: &[Detection]) -> BTreeMap<TrackId, Point2<f32>> {
        let boxes: Vec<Rect> = detections.iter().map(|d| d.bbox).collect();
        self.update(&boxes)
    }

    /// All live objects, including those currently coasting on misses.
    pub fn objects(&self) -> impl Iterator<Item = &TrackedObject> {
        self.objects.values()
    }

    pub fn get(&self, id: TrackId) -> Option<&TrackedObject> {
        self.objects.get(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Identity the next spawned object will receive.
    pub fn next_id(&self) -> TrackId {
        self.next_id
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn allocate_id(&mut self) -> TrackId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
