//! Matching utilities for centroid tracking.

use nalgebra::{Point2, distance_squared};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::tracker::rect::Rect;

/// One detector output for a single frame.
///
/// Serialized the way detection services report it:
/// `{"class": "A", "confidence": 0.91, "bbox": [x1, y1, x2, y2]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class label
    #[serde(rename = "class")]
    pub label: String,
    /// Detection confidence score in [0, 1]
    pub confidence: f64,
    /// Bounding box, TLBR on the wire
    #[serde(with = "tlbr")]
    pub bbox: Rect,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f64, bbox: Rect) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }

    pub fn center(&self) -> Point2<f32> {
        self.bbox.center()
    }
}

mod tlbr {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::tracker::rect::Rect;

    pub fn serialize<S: Serializer>(rect: &Rect, serializer: S) -> Result<S::Ok, S::Error> {
        rect.to_tlbr().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Rect, D::Error> {
        let [x1, y1, x2, y2] = <[f32; 4]>::deserialize(deserializer)?;
        Ok(Rect::from_tlbr(x1, y1, x2, y2))
    }
}

/// Squared Euclidean distance matrix between track centres (rows) and
/// detection centres (columns).
pub fn center_distance(track_centers: &[Point2<f32>], det_centers: &[Point2<f32>]) -> Array2<f32> {
    let mut dists = Array2::zeros((track_centers.len(), det_centers.len()));
    for (i, t) in track_centers.iter().enumerate() {
        for (j, d) in det_centers.iter().enumerate() {
            dists[[i, j]] = distance_squared(t, d);
        }
    }
    dists
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Greedy nearest-neighbour assignment.
///
/// Rows claim columns in row order: each row takes its cheapest column not
/// already claimed by an earlier row, provided the cost is strictly below
/// `gate`. Equal costs resolve to the lowest column index.
pub fn greedy_assignment(cost_matrix: &Array2<f32>, gate: f32) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();

    let mut matches = Vec::new();
    let mut unmatched_tracks = Vec::new();
    let mut claimed = vec![false; num_cols];

    for row in 0..num_rows {
        let mut best: Option<(usize, f32)> = None;
        for col in (0..num_cols).filter(|&c| !claimed[c]) {
            let cost = cost_matrix[[row, col]];
            match best {
                Some((_, best_cost)) if best_cost <= cost => {}
                _ => best = Some((col, cost)),
            }
        }

        match best {
            Some((col, cost)) if cost < gate => {
                claimed[col] = true;
                matches.push((row, col));
            }
            _ => unmatched_tracks.push(row),
        }
    }

    let unmatched_detections = claimed
        .iter()
        .enumerate()
        .filter_map(|(i, &c)| if c { None } else { Some(i) })
        .collect();

    AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}
