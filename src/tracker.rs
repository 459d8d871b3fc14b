mod centroid_tracker;
mod matching;
mod rect;
mod tracked_object;

pub use centroid_tracker::{CentroidTracker, TrackerConfig};
pub use matching::{AssignmentResult, Detection, center_distance, greedy_assignment};
pub use rect::Rect;
pub use tracked_object::{TrackId, TrackedObject};
