//! Integration module for connecting object detection backends with the
//! frame pipeline.
//!
//! The pipeline never looks inside a model: anything implementing
//! [`DetectionSource`] can drive a session.

mod builder;
mod detector;
mod replay;

pub use builder::DetectionBuilder;
pub use detector::{DetectionSource, IntoDetections};
pub use replay::{ReplayDetector, ReplayError, ReplayFrame};
