pub mod config;
pub mod error;
pub mod integration;
pub mod metrics;
pub mod pipeline;
pub mod tracker;

pub use config::{InferenceParams, SessionConfig, SourceConfig};
pub use error::{PipelineError, ReleaseWarning, Result};
pub use integration::{DetectionBuilder, DetectionSource, ReplayDetector};
pub use metrics::{ClassPresence, FpsMeter, MetricsSnapshot};
pub use pipeline::{AnnotatedFrame, Session, SessionBuilder, SessionSummary, StopFlag};
pub use tracker::{CentroidTracker, Detection, Rect, TrackId, TrackerConfig};
