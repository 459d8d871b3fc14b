//! Error types for the frame pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias used throughout the pipeline.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Boxed error returned by a detection backend.
pub type BoxedDetectorError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that end a session or prevent one from starting.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid settings, unreachable source, or a detector that failed to initialize.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Inference failed for the current frame.
    #[error("detector error: {0}")]
    Detector(#[source] BoxedDetectorError),

    /// The source failed while producing a frame.
    #[error("acquisition error: {0}")]
    Acquisition(String),

    /// A sink refused a frame.
    #[error("output error: {0}")]
    Output(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The background session thread panicked before reporting a result.
    #[error("session worker panicked: {0}")]
    WorkerPanicked(String),
}

impl PipelineError {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn acquisition<S: Into<String>>(msg: S) -> Self {
        Self::Acquisition(msg.into())
    }

    pub fn output<S: Into<String>>(msg: S) -> Self {
        Self::Output(msg.into())
    }

    pub fn detector<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Detector(Box::new(err))
    }

    /// Whether this error was raised before any frame could be processed.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::ConfigParse(_))
    }
}

/// A non-fatal failure while releasing a session resource.
///
/// Teardown never aborts on these; they are logged and handed back in the
/// session summary so the original termination reason stays visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseWarning {
    pub resource: &'static str,
    pub message: String,
}

impl ReleaseWarning {
    pub fn new(resource: &'static str, err: &PipelineError) -> Self {
        Self {
            resource,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ReleaseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to release {}: {}", self.resource, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(PipelineError::configuration("camera 3 unavailable").is_configuration());
        assert!(!PipelineError::acquisition("truncated frame").is_configuration());
    }

    #[test]
    fn test_release_warning_display() {
        let warning = ReleaseWarning::new("recorder", &PipelineError::output("disk full"));
        assert_eq!(
            warning.to_string(),
            "failed to release recorder: output error: disk full"
        );
    }
}
