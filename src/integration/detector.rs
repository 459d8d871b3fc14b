//! Trait for object detection inference backends.

use image::RgbImage;

use crate::config::{DetectorSettings, InferenceParams};
use crate::tracker::Detection;

/// Trait for object detection inference backends.
///
/// The pipeline treats the model as a black box: one image in, a set of
/// labelled boxes out. Implement this trait to plug any runtime into a
/// session.
///
/// # Example
///
/// ```ignore
/// use livetrack_rs::{Detection, DetectionSource, InferenceParams};
///
/// struct MyDetector {
///     // Your model here
/// }
///
/// impl DetectionSource for MyDetector {
///     type Error = std::io::Error;
///
///     fn detect(&mut self, frame: &RgbImage, params: &InferenceParams) -> Result<Vec<Detection>, Self::Error> {
///         // Run inference and return detections
///         Ok(vec![])
///     }
/// }
/// ```
pub trait DetectionSource {
    /// Error type for detection failures.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Run inference on one frame.
    ///
    /// # Arguments
    /// * `frame` - RGB raster at the source's native resolution
    /// * `params` - Confidence, NMS, input size and count limits for this session
    fn detect(
        &mut self,
        frame: &RgbImage,
        params: &InferenceParams,
    ) -> Result<Vec<Detection>, Self::Error>;

    /// Load weights and move the model onto the requested device.
    ///
    /// Called once before the first frame of a session. A failure here
    /// aborts session start.
    fn prepare(&mut self, _settings: &DetectorSettings) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Every label the model can emit, used to build the presence legend.
    fn class_names(&self) -> Vec<String> {
        Vec::new()
    }
}

impl<D: DetectionSource + ?Sized> DetectionSource for Box<D> {
    type Error = D::Error;

    fn detect(
        &mut self,
        frame: &RgbImage,
        params: &InferenceParams,
    ) -> Result<Vec<Detection>, Self::Error> {
        (**self).detect(frame, params)
    }

    fn prepare(&mut self, settings: &DetectorSettings) -> Result<(), Self::Error> {
        (**self).prepare(settings)
    }

    fn class_names(&self) -> Vec<String> {
        (**self).class_names()
    }
}

/// Helper trait for converting model-specific outputs to `Detection`.
///
/// Implement this for your model's output format to enable easy conversion.
pub trait IntoDetections {
    /// Convert the output into a vector of detections.
    fn into_detections(self) -> Vec<Detection>;
}

impl IntoDetections for Vec<Detection> {
    fn into_detections(self) -> Vec<Detection> {
        self
    }
}
