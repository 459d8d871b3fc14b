//! Session configuration.
//!
//! A session reads one immutable [`SessionConfig`] snapshot at start. Values
//! can come from a TOML file, from code, or both (file first, then overrides).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::tracker::TrackerConfig;

/// Thresholds and limits handed to the detector on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceParams {
    /// Minimum confidence for a detection to be reported
    pub confidence: f64,
    /// IoU threshold used by non-maximum suppression
    pub iou: f64,
    /// Square inference input size in pixels
    pub image_size: u32,
    /// Cap on detections per frame
    pub max_detections: usize,
}

impl InferenceParams {
    /// Defaults used by the interactive practice loop.
    pub fn practice() -> Self {
        Self {
            confidence: 0.35,
            iou: 0.45,
            image_size: 640,
            max_detections: 100,
        }
    }

    /// Defaults used by the standalone camera test harness.
    pub fn harness() -> Self {
        Self {
            confidence: 0.5,
            ..Self::practice()
        }
    }

    /// Apply the confidence and count limits to already-computed detections.
    ///
    /// Backends that run NMS themselves usually do this internally; sources
    /// that replay stored output use it to honour the session settings. The
    /// highest-confidence detections win when the cap is hit.
    pub fn filter<T, F>(&self, mut items: Vec<T>, confidence: F) -> Vec<T>
    where
        F: Fn(&T) -> f64,
    {
        items.retain(|item| confidence(item) >= self.confidence);
        if items.len() > self.max_detections {
            items.sort_by(|a, b| confidence(b).total_cmp(&confidence(a)));
            items.truncate(self.max_detections);
        }
        items
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(PipelineError::configuration(format!(
                "confidence threshold {} is outside [0, 1]",
                self.confidence
            )));
        }
        if !(0.0..=1.0).contains(&self.iou) {
            return Err(PipelineError::configuration(format!(
                "IoU threshold {} is outside [0, 1]",
                self.iou
            )));
        }
        if !(320..=1280).contains(&self.image_size) || self.image_size % 32 != 0 {
            return Err(PipelineError::configuration(format!(
                "image size {} must be a multiple of 32 between 320 and 1280",
                self.image_size
            )));
        }
        if !(1..=1000).contains(&self.max_detections) {
            return Err(PipelineError::configuration(format!(
                "max detections {} must be between 1 and 1000",
                self.max_detections
            )));
        }
        Ok(())
    }
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self::practice()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Gpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Full,
    Half,
}

/// What the detector needs to know before the first frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub device: Device,
    /// Precision actually requested; half precision is never used on CPU.
    pub precision: Precision,
    pub model: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Live camera identified by an opaque device index
    Camera { index: u32 },
    /// Stored video file (GIF in-process, other containers through OpenCV)
    VideoFile { path: PathBuf },
    /// Directory of still frames, read in file-name order
    ImageSequence { dir: PathBuf },
    /// Single still image; runs once without a session
    Still { path: PathBuf },
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::Camera { index: 0 }
    }
}

impl SourceConfig {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Camera { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub tracker: TrackerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub enabled: bool,
    /// `.gif` writes an animated GIF; anything else is a PNG frame directory
    pub path: PathBuf,
    /// Frame rate used when the source does not report one
    pub default_fps: f64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("output.gif"),
            default_fps: 25.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub source: SourceConfig,
    pub inference: InferenceParams,
    pub tracking: TrackingConfig,
    pub device: Device,
    pub precision: Precision,
    /// Weights handed to the detector's `prepare` step
    pub model: Option<PathBuf>,
    pub recording: RecordingConfig,
    /// Pause between iterations; defaults depend on the source kind
    pub idle_ms: Option<u64>,
}

impl SessionConfig {
    /// Load a configuration from a TOML file. Missing keys take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.inference.validate()?;
        let radius = self.tracking.tracker.gate_radius;
        if self.tracking.enabled && (radius.is_nan() || radius <= 0.0) {
            return Err(PipelineError::configuration(format!(
                "tracking gate radius {radius} must be positive"
            )));
        }
        let fps = self.recording.default_fps;
        if self.recording.enabled && (fps.is_nan() || fps <= 0.0) {
            return Err(PipelineError::configuration(format!(
                "recording frame rate {fps} must be positive"
            )));
        }
        Ok(())
    }

    pub fn detector_settings(&self) -> DetectorSettings {
        let precision = match self.device {
            Device::Cpu => Precision::Full,
            Device::Gpu => self.precision,
        };
        DetectorSettings {
            device: self.device,
            precision,
            model: self.model.clone(),
        }
    }

    /// Pause between loop iterations.
    pub fn idle(&self) -> Duration {
        match self.idle_ms {
            Some(ms) => Duration::from_millis(ms),
            None if self.source.is_live() => Duration::from_millis(10),
            None => Duration::from_millis(1),
        }
    }
}
