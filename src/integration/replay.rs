//! Detector that replays stored per-frame detections.
//!
//! Useful for running the pipeline without an inference runtime, e.g. on
//! output captured from a detection service. The file is JSON lines: an
//! optional header `{"classes": ["A", "B", ...]}` followed by one line per
//! frame, `{"detections": [{"class": "A", "confidence": 0.9, "bbox": [x1, y1, x2, y2]}]}`.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use image::RgbImage;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::{DetectionSource, IntoDetections};
use crate::config::{DetectorSettings, InferenceParams};
use crate::tracker::Detection;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("cannot read replay file: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// The source produced more frames than the replay holds.
    #[error("replay exhausted at frame {frame}")]
    Exhausted { frame: u64 },
}

/// One frame's worth of stored detections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayFrame {
    #[serde(default)]
    pub detections: Vec<Detection>,
}

impl IntoDetections for ReplayFrame {
    fn into_detections(self) -> Vec<Detection> {
        self.detections
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReplayLine {
    Header { classes: Vec<String> },
    Frame(ReplayFrame),
}

#[derive(Debug, Clone, Default)]
pub struct ReplayDetector {
    frames: VecDeque<ReplayFrame>,
    classes: Vec<String>,
    served: u64,
}

impl ReplayDetector {
    /// Load a JSON-lines replay file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let reader = BufReader::new(File::open(path)?);
        Self::from_reader(reader)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, ReplayError> {
        let mut detector = Self::default();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parsed = serde_json::from_str::<ReplayLine>(&line)
                .map_err(|source| ReplayError::Parse {
                    line: idx + 1,
                    source,
                })?;
            match parsed {
                ReplayLine::Header { classes } => detector.classes = classes,
                ReplayLine::Frame(frame) => detector.frames.push_back(frame),
            }
        }
        Ok(detector)
    }

    /// Build a replay directly from in-memory frames.
    pub fn from_frames(frames: impl IntoIterator<Item = Vec<Detection>>) -> Self {
        Self {
            frames: frames
                .into_iter()
                .map(|detections| ReplayFrame { detections })
                .collect(),
            ..Self::default()
        }
    }

    pub fn with_classes<S: Into<String>>(mut self, classes: impl IntoIterator<Item = S>) -> Self {
        self.classes = classes.into_iter().map(Into::into).collect();
        self
    }

    /// Frames not yet served.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl DetectionSource for ReplayDetector {
    type Error = ReplayError;

    fn detect(
        &mut self,
        _frame: &RgbImage,
        params: &InferenceParams,
    ) -> Result<Vec<Detection>, Self::Error> {
        let Some(frame) = self.frames.pop_front() else {
            return Err(ReplayError::Exhausted { frame: self.served });
        };
        self.served += 1;
        Ok(params.filter(frame.into_detections(), |d| d.confidence))
    }

    fn prepare(&mut self, settings: &DetectorSettings) -> Result<(), Self::Error> {
        debug!(
            device = ?settings.device,
            precision = ?settings.precision,
            frames = self.frames.len(),
            "replay detector ready"
        );
        Ok(())
    }

    fn class_names(&self) -> Vec<String> {
        self.classes.clone()
    }
}
