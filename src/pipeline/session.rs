//! One continuous run of the acquisition → detection → tracking → output loop.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::annotate::Annotator;
use super::sink::{FrameSink, open_recorder};
use super::source::{CameraBackend, FrameSource, open_source};
use super::AnnotatedFrame;
use crate::config::SessionConfig;
use crate::error::{PipelineError, ReleaseWarning, Result};
use crate::integration::DetectionSource;
use crate::metrics::{ClassPresence, FpsMeter, MetricsSnapshot};
use crate::tracker::CentroidTracker;

/// Cooperative stop request, checked between iterations.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    EndOfStream,
    Stopped,
}

/// What a finished session reports back.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub frames: u64,
    /// Smoothed FPS at the last frame
    pub fps: f64,
    pub reason: EndReason,
    pub source_released: bool,
    /// `None` when recording was off
    pub recorder_released: Option<bool>,
    pub warnings: Vec<ReleaseWarning>,
}

/// Collects everything a session needs before it opens any resource.
pub struct SessionBuilder<D: DetectionSource> {
    config: SessionConfig,
    detector: D,
    display: Option<Box<dyn FrameSink + Send>>,
    camera: Option<Box<dyn CameraBackend + Send>>,
    annotator: Annotator,
}

impl<D: DetectionSource> SessionBuilder<D> {
    pub fn new(config: SessionConfig, detector: D) -> Self {
        Self {
            config,
            detector,
            display: None,
            camera: None,
            annotator: Annotator::default(),
        }
    }

    pub fn display(mut self, sink: impl FrameSink + Send + 'static) -> Self {
        self.display = Some(Box::new(sink));
        self
    }

    pub fn camera_backend(mut self, backend: impl CameraBackend + Send + 'static) -> Self {
        self.camera = Some(Box::new(backend));
        self
    }

    pub fn annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    /// Validate the configuration, initialize the detector and open the
    /// source and recorder.
    ///
    /// Every failure is a configuration error; a source opened before a
    /// later step fails is released again.
    pub fn start(mut self) -> Result<Session<D>> {
        self.config.validate()?;

        self.detector
            .prepare(&self.config.detector_settings())
            .map_err(|e| {
                PipelineError::configuration(format!("detector initialization failed: {e}"))
            })?;

        let camera = self
            .camera
            .as_mut()
            .map(|backend| backend.as_mut() as &mut dyn CameraBackend);
        let mut source = open_source(&self.config.source, camera)?;

        let recorder = if self.config.recording.enabled {
            let fps = source
                .frame_rate()
                .unwrap_or(self.config.recording.default_fps);
            match open_recorder(&self.config.recording, fps) {
                Ok(recorder) => Some(recorder),
                Err(e) => {
                    if let Err(release) = source.release() {
                        warn!("{}", ReleaseWarning::new("source", &release));
                    }
                    return Err(e);
                }
            }
        } else {
            None
        };

        let tracker = self
            .config
            .tracking
            .enabled
            .then(|| CentroidTracker::new(self.config.tracking.tracker.clone()));
        let classes = self.detector.class_names();

        info!(
            source = %source.describe(),
            tracking = tracker.is_some(),
            recording = recorder.is_some(),
            classes = classes.len(),
            "session started"
        );

        Ok(Session {
            config: self.config,
            detector: self.detector,
            source,
            recorder,
            display: self.display,
            tracker,
            annotator: self.annotator,
            classes,
            fps: FpsMeter::new(Instant::now()),
            frames: 0,
            torn_down: false,
            source_released: false,
            recorder_released: false,
            warnings: Vec::new(),
        })
    }
}

/// A running pipeline session.
///
/// Owns the source, the optional recorder, the display sink and the tracker.
/// All of them are released when the session ends, including when it is
/// dropped early.
pub struct Session<D: DetectionSource> {
    config: SessionConfig,
    detector: D,
    source: Box<dyn FrameSource>,
    recorder: Option<Box<dyn FrameSink>>,
    display: Option<Box<dyn FrameSink + Send>>,
    tracker: Option<CentroidTracker>,
    annotator: Annotator,
    classes: Vec<String>,
    fps: FpsMeter,
    frames: u64,
    torn_down: bool,
    source_released: bool,
    recorder_released: bool,
    warnings: Vec<ReleaseWarning>,
}

impl<D: DetectionSource> Session<D> {
    /// Shorthand for `SessionBuilder::new(config, detector).start()`.
    pub fn start(config: SessionConfig, detector: D) -> Result<Self> {
        SessionBuilder::new(config, detector).start()
    }

    /// Process one frame. Returns `Ok(None)` at end of stream.
    pub fn step(&mut self) -> Result<Option<AnnotatedFrame>> {
        if self.torn_down {
            return Ok(None);
        }
        let Some(mut image) = self.source.next_frame()? else {
            return Ok(None);
        };

        let detections = self
            .detector
            .detect(&image, &self.config.inference)
            .map_err(PipelineError::detector)?;

        self.annotator.draw_detections(&mut image, &detections);
        let tracks = match self.tracker.as_mut() {
            Some(tracker) => {
                let tracks = tracker.update_detections(&detections);
                self.annotator.draw_identities(&mut image, &tracks);
                tracks
            }
            None => BTreeMap::new(),
        };

        let presence = ClassPresence::from_detections(&self.classes, &detections);
        let fps = self.fps.tick(Instant::now());
        self.annotator.draw_fps(&mut image, fps);

        let frame = AnnotatedFrame {
            index: self.frames,
            image,
            metrics: MetricsSnapshot {
                frame_index: self.frames,
                fps,
                detections: detections.len(),
                tracked: tracks.len(),
                presence,
            },
            detections,
            tracks,
        };
        self.frames += 1;

        if let Some(display) = self.display.as_mut() {
            display.emit(&frame)?;
        }
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.emit(&frame)?;
        }

        debug!(
            frame = frame.index,
            detections = frame.metrics.detections,
            tracked = frame.metrics.tracked,
            fps,
            "frame processed"
        );
        Ok(Some(frame))
    }

    /// Drive the loop until end of stream, a stop request or an error.
    ///
    /// Resources are released before this returns on every path; a per-frame
    /// error is reported after teardown.
    pub fn run(mut self, stop: &StopFlag) -> Result<SessionSummary> {
        let idle = self.config.idle();
        let outcome = loop {
            if stop.is_stopped() {
                break Ok(EndReason::Stopped);
            }
            match self.step() {
                Ok(Some(_)) => {}
                Ok(None) => break Ok(EndReason::EndOfStream),
                Err(e) => break Err(e),
            }
            if !idle.is_zero() {
                thread::sleep(idle);
            }
        };

        self.teardown();

        match outcome {
            Ok(reason) => {
                info!(
                    frames = self.frames,
                    fps = self.fps.smoothed(),
                    ?reason,
                    "session finished"
                );
                Ok(self.summary(reason))
            }
            Err(e) => {
                error!(frames = self.frames, "session aborted: {e}");
                Err(e)
            }
        }
    }

    /// Release the source, recorder and display. Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        match self.source.release() {
            Ok(()) => self.source_released = true,
            Err(e) => self.warn_release("source", &e),
        }
        if let Some(recorder) = self.recorder.as_mut() {
            let name = recorder.name();
            match recorder.finish() {
                Ok(()) => self.recorder_released = true,
                Err(e) => self.warn_release(name, &e),
            }
        }
        if let Some(display) = self.display.as_mut() {
            let name = display.name();
            if let Err(e) = display.finish() {
                self.warn_release(name, &e);
            }
        }
    }

    fn warn_release(&mut self, resource: &'static str, err: &PipelineError) {
        let warning = ReleaseWarning::new(resource, err);
        warn!("{warning}");
        self.warnings.push(warning);
    }

    fn summary(&self, reason: EndReason) -> SessionSummary {
        SessionSummary {
            frames: self.frames,
            fps: self.fps.smoothed(),
            reason,
            source_released: self.source_released,
            recorder_released: self.recorder.as_ref().map(|_| self.recorder_released),
            warnings: self.warnings.clone(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn tracker(&self) -> Option<&CentroidTracker> {
        self.tracker.as_ref()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    pub fn fps(&self) -> f64 {
        self.fps.smoothed()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl<D: DetectionSource> Drop for Session<D> {
    fn drop(&mut self) {
        self.teardown();
    }
}
