use std::path::Path;
use std::thread::{self, JoinHandle};

use crossbeam_channel::bounded;
use tracing::{info, warn};

use super::annotate::Annotator;
use super::session::{SessionBuilder, SessionSummary, StopFlag};
use super::sink::FrameSink;
use super::source::load_still;
use super::AnnotatedFrame;
use crate::config::InferenceParams;
use crate::error::{PipelineError, Result};
use crate::integration::DetectionSource;
use crate::metrics::{ClassPresence, MetricsSnapshot};

/// Start a session on its own worker thread.
///
/// The session is opened on the worker, which owns it for its whole life.
/// Start-up errors are returned here; later errors come back from
/// [`SessionHandle::join`].
pub fn spawn<D>(builder: SessionBuilder<D>) -> Result<SessionHandle>
where
    D: DetectionSource + Send + 'static,
{
    let stop = StopFlag::new();
    let worker_stop = stop.clone();
    let (ready_tx, ready_rx) = bounded::<Result<()>>(1);

    let thread = thread::Builder::new()
        .name("livetrack-session".into())
        .spawn(move || {
            let session = match builder.start() {
                Ok(session) => {
                    let _ = ready_tx.send(Ok(()));
                    session
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return None;
                }
            };
            Some(session.run(&worker_stop))
        })?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(SessionHandle {
            stop,
            thread: Some(thread),
        }),
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        // The worker died before reporting.
        Err(_) => Err(PipelineError::WorkerPanicked(panic_message(thread.join()))),
    }
}

fn panic_message<T>(joined: thread::Result<T>) -> String {
    match joined {
        Ok(_) => "worker exited without reporting".to_string(),
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string()),
    }
}

/// Control handle for a session running on a worker thread.
///
/// Dropping the handle stops the session and waits for it to tear down.
pub struct SessionHandle {
    stop: StopFlag,
    thread: Option<JoinHandle<Option<Result<SessionSummary>>>>,
}

impl SessionHandle {
    /// Ask the worker to finish after the current iteration.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Wait for the worker and return its outcome.
    pub fn join(mut self) -> Result<SessionSummary> {
        self.wait()
    }

    fn wait(&mut self) -> Result<SessionSummary> {
        let Some(thread) = self.thread.take() else {
            return Err(PipelineError::WorkerPanicked("session already joined".into()));
        };
        match thread.join() {
            Ok(Some(outcome)) => outcome,
            Ok(None) => Err(PipelineError::WorkerPanicked(
                "worker exited without reporting".into(),
            )),
            Err(payload) => Err(PipelineError::WorkerPanicked(panic_message::<()>(Err(payload)))),
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop.stop();
            if let Err(e) = self.wait() {
                warn!("session ended with error after handle was dropped: {e}");
            }
        }
    }
}

/// Detect once on a still image, annotate it and hand it to `display`.
///
/// No tracker and no frame-rate state are involved.
pub fn run_still<D: DetectionSource>(
    detector: &mut D,
    path: &Path,
    params: &InferenceParams,
    annotator: &Annotator,
    display: Option<&mut dyn FrameSink>,
) -> Result<AnnotatedFrame> {
    params.validate()?;
    let mut image = load_still(path)?;

    let detections = detector
        .detect(&image, params)
        .map_err(PipelineError::detector)?;
    annotator.draw_detections(&mut image, &detections);

    let presence = ClassPresence::from_detections(&detector.class_names(), &detections);
    info!(
        path = %path.display(),
        detections = detections.len(),
        "still image processed"
    );

    let frame = AnnotatedFrame {
        index: 0,
        image,
        metrics: MetricsSnapshot {
            frame_index: 0,
            fps: 0.0,
            detections: detections.len(),
            tracked: 0,
            presence,
        },
        detections,
        tracks: Default::default(),
    };
    if let Some(display) = display {
        display.emit(&frame)?;
        display.finish()?;
    }
    Ok(frame)
}
