//! Output sinks: live display handoff and file recorders.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError, bounded};
use tracing::{debug, info};

use super::AnnotatedFrame;
use crate::config::RecordingConfig;
use crate::error::{PipelineError, Result};

/// Consumer of annotated frames.
pub trait FrameSink {
    fn emit(&mut self, frame: &AnnotatedFrame) -> Result<()>;

    /// Flush and close. Called once during session teardown.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str;
}

/// Create a latest-value display handoff.
///
/// The producer side never blocks: when the viewer has not collected the
/// previous frame yet, that frame is discarded in favour of the new one.
pub fn display_channel() -> (DisplayHandoff, DisplayReceiver) {
    let (tx, rx) = bounded(1);
    let closed = Arc::new(AtomicBool::new(false));
    (
        DisplayHandoff {
            tx,
            evict: rx.clone(),
            dropped: 0,
            closed: closed.clone(),
        },
        DisplayReceiver { rx, closed },
    )
}

pub struct DisplayHandoff {
    tx: Sender<AnnotatedFrame>,
    // Second handle on the slot so stale frames can be evicted by the producer.
    evict: Receiver<AnnotatedFrame>,
    dropped: u64,
    closed: Arc<AtomicBool>,
}

impl DisplayHandoff {
    /// Frames overwritten before the viewer collected them.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn publish(&mut self, mut frame: AnnotatedFrame) {
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if self.evict.try_recv().is_ok() {
                        self.dropped += 1;
                    }
                    frame = rejected;
                }
                // Unreachable while `evict` is alive.
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

impl FrameSink for DisplayHandoff {
    fn emit(&mut self, frame: &AnnotatedFrame) -> Result<()> {
        self.publish(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.dropped > 0 {
            debug!(dropped = self.dropped, "display skipped stale frames");
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "display"
    }
}

impl Drop for DisplayHandoff {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Viewer side of the display handoff.
pub struct DisplayReceiver {
    rx: Receiver<AnnotatedFrame>,
    closed: Arc<AtomicBool>,
}

impl DisplayReceiver {
    /// Take the newest frame if one is waiting.
    pub fn latest(&self) -> Option<AnnotatedFrame> {
        match self.rx.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for the next frame.
    pub fn wait(&self, timeout: Duration) -> Option<AnnotatedFrame> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Whether the producing session has finished or gone away.
    ///
    /// A frame published just before closing can still be collected.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Open the recorder configured for a session.
///
/// The destination picks the container: `.gif` writes an animated GIF, any
/// other extension an mp4v video through OpenCV, and a path without an
/// extension a directory of numbered PNG frames. `fps` is the source frame
/// rate, or the configured default when the source does not report one.
pub fn open_recorder(config: &RecordingConfig, fps: f64) -> Result<Box<dyn FrameSink>> {
    let ext = config
        .path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let recorder: Box<dyn FrameSink> = match ext.as_deref() {
        Some("gif") => Box::new(GifRecorder::create(&config.path, fps)?),
        Some(other) => video_recorder(&config.path, other, fps)?,
        None => Box::new(ImageSequenceRecorder::create(&config.path)?),
    };
    info!(path = %config.path.display(), fps, "recording enabled");
    Ok(recorder)
}

#[cfg(feature = "opencv")]
fn video_recorder(path: &Path, _ext: &str, fps: f64) -> Result<Box<dyn FrameSink>> {
    Ok(Box::new(super::opencv::VideoRecorder::create(path, fps)?))
}

#[cfg(not(feature = "opencv"))]
fn video_recorder(path: &Path, ext: &str, _fps: f64) -> Result<Box<dyn FrameSink>> {
    Err(PipelineError::configuration(format!(
        "cannot record {}: .{ext} video needs the `opencv` feature",
        path.display()
    )))
}

/// Writes annotated frames into an animated GIF.
///
/// The canvas size is taken from the first frame; later frames must match it.
pub struct GifRecorder {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    encoder: Option<gif::Encoder<BufWriter<File>>>,
    canvas: (u16, u16),
    // Frame delay in GIF units of 10 ms.
    delay: u16,
    written: u64,
    closed: bool,
}

impl GifRecorder {
    pub fn create(path: &Path, fps: f64) -> Result<Self> {
        let file = File::create(path).map_err(|e| {
            PipelineError::configuration(format!("cannot create {}: {e}", path.display()))
        })?;
        let fps = if fps.is_finite() { fps.max(1.0) } else { 25.0 };

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(BufWriter::new(file)),
            encoder: None,
            canvas: (0, 0),
            delay: (100.0 / fps).round().clamp(1.0, f64::from(u16::MAX)) as u16,
            written: 0,
            closed: false,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }

    fn output_error(&self, err: impl std::fmt::Display) -> PipelineError {
        PipelineError::output(format!("{}: {err}", self.path.display()))
    }

    fn encoder_for(&mut self, width: u16, height: u16) -> Result<&mut gif::Encoder<BufWriter<File>>> {
        if self.encoder.is_some() && self.canvas != (width, height) {
            let (cw, ch) = self.canvas;
            return Err(self.output_error(format!(
                "frame is {width}x{height} but the recording is {cw}x{ch}"
            )));
        }
        if self.encoder.is_none() {
            let Some(file) = self.file.take() else {
                return Err(PipelineError::output("recorder already closed"));
            };
            let mut encoder = gif::Encoder::new(file, width, height, &[])
                .map_err(|e| self.output_error(e))?;
            encoder
                .set_repeat(gif::Repeat::Infinite)
                .map_err(|e| self.output_error(e))?;
            self.encoder = Some(encoder);
            self.canvas = (width, height);
        }
        self.encoder
            .as_mut()
            .ok_or_else(|| PipelineError::output("recorder already closed"))
    }
}

impl FrameSink for GifRecorder {
    fn emit(&mut self, frame: &AnnotatedFrame) -> Result<()> {
        if self.closed {
            return Err(PipelineError::output("recorder already closed"));
        }
        let (width, height) = frame.image.dimensions();
        let (Ok(w), Ok(h)) = (u16::try_from(width), u16::try_from(height)) else {
            return Err(self.output_error(format!("{width}x{height} exceeds the GIF canvas limit")));
        };

        let mut gif_frame = gif::Frame::from_rgb_speed(w, h, frame.image.as_raw(), 10);
        gif_frame.delay = self.delay;

        let encoder = self.encoder_for(w, h)?;
        let result = encoder.write_frame(&gif_frame);
        result.map_err(|e| self.output_error(e))?;
        self.written += 1;
        Ok(())
    }

    /// Write the trailer and flush; write errors surface here.
    fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let writer = match (self.encoder.take(), self.file.take()) {
            (Some(encoder), _) => encoder.into_inner().map_err(|e| self.output_error(e))?,
            (None, Some(file)) => file,
            (None, None) => return Ok(()),
        };
        writer
            .into_inner()
            .map_err(|e| self.output_error(e.error()))?;

        debug!(path = %self.path.display(), frames = self.written, "recording closed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

/// Writes annotated frames as numbered PNG files.
pub struct ImageSequenceRecorder {
    dir: PathBuf,
    written: u64,
    closed: bool,
}

impl ImageSequenceRecorder {
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            PipelineError::configuration(format!("cannot create {}: {e}", dir.display()))
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            written: 0,
            closed: false,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for ImageSequenceRecorder {
    fn emit(&mut self, frame: &AnnotatedFrame) -> Result<()> {
        if self.closed {
            return Err(PipelineError::output("recorder already closed"));
        }
        let path = self.dir.join(format!("frame_{:06}.png", frame.index));
        frame
            .image
            .save(&path)
            .map_err(|e| PipelineError::output(format!("{}: {e}", path.display())))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}
