//! Frame acquisition.

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, Frames, RgbImage};
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::error::{PipelineError, Result};

/// A stream of frames owned by exactly one session.
///
/// `next_frame` returning `Ok(None)` is the normal end of the stream.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Native frame rate, when the container reports one.
    fn frame_rate(&self) -> Option<f64> {
        None
    }

    /// Close the underlying device or file. Must be safe to call twice.
    fn release(&mut self) -> Result<()>;

    fn is_released(&self) -> bool;

    fn describe(&self) -> String;
}

/// Opens live cameras by device index.
///
/// With the `opencv` feature, sessions without an injected backend fall back
/// to OpenCV's `VideoCapture`.
pub trait CameraBackend {
    fn open(&mut self, index: u32) -> Result<Box<dyn FrameSource>>;
}

/// Open the source named by `config`.
pub fn open_source(
    config: &SourceConfig,
    camera: Option<&mut dyn CameraBackend>,
) -> Result<Box<dyn FrameSource>> {
    let source: Box<dyn FrameSource> = match config {
        SourceConfig::Camera { index } => match camera {
            Some(backend) => backend.open(*index)?,
            None => default_camera(*index)?,
        },
        SourceConfig::VideoFile { path } => open_video(path)?,
        SourceConfig::ImageSequence { dir } => Box::new(ImageSequenceSource::open(dir)?),
        SourceConfig::Still { .. } => {
            return Err(PipelineError::configuration(
                "still images run once without a session",
            ));
        }
    };
    info!(source = %source.describe(), fps = ?source.frame_rate(), "source opened");
    Ok(source)
}

#[cfg(feature = "opencv")]
fn default_camera(index: u32) -> Result<Box<dyn FrameSource>> {
    super::opencv::OpenCvCamera.open(index)
}

#[cfg(not(feature = "opencv"))]
fn default_camera(index: u32) -> Result<Box<dyn FrameSource>> {
    Err(PipelineError::configuration(format!(
        "camera {index} unavailable: no camera backend configured and the `opencv` feature is off"
    )))
}

/// Open a stored video. Animated GIFs are decoded in-process; every other
/// container goes through OpenCV.
pub fn open_video(path: &Path) -> Result<Box<dyn FrameSource>> {
    let is_gif = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gif"));
    if is_gif {
        return Ok(Box::new(GifSource::open(path)?));
    }
    #[cfg(feature = "opencv")]
    {
        Ok(Box::new(super::opencv::CaptureSource::open_file(path)?))
    }
    #[cfg(not(feature = "opencv"))]
    {
        Err(PipelineError::configuration(format!(
            "cannot open {}: only .gif video is supported without the `opencv` feature",
            path.display()
        )))
    }
}

/// Decode a single still image.
pub fn load_still(path: &Path) -> Result<RgbImage> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| PipelineError::configuration(format!("cannot open {}: {e}", path.display())))
}

/// Animated GIF read frame by frame.
pub struct GifSource {
    path: PathBuf,
    frames: Option<Frames<'static>>,
    pending: Option<RgbImage>,
    fps: Option<f64>,
}

impl GifSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            PipelineError::configuration(format!("cannot open {}: {e}", path.display()))
        })?;
        let decoder = GifDecoder::new(BufReader::new(file)).map_err(|e| {
            PipelineError::configuration(format!("{} is not a readable video: {e}", path.display()))
        })?;
        let mut frames = decoder.into_frames();

        // Read ahead one frame to learn the frame rate.
        let (pending, fps) = match frames.next() {
            Some(Ok(frame)) => {
                let (numer, denom) = frame.delay().numer_denom_ms();
                let fps = (numer > 0).then(|| 1000.0 * denom as f64 / numer as f64);
                (Some(DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8()), fps)
            }
            Some(Err(e)) => {
                return Err(PipelineError::configuration(format!(
                    "{} has no decodable frames: {e}",
                    path.display()
                )));
            }
            None => (None, None),
        };

        Ok(Self {
            path: path.to_path_buf(),
            frames: Some(frames),
            pending,
            fps,
        })
    }
}

impl FrameSource for GifSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(frames) = self.frames.as_mut() else {
            return Err(PipelineError::acquisition("video file already released"));
        };
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        match frames.next() {
            Some(Ok(frame)) => Ok(Some(DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8())),
            Some(Err(e)) => Err(PipelineError::acquisition(format!(
                "{}: {e}",
                self.path.display()
            ))),
            None => Ok(None),
        }
    }

    fn frame_rate(&self) -> Option<f64> {
        self.fps
    }

    fn release(&mut self) -> Result<()> {
        if self.frames.take().is_some() {
            debug!(path = %self.path.display(), "video file released");
        }
        self.pending = None;
        Ok(())
    }

    fn is_released(&self) -> bool {
        self.frames.is_none()
    }

    fn describe(&self) -> String {
        format!("gif {}", self.path.display())
    }
}

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// Directory of still frames played back in file-name order.
pub struct ImageSequenceSource {
    dir: PathBuf,
    files: VecDeque<PathBuf>,
    released: bool,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            PipelineError::configuration(format!("cannot read {}: {e}", dir.display()))
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        if files.is_empty() {
            return Err(PipelineError::configuration(format!(
                "{} contains no image frames",
                dir.display()
            )));
        }
        files.sort();

        Ok(Self {
            dir: dir.to_path_buf(),
            files: files.into(),
            released: false,
        })
    }

    pub fn remaining(&self) -> usize {
        self.files.len()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.released {
            return Err(PipelineError::acquisition("image sequence already released"));
        }
        let Some(path) = self.files.pop_front() else {
            return Ok(None);
        };
        image::open(&path)
            .map(|img| Some(img.to_rgb8()))
            .map_err(|e| PipelineError::acquisition(format!("{}: {e}", path.display())))
    }

    fn release(&mut self) -> Result<()> {
        self.released = true;
        self.files.clear();
        Ok(())
    }

    fn is_released(&self) -> bool {
        self.released
    }

    fn describe(&self) -> String {
        format!("image sequence {}", self.dir.display())
    }
}
