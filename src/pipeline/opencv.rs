//! OpenCV-backed cameras, video files and video recording.
//!
//! OpenCV hands out BGR frames; everything crossing into the pipeline is
//! converted to RGB.

use std::path::{Path, PathBuf};

use image::RgbImage;
use opencv::core::{CV_8UC3, Mat, Scalar, Size};
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture, VideoWriter};
use tracing::{debug, info};

use super::AnnotatedFrame;
use super::sink::FrameSink;
use super::source::{CameraBackend, FrameSource};
use crate::error::{PipelineError, Result};

/// Camera backend using `cv::VideoCapture` device indices.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenCvCamera;

impl CameraBackend for OpenCvCamera {
    fn open(&mut self, index: u32) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(CaptureSource::open_camera(index)?))
    }
}

/// A live camera or a video file read through `VideoCapture`.
pub struct CaptureSource {
    name: String,
    capture: Option<VideoCapture>,
    fps: Option<f64>,
}

impl CaptureSource {
    pub fn open_camera(index: u32) -> Result<Self> {
        let name = format!("camera {index}");
        let device = i32::try_from(index)
            .map_err(|_| PipelineError::configuration(format!("{name}: index out of range")))?;
        let capture = VideoCapture::new(device, videoio::CAP_ANY)
            .map_err(|e| PipelineError::configuration(format!("failed to open {name}: {e}")))?;
        Self::from_capture(name, capture)
    }

    pub fn open_file(path: &Path) -> Result<Self> {
        let name = format!("video file {}", path.display());
        let Some(location) = path.to_str() else {
            return Err(PipelineError::configuration(format!("{name}: path is not UTF-8")));
        };
        let capture = VideoCapture::from_file(location, videoio::CAP_ANY)
            .map_err(|e| PipelineError::configuration(format!("failed to open {name}: {e}")))?;
        Self::from_capture(name, capture)
    }

    fn from_capture(name: String, capture: VideoCapture) -> Result<Self> {
        let opened = capture
            .is_opened()
            .map_err(|e| PipelineError::configuration(format!("{name}: {e}")))?;
        if !opened {
            return Err(PipelineError::configuration(format!("{name} is not available")));
        }
        let fps = capture
            .get(videoio::CAP_PROP_FPS)
            .ok()
            .filter(|fps| fps.is_finite() && *fps > 0.0);
        info!(source = %name, ?fps, "capture opened");

        Ok(Self {
            name,
            capture: Some(capture),
            fps,
        })
    }
}

impl FrameSource for CaptureSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(capture) = self.capture.as_mut() else {
            return Err(PipelineError::acquisition(format!("{} already released", self.name)));
        };
        let mut mat = Mat::default();
        let grabbed = capture
            .read(&mut mat)
            .map_err(|e| PipelineError::acquisition(format!("{}: {e}", self.name)))?;
        // A failed grab is how both files and unplugged cameras end.
        if !grabbed || mat.empty() {
            return Ok(None);
        }
        mat_to_rgb(&mat)
            .map(Some)
            .map_err(|e| PipelineError::acquisition(format!("{}: {e}", self.name)))
    }

    fn frame_rate(&self) -> Option<f64> {
        self.fps
    }

    fn release(&mut self) -> Result<()> {
        if let Some(mut capture) = self.capture.take() {
            capture
                .release()
                .map_err(|e| PipelineError::acquisition(format!("{}: {e}", self.name)))?;
            debug!(source = %self.name, "capture released");
        }
        Ok(())
    }

    fn is_released(&self) -> bool {
        self.capture.is_none()
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Writes annotated frames to an mp4v video at the source frame rate.
///
/// The writer opens on the first frame, which fixes the video size.
pub struct VideoRecorder {
    path: PathBuf,
    fps: f64,
    fourcc: i32,
    writer: Option<VideoWriter>,
    size: (u32, u32),
    written: u64,
    closed: bool,
}

impl VideoRecorder {
    pub fn create(path: &Path, fps: f64) -> Result<Self> {
        if path.to_str().is_none() {
            return Err(PipelineError::configuration(format!(
                "{}: path is not UTF-8",
                path.display()
            )));
        }
        let parent_missing = path
            .parent()
            .is_some_and(|dir| !dir.as_os_str().is_empty() && !dir.is_dir());
        if parent_missing {
            return Err(PipelineError::configuration(format!(
                "cannot create {}: directory does not exist",
                path.display()
            )));
        }
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')
            .map_err(|e| PipelineError::configuration(e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            fps: if fps.is_finite() && fps > 0.0 { fps } else { 25.0 },
            fourcc,
            writer: None,
            size: (0, 0),
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

    fn open_writer(&mut self, width: u32, height: u32) -> Result<()> {
        let location = self.path.to_string_lossy().into_owned();
        let size = Size::new(width as i32, height as i32);
        let writer = VideoWriter::new(&location, self.fourcc, self.fps, size, true)
            .map_err(|e| self.output_error(e))?;
        if !writer.is_opened().map_err(|e| self.output_error(e))? {
            return Err(self.output_error("video writer did not open"));
        }
        debug!(path = %self.path.display(), width, height, fps = self.fps, "video writer opened");
        self.writer = Some(writer);
        self.size = (width, height);
        Ok(())
    }
}

impl FrameSink for VideoRecorder {
    fn emit(&mut self, frame: &AnnotatedFrame) -> Result<()> {
        if self.closed {
            return Err(PipelineError::output("recorder already closed"));
        }
        let (width, height) = frame.image.dimensions();
        if self.writer.is_none() {
            self.open_writer(width, height)?;
        } else if self.size != (width, height) {
            let (w, h) = self.size;
            return Err(self.output_error(format!(
                "frame is {width}x{height} but the recording is {w}x{h}"
            )));
        }

        let mat = rgb_to_mat(&frame.image).map_err(|e| self.output_error(e))?;
        let result = match self.writer.as_mut() {
            Some(writer) => writer.write(&mat),
            None => return Err(PipelineError::output("recorder already closed")),
        };
        result.map_err(|e| self.output_error(e))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.closed = true;
        if let Some(mut writer) = self.writer.take() {
            writer.release().map_err(|e| self.output_error(e))?;
            debug!(path = %self.path.display(), frames = self.written, "video closed");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

fn mat_to_rgb(mat: &Mat) -> std::result::Result<RgbImage, String> {
    if mat.typ() != CV_8UC3 {
        return Err(format!("unsupported frame type {}", mat.typ()));
    }
    let (width, height) = (mat.cols() as u32, mat.rows() as u32);
    let continuous;
    let mat = if mat.is_continuous() {
        mat
    } else {
        continuous = mat.try_clone().map_err(|e| e.to_string())?;
        &continuous
    };
    let bgr = mat.data_bytes().map_err(|e| e.to_string())?;

    let mut rgb = Vec::with_capacity(bgr.len());
    for px in bgr.chunks_exact(3) {
        rgb.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    RgbImage::from_raw(width, height, rgb).ok_or_else(|| "frame buffer size mismatch".to_string())
}

fn rgb_to_mat(image: &RgbImage) -> opencv::Result<Mat> {
    let (width, height) = image.dimensions();
    let mut mat =
        Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC3, Scalar::all(0.0))?;
    let bgr = mat.data_bytes_mut()?;
    for (dst, src) in bgr.chunks_exact_mut(3).zip(image.as_raw().chunks_exact(3)) {
        dst[0] = src[2];
        dst[1] = src[1];
        dst[2] = src[0];
    }
    Ok(mat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_color_conversion_swaps_channels() {
        let image = RgbImage::from_pixel(4, 2, Rgb([10, 20, 30]));
        let mat = rgb_to_mat(&image).unwrap();
        assert_eq!(&mat.data_bytes().unwrap()[..3], &[30, 20, 10]);
        assert_eq!(mat_to_rgb(&mat).unwrap(), image);
    }

    #[test]
    fn test_missing_camera_is_configuration_error() {
        let err = OpenCvCamera.open(9999).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_missing_video_file() {
        let err = CaptureSource::open_file(Path::new("/no/such/clip.mp4"))
            .err()
            .unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_recorder_needs_existing_directory() {
        let err = VideoRecorder::create(Path::new("/no/such/dir/out.mp4"), 25.0)
            .err()
            .unwrap();
        assert!(err.is_configuration());
    }
}
