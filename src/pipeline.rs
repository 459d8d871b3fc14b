//! Frame pipeline controller: acquisition, detection, tracking, overlays,
//! metrics and output for one session at a time.

mod annotate;
mod frame;
mod glyphs;
#[cfg(feature = "opencv")]
mod opencv;
mod session;
mod sink;
mod source;
mod worker;

pub use annotate::{Annotator, class_color};
#[cfg(feature = "opencv")]
pub use opencv::{CaptureSource, OpenCvCamera, VideoRecorder};
pub use frame::AnnotatedFrame;
pub use session::{EndReason, Session, SessionBuilder, SessionSummary, StopFlag};
pub use sink::{
    DisplayHandoff, DisplayReceiver, FrameSink, GifRecorder, ImageSequenceRecorder,
    display_channel, open_recorder,
};
pub use source::{
    CameraBackend, FrameSource, GifSource, ImageSequenceSource, load_still, open_source,
    open_video,
};
pub use worker::{SessionHandle, run_still, spawn};
