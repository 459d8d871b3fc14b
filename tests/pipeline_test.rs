use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use image::{Rgb, RgbImage};
use livetrack_rs::config::{DetectorSettings, InferenceParams, RecordingConfig};
use livetrack_rs::pipeline::{
    self, AnnotatedFrame, Annotator, CameraBackend, EndReason, FrameSink, FrameSource, GifSource,
    display_channel, run_still,
};
use livetrack_rs::{
    Detection, DetectionSource, PipelineError, Rect, ReplayDetector, Session, SessionBuilder,
    SessionConfig, SourceConfig, StopFlag,
};
use thiserror::Error;

/// In-memory camera producing solid frames; `limit == None` never ends.
struct FakeCamera {
    limit: Option<usize>,
    produced: usize,
    released: Arc<AtomicBool>,
    fail_release: bool,
    fail_on: Option<usize>,
}

impl FrameSource for FakeCamera {
    fn next_frame(&mut self) -> livetrack_rs::Result<Option<RgbImage>> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return Ok(None);
        }
        if self.fail_on == Some(self.produced) {
            return Err(PipelineError::acquisition("camera unplugged"));
        }
        self.produced += 1;
        Ok(Some(RgbImage::from_pixel(160, 120, Rgb([30, 30, 30]))))
    }

    fn release(&mut self) -> livetrack_rs::Result<()> {
        if self.fail_release {
            return Err(PipelineError::acquisition("device busy"));
        }
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn describe(&self) -> String {
        "fake camera".into()
    }
}

struct FakeBackend {
    limit: Option<usize>,
    released: Arc<AtomicBool>,
    fail_release: bool,
    fail_on: Option<usize>,
}

impl FakeBackend {
    fn finite(limit: usize) -> (Self, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        let backend = Self {
            limit: Some(limit),
            released: released.clone(),
            fail_release: false,
            fail_on: None,
        };
        (backend, released)
    }

    fn endless() -> (Self, Arc<AtomicBool>) {
        let (mut backend, released) = Self::finite(0);
        backend.limit = None;
        (backend, released)
    }
}

impl CameraBackend for FakeBackend {
    fn open(&mut self, _index: u32) -> livetrack_rs::Result<Box<dyn FrameSource>> {
        Ok(Box::new(FakeCamera {
            limit: self.limit,
            produced: 0,
            released: self.released.clone(),
            fail_release: self.fail_release,
            fail_on: self.fail_on,
        }))
    }
}

#[derive(Error, Debug)]
#[error("inference backend crashed")]
struct BackendCrash;

/// Reports one fixed box per frame and fails on a chosen call.
struct FlakyDetector {
    calls: Arc<AtomicUsize>,
    fail_on: Option<usize>,
    fail_prepare: bool,
}

impl FlakyDetector {
    fn new(fail_on: Option<usize>) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            fail_on,
            fail_prepare: false,
        }
    }
}

impl DetectionSource for FlakyDetector {
    type Error = BackendCrash;

    fn detect(
        &mut self,
        _frame: &RgbImage,
        _params: &InferenceParams,
    ) -> Result<Vec<Detection>, Self::Error> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on == Some(call) {
            return Err(BackendCrash);
        }
        Ok(vec![Detection::new(
            "person",
            0.9,
            Rect::from_tlbr(20.0, 20.0, 60.0, 100.0),
        )])
    }

    fn prepare(&mut self, _settings: &DetectorSettings) -> Result<(), Self::Error> {
        if self.fail_prepare {
            return Err(BackendCrash);
        }
        Ok(())
    }

    fn class_names(&self) -> Vec<String> {
        vec!["person".into(), "car".into()]
    }
}

/// Display that refuses every frame.
struct BrokenDisplay {
    finished: Arc<AtomicBool>,
}

impl FrameSink for BrokenDisplay {
    fn emit(&mut self, _frame: &AnnotatedFrame) -> livetrack_rs::Result<()> {
        Err(PipelineError::output("window closed"))
    }

    fn finish(&mut self) -> livetrack_rs::Result<()> {
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "display"
    }
}

fn camera_config() -> SessionConfig {
    SessionConfig {
        source: SourceConfig::Camera { index: 0 },
        idle_ms: Some(0),
        ..SessionConfig::default()
    }
}

fn write_frames(dir: &Path, count: usize) {
    for i in 0..count {
        RgbImage::from_pixel(64, 48, Rgb([i as u8 * 40, 0, 0]))
            .save(dir.join(format!("{i:03}.png")))
            .unwrap();
    }
}

#[test]
fn test_finite_source_ends_cleanly() {
    let (backend, released) = FakeBackend::finite(3);
    let mut config = camera_config();
    config.tracking.enabled = true;

    let detector = ReplayDetector::from_frames(vec![
        vec![Detection::new("A", 0.9, Rect::from_tlbr(10.0, 10.0, 30.0, 30.0))],
        vec![Detection::new("A", 0.9, Rect::from_tlbr(12.0, 10.0, 32.0, 30.0))],
        vec![],
    ]);

    let session = SessionBuilder::new(config, detector)
        .camera_backend(backend)
        .start()
        .unwrap();
    let summary = session.run(&StopFlag::new()).unwrap();

    assert_eq!(summary.frames, 3);
    assert_eq!(summary.reason, EndReason::EndOfStream);
    assert!(summary.source_released);
    assert_eq!(summary.recorder_released, None);
    assert!(summary.warnings.is_empty());
    assert!(summary.fps >= 0.0);
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn test_step_reports_tracks_and_presence() {
    let (backend, _released) = FakeBackend::finite(2);
    let mut config = camera_config();
    config.tracking.enabled = true;

    let mut session = SessionBuilder::new(config, FlakyDetector::new(None))
        .camera_backend(backend)
        .start()
        .unwrap();

    let first = session.step().unwrap().unwrap();
    assert_eq!(first.index, 0);
    assert_eq!(first.tracks.keys().copied().collect::<Vec<_>>(), vec![0]);
    assert!(first.metrics.presence.seen("person"));
    assert!(!first.metrics.presence.seen("car"));
    assert_eq!(first.metrics.tracked, 1);

    let second = session.step().unwrap().unwrap();
    assert_eq!(second.index, 1);
    assert!(second.tracks.contains_key(&0));

    assert!(session.step().unwrap().is_none());
    assert_eq!(session.frames_processed(), 2);
}

#[test]
fn test_tracking_disabled_reports_no_tracks() {
    let (backend, _released) = FakeBackend::finite(1);
    let mut session = SessionBuilder::new(camera_config(), FlakyDetector::new(None))
        .camera_backend(backend)
        .start()
        .unwrap();

    let frame = session.step().unwrap().unwrap();
    assert!(frame.tracks.is_empty());
    assert_eq!(frame.detections.len(), 1);
    assert!(session.tracker().is_none());
}

#[test]
fn test_detector_error_tears_down_first() {
    let (backend, released) = FakeBackend::endless();
    let session = SessionBuilder::new(camera_config(), FlakyDetector::new(Some(2)))
        .camera_backend(backend)
        .start()
        .unwrap();

    let err = session.run(&StopFlag::new()).unwrap_err();
    assert!(matches!(err, PipelineError::Detector(_)));
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn test_acquisition_error_tears_down_first() {
    let (mut backend, released) = FakeBackend::endless();
    backend.fail_on = Some(2);
    let session = SessionBuilder::new(camera_config(), FlakyDetector::new(None))
        .camera_backend(backend)
        .start()
        .unwrap();

    let err = session.run(&StopFlag::new()).unwrap_err();
    assert!(matches!(err, PipelineError::Acquisition(_)));
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn test_display_error_tears_down_first() {
    let (backend, released) = FakeBackend::endless();
    let finished = Arc::new(AtomicBool::new(false));
    let session = SessionBuilder::new(camera_config(), FlakyDetector::new(None))
        .camera_backend(backend)
        .display(BrokenDisplay {
            finished: finished.clone(),
        })
        .start()
        .unwrap();

    let err = session.run(&StopFlag::new()).unwrap_err();
    assert!(matches!(err, PipelineError::Output(_)));
    assert!(released.load(Ordering::SeqCst));
    assert!(finished.load(Ordering::SeqCst));
}

#[test]
fn test_huge_boxes_are_tracked() {
    let (backend, released) = FakeBackend::finite(2);
    let mut config = camera_config();
    config.tracking.enabled = true;
    let far = Rect::from_tlbr(4e9, 4e9, 4e9 + 10.0, 4e9 + 10.0);
    let detector = ReplayDetector::from_frames(vec![
        vec![Detection::new("A", 0.9, far)],
        vec![
            Detection::new("A", 0.9, far),
            Detection::new("B", 0.9, Rect::from_tlbr(-4e9, -4e9, -4e9 + 10.0, -4e9 + 10.0)),
        ],
    ]);

    let mut session = SessionBuilder::new(config, detector)
        .camera_backend(backend)
        .start()
        .unwrap();
    let first = session.step().unwrap().unwrap();
    assert_eq!(first.metrics.tracked, 1);
    let second = session.step().unwrap().unwrap();
    assert_eq!(second.metrics.tracked, 2);
    assert!(second.tracks.contains_key(&0));

    let summary = session.run(&StopFlag::new()).unwrap();
    assert_eq!(summary.reason, EndReason::EndOfStream);
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn test_replay_shorter_than_source_ends_with_detector_error() {
    let (backend, released) = FakeBackend::finite(3);
    let detector = ReplayDetector::from_frames(vec![vec![]]);
    let session = SessionBuilder::new(camera_config(), detector)
        .camera_backend(backend)
        .start()
        .unwrap();

    let err = session.run(&StopFlag::new()).unwrap_err();
    assert!(matches!(err, PipelineError::Detector(_)));
    assert!(err.to_string().contains("replay exhausted at frame 1"));
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn test_stop_before_first_frame() {
    let (backend, released) = FakeBackend::endless();
    let session = SessionBuilder::new(camera_config(), FlakyDetector::new(None))
        .camera_backend(backend)
        .start()
        .unwrap();

    let stop = StopFlag::new();
    stop.stop();
    let summary = session.run(&stop).unwrap();
    assert_eq!(summary.reason, EndReason::Stopped);
    assert_eq!(summary.frames, 0);
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn test_release_failure_is_a_warning() {
    let (mut backend, _released) = FakeBackend::finite(1);
    backend.fail_release = true;
    let session = SessionBuilder::new(camera_config(), FlakyDetector::new(None))
        .camera_backend(backend)
        .start()
        .unwrap();

    let summary = session.run(&StopFlag::new()).unwrap();
    assert_eq!(summary.reason, EndReason::EndOfStream);
    assert!(!summary.source_released);
    assert_eq!(summary.warnings.len(), 1);
    assert_eq!(summary.warnings[0].resource, "source");
}

#[test]
fn test_dropping_session_releases_source() {
    let (backend, released) = FakeBackend::endless();
    let mut session = SessionBuilder::new(camera_config(), FlakyDetector::new(None))
        .camera_backend(backend)
        .start()
        .unwrap();
    session.step().unwrap();
    assert!(!released.load(Ordering::SeqCst));

    drop(session);
    assert!(released.load(Ordering::SeqCst));
}

#[cfg(not(feature = "opencv"))]
#[test]
fn test_camera_needs_a_backend() {
    let err = Session::start(camera_config(), FlakyDetector::new(None)).err().unwrap();
    assert!(err.is_configuration());
}

#[test]
fn test_configuration_errors() {
    // Detector fails to initialize
    let mut detector = FlakyDetector::new(None);
    detector.fail_prepare = true;
    let (backend, _released) = FakeBackend::finite(1);
    let err = SessionBuilder::new(camera_config(), detector)
        .camera_backend(backend)
        .start()
        .err()
        .unwrap();
    assert!(err.is_configuration());

    // Missing video
    let config = SessionConfig {
        source: SourceConfig::VideoFile {
            path: "/no/such/video.gif".into(),
        },
        ..SessionConfig::default()
    };
    let err = Session::start(config, FlakyDetector::new(None)).err().unwrap();
    assert!(err.is_configuration());

    // Invalid inference parameters
    let mut config = camera_config();
    config.inference.image_size = 333;
    let (backend, _released) = FakeBackend::finite(1);
    let err = SessionBuilder::new(config, FlakyDetector::new(None))
        .camera_backend(backend)
        .start()
        .err()
        .unwrap();
    assert!(err.is_configuration());
}

#[test]
fn test_recorder_failure_releases_source() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, released) = FakeBackend::finite(1);
    let mut config = camera_config();
    config.recording = RecordingConfig {
        enabled: true,
        path: dir.path().join("missing").join("out.gif"),
        default_fps: 25.0,
    };

    let err = SessionBuilder::new(config, FlakyDetector::new(None))
        .camera_backend(backend)
        .start()
        .err()
        .unwrap();
    assert!(err.is_configuration());
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn test_image_sequence_recorded_to_gif() {
    let input = tempfile::tempdir().unwrap();
    write_frames(input.path(), 3);
    let output = tempfile::tempdir().unwrap();
    let gif = output.path().join("annotated.gif");

    let mut config = SessionConfig {
        source: SourceConfig::ImageSequence {
            dir: input.path().to_path_buf(),
        },
        idle_ms: Some(0),
        ..SessionConfig::default()
    };
    config.recording.enabled = true;
    config.recording.path = gif.clone();

    let session = Session::start(config, FlakyDetector::new(None)).unwrap();
    let summary = session.run(&StopFlag::new()).unwrap();
    assert_eq!(summary.frames, 3);
    assert_eq!(summary.recorder_released, Some(true));

    let mut playback = GifSource::open(&gif).unwrap();
    assert!((playback.frame_rate().unwrap() - 25.0).abs() < 1.0);
    let mut count = 0;
    while let Some(frame) = playback.next_frame().unwrap() {
        assert_eq!(frame.dimensions(), (64, 48));
        count += 1;
    }
    assert_eq!(count, 3);
}

#[cfg(target_os = "linux")]
#[test]
fn test_recorder_flush_failure_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.gif");
    std::os::unix::fs::symlink("/dev/full", &path).unwrap();

    let (backend, released) = FakeBackend::finite(1);
    let mut config = camera_config();
    config.recording = RecordingConfig {
        enabled: true,
        path,
        default_fps: 25.0,
    };

    let session = SessionBuilder::new(config, FlakyDetector::new(None))
        .camera_backend(backend)
        .start()
        .unwrap();
    let summary = session.run(&StopFlag::new()).unwrap();
    assert_eq!(summary.reason, EndReason::EndOfStream);
    assert!(summary.source_released);
    assert_eq!(summary.recorder_released, Some(false));
    assert_eq!(summary.warnings.len(), 1);
    assert_eq!(summary.warnings[0].resource, "recorder");
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn test_spawned_session_stops_on_request() {
    let (backend, released) = FakeBackend::endless();
    let (display, viewer) = display_channel();
    let builder = SessionBuilder::new(camera_config(), FlakyDetector::new(None))
        .camera_backend(backend)
        .display(display);

    let handle = pipeline::spawn(builder).unwrap();
    let frame = viewer.wait(Duration::from_secs(5)).unwrap();
    assert_eq!(frame.detections.len(), 1);

    handle.stop();
    let summary = handle.join().unwrap();
    assert_eq!(summary.reason, EndReason::Stopped);
    assert!(summary.frames >= 1);
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn test_spawn_reports_start_errors() {
    let config = SessionConfig {
        source: SourceConfig::VideoFile {
            path: "/no/such/video.gif".into(),
        },
        ..SessionConfig::default()
    };
    let err = pipeline::spawn(SessionBuilder::new(config, FlakyDetector::new(None)))
        .err()
        .unwrap();
    assert!(err.is_configuration());
}

#[test]
fn test_spawned_session_surfaces_detector_error() {
    let (backend, released) = FakeBackend::endless();
    let builder = SessionBuilder::new(camera_config(), FlakyDetector::new(Some(0)))
        .camera_backend(backend);

    let handle = pipeline::spawn(builder).unwrap();
    let err = handle.join().unwrap_err();
    assert!(matches!(err, PipelineError::Detector(_)));
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn test_spawned_session_surfaces_acquisition_error() {
    let (mut backend, released) = FakeBackend::endless();
    backend.fail_on = Some(1);
    let builder = SessionBuilder::new(camera_config(), FlakyDetector::new(None))
        .camera_backend(backend);

    let handle = pipeline::spawn(builder).unwrap();
    let err = handle.join().unwrap_err();
    assert!(matches!(err, PipelineError::Acquisition(_)));
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn test_spawned_session_surfaces_display_error() {
    let (backend, released) = FakeBackend::endless();
    let finished = Arc::new(AtomicBool::new(false));
    let builder = SessionBuilder::new(camera_config(), FlakyDetector::new(None))
        .camera_backend(backend)
        .display(BrokenDisplay {
            finished: finished.clone(),
        });

    let handle = pipeline::spawn(builder).unwrap();
    let err = handle.join().unwrap_err();
    assert!(matches!(err, PipelineError::Output(_)));
    assert!(released.load(Ordering::SeqCst));
    assert!(finished.load(Ordering::SeqCst));
}

#[test]
fn test_run_still_detects_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("still.png");
    RgbImage::from_pixel(120, 120, Rgb([0, 0, 0])).save(&path).unwrap();

    let mut detector = FlakyDetector::new(None);
    let calls = detector.calls.clone();
    let (mut display, viewer) = display_channel();
    let frame = run_still(
        &mut detector,
        &path,
        &InferenceParams::default(),
        &Annotator::default(),
        Some(&mut display),
    )
    .unwrap();
    assert_eq!(viewer.latest().map(|f| f.index), Some(0));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(frame.detections.len(), 1);
    assert!(frame.tracks.is_empty());
    assert_eq!(frame.metrics.fps, 0.0);
    assert!(frame.metrics.presence.seen("person"));
    // Box outline drawn on the left edge
    assert_ne!(*frame.image.get_pixel(20, 60), Rgb([0, 0, 0]));
}

#[test]
fn test_run_still_missing_image() {
    let mut detector = FlakyDetector::new(None);
    let err = run_still(
        &mut detector,
        Path::new("/no/such/image.png"),
        &InferenceParams::default(),
        &Annotator::default(),
        None,
    )
    .unwrap_err();
    assert!(err.is_configuration());
}
