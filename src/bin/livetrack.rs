//! Command-line front end: run a detection session over a video, an image
//! directory or a single still image.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use livetrack_rs::config::{Device, Precision};
use livetrack_rs::pipeline::{self, Annotator, SessionBuilder, display_channel, run_still};
use livetrack_rs::{ReplayDetector, SessionConfig, SourceConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Realtime detection with centroid tracking", long_about = None)]
struct Args {
    /// TOML session configuration; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Video file to process (.gif always; other containers with the `opencv` feature)
    #[arg(long, group = "input")]
    video: Option<PathBuf>,

    /// Directory of image frames to process in name order
    #[arg(long, group = "input")]
    frames: Option<PathBuf>,

    /// Single still image
    #[arg(long, group = "input")]
    image: Option<PathBuf>,

    /// Camera device index
    #[arg(long, group = "input")]
    camera: Option<u32>,

    /// JSON-lines file of stored detections to replay, one line per frame
    #[arg(short, long)]
    detections: PathBuf,

    #[arg(long)]
    conf: Option<f64>,

    #[arg(long)]
    iou: Option<f64>,

    #[arg(long)]
    imgsz: Option<u32>,

    #[arg(long)]
    max_det: Option<usize>,

    /// Enable centroid tracking
    #[arg(long)]
    track: bool,

    /// Record annotated output: .gif, another video extension (mp4v, `opencv`
    /// feature), or a PNG directory when there is no extension
    #[arg(long)]
    record: Option<PathBuf>,

    #[arg(long, value_parser = ["cpu", "gpu"])]
    device: Option<String>,

    /// Half precision inference (ignored on CPU)
    #[arg(long)]
    half: bool,

    /// Where to write the annotated still image
    #[arg(short, long, default_value = "annotated.png")]
    output: PathBuf,

    /// Print per-frame metrics as JSON lines
    #[arg(long)]
    metrics: bool,
}

impl Args {
    fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => SessionConfig::default(),
        };

        if let Some(path) = &self.video {
            config.source = SourceConfig::VideoFile { path: path.clone() };
        } else if let Some(dir) = &self.frames {
            config.source = SourceConfig::ImageSequence { dir: dir.clone() };
        } else if let Some(path) = &self.image {
            config.source = SourceConfig::Still { path: path.clone() };
        } else if let Some(index) = self.camera {
            config.source = SourceConfig::Camera { index };
        }

        if let Some(conf) = self.conf {
            config.inference.confidence = conf;
        }
        if let Some(iou) = self.iou {
            config.inference.iou = iou;
        }
        if let Some(size) = self.imgsz {
            config.inference.image_size = size;
        }
        if let Some(max_det) = self.max_det {
            config.inference.max_detections = max_det;
        }
        if self.track {
            config.tracking.enabled = true;
        }
        if let Some(path) = &self.record {
            config.recording.enabled = true;
            config.recording.path = path.clone();
        }
        match self.device.as_deref() {
            Some("gpu") => config.device = Device::Gpu,
            Some(_) => config.device = Device::Cpu,
            None => {}
        }
        if self.half {
            config.precision = Precision::Half;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "livetrack=info,livetrack_rs=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = args.session_config()?;

    let detector = ReplayDetector::open(&args.detections)
        .with_context(|| format!("loading detections from {}", args.detections.display()))?;

    if let SourceConfig::Still { path } = &config.source {
        let mut detector = detector;
        let frame = run_still(
            &mut detector,
            path,
            &config.inference,
            &Annotator::default(),
            None,
        )?;
        frame
            .image
            .save(&args.output)
            .with_context(|| format!("writing {}", args.output.display()))?;
        if args.metrics {
            println!("{}", serde_json::to_string(&frame.metrics)?);
        }
        info!(output = %args.output.display(), detections = frame.detections.len(), "done");
        return Ok(());
    }

    let (display, viewer) = display_channel();
    let handle = pipeline::spawn(SessionBuilder::new(config, detector).display(display))?;

    while !handle.is_finished() {
        if let Some(frame) = viewer.wait(Duration::from_millis(100)) {
            if args.metrics {
                println!("{}", serde_json::to_string(&frame.metrics)?);
            }
        }
    }

    let summary = handle.join()?;
    for warning in &summary.warnings {
        eprintln!("warning: {warning}");
    }
    println!(
        "{} frames, {:.2} fps ({:?})",
        summary.frames, summary.fps, summary.reason
    );
    Ok(())
}
