use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    pipeline::{
        CaptureOptions, MotionConfig, SourceSpec, face::ort::FaceDetectorConfig,
        recording::DEFAULT_FPS,
    },
    storage::{StillFormat, default_data_dir},
    types::{OverlayFlags, OverlayKind},
};

#[derive(Parser, Debug)]
#[command(name = "frame-sentry")]
#[command(about = "Headless camera pipeline: motion-triggered recording and face ornaments")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available cameras
    Cameras,

    /// Watch a source for motion, outlining moving regions
    Motion {
        #[command(flatten)]
        capture: CaptureArgs,

        /// Start a clip when motion appears and close it when it ends
        #[arg(long)]
        record_on_motion: bool,
    },

    /// Overlay ornaments on detected faces
    Face {
        #[command(flatten)]
        capture: CaptureArgs,

        /// Face detector model (UltraFace-style ONNX)
        #[arg(long, default_value = "models/face-detector.onnx")]
        detector: PathBuf,

        /// 68-point landmark model (ONNX)
        #[arg(long, default_value = "models/face-landmarks-68.onnx")]
        landmarks: PathBuf,

        /// Directory holding glasses.jpg, mustache.jpg and mouse-nose.jpg
        #[arg(long, default_value = "assets")]
        assets: PathBuf,

        /// Overlay enabled at startup (box, landmarks, glasses, mustache, mouse-nose)
        #[arg(short, long = "overlay", value_parser = parse_overlay)]
        overlays: Vec<OverlayKind>,
    },

    /// Apply an editor transform to an image file
    Edit {
        /// Transform name (see --list)
        #[arg(required_unless_present = "list")]
        transform: Option<String>,

        input: Option<PathBuf>,

        /// Output path (default: <input stem>-<transform>.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the registered transforms
        #[arg(long)]
        list: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct CaptureArgs {
    /// Camera index, video file (.avi/.mp4/.mkv/.mov), image file or directory of images
    #[arg(short, long, default_value = "0")]
    pub source: String,

    /// Where photos and clips are written (default: <Pictures>/FrameSentry)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Save photos and cover stills as PNG instead of JPEG
    #[arg(long)]
    pub png: bool,

    /// Clip frame rate until a throughput sample is taken
    #[arg(long, default_value_t = DEFAULT_FPS)]
    pub fps: f32,
}

fn parse_overlay(value: &str) -> Result<OverlayKind, String> {
    OverlayKind::from_label(value).ok_or_else(|| {
        let known: Vec<&str> = OverlayKind::ALL.iter().map(|k| k.label()).collect();
        format!("unknown overlay '{value}', expected one of {}", known.join(", "))
    })
}

/// Everything a capture run needs besides the analyzer.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    pub source: SourceSpec,
    pub data_dir: PathBuf,
    pub still_format: StillFormat,
    pub motion: MotionConfig,
    pub options: CaptureOptions,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: SourceSpec::Camera(0),
            data_dir: default_data_dir(),
            still_format: StillFormat::default(),
            motion: MotionConfig::default(),
            options: CaptureOptions::default(),
        }
    }
}

impl From<CaptureArgs> for CaptureConfig {
    fn from(args: CaptureArgs) -> Self {
        let defaults = CaptureConfig::default();
        Self {
            source: SourceSpec::parse(&args.source),
            data_dir: args.data_dir.unwrap_or(defaults.data_dir),
            still_format: if args.png {
                StillFormat::Png
            } else {
                StillFormat::Jpeg
            },
            options: CaptureOptions {
                default_fps: args.fps,
                ..defaults.options
            },
            ..defaults
        }
    }
}

#[derive(Clone, Debug)]
pub struct FaceModelConfig {
    pub detector_path: PathBuf,
    pub landmark_path: PathBuf,
    pub asset_dir: PathBuf,
    pub detector: FaceDetectorConfig,
    pub overlays: OverlayFlags,
}

impl Default for FaceModelConfig {
    fn default() -> Self {
        Self {
            detector_path: PathBuf::from("models/face-detector.onnx"),
            landmark_path: PathBuf::from("models/face-landmarks-68.onnx"),
            asset_dir: PathBuf::from("assets"),
            detector: FaceDetectorConfig::default(),
            overlays: OverlayFlags::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motion_arguments_build_a_capture_config() {
        let cli = Cli::try_parse_from([
            "frame-sentry",
            "motion",
            "--source",
            "clips/yard.avi",
            "--data-dir",
            "/tmp/out",
            "--png",
            "--fps",
            "15",
            "--record-on-motion",
        ])
        .unwrap();
        let Commands::Motion {
            capture,
            record_on_motion,
        } = cli.command
        else {
            panic!("expected motion subcommand");
        };
        assert!(record_on_motion);

        let config = CaptureConfig::from(capture);
        assert_eq!(config.source, SourceSpec::Path("clips/yard.avi".into()));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.still_format, StillFormat::Png);
        assert_eq!(config.options.default_fps, 15.0);
        assert_eq!(config.motion.history, 500);
    }

    #[test]
    fn face_overlays_parse_by_label() {
        let cli = Cli::try_parse_from([
            "frame-sentry",
            "face",
            "-o",
            "glasses",
            "--overlay",
            "box",
        ])
        .unwrap();
        let Commands::Face {
            overlays, capture, ..
        } = cli.command
        else {
            panic!("expected face subcommand");
        };
        assert_eq!(overlays, vec![OverlayKind::Glasses, OverlayKind::FaceBox]);
        assert_eq!(SourceSpec::parse(&capture.source), SourceSpec::Camera(0));

        assert!(Cli::try_parse_from(["frame-sentry", "face", "-o", "hat"]).is_err());
    }
}
