mod cli;
mod config;
mod editor;
mod error;
mod pipeline;
mod storage;
mod types;

use anyhow::{Context, Result};
use clap::Parser;

use config::{CaptureConfig, Cli, Commands, FaceModelConfig};
use types::OverlayFlags;

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Cameras => cli::list_cameras(),
        Commands::Motion {
            capture,
            record_on_motion,
        } => cli::run_motion(CaptureConfig::from(capture), record_on_motion),
        Commands::Face {
            capture,
            detector,
            landmarks,
            assets,
            overlays,
        } => {
            let mut flags = OverlayFlags::default();
            for kind in overlays {
                flags.set(kind, true);
            }
            let face = FaceModelConfig {
                detector_path: detector,
                landmark_path: landmarks,
                asset_dir: assets,
                overlays: flags,
                ..FaceModelConfig::default()
            };
            cli::run_face(CaptureConfig::from(capture), face)
        }
        Commands::Edit {
            transform,
            input,
            output,
            list,
        } => {
            if list {
                cli::list_transforms();
                return Ok(());
            }
            let transform = transform.context("missing transform name")?;
            let input = input.context("missing input image")?;
            cli::run_edit(&transform, &input, output)
        }
    }
}
