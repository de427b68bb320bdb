use std::{
    io::BufRead,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::RecvTimeoutError;

use crate::{
    config::{CaptureConfig, FaceModelConfig},
    editor,
    pipeline::{
        Analyzer, CaptureHandle, MotionDetector, open_source, start_capture,
        face::{FaceOverlay, load_ornaments, ort::OrtFaceAnalyzer},
    },
    storage::DiskArtifacts,
    types::{Command, Notification, OverlayKind},
};

/// Frames between progress lines in the log.
const FRAME_LOG_INTERVAL: u64 = 300;

#[derive(Clone, Debug, PartialEq)]
pub enum ConsoleAction {
    Send(Command),
    Quit,
}

/// `p` photo, `r`/`s` begin/end recording, `f` throughput sample,
/// `m on|off` motion detection, `a on|off` record on motion,
/// `o <overlay> on|off`, `q` quit.
pub fn parse_console_line(line: &str) -> Result<Option<ConsoleAction>> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let action = match head {
        "p" => ConsoleAction::Send(Command::TakePhoto),
        "r" => ConsoleAction::Send(Command::BeginRecording),
        "s" => ConsoleAction::Send(Command::EndRecording),
        "f" => ConsoleAction::Send(Command::SampleThroughput),
        "q" => ConsoleAction::Quit,
        "m" => ConsoleAction::Send(Command::SetMotionDetection(parse_switch(words.next())?)),
        "a" => ConsoleAction::Send(Command::SetRecordOnMotion(parse_switch(words.next())?)),
        "o" => {
            let label = words.next().ok_or_else(|| anyhow!("usage: o <overlay> on|off"))?;
            let kind = OverlayKind::from_label(label)
                .ok_or_else(|| anyhow!("unknown overlay '{label}'"))?;
            ConsoleAction::Send(Command::SetOverlay(kind, parse_switch(words.next())?))
        }
        other => return Err(anyhow!("unknown command '{other}'")),
    };
    Ok(Some(action))
}

fn parse_switch(word: Option<&str>) -> Result<bool> {
    match word {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        Some(other) => Err(anyhow!("expected on|off, got '{other}'")),
        None => Err(anyhow!("expected on|off")),
    }
}

#[cfg(feature = "camera-nokhwa")]
pub fn list_cameras() -> Result<()> {
    let cameras = crate::pipeline::source::available_cameras().context("querying cameras")?;
    if cameras.is_empty() {
        println!("no cameras found");
    }
    for camera in cameras {
        println!("{}: {}", camera.index, camera.label);
    }
    Ok(())
}

#[cfg(not(feature = "camera-nokhwa"))]
pub fn list_cameras() -> Result<()> {
    Err(anyhow!("built without camera support"))
}

pub fn run_motion(mut config: CaptureConfig, record_on_motion: bool) -> Result<()> {
    config.options.record_on_motion = record_on_motion;
    let analyzer = Analyzer::Motion(MotionDetector::new(config.motion.clone()));
    run_capture(config, analyzer)
}

pub fn run_face(config: CaptureConfig, face: FaceModelConfig) -> Result<()> {
    let ornaments = load_ornaments(&face.asset_dir)
        .with_context(|| format!("loading ornaments from {}", face.asset_dir.display()))?;
    let analyzer = OrtFaceAnalyzer::new(&face.detector_path, &face.landmark_path, face.detector)?;
    let overlay = FaceOverlay::new(Box::new(analyzer), ornaments).with_overlays(face.overlays);
    run_capture(config, Analyzer::Face(overlay))
}

fn run_capture(config: CaptureConfig, analyzer: Analyzer) -> Result<()> {
    let store = DiskArtifacts::new(config.data_dir.clone(), config.still_format)?;
    let spec = config.source.clone();
    let handle = start_capture(
        move || open_source(&spec),
        analyzer,
        Box::new(store),
        config.options.clone(),
    )
    .context("failed to start capture thread")?;

    let running = handle.running_flag();
    let ctrlc_flag = running.clone();
    ctrlc::set_handler(move || {
        log::info!("interrupt received, stopping");
        ctrlc_flag.store(false, Ordering::SeqCst);
    })
    .context("installing Ctrl-C handler")?;

    spawn_console(&handle, running.clone());
    println!("capturing from {}; commands: p r s f m a o q", config.source);

    let outcome = drain_notifications(&handle, &running);
    handle.stop();
    outcome
}

fn spawn_console(handle: &CaptureHandle, running: Arc<AtomicBool>) {
    let commands = handle.commands();
    // Detached: a blocked stdin read must not hold up shutdown.
    let spawned = thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match parse_console_line(&line) {
                    Ok(Some(ConsoleAction::Send(command))) => {
                        if commands.send(command).is_err() {
                            break;
                        }
                    }
                    Ok(Some(ConsoleAction::Quit)) => {
                        running.store(false, Ordering::SeqCst);
                        break;
                    }
                    Ok(None) => {}
                    Err(err) => eprintln!("{err}"),
                }
            }
        });
    if let Err(err) = spawned {
        log::warn!("console input unavailable: {err}");
    }
}

fn drain_notifications(handle: &CaptureHandle, running: &AtomicBool) -> Result<()> {
    let mut frames = 0u64;
    loop {
        let notification = match handle.notifications().recv_timeout(Duration::from_millis(500)) {
            Ok(notification) => notification,
            Err(RecvTimeoutError::Timeout) => {
                if !running.load(Ordering::SeqCst) {
                    log::debug!("waiting for capture thread to stop");
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        };

        match notification {
            Notification::FrameAvailable(frame) => {
                frames += 1;
                if frames % FRAME_LOG_INTERVAL == 0 {
                    log::info!(
                        "{frames} frames ({}x{}), latest {:?} after capture",
                        frame.width,
                        frame.height,
                        frame.timestamp.elapsed()
                    );
                }
            }
            Notification::PhotoSaved(name) => println!("photo saved: {name}"),
            Notification::ClipSaved(name) => println!("clip saved: {name}"),
            Notification::ThroughputMeasured(fps) => println!("throughput: {fps:.1} fps"),
            Notification::MotionStarted => println!("motion started"),
            Notification::MotionStopped => println!("motion stopped"),
            Notification::ArtifactFailed { kind, reason } => {
                eprintln!("{kind:?} failed: {reason}")
            }
            Notification::SourceUnavailable(reason) => {
                return Err(anyhow!("{reason}"));
            }
            Notification::Stopped(reason) => {
                log::info!("capture stopped after {frames} frames ({reason:?})");
                return Ok(());
            }
        }
    }
}

pub fn run_edit(transform: &str, input: &Path, output: Option<PathBuf>) -> Result<()> {
    let transform = editor::find(transform).ok_or_else(|| {
        let names: Vec<&str> = editor::TRANSFORMS.iter().map(|t| t.name).collect();
        anyhow!("unknown transform '{transform}', expected one of {}", names.join(", "))
    })?;
    let image = image::open(input)
        .with_context(|| format!("opening {}", input.display()))?
        .to_rgb8();

    let result = (transform.apply)(&image);
    let output = output.unwrap_or_else(|| default_edit_output(input, transform.name));
    result
        .save(&output)
        .with_context(|| format!("writing {}", output.display()))?;
    println!("{} -> {}", transform.name, output.display());
    Ok(())
}

pub fn list_transforms() {
    for transform in editor::TRANSFORMS {
        println!("{:<8} {}", transform.name, transform.description);
    }
}

fn default_edit_output(input: &Path, transform: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let ext = input
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("png");
    input.with_file_name(format!("{stem}-{transform}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_lines_map_to_commands() {
        assert_eq!(
            parse_console_line("p").unwrap(),
            Some(ConsoleAction::Send(Command::TakePhoto))
        );
        assert_eq!(
            parse_console_line("  o mouse-nose on ").unwrap(),
            Some(ConsoleAction::Send(Command::SetOverlay(OverlayKind::MouseNose, true)))
        );
        assert_eq!(
            parse_console_line("a off").unwrap(),
            Some(ConsoleAction::Send(Command::SetRecordOnMotion(false)))
        );
        assert_eq!(parse_console_line("q").unwrap(), Some(ConsoleAction::Quit));
        assert_eq!(parse_console_line("").unwrap(), None);
    }

    #[test]
    fn malformed_console_lines_are_rejected() {
        assert!(parse_console_line("o hat on").is_err());
        assert!(parse_console_line("m maybe").is_err());
        assert!(parse_console_line("o glasses").is_err());
        assert!(parse_console_line("x").is_err());
    }

    #[test]
    fn edit_output_defaults_next_to_the_input() {
        assert_eq!(
            default_edit_output(Path::new("/pics/cat.jpg"), "blur"),
            PathBuf::from("/pics/cat-blur.jpg")
        );
    }
}
