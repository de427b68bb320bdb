//! Clip encoding and decoding through an `ffmpeg` subprocess.

use std::{
    io::{ErrorKind, Read, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
};

use anyhow::{Context, anyhow};

use crate::error::{CaptureError, Result};

/// Largest frame side accepted from a probed file.
const MAX_DIMENSION: u32 = 16_384;

/// Pipes JPEG frames into ffmpeg, which muxes them unchanged into an AVI.
pub struct MjpegEncoder {
    child: Child,
    stdin: ChildStdin,
    output_path: PathBuf,
    frame_count: u32,
}

impl MjpegEncoder {
    pub fn start(output_path: &Path, fps: f32) -> Result<Self> {
        let fps = format!("{fps:.3}");
        let mut child = Command::new("ffmpeg")
            .args(["-loglevel", "error", "-f", "image2pipe", "-vcodec", "mjpeg"])
            .args(["-framerate", &fps, "-i", "pipe:0", "-c:v", "copy", "-y"])
            .arg(output_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| CaptureError::Recording(format!("failed to spawn ffmpeg: {err}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| CaptureError::Recording("could not get ffmpeg stdin".into()))?;

        log::debug!("ffmpeg encoder started for {} @ {fps} fps", output_path.display());
        Ok(Self {
            child,
            stdin,
            output_path: output_path.to_path_buf(),
            frame_count: 0,
        })
    }

    pub fn push_frame(&mut self, jpeg: &[u8]) -> Result<()> {
        self.stdin.write_all(jpeg).map_err(|err| {
            CaptureError::Recording(format!(
                "{}: failed to write frame to ffmpeg: {err}",
                self.output_path.display()
            ))
        })?;
        self.frame_count += 1;
        Ok(())
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Close stdin and wait for ffmpeg to finalize the container.
    pub fn finish(self) -> Result<()> {
        let MjpegEncoder {
            child,
            stdin,
            output_path,
            frame_count,
        } = self;
        drop(stdin);

        let output = child.wait_with_output().map_err(|err| {
            CaptureError::Recording(format!("failed to wait for ffmpeg: {err}"))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::error!("ffmpeg exited with {}: {}", output.status, stderr.trim());
            return Err(CaptureError::Recording(format!(
                "{}: ffmpeg exited with {}",
                output_path.display(),
                output.status
            )));
        }
        log::info!("closed {} after {frame_count} frames", output_path.display());
        Ok(())
    }
}

/// Decodes any ffmpeg-readable video to packed BGR frames.
pub struct VideoDecoder {
    child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
}

impl VideoDecoder {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if !path.is_file() {
            return Err(anyhow!("{} does not exist", path.display()));
        }
        let (width, height) = probe_dimensions(path)?;

        let mut child = Command::new("ffmpeg")
            .args(["-loglevel", "error", "-i"])
            .arg(path)
            .args(["-f", "rawvideo", "-pix_fmt", "bgr24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("failed to spawn ffmpeg decoder")?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("could not get ffmpeg stdout"))?;

        log::debug!("decoding {} at {width}x{height}", path.display());
        Ok(Self {
            child,
            stdout,
            width,
            height,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Next frame's BGR bytes, `None` once the stream is exhausted.
    pub fn next_frame(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        let mut bgr = vec![0u8; self.width as usize * self.height as usize * 3];
        match self.stdout.read_exact(&mut bgr) {
            Ok(()) => Ok(Some(bgr)),
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn probe_dimensions(path: &Path) -> anyhow::Result<(u32, u32)> {
    let output = Command::new("ffprobe")
        .args(["-v", "error", "-select_streams", "v:0"])
        .args(["-show_entries", "stream=width,height", "-of", "csv=s=x:p=0"])
        .arg(path)
        .output()
        .context("failed to run ffprobe")?;
    if !output.status.success() {
        return Err(anyhow!(
            "ffprobe rejected {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    parse_dimensions(&String::from_utf8_lossy(&output.stdout))
        .ok_or_else(|| anyhow!("{} has no usable video stream", path.display()))
}

fn parse_dimensions(text: &str) -> Option<(u32, u32)> {
    let (w, h) = text.lines().next()?.trim().split_once('x')?;
    let (w, h) = (w.parse::<u32>().ok()?, h.parse::<u32>().ok()?);
    let valid = |side: u32| side > 0 && side <= MAX_DIMENSION;
    (valid(w) && valid(h)).then_some((w, h))
}

/// Whether `ffmpeg` and `ffprobe` can be launched from PATH.
pub fn ffmpeg_available() -> bool {
    let runs = |tool: &str| {
        Command::new(tool)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    };
    let found = runs("ffmpeg") && runs("ffprobe");
    if !found {
        log::warn!("ffmpeg not found on PATH; clips cannot be written or replayed");
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probed_dimensions_are_parsed_and_bounded() {
        assert_eq!(parse_dimensions("640x480\n"), Some((640, 480)));
        assert_eq!(parse_dimensions("32x24\n\n"), Some((32, 24)));
        assert_eq!(parse_dimensions(""), None);
        assert_eq!(parse_dimensions("0x480"), None);
        assert_eq!(parse_dimensions("99999x480"), None);
        assert_eq!(parse_dimensions("N/AxN/A"), None);
    }

    #[test]
    fn missing_video_is_rejected_before_spawning() {
        assert!(VideoDecoder::open(Path::new("/nonexistent/clip.avi")).is_err());
    }
}
