pub mod ffmpeg;

use std::{fs, path::PathBuf};

use chrono::{DateTime, Local, TimeZone};
use image::{ExtendedColorType, codecs::jpeg::JpegEncoder};

use crate::{
    error::{CaptureError, Result},
    pipeline::color,
    types::Frame,
};

use self::ffmpeg::MjpegEncoder;

/// Default folder created under the user's pictures directory.
pub const DEFAULT_APP_FOLDER: &str = "FrameSentry";
const CLIP_EXTENSION: &str = "avi";
/// Appended to a clip's name for its cover still.
const COVER_SUFFIX: &str = "-cover";
const JPEG_QUALITY: u8 = 90;

pub fn default_data_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(DEFAULT_APP_FOLDER)
}

/// Timestamp-derived artifact name, e.g. `2024-03-01+18:22:05`.
pub fn new_artifact_name() -> String {
    artifact_name(&Local::now())
}

pub fn artifact_name<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format("%Y-%m-%d+%H:%M:%S").to_string()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StillFormat {
    #[default]
    Jpeg,
    Png,
}

impl StillFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            StillFormat::Jpeg => "jpg",
            StillFormat::Png => "png",
        }
    }
}

/// An open output video. Only the capture thread touches it.
pub trait ClipWriter: Send {
    fn append(&mut self, frame: &Frame) -> Result<()>;
    fn frames_written(&self) -> u32;
    /// Flush and release the underlying resources.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Where photos, cover stills and clips end up.
pub trait ArtifactStore: Send {
    fn save_photo(&mut self, name: &str, frame: &Frame) -> Result<PathBuf>;
    fn save_cover(&mut self, name: &str, frame: &Frame) -> Result<PathBuf>;
    fn open_clip(
        &mut self,
        name: &str,
        width: u32,
        height: u32,
        fps: f32,
    ) -> Result<Box<dyn ClipWriter>>;
}

/// Stores artifacts as files under one per-application directory.
pub struct DiskArtifacts {
    dir: PathBuf,
    still_format: StillFormat,
}

impl DiskArtifacts {
    pub fn new(dir: impl Into<PathBuf>, still_format: StillFormat) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| CaptureError::Artifact {
            name: dir.display().to_string(),
            reason: format!("cannot create data directory: {err}"),
        })?;
        log::info!("saving artifacts under {}", dir.display());
        Ok(Self { dir, still_format })
    }

    pub fn path_for(&self, name: &str, extension: &str) -> PathBuf {
        self.dir.join(format!("{name}.{extension}"))
    }

    fn save_still(&self, file_stem: &str, name: &str, frame: &Frame) -> Result<PathBuf> {
        let path = self.path_for(file_stem, self.still_format.extension());
        let rgb = color::swap_rb(&frame.bgr);
        image::save_buffer(&path, &rgb, frame.width, frame.height, ExtendedColorType::Rgb8)
            .map_err(|err| CaptureError::Artifact {
                name: name.to_string(),
                reason: err.to_string(),
            })?;
        Ok(path)
    }
}

impl ArtifactStore for DiskArtifacts {
    fn save_photo(&mut self, name: &str, frame: &Frame) -> Result<PathBuf> {
        self.save_still(name, name, frame)
    }

    fn save_cover(&mut self, name: &str, frame: &Frame) -> Result<PathBuf> {
        self.save_still(&format!("{name}{COVER_SUFFIX}"), name, frame)
    }

    fn open_clip(
        &mut self,
        name: &str,
        width: u32,
        height: u32,
        fps: f32,
    ) -> Result<Box<dyn ClipWriter>> {
        let path = self.path_for(name, CLIP_EXTENSION);
        let encoder = MjpegEncoder::start(&path, fps)?;
        log::info!("recording {width}x{height} @ {fps:.1} fps to {}", path.display());
        Ok(Box::new(FfmpegClipWriter { encoder }))
    }
}

struct FfmpegClipWriter {
    encoder: MjpegEncoder,
}

impl ClipWriter for FfmpegClipWriter {
    fn append(&mut self, frame: &Frame) -> Result<()> {
        let jpeg = encode_jpeg(frame)?;
        self.encoder.push_frame(&jpeg)
    }

    fn frames_written(&self) -> u32 {
        self.encoder.frame_count()
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let FfmpegClipWriter { encoder } = *self;
        encoder.finish()
    }
}

pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>> {
    let rgb = color::swap_rb(&frame.bgr);
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode(
        &rgb,
        frame.width,
        frame.height,
        ExtendedColorType::Rgb8,
    )?;
    Ok(jpeg)
}
