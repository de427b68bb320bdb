use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};

use super::color;
use crate::{
    error::{CaptureError, Result},
    storage::ffmpeg::VideoDecoder,
    types::Frame,
};

/// Blocking supplier of raw frames. `Ok(None)` marks end of stream.
///
/// Camera handles are not `Send`, so sources are opened on the thread that
/// reads them.
pub trait FrameSource {
    fn read(&mut self) -> Result<Option<Frame>>;

    fn describe(&self) -> String;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    Camera(u32),
    Path(PathBuf),
}

impl SourceSpec {
    /// Numeric arguments select a camera, anything else is a path.
    pub fn parse(arg: &str) -> Self {
        match arg.parse::<u32>() {
            Ok(index) => SourceSpec::Camera(index),
            Err(_) => SourceSpec::Path(PathBuf::from(arg)),
        }
    }
}

impl std::fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSpec::Camera(index) => write!(f, "camera #{index}"),
            SourceSpec::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

const VIDEO_EXTENSIONS: &[&str] = &["avi", "mp4", "mkv", "mov"];

pub fn open_source(spec: &SourceSpec) -> Result<Box<dyn FrameSource>> {
    let opened: anyhow::Result<Box<dyn FrameSource>> = match spec {
        SourceSpec::Camera(index) => open_camera(*index),
        SourceSpec::Path(path) if path.is_dir() => {
            ImageSequenceSource::from_dir(path).map(|s| Box::new(s) as Box<dyn FrameSource>)
        }
        SourceSpec::Path(path) if VIDEO_EXTENSIONS.iter().any(|ext| has_extension(path, ext)) => {
            VideoFileSource::open(path).map(|s| Box::new(s) as Box<dyn FrameSource>)
        }
        SourceSpec::Path(path) => {
            ImageSequenceSource::single(path).map(|s| Box::new(s) as Box<dyn FrameSource>)
        }
    };
    opened.map_err(|err| CaptureError::SourceUnavailable(format!("{spec}: {err:#}")))
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

#[cfg(feature = "camera-nokhwa")]
fn open_camera(index: u32) -> anyhow::Result<Box<dyn FrameSource>> {
    Ok(Box::new(camera::CameraSource::open(index)?))
}

#[cfg(not(feature = "camera-nokhwa"))]
fn open_camera(index: u32) -> anyhow::Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "camera #{index} requested but camera support was not compiled in"
    ))
}

#[cfg(feature = "camera-nokhwa")]
pub use camera::{CameraDevice, available_cameras};

#[cfg(feature = "camera-nokhwa")]
mod camera {
    use anyhow::{Result, anyhow};
    use nokhwa::{
        Camera,
        pixel_format::RgbFormat,
        query,
        utils::{
            ApiBackend, CameraIndex, CameraInfo, FrameFormat, RequestedFormat,
            RequestedFormatType,
        },
    };

    use super::FrameSource;
    use crate::{pipeline::color, types::Frame};

    // Prefer pixel formats that are widely supported on macOS (the built-in
    // cameras often reject YUYV even though Nokhwa reports it).
    const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
        FrameFormat::RAWRGB,
        FrameFormat::RAWBGR,
        FrameFormat::GRAY,
        FrameFormat::YUYV,
        FrameFormat::NV12,
        FrameFormat::MJPEG,
    ];

    fn requested_formats() -> [RequestedFormat<'static>; 4] {
        [
            RequestedFormat::with_formats(
                RequestedFormatType::AbsoluteHighestFrameRate,
                PREFERRED_PIXEL_FORMATS,
            ),
            RequestedFormat::with_formats(
                RequestedFormatType::AbsoluteHighestResolution,
                PREFERRED_PIXEL_FORMATS,
            ),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
        ]
    }

    #[derive(Clone, Debug)]
    pub struct CameraDevice {
        pub index: u32,
        pub label: String,
    }

    pub fn available_cameras() -> Result<Vec<CameraDevice>> {
        let cameras = query(ApiBackend::Auto)?;
        Ok(cameras
            .into_iter()
            .enumerate()
            .map(|(position, info)| CameraDevice {
                index: info.index().as_index().unwrap_or(position as u32),
                label: format_camera_label(&info),
            })
            .collect())
    }

    fn format_camera_label(info: &CameraInfo) -> String {
        format!("{} ({})", info.human_name(), info.description())
    }

    fn build_camera(index: CameraIndex) -> Result<Camera> {
        let mut last_err = None;

        for requested in requested_formats() {
            match Camera::new(index.clone(), requested) {
                Ok(mut camera) => match camera.open_stream() {
                    Ok(()) => return Ok(camera),
                    Err(err) => last_err = Some(err.into()),
                },
                Err(err) => last_err = Some(err.into()),
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
    }

    pub struct CameraSource {
        camera: Camera,
        index: u32,
    }

    impl CameraSource {
        pub fn open(index: u32) -> Result<Self> {
            let camera = build_camera(CameraIndex::Index(index))?;
            let format = camera.camera_format();
            log::info!(
                "camera #{index} streaming {}x{} {:?} @ {} fps",
                format.width(),
                format.height(),
                format.format(),
                format.frame_rate()
            );
            Ok(Self { camera, index })
        }
    }

    impl FrameSource for CameraSource {
        fn read(&mut self) -> crate::error::Result<Option<Frame>> {
            let buffer = match self.camera.frame() {
                Ok(buffer) => buffer,
                Err(err) => {
                    log::warn!("camera #{} read failed, ending stream: {err}", self.index);
                    return Ok(None);
                }
            };
            match color::convert_camera_frame(&buffer) {
                Ok(frame) if frame.is_valid() => Ok(Some(frame)),
                Ok(_) => {
                    log::warn!("camera #{} produced an empty frame", self.index);
                    Ok(None)
                }
                Err(err) => {
                    log::warn!("failed to decode camera frame {err:?}");
                    Ok(None)
                }
            }
        }

        fn describe(&self) -> String {
            format!("camera #{}", self.index)
        }
    }

    impl Drop for CameraSource {
        fn drop(&mut self) {
            if let Err(err) = self.camera.stop_stream() {
                log::debug!("camera #{} did not stop cleanly: {err}", self.index);
            }
        }
    }
}

/// Replays a video file (including clips written by the recorder) via ffmpeg.
pub struct VideoFileSource {
    decoder: VideoDecoder,
    path: PathBuf,
}

impl VideoFileSource {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let decoder = VideoDecoder::open(path)
            .with_context(|| format!("{} is not a readable video", path.display()))?;
        Ok(Self {
            decoder,
            path: path.to_path_buf(),
        })
    }
}

impl FrameSource for VideoFileSource {
    fn read(&mut self) -> Result<Option<Frame>> {
        let (width, height) = self.decoder.dimensions();
        match self.decoder.next_frame() {
            Ok(Some(bgr)) => Ok(Some(Frame::new(bgr, width, height))),
            Ok(None) => Ok(None),
            Err(err) => {
                log::warn!("{}: decoder failed, ending stream: {err}", self.path.display());
                Ok(None)
            }
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Still images read in file-name order, one per acquisition.
pub struct ImageSequenceSource {
    paths: std::vec::IntoIter<PathBuf>,
    origin: PathBuf,
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

impl ImageSequenceSource {
    pub fn from_dir(dir: &Path) -> anyhow::Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("listing {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| IMAGE_EXTENSIONS.iter().any(|ext| has_extension(path, ext)))
            .collect();
        if paths.is_empty() {
            return Err(anyhow!("{} contains no images", dir.display()));
        }
        paths.sort();
        Ok(Self {
            paths: paths.into_iter(),
            origin: dir.to_path_buf(),
        })
    }

    pub fn single(path: &Path) -> anyhow::Result<Self> {
        if !path.is_file() {
            return Err(anyhow!("{} does not exist", path.display()));
        }
        Ok(Self {
            paths: vec![path.to_path_buf()].into_iter(),
            origin: path.to_path_buf(),
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn read(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.paths.next() else {
            return Ok(None);
        };
        match image::open(&path) {
            Ok(img) => {
                let rgb = img.to_rgb8();
                let (width, height) = rgb.dimensions();
                Ok(Some(Frame::new(color::swap_rb(rgb.as_raw()), width, height)))
            }
            Err(err) => {
                log::warn!("{}: unreadable image, ending stream: {err}", path.display());
                Ok(None)
            }
        }
    }

    fn describe(&self) -> String {
        self.origin.display().to_string()
    }
}
