use std::path::PathBuf;

use thiserror::Error;

use crate::types::Rect;

pub type Result<T, E = CaptureError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CaptureError {
    /// Camera or file could not be opened. Fatal to the owning loop.
    #[error("video source unavailable: {0}")]
    SourceUnavailable(String),

    /// A composite rectangle fell outside the frame; only that operation is skipped.
    #[error("rectangle {rect:?} does not fit a {width}x{height} frame")]
    InvalidGeometry { rect: Rect, width: u32, height: u32 },

    #[error("required resource missing: {}", .0.display())]
    MissingResource(PathBuf),

    #[error("recording failed: {0}")]
    Recording(String),

    #[error("failed to persist {name}: {reason}")]
    Artifact { name: String, reason: String },

    #[error("model inference failed: {0}")]
    Model(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}
