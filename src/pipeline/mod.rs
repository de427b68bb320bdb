pub mod capture;
pub mod color;
pub mod draw;
pub mod face;
pub mod frame_buffer;
pub mod motion;
pub mod recording;
pub mod source;
pub mod throughput;

// Re-exports for convenience
pub use capture::{Analyzer, CaptureHandle, CaptureOptions, start_capture};
pub use frame_buffer::FrameBuffer;
pub use motion::{MotionConfig, MotionDetector};
pub use source::{FrameSource, SourceSpec, open_source};
