mod pattern;
#[cfg(feature = "camera")]
mod v4l_capture;

pub use pattern::TestPattern;
#[cfg(feature = "camera")]
pub use v4l_capture::WebcamCapture;

use crate::frame::I420Frame;
use anyhow::Result;

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Capture a single frame
    fn capture_frame(&mut self) -> Result<I420Frame>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}
