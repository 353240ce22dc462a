//! Live background replacement for camera frames.
//!
//! Frames are decoded from 4:2:0 planes into ARGB, segmented every few frames
//! by an external mask service, composited over a blurred (or static) backdrop
//! and re-encoded for the sink.

pub mod bitmap;
pub mod capture;
pub mod compose;
pub mod config;
pub mod error;
pub mod frame;
pub mod output;
pub mod scheduler;
pub mod segmentation;

pub use bitmap::PackedBitmap;
pub use config::{BackgroundMode, PipelineConfig, SkippedFramePolicy};
pub use error::{BackdropError, BackdropResult};
pub use frame::{I420Frame, Orientation, PlanarFrameBuffer, VideoFrame};
pub use output::{FrameSink, OutputFrame};
pub use scheduler::{FrameDecision, FrameScheduler, SchedulerState};
pub use segmentation::{MaskService, MaskTicket, SegmentationMask, SegmentationModel};
