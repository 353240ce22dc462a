use super::CaptureSource;
use crate::bitmap::{argb, PackedBitmap};
use crate::frame::yuv::packed_to_i420;
use crate::frame::I420Frame;
use anyhow::Result;
use std::time::Instant;

/// Color bars: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
const BARS: [(u8, u8, u8); 8] = [
    (235, 235, 235),
    (235, 235, 16),
    (16, 235, 235),
    (16, 235, 16),
    (235, 16, 235),
    (235, 16, 16),
    (16, 16, 235),
    (16, 16, 16),
];

/// Synthetic source of scrolling color bars with a bright box in the middle,
/// for running the pipeline without a camera.
pub struct TestPattern {
    width: u32,
    height: u32,
    rotation: i32,
    frame: u64,
    started: Instant,
}

impl TestPattern {
    pub fn new(width: u32, height: u32, rotation: i32) -> Self {
        tracing::info!("Using {}x{} test pattern source", width, height);
        Self {
            width,
            height,
            rotation,
            frame: 0,
            started: Instant::now(),
        }
    }

    fn render(&self) -> PackedBitmap {
        let bar_width = (self.width / 8).max(1);
        let shift = self.frame as usize;
        let (w, h) = (self.width, self.height);
        PackedBitmap::from_fn(w, h, |x, y| {
            let in_box = x > w / 3 && x < 2 * w / 3 && y > h / 4;
            if in_box {
                return argb(255, 220, 180, 150);
            }
            let (r, g, b) = BARS[((x / bar_width) as usize + shift) % BARS.len()];
            argb(255, r, g, b)
        })
    }
}

impl CaptureSource for TestPattern {
    fn capture_frame(&mut self) -> Result<I420Frame> {
        let timestamp_ns = self.started.elapsed().as_nanos() as i64;
        let frame = packed_to_i420(&self.render(), self.rotation, timestamp_ns);
        self.frame += 1;
        Ok(frame)
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_have_requested_shape_and_rising_timestamps() {
        let mut source = TestPattern::new(16, 8, 90);
        assert_eq!(source.resolution(), (16, 8));
        let a = source.capture_frame().unwrap();
        let b = source.capture_frame().unwrap();
        assert_eq!((a.width, a.height), (16, 8));
        assert_eq!(a.y.len(), 128);
        assert_eq!(a.u.len(), 32);
        assert_eq!(a.rotation, 90);
        assert!(b.timestamp_ns >= a.timestamp_ns);
        assert_ne!(a.y, b.y);
    }
}
