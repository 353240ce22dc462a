#[cfg(feature = "camera")]
mod loopback;
mod raw_file;

#[cfg(feature = "camera")]
pub use loopback::V4L2Output;
pub use raw_file::RawFileSink;

use crate::frame::I420Frame;
use anyhow::Result;
use std::io::Write;

/// Composited frame handed to the sink: I420 planes plus rotation and timestamp.
pub type OutputFrame = I420Frame;

/// Trait for output destinations
///
/// All deliveries happen on one thread, in submission order.
pub trait FrameSink: Send {
    /// Write a frame to the output
    fn deliver(&mut self, frame: OutputFrame) -> Result<()>;
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn deliver(&mut self, frame: OutputFrame) -> Result<()> {
        (**self).deliver(frame)
    }
}

/// Write the visible rows of each plane, skipping stride padding.
pub(crate) fn write_i420<W: Write>(out: &mut W, frame: &OutputFrame) -> std::io::Result<()> {
    let (cw, ch) = crate::frame::chroma_dimensions(frame.width, frame.height);
    let planes = [
        (&frame.y, frame.stride_y, frame.width as usize, frame.height as usize),
        (&frame.u, frame.stride_u, cw, ch),
        (&frame.v, frame.stride_v, cw, ch),
    ];
    for (plane, stride, row_len, rows) in planes {
        for row in 0..rows {
            let start = row * stride;
            out.write_all(&plane[start..start + row_len])?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_i420_drops_padding() {
        let mut frame = I420Frame::solid(2, 2, 1, 2, 3);
        frame.y = vec![1, 1, 9, 1, 1, 9];
        frame.stride_y = 3;
        let mut out = Vec::new();
        write_i420(&mut out, &frame).unwrap();
        assert_eq!(out, vec![1, 1, 1, 1, 2, 3]);
    }
}
