mod planar;
pub mod yuv;

pub use planar::PlanarFrameBuffer;

use crate::error::{BackdropError, BackdropResult};

/// Borrowed view of a frame's three I420 planes.
///
/// Strides may exceed the logical row width (padded rows).
#[derive(Clone, Copy, Debug)]
pub struct I420Planes<'a> {
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
    pub stride_y: usize,
    pub stride_u: usize,
    pub stride_v: usize,
}

/// A captured frame handed over by a frame source.
///
/// Implementors are only borrowed for the duration of one scheduler call.
pub trait VideoFrame {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Rotation in degrees as reported by the source, possibly negative.
    fn rotation(&self) -> i32;

    fn timestamp_ns(&self) -> i64;

    /// `None` when the frame carries no readable pixel buffer.
    fn planes(&self) -> Option<I420Planes<'_>>;
}

/// Owned I420 frame with explicit plane strides.
#[derive(Clone, Debug)]
pub struct I420Frame {
    pub width: u32,
    pub height: u32,
    pub rotation: i32,
    pub timestamp_ns: i64,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
    pub stride_y: usize,
    pub stride_u: usize,
    pub stride_v: usize,
}

impl I420Frame {
    /// Tightly packed frame filled with one color.
    pub fn solid(width: u32, height: u32, y: u8, u: u8, v: u8) -> Self {
        let (cw, ch) = chroma_dimensions(width, height);
        Self {
            width,
            height,
            rotation: 0,
            timestamp_ns: 0,
            y: vec![y; width as usize * height as usize],
            u: vec![u; cw * ch],
            v: vec![v; cw * ch],
            stride_y: width as usize,
            stride_u: cw,
            stride_v: cw,
        }
    }

    pub fn with_rotation(mut self, rotation: i32) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_timestamp(mut self, timestamp_ns: i64) -> Self {
        self.timestamp_ns = timestamp_ns;
        self
    }
}

impl VideoFrame for I420Frame {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn rotation(&self) -> i32 {
        self.rotation
    }

    fn timestamp_ns(&self) -> i64 {
        self.timestamp_ns
    }

    fn planes(&self) -> Option<I420Planes<'_>> {
        Some(I420Planes {
            y: &self.y,
            u: &self.u,
            v: &self.v,
            stride_y: self.stride_y,
            stride_u: self.stride_u,
            stride_v: self.stride_v,
        })
    }
}

/// Chroma plane size for a 4:2:0 frame, rounding odd dimensions up.
pub fn chroma_dimensions(width: u32, height: u32) -> (usize, usize) {
    ((width as usize).div_ceil(2), (height as usize).div_ceil(2))
}

/// Orientation correction applied when converting a captured frame to a bitmap.
///
/// Every case includes the sensor mirror: horizontal for upright, 90 and 180,
/// vertical for 270.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Upright,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Orientation {
    /// Map signed source degrees onto a correction. Unknown values fall back to `Upright`.
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees {
            90 | -270 => Self::Rotate90,
            180 | -180 => Self::Rotate180,
            270 | -90 => Self::Rotate270,
            _ => Self::Upright,
        }
    }

    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Self::Rotate90 | Self::Rotate270)
    }

    pub fn apply(self, bitmap: &crate::bitmap::PackedBitmap) -> crate::bitmap::PackedBitmap {
        match self {
            Self::Rotate90 => bitmap.flip_horizontal().rotate90(),
            Self::Rotate180 => bitmap.flip_horizontal().rotate180(),
            Self::Rotate270 => bitmap.flip_vertical().rotate270(),
            Self::Upright => bitmap.flip_horizontal(),
        }
    }
}

/// Check that a plane holds `rows` rows of `row_len` bytes at `stride`.
pub(crate) fn check_plane(
    name: &str,
    plane: &[u8],
    stride: usize,
    row_len: usize,
    rows: usize,
) -> BackdropResult<()> {
    if stride < row_len {
        return Err(BackdropError::plane_copy(format!(
            "{name} stride {stride} is shorter than row width {row_len}"
        )));
    }
    let needed = if rows == 0 {
        0
    } else {
        (rows - 1) * stride + row_len
    };
    if plane.len() < needed {
        return Err(BackdropError::plane_copy(format!(
            "{name} plane holds {} bytes, need {needed}",
            plane.len()
        )));
    }
    Ok(())
}
