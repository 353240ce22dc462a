//! BT.601 color conversion between 4:2:0 planar layouts and packed ARGB.
//!
//! Decoding uses integer math on coefficients scaled by 1000, rounding half up
//! and clamping each channel to `[0, 255]`:
//!
//! ```text
//! Y' = max(Y, 16)
//! R  = 1.164 (Y' - 16) + 1.596 (V - 128)
//! G  = 1.164 (Y' - 16) - 0.813 (V - 128) - 0.391 (U - 128)
//! B  = 1.164 (Y' - 16) + 2.018 (U - 128)
//! ```

use super::{chroma_dimensions, I420Frame};
use crate::bitmap::{argb, channels, PackedBitmap};
use crate::error::{BackdropError, BackdropResult};

const SCALE: i32 = 1000;

#[inline]
fn descale(v: i32) -> u8 {
    (v + SCALE / 2).div_euclid(SCALE).clamp(0, 255) as u8
}

/// Convert one YUV triple to an opaque ARGB sample.
#[inline]
pub fn yuv_to_argb(y: u8, u: u8, v: u8) -> u32 {
    let c = (i32::from(y.max(16)) - 16) * 1164;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;

    let r = descale(c + 1596 * e);
    let g = descale(c - 813 * e - 391 * d);
    let b = descale(c + 2018 * d);
    argb(255, r, g, b)
}

/// Row length in bytes of the interleaved chroma plane.
pub fn semi_planar_chroma_stride(width: u32) -> usize {
    chroma_dimensions(width, 1).0 * 2
}

/// Total size of a semi-planar frame: luma plus both interleaved chroma channels.
pub fn semi_planar_len(width: u32, height: u32) -> usize {
    let (cw, ch) = chroma_dimensions(width, height);
    width as usize * height as usize + 2 * cw * ch
}

/// Decode a semi-planar buffer whose chroma pairs are stored V first, then U.
///
/// Chroma rows are `2 * ceil(width / 2)` bytes apart, which equals `width` for
/// even widths and keeps the last pair of an odd-width row in bounds.
pub fn semi_planar_to_packed(data: &[u8], width: u32, height: u32) -> BackdropResult<PackedBitmap> {
    let expected = semi_planar_len(width, height);
    if data.len() != expected {
        return Err(BackdropError::plane_copy(format!(
            "semi-planar {width}x{height} buffer holds {} bytes, need {expected}",
            data.len()
        )));
    }

    let (w, h) = (width as usize, height as usize);
    let frame_size = w * h;
    let chroma_stride = semi_planar_chroma_stride(width);
    let mut pixels = Vec::with_capacity(frame_size);

    for row in 0..h {
        let chroma_row = frame_size + (row >> 1) * chroma_stride;
        for col in 0..w {
            let y = data[row * w + col];
            let ci = chroma_row + (col & !1);
            let v = data[ci];
            let u = data[ci + 1];
            pixels.push(yuv_to_argb(y, u, v));
        }
    }

    PackedBitmap::from_pixels(width, height, pixels)
}

/// BT.601 limited-range encode of one RGB triple.
#[inline]
pub fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (y as u8, u as u8, v as u8)
}

/// Encode a packed bitmap as a tightly packed I420 frame.
///
/// Chroma is taken from the average color of each 2x2 block (edge blocks of odd
/// sized images average fewer samples). Alpha is ignored.
pub fn packed_to_i420(bitmap: &PackedBitmap, rotation: i32, timestamp_ns: i64) -> I420Frame {
    let (width, height) = bitmap.dimensions();
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = chroma_dimensions(width, height);
    let px = bitmap.pixels();

    let mut y_plane = Vec::with_capacity(w * h);
    for &p in px {
        let [_, r, g, b] = channels(p);
        y_plane.push(rgb_to_yuv(r, g, b).0);
    }

    let mut u_plane = Vec::with_capacity(cw * ch);
    let mut v_plane = Vec::with_capacity(cw * ch);
    for cy in 0..ch {
        for cx in 0..cw {
            let mut sum = [0u32; 3];
            let mut n = 0u32;
            for row in (cy * 2)..(cy * 2 + 2).min(h) {
                for col in (cx * 2)..(cx * 2 + 2).min(w) {
                    let [_, r, g, b] = channels(px[row * w + col]);
                    sum[0] += u32::from(r);
                    sum[1] += u32::from(g);
                    sum[2] += u32::from(b);
                    n += 1;
                }
            }
            let avg = |s: u32| ((s + n / 2) / n) as u8;
            let (_, u, v) = rgb_to_yuv(avg(sum[0]), avg(sum[1]), avg(sum[2]));
            u_plane.push(u);
            v_plane.push(v);
        }
    }

    I420Frame {
        width,
        height,
        rotation,
        timestamp_ns,
        y: y_plane,
        u: u_plane,
        v: v_plane,
        stride_y: w,
        stride_u: cw,
        stride_v: cw,
    }
}
