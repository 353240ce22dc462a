//! Matte compositing with two Porter-Duff passes.
//!
//! Bitmaps are straight alpha at the API boundary. Both passes run on
//! premultiplied samples, as a raster canvas would.

use crate::bitmap::{argb, channels, PackedBitmap};
use crate::error::{BackdropError, BackdropResult};

type Premul = [u8; 4];

#[inline]
fn mul_div255(x: u8, y: u8) -> u8 {
    ((u32::from(x) * u32::from(y) + 127) / 255) as u8
}

#[inline]
fn premultiply(px: u32) -> Premul {
    let [a, r, g, b] = channels(px);
    [a, mul_div255(r, a), mul_div255(g, a), mul_div255(b, a)]
}

#[inline]
fn unpremultiply([a, r, g, b]: Premul) -> u32 {
    match a {
        0 => 0,
        255 => argb(255, r, g, b),
        _ => {
            let un = |c: u8| ((u32::from(c) * 255 + u32::from(a) / 2) / u32::from(a)).min(255) as u8;
            argb(a, un(r), un(g), un(b))
        }
    }
}

/// `src` kept only where `dst` has coverage: `Sa * Da`, `Sc * Da`.
#[inline]
pub fn source_in(dst: Premul, src: Premul) -> Premul {
    let da = dst[0];
    [
        mul_div255(src[0], da),
        mul_div255(src[1], da),
        mul_div255(src[2], da),
        mul_div255(src[3], da),
    ]
}

/// `src` drawn underneath `dst`: `D + S * (1 - Da)`.
#[inline]
pub fn destination_over(dst: Premul, src: Premul) -> Premul {
    let inv = 255 - dst[0];
    [
        dst[0].saturating_add(mul_div255(src[0], inv)),
        dst[1].saturating_add(mul_div255(src[1], inv)),
        dst[2].saturating_add(mul_div255(src[2], inv)),
        dst[3].saturating_add(mul_div255(src[3], inv)),
    ]
}

/// Layer the backdrop through the matte, then the original frame beneath.
///
/// Output has the matte's dimensions. `background` and `original` must already
/// be scaled to the matte; any other size is rejected with `DimensionMismatch`.
pub fn compose(
    matte: &PackedBitmap,
    background: &PackedBitmap,
    original: &PackedBitmap,
) -> BackdropResult<PackedBitmap> {
    let _span = tracing::debug_span!("compose").entered();
    let size = matte.dimensions();
    BackdropError::check_dimensions(size, background.dimensions())?;
    BackdropError::check_dimensions(size, original.dimensions())?;

    let mut canvas: Vec<Premul> = matte.pixels().iter().map(|&p| premultiply(p)).collect();

    for (dst, &bg) in canvas.iter_mut().zip(background.pixels()) {
        *dst = source_in(*dst, premultiply(bg));
    }
    for (dst, &orig) in canvas.iter_mut().zip(original.pixels()) {
        *dst = destination_over(*dst, premultiply(orig));
    }

    let pixels = canvas.into_iter().map(unpremultiply).collect();
    PackedBitmap::from_pixels(size.0, size.1, pixels)
}
