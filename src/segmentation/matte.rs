//! Alpha matte derivation from a segmentation mask.
//!
//! Alpha follows the background likelihood `1 - mask` in three zones:
//! above 0.9 it is 255, in `(0.2, 0.9]` it ramps linearly from 0 to 128, and at
//! or below 0.2 it is 0. The ramp tops out at 128, so alpha jumps to 255 just
//! past 0.9.

use super::SegmentationMask;
use crate::bitmap::{argb, PackedBitmap};

/// Packed bitmap whose alpha carries the blend weight of the backdrop.
pub type AlphaMatte = PackedBitmap;

/// Color written under non-zero alpha. Only alpha takes part in compositing.
pub const MATTE_KEY: [u8; 3] = [255, 0, 255];

const FULL_BACKGROUND: f64 = 0.9;
const FULL_FOREGROUND: f64 = 0.2;

/// Matte alpha for a background likelihood.
pub fn matte_alpha(background_likelihood: f32) -> u8 {
    let bg = f64::from(background_likelihood);
    if bg > FULL_BACKGROUND {
        255
    } else if bg > FULL_FOREGROUND {
        // 0 at 0.2, 128 at 0.9; +0.5 rounds to nearest on truncation.
        (182.9 * bg - 36.6 + 0.5).clamp(0.0, 255.0) as u8
    } else {
        0
    }
}

/// Turn a mask into a matte of the mask's own dimensions.
pub fn derive_matte(mask: SegmentationMask) -> AlphaMatte {
    let _span = tracing::debug_span!("derive_matte").entered();
    let [r, g, b] = MATTE_KEY;
    let (width, height) = mask.dimensions();
    let values = mask.values();
    PackedBitmap::from_fn(width, height, |x, y| {
        let value = values[y as usize * width as usize + x as usize];
        match matte_alpha(1.0 - value) {
            0 => 0,
            a => argb(a, r, g, b),
        }
    })
}
