use crate::bitmap::{argb, channels, PackedBitmap};
use crate::error::{BackdropError, BackdropResult};

/// Largest supported blur radius.
pub const MAX_BLUR_RADIUS: f32 = 25.0;

/// Produces a blurred copy of a bitmap with the same dimensions.
pub trait BlurEngine: Send {
    fn blur(&self, input: &PackedBitmap, radius: f32) -> BackdropResult<PackedBitmap>;
}

/// Blur `input`, falling back to an unmodified copy when the engine fails.
pub fn blur_or_passthrough(engine: &dyn BlurEngine, input: &PackedBitmap, radius: f32) -> PackedBitmap {
    let _span = tracing::debug_span!("blur", radius).entered();
    match engine.blur(input, radius) {
        Ok(blurred) => blurred,
        Err(err) => {
            tracing::warn!("Blur failed, using unblurred backdrop: {}", err);
            input.clone()
        }
    }
}

/// Software Gaussian approximation from repeated box passes.
///
/// The radius maps to a standard deviation of `0.4 * radius + 0.6`, and each
/// pass is a separable running-sum box filter with edge clamping.
#[derive(Clone, Copy, Debug)]
pub struct BoxBlur {
    passes: usize,
}

impl Default for BoxBlur {
    fn default() -> Self {
        Self { passes: 3 }
    }
}

impl BoxBlur {
    pub fn with_passes(passes: usize) -> Self {
        Self {
            passes: passes.max(1),
        }
    }
}

impl BlurEngine for BoxBlur {
    fn blur(&self, input: &PackedBitmap, radius: f32) -> BackdropResult<PackedBitmap> {
        if !(radius > 0.0 && radius <= MAX_BLUR_RADIUS) {
            return Err(BackdropError::blur(format!(
                "radius {radius} outside (0, {MAX_BLUR_RADIUS}]"
            )));
        }
        let (width, height) = input.dimensions();
        if width == 0 || height == 0 {
            return Ok(input.clone());
        }

        let sigma = 0.4 * radius + 0.6;
        let (w, h) = (width as usize, height as usize);
        let mut src: Vec<[u8; 4]> = input.pixels().iter().map(|&p| channels(p)).collect();
        let mut tmp = vec![[0u8; 4]; src.len()];

        for size in box_sizes(sigma, self.passes) {
            let r = (size - 1) / 2;
            // Rows, then columns.
            box_pass(&src, &mut tmp, w, h, 1, w, r);
            box_pass(&tmp, &mut src, h, w, w, 1, r);
        }

        let pixels = src.into_iter().map(|[a, r, g, b]| argb(a, r, g, b)).collect();
        PackedBitmap::from_pixels(width, height, pixels)
    }
}

/// Odd box widths whose repeated application approximates a Gaussian of `sigma`.
fn box_sizes(sigma: f32, passes: usize) -> Vec<usize> {
    let n = passes as f32;
    let ideal = (12.0 * sigma * sigma / n + 1.0).sqrt();
    let mut lower = ideal.floor() as i64;
    if lower % 2 == 0 {
        lower -= 1;
    }
    let lower = lower.max(1);
    let upper = lower + 2;
    let lf = lower as f32;
    let m_ideal = (12.0 * sigma * sigma - n * lf * lf - 4.0 * n * lf - 3.0 * n) / (-4.0 * lf - 4.0);
    let m = m_ideal.round().max(0.0) as usize;

    (0..passes)
        .map(|i| if i < m { lower as usize } else { upper as usize })
        .collect()
}

/// One running-sum box pass over `lines` lines of `len` samples each.
///
/// Sample `i` of line `l` lives at `l * line_step + i * step`.
fn box_pass(
    src: &[[u8; 4]],
    dst: &mut [[u8; 4]],
    len: usize,
    lines: usize,
    step: usize,
    line_step: usize,
    r: usize,
) {
    let window = (2 * r + 1) as u32;
    let last = len - 1;
    let r = r as isize;

    for line in 0..lines {
        let base = line * line_step;
        let at = |i: isize| src[base + (i.clamp(0, last as isize) as usize) * step];

        let mut acc = [0u32; 4];
        for i in -r..=r {
            let px = at(i);
            for c in 0..4 {
                acc[c] += u32::from(px[c]);
            }
        }

        for i in 0..len as isize {
            let out = &mut dst[base + i as usize * step];
            for c in 0..4 {
                out[c] = ((acc[c] + window / 2) / window) as u8;
            }
            let incoming = at(i + r + 1);
            let outgoing = at(i - r);
            for c in 0..4 {
                acc[c] = acc[c] + u32::from(incoming[c]) - u32::from(outgoing[c]);
            }
        }
    }
}
