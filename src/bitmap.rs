use crate::error::{BackdropError, BackdropResult};
use image::{imageops, RgbaImage};

/// Pack four 8-bit channels into one ARGB sample.
#[inline]
pub fn argb(a: u8, r: u8, g: u8, b: u8) -> u32 {
    (u32::from(a) << 24) | (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
}

/// Split an ARGB sample into `[a, r, g, b]`.
#[inline]
pub fn channels(px: u32) -> [u8; 4] {
    [(px >> 24) as u8, (px >> 16) as u8, (px >> 8) as u8, px as u8]
}

#[inline]
pub fn alpha(px: u32) -> u8 {
    (px >> 24) as u8
}

/// Row-major 2-D array of packed ARGB samples, `width * height` long.
///
/// Samples are straight (not premultiplied) alpha.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedBitmap {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl PackedBitmap {
    /// A fully transparent bitmap.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0)
    }

    pub fn filled(width: u32, height: u32, px: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![px; width as usize * height as usize],
        }
    }

    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u32>) -> BackdropResult<Self> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(BackdropError::Other(anyhow::anyhow!(
                "bitmap {}x{} expects {} samples, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> u32) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn get(&self, x: u32, y: u32) -> u32 {
        self.pixels[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, px: u32) {
        let idx = self.index(x, y);
        self.pixels[idx] = px;
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Mirror left to right.
    pub fn flip_horizontal(&self) -> Self {
        let w = self.width;
        Self::from_fn(self.width, self.height, |x, y| self.get(w - 1 - x, y))
    }

    /// Mirror top to bottom.
    pub fn flip_vertical(&self) -> Self {
        let h = self.height;
        Self::from_fn(self.width, self.height, |x, y| self.get(x, h - 1 - y))
    }

    /// Rotate 90 degrees clockwise. Output is `height x width`.
    pub fn rotate90(&self) -> Self {
        let h = self.height;
        Self::from_fn(self.height, self.width, |x, y| self.get(y, h - 1 - x))
    }

    pub fn rotate180(&self) -> Self {
        let (w, h) = (self.width, self.height);
        Self::from_fn(w, h, |x, y| self.get(w - 1 - x, h - 1 - y))
    }

    /// Rotate 270 degrees clockwise. Output is `height x width`.
    pub fn rotate270(&self) -> Self {
        let w = self.width;
        Self::from_fn(self.height, self.width, |x, y| self.get(w - 1 - y, x))
    }

    /// Resample to new dimensions. Returns a clone when the size already matches.
    pub fn resize(&self, width: u32, height: u32) -> Self {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        let _span = tracing::debug_span!("resize_bitmap").entered();
        let resized = imageops::resize(
            &self.to_rgba_image(),
            width,
            height,
            imageops::FilterType::Triangle,
        );
        Self::from_rgba_image(&resized)
    }

    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let [a, r, g, b] = channels(self.get(x, y));
            image::Rgba([r, g, b, a])
        })
    }

    pub fn from_rgba_image(image: &RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let pixels = image
            .pixels()
            .map(|p| argb(p[3], p[0], p[1], p[2]))
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }
}
