use crate::bitmap::PackedBitmap;
use crate::error::{BackdropError, BackdropResult};
use anyhow::Result;

/// Per-pixel foreground confidence in `[0, 1]`, row-major.
///
/// The mask's own dimensions are authoritative and may differ from the frame
/// it was computed for.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentationMask {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl SegmentationMask {
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> BackdropResult<Self> {
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(BackdropError::invalid_mask(format!(
                "{width}x{height} mask needs {expected} values, got {}",
                values.len()
            )));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            values: vec![value; width as usize * height as usize],
        }
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        let mut values = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                values.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            values,
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

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// Trait for segmentation models
/// Allows swapping between different backends behind the same mask service
pub trait SegmentationModel {
    /// Compute a foreground mask for one oriented frame.
    ///
    /// The mask may come back at the model's own resolution.
    fn segment(&mut self, image: &PackedBitmap) -> Result<SegmentationMask>;

    /// Reset internal state (for models with temporal/recurrent components)
    ///
    /// Call this when:
    /// - Switching cameras
    /// - Scene cuts detected
    /// - Starting a new video session
    fn reset_state(&mut self) {
        // Default implementation: no-op for stateless models
    }

    /// Get the model's preferred input dimensions
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32);
}
