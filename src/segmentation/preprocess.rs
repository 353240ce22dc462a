use super::SegmentationMask;
use crate::bitmap::{channels, PackedBitmap};
use anyhow::{ensure, Result};
use ndarray::{Array4, ArrayViewD};

/// Preprocessor for converting packed frames to model input tensors
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Preprocess an ARGB bitmap into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Convert to float and normalize to [0, 1]
    /// 3. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, image: &PackedBitmap) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized = image.resize(self.target_width, self.target_height);
        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for y in 0..height {
            for x in 0..width {
                let [_, r, g, b] = channels(resized.get(x, y));
                let (y, x) = (y as usize, x as usize);
                tensor[[0, 0, y, x]] = f32::from(r) / 255.0;
                tensor[[0, 1, y, x]] = f32::from(g) / 255.0;
                tensor[[0, 2, y, x]] = f32::from(b) / 255.0;
            }
        }

        tensor
    }

    /// Flatten a `[1, 1, H, W]` alpha output into a mask at model resolution.
    pub fn mask_from_alpha(alpha: ArrayViewD<'_, f32>) -> Result<SegmentationMask> {
        let shape = alpha.shape();
        ensure!(
            shape.len() == 4 && shape[0] == 1 && shape[1] == 1,
            "unexpected alpha shape {:?}",
            shape
        );
        let (height, width) = (shape[2] as u32, shape[3] as u32);
        let values = alpha.iter().map(|v| v.clamp(0.0, 1.0)).collect();
        Ok(SegmentationMask::new(width, height, values)?)
    }
}
