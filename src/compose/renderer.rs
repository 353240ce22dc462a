use super::blur::{blur_or_passthrough, BlurEngine};
use super::porter_duff::compose;
use crate::bitmap::PackedBitmap;
use crate::config::{BackgroundMode, PipelineConfig};
use crate::error::BackdropResult;
use crate::segmentation::{derive_matte, SegmentationMask};

/// Turns a captured frame and its mask into the composited frame.
pub struct BackdropRenderer {
    blur: Box<dyn BlurEngine>,
    blur_radius: f32,
    background: BackgroundMode,
    /// Static backdrop already scaled to the last frame size.
    scaled_background: Option<PackedBitmap>,
}

impl BackdropRenderer {
    pub fn new(config: &PipelineConfig, blur: Box<dyn BlurEngine>) -> Self {
        Self {
            blur,
            blur_radius: config.blur_radius,
            background: config.background.clone(),
            scaled_background: None,
        }
    }

    pub fn render(&mut self, original: &PackedBitmap, mask: SegmentationMask) -> BackdropResult<PackedBitmap> {
        let (width, height) = original.dimensions();
        let mut matte = derive_matte(mask);
        if matte.dimensions() != (width, height) {
            tracing::debug!(
                "Scaling matte {}x{} to frame {}x{}",
                matte.width(),
                matte.height(),
                width,
                height
            );
            matte = matte.resize(width, height);
        }

        let background = self.background_for(original);
        compose(&matte, &background, original)
    }

    fn background_for(&mut self, original: &PackedBitmap) -> PackedBitmap {
        match &self.background {
            BackgroundMode::LiveBlur => blur_or_passthrough(self.blur.as_ref(), original, self.blur_radius),
            BackgroundMode::Static(image) => {
                let size = original.dimensions();
                match &mut self.scaled_background {
                    Some(scaled) if scaled.dimensions() == size => scaled.clone(),
                    slot => {
                        let scaled = image.resize(size.0, size.1);
                        *slot = Some(scaled.clone());
                        scaled
                    }
                }
            }
        }
    }
}
