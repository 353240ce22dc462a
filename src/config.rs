use crate::bitmap::PackedBitmap;
use crate::compose::blur::MAX_BLUR_RADIUS;
use crate::error::{BackdropError, BackdropResult};
use anyhow::{Context, Result};
use std::path::Path;

/// What replaces the background behind the subject.
#[derive(Clone, Debug, Default)]
pub enum BackgroundMode {
    /// Blurred copy of the frame being composited.
    #[default]
    LiveBlur,
    /// Fixed image, resized to the frame.
    Static(PackedBitmap),
}

impl BackgroundMode {
    /// Load a static backdrop image once, at startup.
    pub fn load_static<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .with_context(|| format!("Failed to load background image {}", path.display()))?
            .to_rgba8();
        tracing::info!(
            "Loaded background image {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        Ok(Self::Static(PackedBitmap::from_rgba_image(&image)))
    }
}

/// What happens to frames that do not start a mask cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SkippedFramePolicy {
    /// Forward nothing for them.
    #[default]
    Drop,
    /// Re-emit the last composite, stamped with the skipped frame's timestamp.
    ReplayLast,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// A mask is requested for the first frame of every `cycle_period` frames.
    pub cycle_period: u32,
    /// Backdrop blur radius, in `(0, 25]`.
    pub blur_radius: f32,
    pub background: BackgroundMode,
    pub skipped_frames: SkippedFramePolicy,
    /// Drop composites older than the last frame delivered, replays included.
    pub drop_stale_results: bool,
    /// Rotation stamped on every output frame.
    pub output_rotation: i32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cycle_period: 3,
            blur_radius: MAX_BLUR_RADIUS,
            background: BackgroundMode::LiveBlur,
            skipped_frames: SkippedFramePolicy::Drop,
            drop_stale_results: true,
            output_rotation: 180,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> BackdropResult<()> {
        if self.cycle_period == 0 {
            return Err(BackdropError::invalid_config("cycle_period must be at least 1"));
        }
        if !(self.blur_radius > 0.0 && self.blur_radius <= MAX_BLUR_RADIUS) {
            return Err(BackdropError::invalid_config(format!(
                "blur_radius must be in (0, {MAX_BLUR_RADIUS}], got {}",
                self.blur_radius
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_pipeline() {
        let config = PipelineConfig::default();
        assert_eq!(config.cycle_period, 3);
        assert_eq!(config.blur_radius, 25.0);
        assert!(matches!(config.background, BackgroundMode::LiveBlur));
        assert_eq!(config.skipped_frames, SkippedFramePolicy::Drop);
        assert_eq!(config.output_rotation, 180);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_period_and_bad_radius() {
        let zero = PipelineConfig {
            cycle_period: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(zero.validate(), Err(BackdropError::InvalidConfig(_))));

        for radius in [0.0, -1.0, 25.5, f32::NAN] {
            let config = PipelineConfig {
                blur_radius: radius,
                ..PipelineConfig::default()
            };
            assert!(config.validate().is_err(), "radius {radius}");
        }
    }

    #[test]
    fn missing_background_image_is_an_error() {
        assert!(BackgroundMode::load_static("/nonexistent/backdrop.png").is_err());
    }
}
