use super::preprocess::Preprocessor;
use super::types::{SegmentationMask, SegmentationModel};
use crate::bitmap::PackedBitmap;
use anyhow::{Context, Result};
use ndarray::{Array4, Ix4};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

/// RobustVideoMatting segmentation model
///
/// This model uses recurrent connections to maintain temporal consistency.
/// Hidden states (r1-r4) are carried between frames for smooth results.
/// Its alpha output is foreground confidence, returned at model resolution.
pub struct RobustVideoMatting {
    session: Session,
    preprocessor: Preprocessor,
    width: u32,
    height: u32,

    /// r1..r4 from the previous inference; `None` before the first frame.
    states: Option<[Array4<f32>; 4]>,
    downsample_ratio: f32,
}

impl RobustVideoMatting {
    /// Create a new RVM model from an ONNX file
    ///
    /// # Default Configuration
    /// - Input size: 512x512
    /// - Downsample ratio: 0.25 (hidden states are 1/4 of input resolution)
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading RVM model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("RVM model loaded successfully");

        let width = 512;
        let height = 512;

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(width, height),
            width,
            height,
            states: None,
            downsample_ratio: 0.25,
        })
    }

    /// Zeroed hidden states for the first frame of a session.
    fn initial_states(&self) -> [Array4<f32>; 4] {
        let h = (self.height as f32 * self.downsample_ratio) as usize;
        let w = (self.width as f32 * self.downsample_ratio) as usize;

        tracing::debug!("Initializing hidden states to {}x{}", w, h);

        [
            Array4::zeros((1, 16, h, w)),
            Array4::zeros((1, 20, h / 2, w / 2)),
            Array4::zeros((1, 24, h / 4, w / 4)),
            Array4::zeros((1, 28, h / 8, w / 8)),
        ]
    }
}

impl SegmentationModel for RobustVideoMatting {
    fn segment(&mut self, image: &PackedBitmap) -> Result<SegmentationMask> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        let [r1, r2, r3, r4] = match self.states.take() {
            Some(states) => states,
            None => self.initial_states(),
        };

        let input_tensor = self.preprocessor.preprocess(image);

        // RVM expects: src (frame), r1, r2, r3, r4
        // Outputs: fgr, pha, r1, r2, r3, r4
        let outputs = self
            .session
            .run(ort::inputs![
                TensorRef::from_array_view(input_tensor.view())?,
                TensorRef::from_array_view(r1.view())?,
                TensorRef::from_array_view(r2.view())?,
                TensorRef::from_array_view(r3.view())?,
                TensorRef::from_array_view(r4.view())?
            ])
            .context("Failed to run inference")?;

        let mask = Preprocessor::mask_from_alpha(outputs[1].try_extract_array::<f32>()?)?;

        let state = |idx: usize| -> Result<Array4<f32>> {
            Ok(outputs[idx]
                .try_extract_array::<f32>()?
                .to_owned()
                .into_dimensionality::<Ix4>()?)
        };
        // A failed extraction leaves `states` empty, so the next frame starts fresh.
        self.states = Some([state(2)?, state(3)?, state(4)?, state(5)?]);

        Ok(mask)
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting RVM hidden states");
        self.states = None;
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
