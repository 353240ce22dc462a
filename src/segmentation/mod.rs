pub mod matte;
#[cfg(feature = "onnx")]
mod preprocess;
#[cfg(feature = "onnx")]
mod rvm;
mod service;
pub mod types;

pub use matte::{derive_matte, matte_alpha, AlphaMatte};
#[cfg(feature = "onnx")]
pub use preprocess::Preprocessor;
#[cfg(feature = "onnx")]
pub use rvm::RobustVideoMatting;
pub use service::{MaskCompletion, MaskRequest, MaskService, MaskTicket, ThreadedMaskService};
pub use types::{SegmentationMask, SegmentationModel};

/// Create a default segmentation model (RVM)
#[cfg(feature = "onnx")]
pub fn create_default_model(model_path: &str) -> anyhow::Result<Box<dyn SegmentationModel + Send>> {
    let model = RobustVideoMatting::new(model_path)?;
    Ok(Box::new(model))
}
