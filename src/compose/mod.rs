pub mod blur;
pub mod porter_duff;
mod renderer;

pub use blur::{blur_or_passthrough, BlurEngine, BoxBlur};
pub use porter_duff::compose;
pub use renderer::BackdropRenderer;
