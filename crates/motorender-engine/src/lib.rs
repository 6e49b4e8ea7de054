//! Render pipeline: accessory resolution, prompt composition, image
//! normalization and the outbound image-edit call.

pub mod error;
pub mod gateway;
pub mod imaging;
pub mod pipeline;
pub mod settings;

pub use error::{ImagingError, RenderError};
pub use gateway::{RenderCall, RenderGateway, RenderOutcome, RenderedImage};
pub use imaging::{ImageNormalizer, NormalizePolicy, NormalizedImage};
pub use pipeline::{RenderPipeline, RenderPlan, RenderResponse, RenderUpload};
pub use settings::EngineSettings;
