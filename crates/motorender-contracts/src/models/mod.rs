mod registry;
mod selectors;
mod sizes;

pub use registry::{ImageInputPolicy, ModelRegistry, ModelSpec, RequestShape};
pub use selectors::{ModelSelection, ModelSelector};
pub use sizes::{snap_size, SizeDecision};
