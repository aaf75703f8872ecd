mod registry;
mod selectors;

pub use registry::{ModelRegistry, ModelSpec, WireFamily, CAPABILITY_STREAM, CAPABILITY_VISION};
pub use selectors::{ModelSelection, ModelSelector};
