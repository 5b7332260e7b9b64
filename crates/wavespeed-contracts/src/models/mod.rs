mod descriptor;
mod registry;
mod resolver;

pub use descriptor::{
    ApiKey, ModelDescriptor, ModelListing, ModelOrigin, Provider, ResolvedModelSummary,
    DEFAULT_MODEL_ID, DEFAULT_MODEL_NAME, NATIVE_API_KEY_ENV, NATIVE_BASE_URL,
};
pub use registry::{Capability, ModelRegistry, RegistryModel};
pub use resolver::ModelResolver;
