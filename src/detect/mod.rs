mod backend;
mod backends;
mod registry;

pub use backend::{DetectorBackend, ModelOutput, RawDetection};
pub use backends::StubBackend;
pub use registry::BackendRegistry;
