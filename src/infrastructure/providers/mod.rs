pub mod registry;
pub mod subprocess;

pub use registry::ProviderRegistry;
pub use subprocess::{SubprocessAgentProvider, SubprocessProviderConfig};
