//! Provider instance registry: loads, configures, and caches provider
//! instances keyed by package/version/configuration, and resolves the wire
//! form of provider references used elsewhere in the engine.

pub mod error;
pub mod provider;
pub mod registry;

pub use error::ProviderError;
pub use provider::{ApplyResult, CheckResult, Loader, ProviderHandle, ReadResult, ReadStatus};
pub use registry::{default_provider_type, fingerprint_inputs, ProviderRegistry, DEFAULT_PROVIDER_NAME};
