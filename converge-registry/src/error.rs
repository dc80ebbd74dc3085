use std::fmt;

/// Errors surfaced by the provider registry and by provider RPC calls made
/// through it.
#[derive(Debug)]
pub enum ProviderError {
    Load { pkg: String, version: String, reason: String },
    Configure { pkg: String, reason: String },
    Rpc { method: &'static str, reason: String },
    NotFound { pkg: String, version: String },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Load { pkg, version, reason } => {
                write!(f, "failed to load provider {pkg}@{version}: {reason}")
            }
            ProviderError::Configure { pkg, reason } => write!(f, "provider {pkg} failed to configure: {reason}"),
            ProviderError::Rpc { method, reason } => write!(f, "provider RPC {method} failed: {reason}"),
            ProviderError::NotFound { pkg, version } => write!(f, "no loader registered for {pkg}@{version}"),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<ProviderError> for converge_core::EngineError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Configure { pkg, reason } => converge_core::EngineError::Configuration {
                provider: converge_core::Urn::new("unknown", "unknown", "", &format!("pulumi:providers:{pkg}"), "default"),
                reason,
            },
            other => converge_core::EngineError::Configuration {
                provider: converge_core::Urn::new("unknown", "unknown", "", "pulumi:providers:unknown", "default"),
                reason: other.to_string(),
            },
        }
    }
}
