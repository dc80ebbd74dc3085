use async_trait::async_trait;
use converge_core::{DiffResult, PropertyMap, ResourceState, Urn};

use crate::error::ProviderError;

/// Outcome of a Check call: possibly-adjusted inputs plus any check failures.
#[derive(Debug, Clone, Default)]
pub struct CheckResult {
    pub inputs: PropertyMap,
    pub failures: Vec<String>,
}

/// Outcome of a Create/Update call.
#[derive(Debug, Clone)]
pub struct ApplyResult {
    pub id: String,
    pub outputs: PropertyMap,
    /// Set when the provider only partially completed the operation; the
    /// caller must persist `outputs` as-is so the next run resumes via
    /// Diff-and-Update rather than Create.
    pub partial_failure: bool,
    pub init_errors: Vec<String>,
}

/// Outcome of a Read call: `None` means the resource no longer exists.
#[derive(Debug, Clone)]
pub struct ReadResult {
    pub id: String,
    pub inputs: PropertyMap,
    pub outputs: PropertyMap,
    pub status: ReadStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadStatus {
    Ok,
    /// The provider completed the read but flagged some fields as
    /// unreliable; `reasons` replaces the row's `init_errors` so callers see
    /// what the provider actually reported rather than carrying forward
    /// whatever was there before the read.
    PartialFailure { reasons: Vec<String> },
}

/// The provider RPC contract a loaded plugin instance exposes. Implemented
/// by whatever transport-level client sits underneath (a gRPC-backed plugin
/// process, or the in-memory fake used in tests) — this crate only defines
/// the contract and caches instances against it.
#[async_trait]
pub trait ProviderHandle: Send + Sync {
    async fn configure(&self, inputs: &PropertyMap) -> Result<(), ProviderError>;
    async fn check(&self, urn: &Urn, olds: &PropertyMap, news: &PropertyMap) -> Result<CheckResult, ProviderError>;
    async fn diff(
        &self,
        urn: &Urn,
        old_inputs: &PropertyMap,
        old_outputs: &PropertyMap,
        new_inputs: &PropertyMap,
        ignore_changes: &[String],
    ) -> Result<DiffResult, ProviderError>;
    async fn create(&self, urn: &Urn, inputs: &PropertyMap) -> Result<ApplyResult, ProviderError>;
    async fn update(&self, urn: &Urn, old: &ResourceState, new_inputs: &PropertyMap) -> Result<ApplyResult, ProviderError>;
    async fn delete(&self, urn: &Urn, state: &ResourceState) -> Result<(), ProviderError>;
    async fn read(&self, urn: &Urn, id: &str, inputs: &PropertyMap, state: &PropertyMap) -> Result<Option<ReadResult>, ProviderError>;
    async fn cancel(&self);
}

/// Loads and constructs a provider instance for a given (pkg, version),
/// before it has been configured. Distinct from plugin *download*, which is
/// out of scope: by the time `load` is called the plugin binary/library is
/// already available to the process.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, pkg: &str, version: &str) -> Result<Box<dyn ProviderHandle>, ProviderError>;
}
