use async_trait::async_trait;

use converge_core::{EngineError, PropertyMap, Urn};
use converge_generator::Registration;

/// What submitting a registration resolved to, once its step(s) have run.
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    pub urn: Urn,
    pub id: String,
    pub outputs: PropertyMap,
}

/// The boundary between the wire-level monitor service and whatever owns
/// the generator/executor/snapshot pipeline. `MonitorService` depends only
/// on this trait so the gRPC contract can be exercised in tests without a
/// running engine; the facade crate supplies the real implementation that
/// plans and executes steps for each submitted registration in turn.
#[async_trait]
pub trait RegistrationSink: Send + Sync {
    /// Submit a fully-normalized registration and block until its step(s)
    /// have been executed, returning the resolved URN/id/outputs the
    /// language runtime needs before it can proceed.
    async fn submit(&self, reg: Registration) -> Result<RegistrationOutcome, EngineError>;

    /// Record outputs for a URN already registered earlier in this update
    /// (the terminal event for component resources).
    async fn register_outputs(&self, urn: Urn, outputs: PropertyMap) -> Result<(), EngineError>;

    /// Whether `urn` names a custom resource, for URNs that predate this
    /// update (so the monitor can still compute a correct type-chain
    /// contribution for a newly-registered child of an old parent). `None`
    /// if `urn` is not a known live resource at all.
    async fn resource_custom(&self, urn: &Urn) -> Option<bool>;
}
