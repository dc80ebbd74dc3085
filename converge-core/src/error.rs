use std::fmt;

use crate::urn::Urn;

/// The top-level error taxonomy for the engine, per the kinds enumerated in
/// the error-handling design: each variant carries enough context for the
/// propagation policy (URN + op prepended for provider errors, alias chain
/// for generator errors, abandoned-dependent list for executor errors).
#[derive(Debug, Clone)]
pub enum EngineError {
    /// A provider could not be configured; fatal for every step needing it.
    Configuration { provider: Urn, reason: String },
    /// A provider rejected a Diff call.
    Diff { urn: Urn, reason: String },
    /// A Create/Update/Delete step failed. `partial_state` is set when the
    /// provider reported PartialFailure and returned state to persist.
    StepFailed {
        urn: Urn,
        op: crate::step::Op,
        reason: String,
        partial_failure: bool,
    },
    /// A step would destroy a protected resource.
    ProtectViolation { urn: Urn },
    /// Two registrations in one update resolved to the same URN.
    DuplicateUrn { urn: Urn },
    /// An alias resolved ambiguously or was declared more than once for a URN.
    DuplicateAlias { urn: Urn },
    /// A registration's declared parent was not registered earlier in the same update.
    InvalidParent { urn: Urn, parent: Urn },
    /// The computed snapshot failed integrity verification; persist is refused.
    SnapshotIntegrity(SnapshotIntegrityError),
    /// The run was cancelled; prior progress is preserved.
    Cancelled,
    /// A generator-level decision failed, carrying the alias/target chain
    /// that led to it.
    Generator { urn: Urn, chain: Vec<String>, reason: String },
    /// An executor-level failure, carrying the URNs abandoned as transitive
    /// dependents of a failed step.
    Executor { failed: Urn, abandoned: Vec<Urn>, reason: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Configuration { provider, reason } => {
                write!(f, "provider {provider} failed to configure: {reason}")
            }
            EngineError::Diff { urn, reason } => write!(f, "{urn}: diff failed: {reason}"),
            EngineError::StepFailed { urn, op, reason, partial_failure } => {
                write!(f, "{urn}: {op:?} failed: {reason}")?;
                if *partial_failure {
                    write!(f, " (partial failure; state persisted for retry)")?;
                }
                Ok(())
            }
            EngineError::ProtectViolation { urn } => {
                write!(f, "{urn} is protected and cannot be destroyed")
            }
            EngineError::DuplicateUrn { urn } => write!(f, "duplicate URN in this update: {urn}"),
            EngineError::DuplicateAlias { urn } => write!(f, "duplicate alias claim for {urn}"),
            EngineError::InvalidParent { urn, parent } => {
                write!(f, "{urn}: parent {parent} was not registered in this update")
            }
            EngineError::SnapshotIntegrity(e) => write!(f, "{e}"),
            EngineError::Cancelled => write!(f, "run was cancelled"),
            EngineError::Generator { urn, chain, reason } => {
                write!(f, "{urn}: {reason} (via {})", chain.join(" -> "))
            }
            EngineError::Executor { failed, abandoned, reason } => {
                write!(f, "{failed} failed: {reason}; abandoned dependents: {abandoned:?}")
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::SnapshotIntegrity(e) => Some(e),
            _ => None,
        }
    }
}

impl EngineError {
    /// Whether this error should be treated as a distinguishable
    /// cancellation outcome rather than an ordinary failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }

    /// The URN this error is primarily about, for callers that need to route
    /// an error from a flattened batch of steps back to the registration
    /// that produced it. `None` for errors with no single associated URN.
    pub fn primary_urn(&self) -> Option<&Urn> {
        match self {
            EngineError::Configuration { provider, .. } => Some(provider),
            EngineError::Diff { urn, .. } => Some(urn),
            EngineError::StepFailed { urn, .. } => Some(urn),
            EngineError::ProtectViolation { urn } => Some(urn),
            EngineError::DuplicateUrn { urn } => Some(urn),
            EngineError::DuplicateAlias { urn } => Some(urn),
            EngineError::InvalidParent { urn, .. } => Some(urn),
            EngineError::Generator { urn, .. } => Some(urn),
            EngineError::Executor { failed, .. } => Some(failed),
            EngineError::SnapshotIntegrity(_) | EngineError::Cancelled => None,
        }
    }
}

impl From<SnapshotIntegrityError> for EngineError {
    fn from(e: SnapshotIntegrityError) -> Self {
        EngineError::SnapshotIntegrity(e)
    }
}

/// The first integrity violation found while verifying a snapshot, with
/// enough context to locate it without re-scanning.
#[derive(Debug, Clone)]
pub enum SnapshotIntegrityError {
    MissingParent { urn: Urn, parent: Urn },
    UnresolvedProvider { urn: Urn, provider: Urn },
    DanglingReference { urn: Urn, field: &'static str, target: Urn },
    DuplicateLiveUrn { urn: Urn },
    ProviderAfterConsumer { provider: Urn, consumer: Urn },
}

impl fmt::Display for SnapshotIntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotIntegrityError::MissingParent { urn, parent } => {
                write!(f, "{urn}: parent {parent} does not appear earlier in the snapshot")
            }
            SnapshotIntegrityError::UnresolvedProvider { urn, provider } => {
                write!(f, "{urn}: provider {provider} does not resolve to a custom provider row")
            }
            SnapshotIntegrityError::DanglingReference { urn, field, target } => {
                write!(f, "{urn}: {field} references {target}, which is not present in the snapshot")
            }
            SnapshotIntegrityError::DuplicateLiveUrn { urn } => {
                write!(f, "{urn} appears as more than one live row")
            }
            SnapshotIntegrityError::ProviderAfterConsumer { provider, consumer } => {
                write!(f, "provider {provider} appears after its consumer {consumer}")
            }
        }
    }
}

impl std::error::Error for SnapshotIntegrityError {}
