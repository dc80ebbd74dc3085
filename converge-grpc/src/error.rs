use tonic::Status;

use converge_core::EngineError;
use converge_registry::ProviderError;

/// Map an engine-level failure onto the gRPC status code the language
/// runtime is expected to branch on. `InvalidParent`/`DuplicateUrn` surface
/// as `invalid_argument` since the program itself is malformed; everything
/// else is `internal`, matching how providers/executor failures are
/// presented upstream of this boundary.
pub fn engine_error_to_status(err: &EngineError) -> Status {
    match err {
        EngineError::InvalidParent { .. } | EngineError::DuplicateUrn { .. } | EngineError::DuplicateAlias { .. } => {
            Status::invalid_argument(err.to_string())
        }
        EngineError::ProtectViolation { .. } => Status::failed_precondition(err.to_string()),
        EngineError::Cancelled => Status::cancelled(err.to_string()),
        _ => Status::internal(err.to_string()),
    }
}

pub fn provider_error_to_status(err: &ProviderError) -> Status {
    match err {
        ProviderError::NotFound { .. } => Status::not_found(err.to_string()),
        _ => Status::internal(err.to_string()),
    }
}
