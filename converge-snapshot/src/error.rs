use std::fmt;

use converge_core::SnapshotIntegrityError;

/// Errors raised by the snapshot manager's journal and persist operations.
#[derive(Debug)]
pub enum SnapshotError {
    Integrity(SnapshotIntegrityError),
    Persist(Box<dyn std::error::Error + Send + Sync>),
}

impl SnapshotError {
    pub fn persist(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        SnapshotError::Persist(Box::new(err))
    }
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::Integrity(e) => write!(f, "refusing to persist an invalid snapshot: {e}"),
            SnapshotError::Persist(e) => write!(f, "persist failed: {e}"),
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapshotError::Integrity(e) => Some(e),
            SnapshotError::Persist(e) => Some(e.as_ref()),
        }
    }
}

impl From<SnapshotIntegrityError> for SnapshotError {
    fn from(e: SnapshotIntegrityError) -> Self {
        SnapshotError::Integrity(e)
    }
}

impl From<SnapshotError> for converge_core::EngineError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::Integrity(e) => converge_core::EngineError::SnapshotIntegrity(e),
            SnapshotError::Persist(e) => converge_core::EngineError::Generator {
                urn: converge_core::Urn::new("unknown", "unknown", "", "pulumi:snapshot", "persist"),
                chain: vec![],
                reason: e.to_string(),
            },
        }
    }
}
