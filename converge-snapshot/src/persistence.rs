use async_trait::async_trait;
use converge_core::Snapshot;

use crate::error::SnapshotError;

/// The narrow port through which a snapshot is durably stored. Deliberately
/// ignorant of blob/cloud storage mechanics — those belong to the stack
/// backend, an external collaborator.
#[async_trait]
pub trait PersistencePort: Send + Sync {
    async fn load(&self) -> Result<Option<Snapshot>, SnapshotError>;
    async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError>;
}

/// An in-memory persistence port, useful for tests and for embedding
/// applications that manage durability themselves.
#[derive(Default)]
pub struct InMemoryPersistence {
    slot: tokio::sync::Mutex<Option<Snapshot>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistencePort for InMemoryPersistence {
    async fn load(&self) -> Result<Option<Snapshot>, SnapshotError> {
        Ok(self.slot.lock().await.clone())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        *self.slot.lock().await = Some(snapshot.clone());
        Ok(())
    }
}
