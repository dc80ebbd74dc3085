use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use converge_core::{EngineError, Op, ResourceState, Step, Urn};
use converge_executor::StepRunner;
use converge_registry::{ProviderRegistry, ReadStatus};

/// What a single row's refresh read concluded.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// The provider no longer has this resource; it must be removed.
    Deleted,
    /// Inputs changed: the row is updated and the step is reported as an
    /// Update for journaling purposes.
    InputsChanged(ResourceState),
    /// Only outputs (or the read id) changed: the row is updated in place
    /// and reported as a Same.
    OutputsOnly(ResourceState),
    /// Nothing changed, or the row is external and the provider reported no
    /// result — external rows are never deleted by refresh.
    Unchanged,
}

/// A `StepRunner` that performs the refresh read for each planned step and
/// records its outcome for the caller to fold into the snapshot afterward.
/// Reads have no inter-resource ordering, so every step in the plan is
/// independent — the executor's antichain here is flat.
pub struct RefreshRunner {
    registry: Arc<ProviderRegistry>,
    outcomes: Mutex<HashMap<Urn, RefreshOutcome>>,
}

impl RefreshRunner {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            outcomes: Mutex::new(HashMap::new()),
        }
    }

    pub async fn into_outcomes(self) -> HashMap<Urn, RefreshOutcome> {
        self.outcomes.into_inner()
    }
}

#[async_trait]
impl StepRunner for RefreshRunner {
    async fn begin(&self, step: &Step) {
        tracing::debug!(urn = %step.urn, "refresh read starting");
    }

    async fn run(&self, step: &Step, _cancel: &CancellationToken) -> Result<(), EngineError> {
        let Some(old) = &step.old_state else {
            return Ok(());
        };

        let provider = old.provider.as_ref().ok_or_else(|| EngineError::Configuration {
            provider: step.urn.clone(),
            reason: "custom resource has no provider reference".into(),
        })?;
        let handle = self.registry.resolve(provider).ok_or_else(|| EngineError::Configuration {
            provider: provider.urn.clone(),
            reason: "provider instance not resolved in the registry".into(),
        })?;

        let read = handle
            .read(&step.urn, &old.id, &old.inputs, &old.outputs)
            .await
            .map_err(|e| EngineError::StepFailed {
                urn: step.urn.clone(),
                op: Op::Refresh,
                reason: e.to_string(),
                partial_failure: false,
            })?;

        let outcome = match read {
            None if old.external => RefreshOutcome::Unchanged,
            None => RefreshOutcome::Deleted,
            Some(result) => {
                let mut row = old.clone();
                row.id = result.id;
                row.init_errors = match result.status {
                    ReadStatus::Ok => Vec::new(),
                    ReadStatus::PartialFailure { reasons } => reasons,
                };
                let inputs_changed = result.inputs != old.inputs;
                row.inputs = result.inputs;
                row.outputs = result.outputs;
                if inputs_changed {
                    RefreshOutcome::InputsChanged(row)
                } else if row.outputs != old.outputs || row.id != old.id {
                    RefreshOutcome::OutputsOnly(row)
                } else {
                    RefreshOutcome::Unchanged
                }
            }
        };

        self.outcomes.lock().await.insert(step.urn.clone(), outcome);
        Ok(())
    }

    async fn succeed(&self, step: &Step) {
        tracing::debug!(urn = %step.urn, "refresh read complete");
    }

    async fn fail(&self, step: &Step, err: &EngineError) {
        tracing::warn!(urn = %step.urn, error = %err, "refresh read failed");
    }

    async fn abandon(&self, step: &Step) {
        tracing::debug!(urn = %step.urn, "refresh read abandoned");
    }
}
