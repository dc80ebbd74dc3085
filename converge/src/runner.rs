use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use converge_core::{EngineError, Op, PropertyMap, PropertyValue, ResourceState, Step, Urn};
use converge_events::{EventBus, StepEvent};
use converge_executor::StepRunner;
use converge_registry::{ProviderError, ProviderHandle, ProviderRegistry};
use converge_snapshot::SnapshotManager;

fn provider_step_failed(step: &Step, err: ProviderError) -> EngineError {
    EngineError::StepFailed {
        urn: step.urn.clone(),
        op: step.op,
        reason: err.to_string(),
        partial_failure: false,
    }
}

/// Placeholder outputs for a preview: every input key becomes unknown,
/// mirroring Pulumi's own "outputs are unknown until applied" preview
/// convention rather than leaving the old outputs in place.
fn preview_outputs(inputs: &PropertyMap) -> PropertyMap {
    inputs.keys().map(|k| (k.clone(), PropertyValue::Computed)).collect()
}

/// A `StepRunner` that applies a planned update against real (or, in
/// `dry_run` mode, skipped) provider calls, journals each step through the
/// snapshot manager, and publishes lifecycle events. Unlike `RefreshRunner`,
/// which only ever sees `Op::Refresh`, this runner dispatches the full set
/// of ops an update plan produces.
pub struct UpdateRunner {
    registry: Arc<ProviderRegistry>,
    manager: Arc<SnapshotManager>,
    events: EventBus,
    dry_run: bool,
    outcomes: Mutex<HashMap<Urn, ResourceState>>,
}

impl UpdateRunner {
    pub fn new(registry: Arc<ProviderRegistry>, manager: Arc<SnapshotManager>, events: EventBus, dry_run: bool) -> Self {
        Self {
            registry,
            manager,
            events,
            dry_run,
            outcomes: Mutex::new(HashMap::new()),
        }
    }

    /// The `(id, outputs)` pair a completed step resolved to, for replying
    /// to the monitor's `RegisterResource` call.
    pub async fn outcome_for(&self, urn: &Urn) -> Option<(String, PropertyMap)> {
        self.outcomes.lock().await.get(urn).map(|s| (s.id.clone(), s.outputs.clone()))
    }

    async fn record(&self, urn: &Urn, state: ResourceState) {
        self.outcomes.lock().await.insert(urn.clone(), state);
    }

    /// Record outputs reported for a resource after its registering step
    /// already completed (the terminal `RegisterResourceOutputs` call for a
    /// component resource).
    pub async fn register_outputs(&self, urn: &Urn, outputs: PropertyMap) {
        self.manager.outputs(urn, outputs.clone()).await;
        if let Some(state) = self.outcomes.lock().await.get_mut(urn) {
            state.outputs = outputs;
        }
    }

    fn resolve(&self, provider: &converge_core::ProviderReference, urn: &Urn) -> Result<Arc<dyn ProviderHandle>, EngineError> {
        self.registry.resolve(provider).ok_or_else(|| EngineError::Configuration {
            provider: urn.clone(),
            reason: "provider instance not resolved in the registry".into(),
        })
    }

    async fn create_or_read(&self, step: &Step) -> Result<(), EngineError> {
        let Some(new_state) = step.new_state.clone() else {
            return Err(EngineError::StepFailed {
                urn: step.urn.clone(),
                op: step.op,
                reason: "create-like step carries no new_state".into(),
                partial_failure: false,
            });
        };

        if !new_state.custom {
            self.record(&step.urn, new_state).await;
            return Ok(());
        }

        if self.dry_run {
            let mut state = new_state;
            state.outputs = preview_outputs(&state.inputs);
            self.record(&step.urn, state).await;
            return Ok(());
        }

        let provider = new_state.provider.clone().ok_or_else(|| EngineError::Configuration {
            provider: step.urn.clone(),
            reason: "custom resource has no provider reference".into(),
        })?;
        let handle = self.resolve(&provider, &step.urn)?;

        if matches!(step.op, Op::Read | Op::ReadReplacement | Op::Import) {
            let external_id = new_state.id.clone();
            let read = handle
                .read(&step.urn, &external_id, &new_state.inputs, &new_state.outputs)
                .await
                .map_err(|e| provider_step_failed(step, e))?
                .ok_or_else(|| EngineError::StepFailed {
                    urn: step.urn.clone(),
                    op: step.op,
                    reason: "provider reports the resource no longer exists".into(),
                    partial_failure: false,
                })?;
            let mut state = new_state;
            state.id = read.id;
            state.inputs = read.inputs;
            state.outputs = read.outputs;
            self.record(&step.urn, state).await;
            return Ok(());
        }

        let result = handle.create(&step.urn, &new_state.inputs).await.map_err(|e| provider_step_failed(step, e))?;
        if result.partial_failure {
            return Err(EngineError::StepFailed {
                urn: step.urn.clone(),
                op: step.op,
                reason: "create reported a partial failure".into(),
                partial_failure: true,
            });
        }
        let mut state = new_state;
        state.id = result.id;
        state.outputs = result.outputs;
        state.init_errors = result.init_errors;
        self.record(&step.urn, state).await;
        Ok(())
    }

    async fn update(&self, step: &Step) -> Result<(), EngineError> {
        let (Some(old), Some(new_state)) = (step.old_state.clone(), step.new_state.clone()) else {
            return Err(EngineError::StepFailed {
                urn: step.urn.clone(),
                op: step.op,
                reason: "update step missing old or new state".into(),
                partial_failure: false,
            });
        };

        if !new_state.custom {
            self.record(&step.urn, new_state).await;
            return Ok(());
        }

        if self.dry_run {
            let mut state = new_state;
            state.outputs = preview_outputs(&state.inputs);
            self.record(&step.urn, state).await;
            return Ok(());
        }

        let provider = new_state.provider.clone().ok_or_else(|| EngineError::Configuration {
            provider: step.urn.clone(),
            reason: "custom resource has no provider reference".into(),
        })?;
        let handle = self.resolve(&provider, &step.urn)?;

        let result = handle.update(&step.urn, &old, &new_state.inputs).await.map_err(|e| provider_step_failed(step, e))?;
        if result.partial_failure {
            return Err(EngineError::StepFailed {
                urn: step.urn.clone(),
                op: step.op,
                reason: "update reported a partial failure".into(),
                partial_failure: true,
            });
        }
        let mut state = new_state;
        state.id = result.id;
        state.outputs = result.outputs;
        state.init_errors = result.init_errors;
        self.record(&step.urn, state).await;
        Ok(())
    }

    async fn delete(&self, step: &Step) -> Result<(), EngineError> {
        let Some(old) = step.old_state.clone() else {
            return Ok(());
        };
        if !old.custom || old.retain_on_delete || self.dry_run {
            return Ok(());
        }
        let provider = old.provider.clone().ok_or_else(|| EngineError::Configuration {
            provider: step.urn.clone(),
            reason: "custom resource has no provider reference".into(),
        })?;
        let handle = self.resolve(&provider, &step.urn)?;
        handle.delete(&step.urn, &old).await.map_err(|e| provider_step_failed(step, e))?;
        Ok(())
    }
}

#[async_trait]
impl StepRunner for UpdateRunner {
    async fn begin(&self, step: &Step) {
        self.manager.begin(step).await;
        self.events.emit(StepEvent::Begun { urn: step.urn.clone(), op: step.op }).await;
        tracing::info!(urn = %step.urn, op = ?step.op, "update step begun");
    }

    async fn run(&self, step: &Step, _cancel: &CancellationToken) -> Result<(), EngineError> {
        match step.op {
            Op::Same => {
                // Carries the registered URN forward (renames/aliases land here)
                // while keeping the prior id and outputs rather than a fresh
                // provider's worth of either — Same never calls the provider.
                let state = match (step.new_state.clone(), step.old_state.clone()) {
                    (Some(mut new_state), Some(old_state)) => {
                        new_state.id = old_state.id;
                        new_state.outputs = old_state.outputs;
                        Some(new_state)
                    }
                    (new_state, old_state) => new_state.or(old_state),
                };
                if let Some(state) = state {
                    self.record(&step.urn, state).await;
                }
                Ok(())
            }
            Op::RemovePendingReplace => Ok(()),
            Op::Create | Op::CreateReplacement | Op::Read | Op::ReadReplacement | Op::Import => self.create_or_read(step).await,
            Op::Update => self.update(step).await,
            Op::Delete | Op::DeleteReplaced => self.delete(step).await,
            Op::Refresh => unreachable!("refresh steps are run by converge-refresh's own runner"),
            Op::Replace => unreachable!("Replace is decomposed into CreateReplacement/DeleteReplaced by the generator"),
        }
    }

    async fn succeed(&self, step: &Step) {
        let new_state = self.outcomes.lock().await.get(&step.urn).cloned();
        self.manager.success(step, new_state).await;
        self.events.emit(StepEvent::Succeeded { urn: step.urn.clone(), op: step.op }).await;
        tracing::info!(urn = %step.urn, op = ?step.op, "update step succeeded");
    }

    async fn fail(&self, step: &Step, err: &EngineError) {
        self.manager.failure(step, err).await;
        self.events
            .emit(StepEvent::Failed { urn: step.urn.clone(), op: step.op, reason: err.to_string() })
            .await;
        tracing::warn!(urn = %step.urn, op = ?step.op, error = %err, "update step failed");
    }

    async fn abandon(&self, step: &Step) {
        tracing::debug!(urn = %step.urn, op = ?step.op, "update step abandoned");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::{Manifest, ProviderReference, Snapshot};
    use converge_test::{FakeProvider, FakeProviderScript, SingleLoader};

    fn manifest() -> Manifest {
        Manifest { time: "2026-01-01T00:00:00Z".into(), magic: "test".into(), version: "1".into(), plugins: vec![] }
    }

    async fn registry_with(script: FakeProviderScript) -> (Arc<ProviderRegistry>, ProviderReference) {
        let provider = Arc::new(FakeProvider::new(script));
        let registry = Arc::new(ProviderRegistry::new(Arc::new(SingleLoader::new(provider))));
        registry.get_or_create("test", "1.0.0", "p1", &PropertyMap::new()).await.unwrap();
        (registry, ProviderReference::new(Urn::new("dev", "proj", "", "pulumi:providers:test", "default"), "p1"))
    }

    fn runner(registry: Arc<ProviderRegistry>, dry_run: bool) -> UpdateRunner {
        let manager = Arc::new(SnapshotManager::new(Snapshot::empty(manifest())));
        UpdateRunner::new(registry, manager, EventBus::new(), dry_run)
    }

    #[tokio::test]
    async fn create_records_provider_assigned_id_and_outputs() {
        let (registry, provider) = registry_with(FakeProviderScript::default()).await;
        let r = runner(registry, false);
        let urn = Urn::new("dev", "proj", "", "test:index:Thing", "a");
        let mut state = ResourceState::new(urn.clone(), true, "test:index:Thing");
        state.provider = Some(provider);
        let step = Step::new(Op::Create, urn.clone()).with_new_state(state);

        let cancel = CancellationToken::new();
        r.run(&step, &cancel).await.unwrap();

        let (id, _) = r.outcome_for(&urn).await.unwrap();
        assert_eq!(id, "fake-1");
    }

    #[tokio::test]
    async fn dry_run_skips_the_provider_and_marks_outputs_computed() {
        let (registry, provider) = registry_with(FakeProviderScript::default()).await;
        let r = runner(registry.clone(), true);
        let urn = Urn::new("dev", "proj", "", "test:index:Thing", "a");
        let mut state = ResourceState::new(urn.clone(), true, "test:index:Thing");
        state.provider = Some(provider);
        state.inputs.insert("size".into(), PropertyValue::Plain(serde_json::json!(1)));
        let step = Step::new(Op::Create, urn.clone()).with_new_state(state);

        r.run(&step, &CancellationToken::new()).await.unwrap();

        let (_, outputs) = r.outcome_for(&urn).await.unwrap();
        assert!(matches!(outputs.get("size"), Some(PropertyValue::Computed)));
    }

    #[tokio::test]
    async fn component_create_bypasses_the_provider_entirely() {
        let registry = Arc::new(ProviderRegistry::new(Arc::new(converge_test::SingleLoader::new(Arc::new(FakeProvider::new(
            FakeProviderScript::default(),
        ))))));
        let r = runner(registry, false);
        let urn = Urn::new("dev", "proj", "", "pkg:index:Component", "c");
        let state = ResourceState::new(urn.clone(), false, "pkg:index:Component");
        let step = Step::new(Op::Create, urn.clone()).with_new_state(state);

        r.run(&step, &CancellationToken::new()).await.unwrap();
        assert!(r.outcome_for(&urn).await.is_some());
    }

    #[tokio::test]
    async fn same_step_carries_forward_the_old_row() {
        let registry = Arc::new(ProviderRegistry::new(Arc::new(converge_test::SingleLoader::new(Arc::new(FakeProvider::new(
            FakeProviderScript::default(),
        ))))));
        let r = runner(registry, false);
        let urn = Urn::new("dev", "proj", "", "test:index:Thing", "a");
        let mut old = ResourceState::new(urn.clone(), true, "test:index:Thing");
        old.id = "existing".into();
        let step = Step::new(Op::Same, urn.clone()).with_old_state(old);

        r.run(&step, &CancellationToken::new()).await.unwrap();
        let (id, _) = r.outcome_for(&urn).await.unwrap();
        assert_eq!(id, "existing");
    }

    #[tokio::test]
    async fn create_failure_is_surfaced_as_a_step_error() {
        let (registry, provider) = registry_with(FakeProviderScript { fail_create: Some("quota".into()), ..Default::default() }).await;
        let r = runner(registry, false);
        let urn = Urn::new("dev", "proj", "", "test:index:Thing", "a");
        let mut state = ResourceState::new(urn.clone(), true, "test:index:Thing");
        state.provider = Some(provider);
        let step = Step::new(Op::Create, urn.clone()).with_new_state(state);

        let err = r.run(&step, &CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("quota"));
    }
}
