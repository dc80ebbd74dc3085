use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use converge_core::{EngineError, Op, Snapshot, Step, TargetSet};
use converge_executor::StepExecutor;
use converge_registry::ProviderRegistry;

use crate::apply::apply_refresh;
use crate::runner::RefreshRunner;

/// Outcome of a refresh run: the resulting snapshot plus which URNs were
/// visited, changed, or dropped, for diagnostics.
pub struct RefreshReport {
    pub snapshot: Snapshot,
    pub refreshed: Vec<converge_core::Urn>,
    pub failed: Vec<EngineError>,
    pub cancelled: bool,
}

/// Reconciles a snapshot against live provider state. Reads have no
/// inter-resource ordering (a flat antichain); the same bounded,
/// cancellable executor used for updates provides the parallelism cap.
pub struct RefreshEngine {
    registry: Arc<ProviderRegistry>,
    parallelism: usize,
}

impl RefreshEngine {
    pub fn new(registry: Arc<ProviderRegistry>, parallelism: usize) -> Self {
        Self { registry, parallelism }
    }

    /// Pure refresh: read every targeted, live, custom row and fold the
    /// outcomes back into the snapshot. `base` is left untouched; the
    /// reconciled copy is returned in the report.
    pub async fn run(&self, base: &Snapshot, targets: &TargetSet, cancel: CancellationToken) -> RefreshReport {
        let plan: Vec<Step> = base
            .resources
            .iter()
            .filter(|row| row.is_live() && row.custom && targets.includes(&row.urn))
            .map(|row| {
                // Dependencies are stripped from the step's old_state so the
                // executor's antichain stays flat — refresh reads do not
                // order against one another the way Create/Update do.
                let mut flat = row.clone();
                flat.dependencies.clear();
                Step::new(Op::Refresh, row.urn.clone()).with_old_state(flat)
            })
            .collect();

        let refreshed: Vec<converge_core::Urn> = plan.iter().map(|s| s.urn.clone()).collect();

        let executor = StepExecutor::new(self.parallelism.max(1), cancel);
        let runner = Arc::new(RefreshRunner::new(self.registry.clone()));
        let report = executor.execute(plan, runner.clone()).await;

        let outcomes = Arc::try_unwrap(runner)
            .unwrap_or_else(|_| panic!("refresh runner still shared after executor join"))
            .into_outcomes()
            .await;

        let mut snapshot = base.clone();
        apply_refresh(&mut snapshot, outcomes);

        RefreshReport {
            snapshot,
            refreshed,
            failed: report.failed,
            cancelled: report.cancelled,
        }
    }
}

/// Reconfigure provider instances ahead of a refresh-with-program run: the
/// language runtime's provider registrations are used only to refresh
/// credentials, never to forward inputs into Create/Update — provider.Read
/// remains the source of truth for every row.
pub async fn reconfigure_for_refresh_with_program(
    registry: &ProviderRegistry,
    pkg: &str,
    version: &str,
    provider_id: &str,
    config: &converge_core::PropertyMap,
) -> Result<(), converge_registry::ProviderError> {
    registry.get_or_create(pkg, version, provider_id, config).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use converge_core::{Manifest, PropertyMap, PropertyValue, ProviderReference, ResourceState, Urn};
    use converge_registry::{ApplyResult, CheckResult, DiffResult, Loader, ProviderError, ProviderHandle, ReadResult, ReadStatus};

    fn manifest() -> Manifest {
        Manifest {
            time: "2026-01-01T00:00:00Z".into(),
            magic: "test".into(),
            version: "1".into(),
            plugins: vec![],
        }
    }

    struct FakeHandle {
        read: Option<ReadResult>,
    }

    #[async_trait]
    impl ProviderHandle for FakeHandle {
        async fn configure(&self, _inputs: &PropertyMap) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn check(&self, _urn: &Urn, _olds: &PropertyMap, _news: &PropertyMap) -> Result<CheckResult, ProviderError> {
            Ok(CheckResult::default())
        }
        async fn diff(
            &self,
            _urn: &Urn,
            _o: &PropertyMap,
            _oo: &PropertyMap,
            _n: &PropertyMap,
            _i: &[String],
        ) -> Result<DiffResult, ProviderError> {
            Ok(DiffResult::none())
        }
        async fn create(&self, _urn: &Urn, _inputs: &PropertyMap) -> Result<ApplyResult, ProviderError> {
            unreachable!()
        }
        async fn update(&self, _urn: &Urn, _old: &ResourceState, _new_inputs: &PropertyMap) -> Result<ApplyResult, ProviderError> {
            unreachable!()
        }
        async fn delete(&self, _urn: &Urn, _state: &ResourceState) -> Result<(), ProviderError> {
            Ok(())
        }
        async fn read(&self, _urn: &Urn, _id: &str, _inputs: &PropertyMap, _state: &PropertyMap) -> Result<Option<ReadResult>, ProviderError> {
            Ok(self.read.clone())
        }
        async fn cancel(&self) {}
    }

    struct FakeLoader(Option<ReadResult>);
    #[async_trait]
    impl Loader for FakeLoader {
        async fn load(&self, _pkg: &str, _version: &str) -> Result<Box<dyn ProviderHandle>, ProviderError> {
            Ok(Box::new(FakeHandle { read: self.0.clone() }))
        }
    }

    fn provider_ref() -> ProviderReference {
        ProviderReference::new(Urn::new("test", "proj", "", "pulumi:providers:aws", "default"), "p1")
    }

    async fn registry_with(read: Option<ReadResult>) -> Arc<ProviderRegistry> {
        let registry = Arc::new(ProviderRegistry::new(Arc::new(FakeLoader(read))));
        registry.get_or_create("aws", "1.0.0", "p1", &PropertyMap::new()).await.unwrap();
        registry
    }

    fn custom_row(urn: &Urn) -> ResourceState {
        let mut row = ResourceState::new(urn.clone(), true, "aws:s3:Bucket");
        row.provider = Some(provider_ref());
        row
    }

    #[tokio::test]
    async fn absent_result_deletes_the_row() {
        let urn = Urn::new("test", "proj", "", "aws:s3:Bucket", "b");
        let registry = registry_with(None).await;
        let mut base = Snapshot::empty(manifest());
        base.resources.push(custom_row(&urn));

        let engine = RefreshEngine::new(registry, 2);
        let report = engine.run(&base, &TargetSet::All, CancellationToken::new()).await;

        assert!(report.snapshot.resources.is_empty());
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn external_row_is_never_deleted_on_absent_result() {
        let urn = Urn::new("test", "proj", "", "aws:s3:Bucket", "b");
        let registry = registry_with(None).await;
        let mut base = Snapshot::empty(manifest());
        let mut row = custom_row(&urn);
        row.external = true;
        base.resources.push(row);

        let engine = RefreshEngine::new(registry, 2);
        let report = engine.run(&base, &TargetSet::All, CancellationToken::new()).await;

        assert_eq!(report.snapshot.resources.len(), 1);
    }

    #[tokio::test]
    async fn changed_inputs_updates_the_row() {
        let urn = Urn::new("test", "proj", "", "aws:s3:Bucket", "b");
        let mut inputs = PropertyMap::new();
        inputs.insert("size".into(), PropertyValue::Plain(serde_json::json!(2)));
        let read = ReadResult {
            id: "id1".into(),
            inputs,
            outputs: PropertyMap::new(),
            status: ReadStatus::Ok,
        };
        let registry = registry_with(Some(read)).await;
        let mut base = Snapshot::empty(manifest());
        base.resources.push(custom_row(&urn));

        let engine = RefreshEngine::new(registry, 2);
        let report = engine.run(&base, &TargetSet::All, CancellationToken::new()).await;

        assert_eq!(report.snapshot.resources.len(), 1);
        assert!(report.snapshot.resources[0].inputs.contains_key("size"));
    }

    #[tokio::test]
    async fn partial_failure_read_replaces_init_errors() {
        let urn = Urn::new("test", "proj", "", "aws:s3:Bucket", "b");
        let read = ReadResult {
            id: "id1".into(),
            inputs: PropertyMap::new(),
            outputs: PropertyMap::new(),
            status: ReadStatus::PartialFailure {
                reasons: vec!["instance still initializing".into()],
            },
        };
        let registry = registry_with(Some(read)).await;
        let mut base = Snapshot::empty(manifest());
        let mut row = custom_row(&urn);
        row.init_errors = vec!["stale error from a previous run".into()];
        base.resources.push(row);

        let engine = RefreshEngine::new(registry, 2);
        let report = engine.run(&base, &TargetSet::All, CancellationToken::new()).await;

        assert_eq!(report.snapshot.resources.len(), 1);
        assert_eq!(report.snapshot.resources[0].init_errors, vec!["instance still initializing".to_string()]);
    }
}
