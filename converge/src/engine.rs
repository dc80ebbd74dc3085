use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use converge_core::config::EngineSettings;
use converge_core::{Diagnostic, EngineError, Snapshot, TargetSet, Urn};
use converge_events::EventBus;
use converge_executor::StepExecutor;
use converge_generator::StepGenerator;
use converge_grpc::MonitorService;
use converge_refresh::{RefreshEngine, RefreshReport};
use converge_registry::ProviderRegistry;
use converge_snapshot::{PersistencePort, SnapshotManager};

use crate::driver::Driver;
use crate::runner::UpdateRunner;
use crate::sink::EngineSink;

/// Outcome of an update (or preview) once the driving program has finished
/// registering resources and outstanding deletes have run. Per-registration
/// successes/failures were already reported synchronously to the monitor as
/// they happened; this report only covers the finalize-time delete pass.
pub struct UpdateReport {
    pub diagnostics: Vec<Diagnostic>,
    pub deleted: Vec<Urn>,
    pub failed: Vec<EngineError>,
    pub abandoned: Vec<Urn>,
    pub cancelled: bool,
}

impl UpdateReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.abandoned.is_empty() && !self.cancelled
    }
}

/// A planning session for one update: wraps the sink a `MonitorService`
/// submits registrations through, plus the machinery to finalize drop
/// detection and persist the result once the driving program is done.
pub struct UpdateSession {
    sink: Arc<EngineSink>,
    join: tokio::task::JoinHandle<(StepGenerator, Arc<UpdateRunner>)>,
    executor: Arc<StepExecutor>,
    manager: Arc<SnapshotManager>,
    cancel: CancellationToken,
}

impl UpdateSession {
    /// The sink to hand to a `MonitorService` serving this update's program.
    pub fn sink(&self) -> Arc<EngineSink> {
        self.sink.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// A snapshot of progress so far, for mid-update inspection.
    pub async fn view(&self) -> Snapshot {
        self.manager.view().await
    }

    /// Signal that the driving program is done registering resources, run
    /// drop detection against the base snapshot, execute the resulting
    /// deletes, and persist the final snapshot through `port`.
    pub async fn finish(self, port: &dyn PersistencePort) -> Result<UpdateReport, EngineError> {
        drop(self.sink);
        let (mut generator, runner) = self.join.await.expect("update driver task panicked");
        let delete_steps = generator.finalize()?;
        let diagnostics = generator.diagnostics().to_vec();

        let report = self.executor.execute(delete_steps, runner).await;

        self.manager.persist(port).await?;

        Ok(UpdateReport {
            diagnostics,
            deleted: report.succeeded,
            failed: report.failed,
            abandoned: report.abandoned,
            cancelled: report.cancelled,
        })
    }
}

/// Top-level facade wiring the resource monitor, step generator, executor,
/// snapshot manager and refresh engine into the library surface an embedding
/// application drives. Owns no gRPC transport of its own — `begin_update`
/// hands back a sink meant to be wrapped in a `MonitorService` and served
/// however the caller likes; spawning the language runtime subprocess and
/// the gRPC listener is left to that caller.
pub struct Engine {
    registry: Arc<ProviderRegistry>,
    events: EventBus,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(registry: Arc<ProviderRegistry>, settings: EngineSettings) -> Self {
        Self {
            registry,
            events: EventBus::new(),
            settings,
        }
    }

    /// The event bus step-lifecycle and diagnostic events are published on,
    /// shared across every update this engine drives.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Begin planning an update (or, with `dry_run` set, a preview) against
    /// `base`, scoped to `targets`.
    pub fn begin_update(&self, base: Snapshot, targets: TargetSet, dry_run: bool) -> UpdateSession {
        let manager = Arc::new(SnapshotManager::new(base.clone()));
        let cancel = CancellationToken::new();
        let executor = Arc::new(StepExecutor::new(self.settings.parallel.max(1), cancel.clone()));
        let runner = Arc::new(UpdateRunner::new(self.registry.clone(), manager.clone(), self.events.clone(), dry_run));
        let generator = StepGenerator::new(self.registry.clone(), base.clone(), targets);

        let (tx, rx) = mpsc::channel(self.settings.registration_queue_bound.max(1));
        let driver = Driver::new(generator, executor.clone(), runner, base);
        let join = tokio::spawn(driver.run(rx));

        UpdateSession {
            sink: Arc::new(EngineSink::new(tx)),
            join,
            executor,
            manager,
            cancel,
        }
    }

    /// Destroy every live, targeted resource. Modeled as an update whose
    /// plan is entirely drop-detected deletes and no program ever registers
    /// anything, so it runs straight through `StepGenerator::finalize`
    /// without a monitor session.
    pub async fn destroy(&self, base: &Snapshot, targets: &TargetSet, port: &dyn PersistencePort) -> Result<UpdateReport, EngineError> {
        let manager = Arc::new(SnapshotManager::new(base.clone()));
        let cancel = CancellationToken::new();
        let executor = StepExecutor::new(self.settings.parallel.max(1), cancel);
        let runner = Arc::new(UpdateRunner::new(self.registry.clone(), manager.clone(), self.events.clone(), false));

        let mut generator = StepGenerator::new(self.registry.clone(), base.clone(), targets.clone());
        let delete_steps = generator.finalize()?;
        let diagnostics = generator.diagnostics().to_vec();

        let report = executor.execute(delete_steps, runner).await;
        manager.persist(port).await?;

        Ok(UpdateReport {
            diagnostics,
            deleted: report.succeeded,
            failed: report.failed,
            abandoned: report.abandoned,
            cancelled: report.cancelled,
        })
    }

    /// Reconcile `base` against live provider state without a driving
    /// program (the pure-refresh path; refresh-with-program is driven the
    /// same way as an update, with `converge_refresh::reconfigure_for_refresh_with_program`
    /// called ahead of it by the embedding application).
    pub async fn refresh(&self, base: &Snapshot, targets: &TargetSet, cancel: CancellationToken) -> RefreshReport {
        RefreshEngine::new(self.registry.clone(), self.settings.parallel.max(1)).run(base, targets, cancel).await
    }

    /// Construct a `MonitorService` wired to `session`'s sink, ready to be
    /// served to the language runtime over whatever transport the embedding
    /// application chooses.
    pub fn monitor_service(&self, stack: impl Into<String>, project: impl Into<String>, session: &UpdateSession) -> MonitorService<EngineSink> {
        MonitorService::new(stack, project, self.registry.clone(), session.sink())
    }
}
