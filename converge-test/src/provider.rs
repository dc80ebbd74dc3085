use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use converge_core::{DiffResult, PropertyMap, ResourceState, Urn};
use converge_registry::{ApplyResult, CheckResult, Loader, ProviderError, ProviderHandle, ReadResult, ReadStatus};

/// Scripted responses for [`FakeProvider`]'s lifecycle methods, set up front
/// by a test before the engine exercises it.
#[derive(Default)]
pub struct FakeProviderScript {
    pub diff: Option<DiffResult>,
    pub create_outputs: Option<PropertyMap>,
    pub update_outputs: Option<PropertyMap>,
    pub read_result: Option<Option<ReadResult>>,
    pub fail_create: Option<String>,
    pub fail_update: Option<String>,
    pub fail_delete: Option<String>,
}

/// An in-memory stand-in for a provider plugin, the engine's analog of
/// `TestApp`'s in-process HTTP harness: no RPC, no subprocess, just the
/// [`ProviderHandle`] contract driven directly against canned responses.
///
/// Every call is recorded so assertions can check what the executor actually
/// asked the provider to do, not just what it returned.
pub struct FakeProvider {
    script: Mutex<FakeProviderScript>,
    next_id: AtomicU64,
    calls: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new(script: FakeProviderScript) -> Self {
        Self {
            script: Mutex::new(script),
            next_id: AtomicU64::new(1),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The method names invoked so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, method: &str) {
        self.calls.lock().unwrap().push(method.to_string());
    }
}

#[async_trait]
impl ProviderHandle for FakeProvider {
    async fn configure(&self, _inputs: &PropertyMap) -> Result<(), ProviderError> {
        self.record("configure");
        Ok(())
    }

    async fn check(&self, _urn: &Urn, _olds: &PropertyMap, news: &PropertyMap) -> Result<CheckResult, ProviderError> {
        self.record("check");
        Ok(CheckResult {
            inputs: news.clone(),
            failures: Vec::new(),
        })
    }

    async fn diff(
        &self,
        _urn: &Urn,
        _old_inputs: &PropertyMap,
        _old_outputs: &PropertyMap,
        _new_inputs: &PropertyMap,
        _ignore_changes: &[String],
    ) -> Result<DiffResult, ProviderError> {
        self.record("diff");
        Ok(self.script.lock().unwrap().diff.clone().unwrap_or_else(DiffResult::none))
    }

    async fn create(&self, _urn: &Urn, inputs: &PropertyMap) -> Result<ApplyResult, ProviderError> {
        self.record("create");
        if let Some(reason) = self.script.lock().unwrap().fail_create.clone() {
            return Err(ProviderError::Rpc { method: "create", reason });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let outputs = self.script.lock().unwrap().create_outputs.clone().unwrap_or_else(|| inputs.clone());
        Ok(ApplyResult {
            id: format!("fake-{id}"),
            outputs,
            partial_failure: false,
            init_errors: Vec::new(),
        })
    }

    async fn update(&self, _urn: &Urn, old: &ResourceState, new_inputs: &PropertyMap) -> Result<ApplyResult, ProviderError> {
        self.record("update");
        if let Some(reason) = self.script.lock().unwrap().fail_update.clone() {
            return Err(ProviderError::Rpc { method: "update", reason });
        }
        let outputs = self.script.lock().unwrap().update_outputs.clone().unwrap_or_else(|| new_inputs.clone());
        Ok(ApplyResult {
            id: old.id.clone(),
            outputs,
            partial_failure: false,
            init_errors: Vec::new(),
        })
    }

    async fn delete(&self, _urn: &Urn, _state: &ResourceState) -> Result<(), ProviderError> {
        self.record("delete");
        if let Some(reason) = self.script.lock().unwrap().fail_delete.clone() {
            return Err(ProviderError::Rpc { method: "delete", reason });
        }
        Ok(())
    }

    async fn read(&self, _urn: &Urn, id: &str, inputs: &PropertyMap, _state: &PropertyMap) -> Result<Option<ReadResult>, ProviderError> {
        self.record("read");
        if let Some(scripted) = self.script.lock().unwrap().read_result.clone() {
            return Ok(scripted);
        }
        Ok(Some(ReadResult {
            id: id.to_string(),
            inputs: inputs.clone(),
            outputs: inputs.clone(),
            status: ReadStatus::Ok,
        }))
    }

    async fn cancel(&self) {
        self.record("cancel");
    }
}

/// A [`Loader`] that always hands back the same pre-built [`FakeProvider`],
/// for tests that don't care about per-package loader dispatch.
pub struct SingleLoader<P> {
    handle: std::sync::Arc<P>,
}

impl<P> SingleLoader<P> {
    pub fn new(handle: std::sync::Arc<P>) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl<P: ProviderHandle + 'static> Loader for SingleLoader<P> {
    async fn load(&self, _pkg: &str, _version: &str) -> Result<Box<dyn ProviderHandle>, ProviderError> {
        Ok(Box::new(ClonedHandle(self.handle.clone())))
    }
}

/// Wraps an `Arc<P>` so `Loader::load`'s `Box<dyn ProviderHandle>` return can
/// share the same underlying fake across every load, letting a test observe
/// calls made through whichever instance the registry ends up caching.
struct ClonedHandle<P>(std::sync::Arc<P>);

#[async_trait]
impl<P: ProviderHandle> ProviderHandle for ClonedHandle<P> {
    async fn configure(&self, inputs: &PropertyMap) -> Result<(), ProviderError> {
        self.0.configure(inputs).await
    }
    async fn check(&self, urn: &Urn, olds: &PropertyMap, news: &PropertyMap) -> Result<CheckResult, ProviderError> {
        self.0.check(urn, olds, news).await
    }
    async fn diff(
        &self,
        urn: &Urn,
        old_inputs: &PropertyMap,
        old_outputs: &PropertyMap,
        new_inputs: &PropertyMap,
        ignore_changes: &[String],
    ) -> Result<DiffResult, ProviderError> {
        self.0.diff(urn, old_inputs, old_outputs, new_inputs, ignore_changes).await
    }
    async fn create(&self, urn: &Urn, inputs: &PropertyMap) -> Result<ApplyResult, ProviderError> {
        self.0.create(urn, inputs).await
    }
    async fn update(&self, urn: &Urn, old: &ResourceState, new_inputs: &PropertyMap) -> Result<ApplyResult, ProviderError> {
        self.0.update(urn, old, new_inputs).await
    }
    async fn delete(&self, urn: &Urn, state: &ResourceState) -> Result<(), ProviderError> {
        self.0.delete(urn, state).await
    }
    async fn read(&self, urn: &Urn, id: &str, inputs: &PropertyMap, state: &PropertyMap) -> Result<Option<ReadResult>, ProviderError> {
        self.0.read(urn, id, inputs, state).await
    }
    async fn cancel(&self) {
        self.0.cancel().await
    }
}
