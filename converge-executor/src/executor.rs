use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, Semaphore};
use tokio_util::sync::CancellationToken;

use converge_core::{EngineError, Step};

use crate::graph::build_graph;

/// Hooks the executor calls around each step so the snapshot manager can
/// journal Begin/Success/Failure without the executor needing to know
/// anything about persistence.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Perform the step's provider RPC (or whatever else it entails). `cancel`
    /// is the run's cancellation token, forwarded so a long-running provider
    /// call can be told to cancel; the worker always awaits this call to
    /// completion rather than aborting it, per the cancellation contract.
    async fn run(&self, step: &Step, cancel: &CancellationToken) -> Result<(), EngineError>;
    /// Called before `run`, mirroring the snapshot manager's Begin journal entry.
    async fn begin(&self, step: &Step);
    /// Called after a successful `run`.
    async fn succeed(&self, step: &Step);
    /// Called after a failed `run`.
    async fn fail(&self, step: &Step, err: &EngineError);
    /// Called for a step abandoned because a prerequisite failed; never
    /// reaches `begin`/`run`.
    async fn abandon(&self, step: &Step);
}

/// Outcome of draining an execution plan.
#[derive(Default)]
pub struct ExecutionReport {
    pub succeeded: Vec<converge_core::Urn>,
    pub failed: Vec<EngineError>,
    pub abandoned: Vec<converge_core::Urn>,
    pub cancelled: bool,
}

impl ExecutionReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.abandoned.is_empty() && !self.cancelled
    }
}

struct GraphState {
    indegree: Vec<usize>,
    successors: Vec<Vec<usize>>,
    remaining: usize,
    abandoned: HashSet<usize>,
}

/// Runs a step plan across a bounded pool of workers, honoring the
/// per-URN total order and dependency-closure ordering (§4.3), with
/// cancellation and failure-abandons-dependents semantics.
pub struct StepExecutor {
    parallelism: usize,
    cancel: CancellationToken,
}

impl StepExecutor {
    pub fn new(parallelism: usize, cancel: CancellationToken) -> Self {
        assert!(parallelism >= 1, "executor parallelism degree must be at least 1");
        Self { parallelism, cancel }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn execute<R: StepRunner + 'static>(&self, plan: Vec<Step>, runner: Arc<R>) -> ExecutionReport {
        let n = plan.len();
        if n == 0 {
            return ExecutionReport::default();
        }

        let graph = build_graph(&plan);
        let indegree: Vec<usize> = graph.prerequisites.iter().map(Vec::len).collect();

        let steps = Arc::new(plan);
        let ready = Arc::new(Mutex::new(VecDeque::from_iter(
            indegree.iter().enumerate().filter(|(_, &d)| d == 0).map(|(i, _)| i),
        )));
        let state = Arc::new(Mutex::new(GraphState {
            indegree,
            successors: graph.successors,
            remaining: n,
            abandoned: HashSet::new(),
        }));
        let notify = Arc::new(Notify::new());
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let report = Arc::new(Mutex::new(ExecutionReport::default()));

        let mut workers = Vec::with_capacity(self.parallelism);
        for _ in 0..self.parallelism {
            let steps = steps.clone();
            let ready = ready.clone();
            let state = state.clone();
            let notify = notify.clone();
            let semaphore = semaphore.clone();
            let report = report.clone();
            let runner = runner.clone();
            let cancel = self.cancel.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    let idx = loop {
                        if cancel.is_cancelled() {
                            break None;
                        }
                        if let Some(idx) = ready.lock().await.pop_front() {
                            break Some(idx);
                        }
                        if state.lock().await.remaining == 0 {
                            break None;
                        }
                        tokio::select! {
                            _ = notify.notified() => {}
                            _ = cancel.cancelled() => { break None; }
                        }
                    };
                    let Some(idx) = idx else { break };

                    let _permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
                    let step = &steps[idx];

                    if cancel.is_cancelled() {
                        on_abandoned(&state, &report, &steps, idx, &runner).await;
                        notify.notify_waiters();
                        continue;
                    }

                    runner.begin(step).await;
                    tracing::info!(urn = %step.urn, op = ?step.op, "step begun");

                    // Run to completion even if cancellation lands mid-call: the
                    // provider is told to cancel via `cancel`, but the worker
                    // waits for its call to actually return before exiting.
                    match runner.run(step, &cancel).await {
                        Ok(()) => {
                            runner.succeed(step).await;
                            tracing::info!(urn = %step.urn, op = ?step.op, "step succeeded");
                            on_success(&state, &ready, &report, step, idx).await;
                        }
                        Err(e) if e.is_cancelled() => {
                            on_abandoned(&state, &report, &steps, idx, &runner).await;
                        }
                        Err(e) => {
                            runner.fail(step, &e).await;
                            tracing::warn!(urn = %step.urn, op = ?step.op, error = %e, "step failed");
                            on_failure(&state, &report, &steps, idx, e, &runner).await;
                        }
                    }
                    notify.notify_waiters();
                }
            }));
        }

        for w in workers {
            let _ = w.await;
        }

        let mut report = Arc::try_unwrap(report)
            .unwrap_or_else(|_| panic!("executor workers still hold a report handle after join"))
            .into_inner();
        report.cancelled = self.cancel.is_cancelled();
        report
    }
}

async fn on_success(
    state: &Arc<Mutex<GraphState>>,
    ready: &Arc<Mutex<VecDeque<usize>>>,
    report: &Arc<Mutex<ExecutionReport>>,
    step: &Step,
    idx: usize,
) {
    report.lock().await.succeeded.push(step.urn.clone());
    let mut st = state.lock().await;
    st.remaining = st.remaining.saturating_sub(1);
    let successors = st.successors[idx].clone();
    let mut newly_ready = Vec::new();
    for s in successors {
        if st.abandoned.contains(&s) {
            continue;
        }
        st.indegree[s] = st.indegree[s].saturating_sub(1);
        if st.indegree[s] == 0 {
            newly_ready.push(s);
        }
    }
    drop(st);
    if !newly_ready.is_empty() {
        ready.lock().await.extend(newly_ready);
    }
}

async fn on_failure<R: StepRunner>(
    state: &Arc<Mutex<GraphState>>,
    report: &Arc<Mutex<ExecutionReport>>,
    steps: &Arc<Vec<Step>>,
    idx: usize,
    err: EngineError,
    runner: &Arc<R>,
) {
    report.lock().await.failed.push(err);
    let abandoned_now = mark_abandoned_transitively(state, idx).await;
    let mut st = state.lock().await;
    st.remaining = st.remaining.saturating_sub(1 + abandoned_now.len());
    drop(st);
    let mut rep = report.lock().await;
    for &a in &abandoned_now {
        rep.abandoned.push(steps[a].urn.clone());
    }
    drop(rep);
    for &a in &abandoned_now {
        runner.abandon(&steps[a]).await;
    }
}

async fn on_abandoned<R: StepRunner>(
    state: &Arc<Mutex<GraphState>>,
    report: &Arc<Mutex<ExecutionReport>>,
    steps: &Arc<Vec<Step>>,
    idx: usize,
    runner: &Arc<R>,
) {
    let mut st = state.lock().await;
    if st.abandoned.insert(idx) {
        st.remaining = st.remaining.saturating_sub(1);
        drop(st);
        report.lock().await.abandoned.push(steps[idx].urn.clone());
        runner.abandon(&steps[idx]).await;
    }
}

/// Mark every step transitively reachable from `idx` via the successor
/// graph as abandoned, returning the newly-abandoned indices (excluding
/// `idx` itself, which is recorded as a failure, not an abandonment).
async fn mark_abandoned_transitively(state: &Arc<Mutex<GraphState>>, idx: usize) -> Vec<usize> {
    let mut st = state.lock().await;
    let mut queue = VecDeque::from(st.successors[idx].clone());
    let mut newly = Vec::new();
    while let Some(s) = queue.pop_front() {
        if st.abandoned.insert(s) {
            newly.push(s);
            queue.extend(st.successors[s].clone());
        }
    }
    newly
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::{Op, ResourceState, Urn};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingRunner {
        order: Mutex<Vec<Urn>>,
        fail_on: Option<Urn>,
    }

    #[async_trait]
    impl StepRunner for RecordingRunner {
        async fn run(&self, step: &Step, _cancel: &CancellationToken) -> Result<(), EngineError> {
            self.order.lock().await.push(step.urn.clone());
            if self.fail_on.as_ref() == Some(&step.urn) {
                return Err(EngineError::StepFailed {
                    urn: step.urn.clone(),
                    op: step.op,
                    reason: "injected failure".into(),
                    partial_failure: false,
                });
            }
            Ok(())
        }
        async fn begin(&self, _step: &Step) {}
        async fn succeed(&self, _step: &Step) {}
        async fn fail(&self, _step: &Step, _err: &EngineError) {}
        async fn abandon(&self, _step: &Step) {}
    }

    fn step(op: Op, urn: &Urn, deps: &[Urn]) -> Step {
        let mut state = ResourceState::new(urn.clone(), true, "t");
        state.dependencies = deps.to_vec();
        Step::new(op, urn.clone()).with_old_state(state)
    }

    #[tokio::test]
    async fn independent_steps_all_succeed() {
        let a = Urn::new("test", "proj", "", "t", "a");
        let b = Urn::new("test", "proj", "", "t", "b");
        let executor = StepExecutor::new(2, CancellationToken::new());
        let runner = Arc::new(RecordingRunner { order: Mutex::new(vec![]), fail_on: None });
        let report = executor
            .execute(vec![step(Op::Create, &a, &[]), step(Op::Create, &b, &[])], runner)
            .await;
        assert_eq!(report.succeeded.len(), 2);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn dependency_create_order_is_respected() {
        let a = Urn::new("test", "proj", "", "t", "a");
        let b = Urn::new("test", "proj", "", "t", "b");
        let executor = StepExecutor::new(1, CancellationToken::new());
        let runner = Arc::new(RecordingRunner { order: Mutex::new(vec![]), fail_on: None });
        executor
            .execute(vec![step(Op::Create, &b, &[a.clone()]), step(Op::Create, &a, &[])], runner.clone())
            .await;
        let order = runner.order.lock().await.clone();
        assert_eq!(order, vec![a, b]);
    }

    #[tokio::test]
    async fn failure_abandons_transitive_dependents() {
        let a = Urn::new("test", "proj", "", "t", "a");
        let b = Urn::new("test", "proj", "", "t", "b");
        let c = Urn::new("test", "proj", "", "t", "c");
        let executor = StepExecutor::new(2, CancellationToken::new());
        let runner = Arc::new(RecordingRunner {
            order: Mutex::new(vec![]),
            fail_on: Some(a.clone()),
        });
        let report = executor
            .execute(
                vec![
                    step(Op::Create, &a, &[]),
                    step(Op::Create, &b, &[a.clone()]),
                    step(Op::Create, &c, &[b.clone()]),
                ],
                runner,
            )
            .await;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.abandoned.len(), 2);
        assert!(report.abandoned.contains(&b));
        assert!(report.abandoned.contains(&c));
    }

    #[tokio::test]
    async fn cancellation_leaves_unstarted_steps_out_of_succeeded() {
        let a = Urn::new("test", "proj", "", "t", "a");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let executor = StepExecutor::new(1, cancel);
        let runner = Arc::new(RecordingRunner { order: Mutex::new(vec![]), fail_on: None });
        let report = executor.execute(vec![step(Op::Create, &a, &[])], runner).await;
        assert!(report.cancelled);
        assert!(report.succeeded.is_empty());
    }

    #[tokio::test]
    #[should_panic(expected = "at least 1")]
    async fn rejects_zero_parallelism() {
        let _ = StepExecutor::new(0, CancellationToken::new());
    }
}
