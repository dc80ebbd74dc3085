use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use converge_core::{EngineError, PropertyMap, Snapshot, Step, Urn};
use converge_executor::StepExecutor;
use converge_generator::{Registration, StepGenerator};
use converge_grpc::RegistrationOutcome;

use crate::runner::UpdateRunner;

/// A unit of work handed from `EngineSink` to the sequential driver task.
/// `StepGenerator::register` is deliberately single-threaded, so every
/// registration the monitor accepts concurrently is serialized through this
/// channel rather than racing against the generator's own state.
pub(crate) enum Job {
    Register {
        reg: Registration,
        reply: oneshot::Sender<Result<RegistrationOutcome, EngineError>>,
    },
    RegisterOutputs {
        urn: Urn,
        outputs: PropertyMap,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    ResourceCustom {
        urn: Urn,
        reply: oneshot::Sender<Option<bool>>,
    },
}

/// Owns the generator for the lifetime of one update and drains registration
/// jobs one at a time. `run` returns the generator (so the caller can
/// `finalize()` drop detection) and the runner (so outstanding deletes reuse
/// the same recorded outcomes map) once the job channel is closed.
pub(crate) struct Driver {
    generator: StepGenerator,
    executor: Arc<StepExecutor>,
    runner: Arc<UpdateRunner>,
    base: Snapshot,
    custom_by_urn: HashMap<Urn, bool>,
}

impl Driver {
    pub(crate) fn new(generator: StepGenerator, executor: Arc<StepExecutor>, runner: Arc<UpdateRunner>, base: Snapshot) -> Self {
        Self {
            generator,
            executor,
            runner,
            base,
            custom_by_urn: HashMap::new(),
        }
    }

    /// Drains registration jobs, batching every `Job::Register` currently
    /// sitting in the channel so `StepGenerator::register_batch` resolves
    /// direct-URN and alias claims across the whole arrived group before any
    /// of their steps run, and so the executor's bounded parallelism spans
    /// more than one registration's 1-3 steps at a time. A non-Register job
    /// encountered mid-drain is set aside and replayed first on the next
    /// iteration, preserving the order jobs arrived in.
    pub(crate) async fn run(mut self, mut rx: mpsc::Receiver<Job>) -> (StepGenerator, Arc<UpdateRunner>) {
        let mut deferred: VecDeque<Job> = VecDeque::new();
        loop {
            let job = match deferred.pop_front() {
                Some(job) => job,
                None => match rx.recv().await {
                    Some(job) => job,
                    None => break,
                },
            };

            match job {
                Job::Register { reg, reply } => {
                    let mut batch = vec![(reg, reply)];
                    while let Ok(next) = rx.try_recv() {
                        match next {
                            Job::Register { reg, reply } => batch.push((reg, reply)),
                            other => {
                                deferred.push_back(other);
                                break;
                            }
                        }
                    }
                    self.handle_register_batch(batch).await;
                }
                Job::RegisterOutputs { urn, outputs, reply } => {
                    self.runner.register_outputs(&urn, outputs).await;
                    let _ = reply.send(Ok(()));
                }
                Job::ResourceCustom { urn, reply } => {
                    let _ = reply.send(self.lookup_custom(&urn));
                }
            }
        }
        (self.generator, self.runner)
    }

    async fn handle_register_batch(&mut self, batch: Vec<(Registration, oneshot::Sender<Result<RegistrationOutcome, EngineError>>)>) {
        let urns: Vec<Urn> = batch.iter().map(|(reg, _)| reg.urn.clone()).collect();
        let customs: Vec<bool> = batch.iter().map(|(reg, _)| reg.custom).collect();
        let (regs, replies): (Vec<Registration>, Vec<_>) = batch.into_iter().unzip();

        let planned = self.generator.register_batch(regs).await;

        let mut all_steps = Vec::new();
        let mut groups: Vec<Result<HashSet<Urn>, EngineError>> = Vec::with_capacity(planned.len());
        for result in planned {
            match result {
                Ok(steps) => {
                    let step_urns: HashSet<Urn> = steps.iter().map(|s: &Step| s.urn.clone()).collect();
                    all_steps.extend(steps);
                    groups.push(Ok(step_urns));
                }
                Err(e) => groups.push(Err(e)),
            }
        }

        let report = self.executor.execute(all_steps, self.runner.clone()).await;

        for (((urn, custom), reply), group) in urns.into_iter().zip(customs).zip(replies).zip(groups) {
            let outcome = match group {
                Err(e) => Err(e),
                Ok(step_urns) => {
                    if report.cancelled {
                        Err(EngineError::Cancelled)
                    } else if let Some(err) = report.failed.iter().find(|e| e.primary_urn().is_some_and(|u| step_urns.contains(u))) {
                        Err(err.clone())
                    } else {
                        let (id, outputs) = self.runner.outcome_for(&urn).await.unwrap_or_default();
                        Ok(RegistrationOutcome { urn: urn.clone(), id, outputs })
                    }
                }
            };
            if outcome.is_ok() {
                self.custom_by_urn.insert(urn, custom);
            }
            let _ = reply.send(outcome);
        }
    }

    fn lookup_custom(&self, urn: &Urn) -> Option<bool> {
        if let Some(&custom) = self.custom_by_urn.get(urn) {
            return Some(custom);
        }
        self.base.resources.iter().find(|r| &r.urn == urn && r.is_live()).map(|r| r.custom)
    }
}
