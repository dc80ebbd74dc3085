use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;

use converge_core::{EngineError, Op, PendingOperation, PropertyMap, ResourceState, Snapshot, Step, Urn};

use crate::error::SnapshotError;
use crate::persistence::PersistencePort;

fn now_iso() -> String {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    format!("{secs}")
}

/// Owns the persisted snapshot as process-wide, mutex-guarded state.
/// Accepts journal entries from the executor (Begin/Success/Outputs/Failure)
/// and performs URN normalization and integrity verification before every
/// external persist. Aliases are never written into the rows this manager
/// produces; the rename map used for normalization is derived purely from
/// completed steps' old/new URN pairs.
pub struct SnapshotManager {
    snapshot: Mutex<Snapshot>,
    rename_map: Mutex<HashMap<Urn, Urn>>,
}

impl SnapshotManager {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            rename_map: Mutex::new(HashMap::new()),
        }
    }

    /// A read-only copy of the current in-memory snapshot, for callers that
    /// need a consistent view without holding the lock (e.g. the generator's
    /// old-resource lookup).
    pub async fn view(&self) -> Snapshot {
        self.snapshot.lock().await.clone()
    }

    /// Record a step's intent. For Create/CreateReplacement this allocates a
    /// `pending-replacement` row up front, so an interrupted run still
    /// persists the half-done resource.
    pub async fn begin(&self, step: &Step) {
        let mut snap = self.snapshot.lock().await;
        snap.pending_operations.push(PendingOperation {
            urn: step.urn.clone(),
            op: step.op,
        });
        if matches!(step.op, Op::Create | Op::CreateReplacement) {
            if let Some(mut state) = step.new_state.clone() {
                state.pending_replacement = true;
                state.created = Some(now_iso());
                snap.resources.push(state);
            }
        }
    }

    /// Commit a successful step. `new_state` overrides the step's own
    /// `new_state` when the runner computed outputs only after the RPC
    /// returned (the common case); falls back to `step.new_state`.
    pub async fn success(&self, step: &Step, new_state: Option<ResourceState>) {
        let mut snap = self.snapshot.lock().await;
        snap.pending_operations
            .retain(|p| !(p.urn == step.urn && p.op == step.op));

        let final_state = new_state.or_else(|| step.new_state.clone());

        match step.op {
            Op::Create | Op::CreateReplacement | Op::Read | Op::ReadReplacement | Op::Import => {
                if let Some(mut state) = final_state {
                    state.pending_replacement = false;
                    state.created = Some(now_iso());
                    if let Some(pos) = snap
                        .resources
                        .iter()
                        .position(|r| r.urn == step.urn && r.pending_replacement)
                    {
                        snap.resources[pos] = state;
                    } else {
                        snap.resources.push(state);
                    }
                }
            }
            Op::Update => {
                if let Some(old) = &step.old_state {
                    if old.urn != step.urn {
                        self.rename_map.lock().await.insert(old.urn.clone(), step.urn.clone());
                    }
                    if let Some(pos) = snap.resources.iter().position(|r| r.urn == old.urn && r.is_live()) {
                        if let Some(mut state) = final_state {
                            state.modified = Some(now_iso());
                            snap.resources[pos] = state;
                        }
                    }
                }
            }
            Op::Same => {
                if let Some(old) = &step.old_state {
                    if old.urn != step.urn {
                        self.rename_map.lock().await.insert(old.urn.clone(), step.urn.clone());
                    }
                    if let Some(pos) = snap.resources.iter().position(|r| r.urn == old.urn && r.is_live()) {
                        // Same copies inputs forward but keeps the prior outputs.
                        let kept_outputs = snap.resources[pos].outputs.clone();
                        if let Some(mut state) = final_state {
                            state.outputs = kept_outputs;
                            snap.resources[pos] = state;
                        } else {
                            snap.resources[pos].urn = step.urn.clone();
                        }
                    }
                }
            }
            Op::Delete => {
                if let Some(pos) = snap.find_live(&step.urn) {
                    snap.resources.remove(pos);
                }
            }
            Op::DeleteReplaced => {
                if let Some(pos) = snap.find_live(&step.urn) {
                    snap.resources[pos].delete_flag = true;
                }
            }
            Op::RemovePendingReplace => {
                if let Some(pos) = snap
                    .resources
                    .iter()
                    .position(|r| r.urn == step.urn && r.pending_replacement)
                {
                    snap.resources.remove(pos);
                }
            }
            Op::Refresh => {
                if let Some(pos) = snap.find_live(&step.urn) {
                    if let Some(state) = final_state {
                        snap.resources[pos] = state;
                    }
                }
            }
            Op::Replace => {
                // Replace is decomposed into CreateReplacement/DeleteReplaced
                // by the generator; it never reaches the executor directly.
            }
        }
    }

    /// Update the outputs recorded for a prior successful registration.
    pub async fn outputs(&self, urn: &Urn, outputs: PropertyMap) {
        let mut snap = self.snapshot.lock().await;
        if let Some(pos) = snap.find_live(urn) {
            snap.resources[pos].outputs = outputs;
            snap.resources[pos].modified = Some(now_iso());
        }
    }

    /// Record a step failure. Leaves the row in its prior form; if the
    /// provider reported a partial failure, appends to the row's init-error
    /// list so the next run resumes via Diff-and-Update.
    pub async fn failure(&self, step: &Step, err: &EngineError) {
        let mut snap = self.snapshot.lock().await;
        snap.pending_operations
            .retain(|p| !(p.urn == step.urn && p.op == step.op));

        if let EngineError::StepFailed { partial_failure: true, reason, .. } = err {
            if let Some(pos) = snap.resources.iter().position(|r| r.urn == step.urn) {
                snap.resources[pos].init_errors.push(reason.clone());
            }
        }
    }

    /// Deduplicate live rows, normalize URN references against the
    /// accumulated rename map, verify integrity, and persist through `port`.
    /// Fails without writing anything if the resulting snapshot is invalid.
    pub async fn persist(&self, port: &dyn PersistencePort) -> Result<(), SnapshotError> {
        let mut snap = self.snapshot.lock().await;
        dedupe_live_rows(&mut snap);

        let renames = self.rename_map.lock().await.clone();
        normalize_urns(&mut snap, &renames);

        snap.verify_integrity()?;
        port.save(&snap).await
    }
}

fn dedupe_live_rows(snap: &mut Snapshot) {
    let mut seen_live: HashSet<Urn> = HashSet::new();
    let mut keep = vec![true; snap.resources.len()];
    for i in (0..snap.resources.len()).rev() {
        let row = &snap.resources[i];
        if row.is_live() && !seen_live.insert(row.urn.clone()) {
            keep[i] = false;
        }
    }
    let mut idx = 0;
    snap.resources.retain(|_| {
        let k = keep[idx];
        idx += 1;
        k
    });
}

fn normalize_urns(snap: &mut Snapshot, renames: &HashMap<Urn, Urn>) {
    if renames.is_empty() {
        return;
    }
    for row in &mut snap.resources {
        if let Some(p) = &row.parent {
            if let Some(new) = renames.get(p) {
                row.parent = Some(new.clone());
            }
        }
        if let Some(pr) = &mut row.provider {
            if let Some(new) = renames.get(&pr.urn) {
                pr.urn = new.clone();
            }
        }
        for dep in &mut row.dependencies {
            if let Some(new) = renames.get(dep) {
                *dep = new.clone();
            }
        }
        for deps in row.property_dependencies.values_mut() {
            for dep in deps.iter_mut() {
                if let Some(new) = renames.get(dep) {
                    *dep = new.clone();
                }
            }
        }
        if let Some(dw) = &row.deleted_with {
            if let Some(new) = renames.get(dw) {
                row.deleted_with = Some(new.clone());
            }
        }
    }
}
