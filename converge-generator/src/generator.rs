use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use converge_core::alias::resolve_alias_urns;
use converge_core::{
    Diagnostic, DiffResult, EngineError, Op, RegistrationCoords, ReplacementReason, ResourceState, Snapshot, Step, TargetSet, Urn,
};
use converge_registry::ProviderRegistry;

use crate::registration::{Registration, Source};
use crate::state::GeneratorState;

/// Plans steps for an update against a fixed base snapshot. Deliberately
/// single-threaded: URN allocation, alias resolution and diff dispatch only
/// totalize if one batch of registrations resolves before the next begins.
pub struct StepGenerator {
    registry: Arc<ProviderRegistry>,
    base: Snapshot,
    targets: TargetSet,
    state: GeneratorState,
    diagnostics: Vec<Diagnostic>,
}

impl StepGenerator {
    pub fn new(registry: Arc<ProviderRegistry>, base: Snapshot, targets: TargetSet) -> Self {
        Self {
            registry,
            base,
            targets,
            state: GeneratorState::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Plan the step(s) for one registration. Usually one step; a Replace
    /// decomposes into exactly two, ordered per the chosen replace strategy.
    pub async fn register(&mut self, reg: Registration) -> Result<Vec<Step>, EngineError> {
        self.register_batch(vec![reg]).await.remove(0)
    }

    /// Plan steps for a batch of registrations that arrived together.
    /// Old-resource resolution runs in two passes across the whole batch —
    /// every direct-URN match is claimed before any alias match is
    /// attempted — so which old row a registration adopts never depends on
    /// the order registrations happen to be submitted in.
    pub async fn register_batch(&mut self, regs: Vec<Registration>) -> Vec<Result<Vec<Step>, EngineError>> {
        let mut old: Vec<Option<Result<Option<ResourceState>, EngineError>>> = vec![None; regs.len()];

        // Pass 0: structural validation + own-alias materialization. Done
        // up front so a child's parent-alias inheritance sees the parent's
        // materialized aliases even if the parent appears later in `regs`.
        for (i, reg) in regs.iter().enumerate() {
            if let Some(parent) = &reg.parent {
                if !self.state.new_urns.contains(parent) && self.base.find_live(parent).is_none() {
                    old[i] = Some(Err(EngineError::InvalidParent {
                        urn: reg.urn.clone(),
                        parent: parent.clone(),
                    }));
                    continue;
                }
            }
            if !self.state.new_urns.insert(reg.urn.clone()) {
                old[i] = Some(Err(EngineError::DuplicateUrn { urn: reg.urn.clone() }));
            }
        }

        for (i, reg) in regs.iter().enumerate() {
            if old[i].is_some() {
                continue;
            }
            let coords = self.coords_for(reg);
            let parent_aliases: Vec<Urn> = reg
                .parent
                .as_ref()
                .and_then(|p| self.state.aliases_by_new_urn.get(p).cloned())
                .unwrap_or_default();
            let declared = reg.all_aliases();
            let candidate_aliases = resolve_alias_urns(&declared, &coords, &parent_aliases);
            self.state.aliases_by_new_urn.insert(reg.urn.clone(), candidate_aliases);
        }

        // Pass 1: direct-URN claims across the whole batch.
        for (i, reg) in regs.iter().enumerate() {
            if old[i].is_some() {
                continue;
            }
            if let Some(pos) = self.base.find_live(&reg.urn) {
                let row = self.base.resources[pos].clone();
                if !self.state.direct_claimed.insert(row.urn.clone()) {
                    old[i] = Some(Err(EngineError::DuplicateUrn { urn: row.urn.clone() }));
                } else {
                    old[i] = Some(Ok(Some(row)));
                }
            }
        }

        // Pass 2: alias claims, only for registrations a direct match didn't
        // already resolve. A row already direct-claimed is simply
        // unavailable here, not an error — direct-URN priority means this
        // registration falls through to the next alias candidate (or, if
        // none match, is treated as brand new).
        for (i, reg) in regs.iter().enumerate() {
            if old[i].is_some() {
                continue;
            }
            let candidate_aliases = self.state.aliases_by_new_urn.get(&reg.urn).cloned().unwrap_or_default();
            let mut resolved = None;
            let mut err = None;
            for alias in &candidate_aliases {
                let Some(pos) = self.base.find_live(alias) else { continue };
                let row = self.base.resources[pos].clone();
                if self.state.direct_claimed.contains(&row.urn) {
                    continue;
                }
                match self.state.alias_claimed.get(&row.urn) {
                    Some(claimant) if claimant != &reg.urn => {
                        err = Some(EngineError::DuplicateAlias { urn: reg.urn.clone() });
                        break;
                    }
                    _ => {
                        self.state.alias_claimed.insert(row.urn.clone(), reg.urn.clone());
                        resolved = Some(row);
                        break;
                    }
                }
            }
            old[i] = Some(match err {
                Some(e) => Err(e),
                None => Ok(resolved),
            });
        }

        let mut out = Vec::with_capacity(regs.len());
        for (reg, resolved) in regs.into_iter().zip(old.into_iter()) {
            let resolved = resolved.expect("every registration is resolved by pass 2");
            out.push(match resolved {
                Err(e) => Err(e),
                Ok(old) => self.register_one(reg, old).await,
            });
        }
        out
    }

    fn coords_for(&self, reg: &Registration) -> RegistrationCoords {
        RegistrationCoords {
            stack: reg.urn.stack().to_string(),
            project: reg.urn.project().to_string(),
            r#type: reg.r#type.clone(),
            name: reg.urn.name().to_string(),
            parent_type_chain: reg.urn.parent_type_chain(),
            parent_urn: reg.parent.clone(),
        }
    }

    /// Build the step(s) for one registration once its old-resource match
    /// (if any) has already been resolved.
    async fn register_one(&mut self, reg: Registration, old: Option<ResourceState>) -> Result<Vec<Step>, EngineError> {
        let protect = self.state.effective_protect(reg.parent.as_ref(), reg.protect);
        self.state.protect_by_urn.insert(reg.urn.clone(), protect);

        let (mut op, diff) = self.decide_op(&reg, old.as_ref()).await?;
        let replacement_reason = if op == Op::Replace {
            diff.as_ref().map(|d| ReplacementReason::DiffReplaceKeys(d.replace_keys.clone()))
        } else if let Some(source) = self.state.forced_replace.get(&reg.urn).cloned() {
            op = Op::Replace;
            Some(ReplacementReason::ReplaceWithPropagation { source })
        } else {
            None
        };

        let mut steps = Vec::new();

        if op == Op::Replace {
            if protect {
                let target_urn = old.as_ref().map(|o| o.urn.clone()).unwrap_or_else(|| reg.urn.clone());
                return Err(EngineError::ProtectViolation { urn: target_urn });
            }
            self.record_replace_with(&reg);
            let delete_before_replace = diff.as_ref().map(|d| d.delete_before_replace).unwrap_or(false)
                || reg.delete_before_replace.unwrap_or(false)
                || self.state.forced_delete_before_replace.contains(&reg.urn);

            let new_state = self.build_new_state(&reg, old.as_ref(), true);
            let mut create_step = Step::new(Op::CreateReplacement, reg.urn.clone()).with_new_state(new_state);
            if let Some(o) = &old {
                create_step = create_step.with_old_state(o.clone());
            }
            if let Some(d) = diff.clone() {
                create_step = create_step.with_diff(d);
            }
            if let Some(r) = replacement_reason {
                create_step = create_step.with_replacement_reason(r);
            }

            let delete_urn = old.as_ref().map(|o| o.urn.clone()).unwrap_or_else(|| reg.urn.clone());
            let mut delete_step = Step::new(Op::DeleteReplaced, delete_urn);
            if let Some(o) = &old {
                delete_step = delete_step.with_old_state(o.clone());
            }

            if delete_before_replace {
                steps.push(delete_step);
                steps.push(create_step);
            } else {
                steps.push(create_step);
                steps.push(delete_step);
            }
            return Ok(steps);
        }

        let targeted_or_fresh = !self.targets.is_scoped() || self.targets.includes(&reg.urn) || old.is_none();

        if !targeted_or_fresh {
            let mut step = Step::new(Op::Same, reg.urn.clone());
            if let Some(o) = &old {
                let mut carried = o.clone();
                carried.urn = reg.urn.clone();
                step = step.with_old_state(o.clone()).with_new_state(carried);
            }
            steps.push(step);
            return Ok(steps);
        }

        let new_state = self.build_new_state(&reg, old.as_ref(), false);
        let mut step = Step::new(op, reg.urn.clone()).with_new_state(new_state);
        if let Some(o) = &old {
            step = step.with_old_state(o.clone());
        }
        if let Some(d) = diff {
            step = step.with_diff(d);
        }
        steps.push(step);
        Ok(steps)
    }

    fn is_claimed(&self, urn: &Urn) -> bool {
        self.state.direct_claimed.contains(urn) || self.state.alias_claimed.contains_key(urn)
    }

    /// Removal phase: once every registration for the update has been
    /// processed, any live row not claimed by this update is gone from the
    /// program and must be deleted (or, if untargeted, left alone) plus any
    /// stale `pending-replacement` rows this update never resolved. Deleting
    /// a row cascades to any other stale row whose DeletedWith points at it,
    /// unless that row is external or itself protected.
    pub fn finalize(&mut self) -> Result<Vec<Step>, EngineError> {
        let mut steps = Vec::new();

        let stale: Vec<ResourceState> = self
            .base
            .resources
            .iter()
            .filter(|r| r.is_live() && !self.state.new_urns.contains(&r.urn) && !self.is_claimed(&r.urn))
            .cloned()
            .collect();

        let mut deleting: HashSet<Urn> = stale
            .iter()
            .filter(|r| !r.protect && (!self.targets.is_scoped() || self.targets.includes(&r.urn)))
            .map(|r| r.urn.clone())
            .collect();

        loop {
            let mut grew = false;
            for row in &stale {
                if row.external || row.protect || deleting.contains(&row.urn) {
                    continue;
                }
                if row.deleted_with.as_ref().is_some_and(|d| deleting.contains(d)) {
                    deleting.insert(row.urn.clone());
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }

        for row in &stale {
            if row.protect {
                self.diagnostics.push(Diagnostic::protect_violation(row.urn.clone()));
                continue;
            }
            if !deleting.contains(&row.urn) {
                if self.targets.is_scoped() && !self.targets.includes(&row.urn) {
                    if let Some(parent) = &row.parent {
                        if deleting.contains(parent) {
                            return Err(EngineError::Generator {
                                urn: row.urn.clone(),
                                chain: vec![parent.to_string()],
                                reason: "untargeted resource would be orphaned by its targeted parent's deletion".into(),
                            });
                        }
                    }
                }
                continue;
            }
            steps.push(Step::new(Op::Delete, row.urn.clone()).with_old_state(row.clone()));
        }

        for row in &self.base.resources {
            if row.pending_replacement && !self.state.new_urns.contains(&row.urn) {
                steps.push(Step::new(Op::RemovePendingReplace, row.urn.clone()).with_old_state(row.clone()));
            }
        }

        Ok(steps)
    }

    async fn decide_op(&self, reg: &Registration, old: Option<&ResourceState>) -> Result<(Op, Option<DiffResult>), EngineError> {
        let Some(old) = old else {
            return Ok((
                match reg.source {
                    Source::Read => Op::Read,
                    Source::Import => Op::Import,
                    Source::Register => Op::Create,
                },
                None,
            ));
        };

        if reg.source == Source::Read {
            return Ok((Op::ReadReplacement, None));
        }

        let provider_changed = match (&old.provider, &reg.provider) {
            (Some(a), Some(b)) => a != b,
            (None, None) => false,
            _ => true,
        };
        if old.custom != reg.custom || provider_changed {
            return Ok((Op::Same, None));
        }

        if !reg.custom {
            return Ok((Op::Same, None));
        }

        let provider_ref = reg.provider.as_ref().ok_or_else(|| EngineError::Configuration {
            provider: reg.urn.clone(),
            reason: "custom resource has no provider reference".into(),
        })?;
        let handle = self.registry.resolve(provider_ref).ok_or_else(|| EngineError::Configuration {
            provider: provider_ref.urn.clone(),
            reason: "provider instance not resolved in the registry".into(),
        })?;

        let diff = handle
            .diff(&reg.urn, &old.inputs, &old.outputs, &reg.inputs, &reg.ignore_changes)
            .await
            .map_err(|e| EngineError::Diff {
                urn: reg.urn.clone(),
                reason: e.to_string(),
            })?;

        let op = if diff.requires_replace() {
            Op::Replace
        } else if diff.has_changes() {
            Op::Update
        } else {
            Op::Same
        };
        Ok((op, Some(diff)))
    }

    fn record_replace_with(&mut self, reg: &Registration) {
        for target in &reg.replace_with {
            self.state.forced_replace.insert(target.clone(), reg.urn.clone());
            if reg.delete_before_replace.unwrap_or(false) {
                self.state.forced_delete_before_replace.insert(target.clone());
            }
        }
    }

    fn build_new_state(&self, reg: &Registration, old: Option<&ResourceState>, pending_replacement: bool) -> ResourceState {
        let mut state = ResourceState::new(reg.urn.clone(), reg.custom, reg.r#type.clone());
        state.parent = reg.parent.clone();
        state.provider = reg.provider.clone();
        state.inputs = reg.inputs.clone();
        state.outputs = old.map(|o| o.outputs.clone()).unwrap_or_default();
        state.dependencies = reg.dependencies.clone();
        state.property_dependencies = reg.property_dependencies.clone();
        state.deleted_with = reg.deleted_with.clone();
        state.protect = self.state.protect_by_urn.get(&reg.urn).copied().unwrap_or(false);
        state.retain_on_delete = reg.retain_on_delete;
        state.additional_secret_outputs = reg.additional_secret_outputs.clone();
        state.external = matches!(reg.source, Source::Read | Source::Import);
        state.id = reg
            .external_id
            .clone()
            .or_else(|| old.map(|o| o.id.clone()))
            .unwrap_or_default();
        state.pending_replacement = pending_replacement;
        state
    }
}
