use crate::diff::DiffResult;
use crate::resource_state::ResourceState;
use crate::urn::Urn;

/// The operation a planned step performs against a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Op {
    Same,
    Create,
    CreateReplacement,
    Update,
    Delete,
    DeleteReplaced,
    Replace,
    Read,
    ReadReplacement,
    Refresh,
    Import,
    RemovePendingReplace,
}

impl Op {
    /// Whether this op, on success, destroys the row it targets (as opposed
    /// to creating or leaving one behind).
    pub fn is_destructive(&self) -> bool {
        matches!(self, Op::Delete | Op::DeleteReplaced)
    }

    /// Whether this op allocates a new row distinct from `OldState`.
    pub fn creates_new_row(&self) -> bool {
        matches!(self, Op::Create | Op::CreateReplacement | Op::Read | Op::ReadReplacement | Op::Import)
    }
}

/// Why a resource is being replaced rather than updated in place, recorded
/// for diagnostics and for deciding CreateReplacement/DeleteReplaced ordering.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ReplacementReason {
    /// The provider's Diff reported one or more `replaceKeys`.
    DiffReplaceKeys(Vec<String>),
    /// Forced because this URN appears in another step's `ReplaceWith` set.
    ReplaceWithPropagation { source: Urn },
}

/// A single planned operation against one resource, as emitted by the step
/// generator and consumed by the step executor.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Step {
    pub op: Op,
    pub urn: Urn,
    pub old_state: Option<ResourceState>,
    pub new_state: Option<ResourceState>,
    pub keys: Vec<String>,
    pub detailed_diff: Option<DiffResult>,
    pub replacement_reason: Option<ReplacementReason>,
}

impl Step {
    pub fn new(op: Op, urn: Urn) -> Self {
        Self {
            op,
            urn,
            old_state: None,
            new_state: None,
            keys: Vec::new(),
            detailed_diff: None,
            replacement_reason: None,
        }
    }

    pub fn with_old_state(mut self, state: ResourceState) -> Self {
        self.old_state = Some(state);
        self
    }

    pub fn with_new_state(mut self, state: ResourceState) -> Self {
        self.new_state = Some(state);
        self
    }

    pub fn with_diff(mut self, diff: DiffResult) -> Self {
        self.keys = diff.changed_keys.iter().chain(diff.replace_keys.iter()).cloned().collect();
        self.detailed_diff = Some(diff);
        self
    }

    pub fn with_replacement_reason(mut self, reason: ReplacementReason) -> Self {
        self.replacement_reason = Some(reason);
        self
    }

    /// URNs this step's completion must wait on before it is runnable. Does
    /// not encode the reverse-topological ordering for deletes — that is an
    /// executor scheduling concern, not a property of the step itself.
    pub fn dependency_closure(&self) -> Vec<Urn> {
        self.old_state
            .as_ref()
            .or(self.new_state.as_ref())
            .map(|s| s.dependencies.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destructive_ops_are_flagged() {
        assert!(Op::Delete.is_destructive());
        assert!(Op::DeleteReplaced.is_destructive());
        assert!(!Op::Update.is_destructive());
        assert!(!Op::Same.is_destructive());
    }

    #[test]
    fn creates_new_row_covers_create_like_ops() {
        assert!(Op::Create.creates_new_row());
        assert!(Op::Read.creates_new_row());
        assert!(!Op::Update.creates_new_row());
        assert!(!Op::Delete.creates_new_row());
    }

    #[test]
    fn with_diff_populates_keys_from_changed_and_replace() {
        let urn = Urn::new("test", "proj", "", "t", "n");
        let diff = DiffResult {
            changed_keys: vec!["a".into()],
            replace_keys: vec!["b".into()],
            ..Default::default()
        };
        let step = Step::new(Op::Replace, urn).with_diff(diff);
        assert_eq!(step.keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn dependency_closure_prefers_old_state() {
        let urn = Urn::new("test", "proj", "", "t", "n");
        let dep = Urn::new("test", "proj", "", "t", "d");
        let mut old = ResourceState::new(urn.clone(), true, "t");
        old.dependencies = vec![dep.clone()];
        let step = Step::new(Op::Update, urn).with_old_state(old);
        assert_eq!(step.dependency_closure(), vec![dep]);
    }
}
