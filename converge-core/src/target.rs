use std::collections::HashSet;

use crate::urn::Urn;

/// An update's target scope: either everything, or only the named URNs.
/// Shared between the step generator (downgrades non-targeted steps to
/// Same) and the refresh engine (restricts which rows are read).
#[derive(Debug, Clone)]
pub enum TargetSet {
    All,
    Only(HashSet<Urn>),
}

impl TargetSet {
    pub fn only(urns: impl IntoIterator<Item = Urn>) -> Self {
        TargetSet::Only(urns.into_iter().collect())
    }

    pub fn includes(&self, urn: &Urn) -> bool {
        match self {
            TargetSet::All => true,
            TargetSet::Only(set) => set.contains(urn),
        }
    }

    pub fn is_scoped(&self) -> bool {
        matches!(self, TargetSet::Only(_))
    }
}
