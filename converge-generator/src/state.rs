use std::collections::{HashMap, HashSet};

use converge_core::Urn;

/// Bookkeeping carried across an entire update's worth of registrations.
/// The generator is sequential, so this is plain owned state rather than
/// anything behind a lock.
#[derive(Debug, Default)]
pub struct GeneratorState {
    /// URNs this update has already assigned to a registration.
    pub(crate) new_urns: HashSet<Urn>,
    /// Old-resource rows claimed by an exact URN match. Tracked separately
    /// from alias claims so a direct match always takes priority over a
    /// competing alias match, regardless of which registration is resolved
    /// first.
    pub(crate) direct_claimed: HashSet<Urn>,
    /// Old-resource rows claimed via alias, mapped to the claiming
    /// registration's own URN. A second, different registration aliasing to
    /// an already-claimed row is a DuplicateAlias, not a silent
    /// double-migration.
    pub(crate) alias_claimed: HashMap<Urn, Urn>,
    /// Materialized alias set per new URN, consulted by children for
    /// inherited-alias derivation.
    pub(crate) aliases_by_new_urn: HashMap<Urn, Vec<Urn>>,
    /// Effective (possibly inherited) protect flag per new URN.
    pub(crate) protect_by_urn: HashMap<Urn, bool>,
    /// URNs forced to Replace by another resource's ReplaceWith set, paired
    /// with the URN that forced it (for the propagated ReplacementReason).
    pub(crate) forced_replace: HashMap<Urn, Urn>,
    /// Whether DeleteBeforeReplace must propagate transitively once set on
    /// the resource that forced a downstream replace.
    pub(crate) forced_delete_before_replace: HashSet<Urn>,
}

impl GeneratorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn effective_protect(&self, parent: Option<&Urn>, own: Option<bool>) -> bool {
        own.unwrap_or_else(|| parent.and_then(|p| self.protect_by_urn.get(p).copied()).unwrap_or(false))
    }
}
