use std::collections::{HashMap, HashSet};

use converge_core::{Snapshot, Urn};

use crate::runner::RefreshOutcome;

/// Fold refresh outcomes into the base snapshot: deleted rows are removed,
/// and so is any other row whose DeletedWith points at a deleted row and
/// which isn't itself external — cascading until no further row qualifies.
/// Every remaining reference to a removed row is cascaded away (dependency/
/// property-dependency entries stripped, DeletedWith pointers cleared);
/// updated rows replace their prior copy in place. Sequence order is
/// preserved.
pub fn apply_refresh(base: &mut Snapshot, outcomes: HashMap<Urn, RefreshOutcome>) {
    for row in &mut base.resources {
        match outcomes.get(&row.urn) {
            Some(RefreshOutcome::InputsChanged(updated)) | Some(RefreshOutcome::OutputsOnly(updated)) => {
                *row = updated.clone();
            }
            _ => {}
        }
    }

    let mut deleted: HashSet<Urn> = outcomes
        .iter()
        .filter_map(|(urn, outcome)| matches!(outcome, RefreshOutcome::Deleted).then(|| urn.clone()))
        .collect();

    loop {
        let mut grew = false;
        for row in &base.resources {
            if row.external || deleted.contains(&row.urn) {
                continue;
            }
            if row.deleted_with.as_ref().is_some_and(|d| deleted.contains(d)) {
                deleted.insert(row.urn.clone());
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }

    if deleted.is_empty() {
        return;
    }

    base.resources.retain(|row| !deleted.contains(&row.urn));

    for row in &mut base.resources {
        row.dependencies.retain(|d| !deleted.contains(d));
        row.property_dependencies.retain(|_, urns| {
            urns.retain(|u| !deleted.contains(u));
            !urns.is_empty()
        });
        if row.deleted_with.as_ref().is_some_and(|d| deleted.contains(d)) {
            row.deleted_with = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::{Manifest, ResourceState};

    fn manifest() -> Manifest {
        Manifest {
            time: "2026-01-01T00:00:00Z".into(),
            magic: "test".into(),
            version: "1".into(),
            plugins: vec![],
        }
    }

    #[test]
    fn deleted_row_is_removed_and_plain_dependents_cleaned() {
        let a = Urn::new("test", "proj", "", "t", "a");
        let b = Urn::new("test", "proj", "", "t", "b");
        let mut row_b = ResourceState::new(b.clone(), true, "t");
        row_b.dependencies = vec![a.clone()];

        let mut snap = Snapshot::empty(manifest());
        snap.resources.push(ResourceState::new(a.clone(), true, "t"));
        snap.resources.push(row_b);

        let mut outcomes = HashMap::new();
        outcomes.insert(a.clone(), RefreshOutcome::Deleted);
        apply_refresh(&mut snap, outcomes);

        assert_eq!(snap.resources.len(), 1);
        assert_eq!(snap.resources[0].urn, b);
        assert!(snap.resources[0].dependencies.is_empty());
    }

    #[test]
    fn deleting_a_row_cascades_to_a_row_deleted_with_it() {
        let a = Urn::new("test", "proj", "", "t", "a");
        let b = Urn::new("test", "proj", "", "t", "b");
        let mut row_b = ResourceState::new(b.clone(), true, "t");
        row_b.deleted_with = Some(a.clone());

        let mut snap = Snapshot::empty(manifest());
        snap.resources.push(ResourceState::new(a.clone(), true, "t"));
        snap.resources.push(row_b);

        let mut outcomes = HashMap::new();
        outcomes.insert(a.clone(), RefreshOutcome::Deleted);
        apply_refresh(&mut snap, outcomes);

        assert!(snap.resources.is_empty());
    }

    #[test]
    fn cascade_does_not_remove_an_external_row() {
        let a = Urn::new("test", "proj", "", "t", "a");
        let b = Urn::new("test", "proj", "", "t", "b");
        let mut row_b = ResourceState::new(b.clone(), true, "t");
        row_b.deleted_with = Some(a.clone());
        row_b.external = true;

        let mut snap = Snapshot::empty(manifest());
        snap.resources.push(ResourceState::new(a.clone(), true, "t"));
        snap.resources.push(row_b);

        let mut outcomes = HashMap::new();
        outcomes.insert(a.clone(), RefreshOutcome::Deleted);
        apply_refresh(&mut snap, outcomes);

        assert_eq!(snap.resources.len(), 1);
        assert_eq!(snap.resources[0].urn, b);
        assert!(snap.resources[0].deleted_with.is_none());
    }

    #[test]
    fn inputs_changed_replaces_the_row() {
        let a = Urn::new("test", "proj", "", "t", "a");
        let mut snap = Snapshot::empty(manifest());
        snap.resources.push(ResourceState::new(a.clone(), true, "t"));

        let mut updated = ResourceState::new(a.clone(), true, "t");
        updated.id = "new-id".into();

        let mut outcomes = HashMap::new();
        outcomes.insert(a.clone(), RefreshOutcome::InputsChanged(updated));
        apply_refresh(&mut snap, outcomes);

        assert_eq!(snap.resources[0].id, "new-id");
    }
}
