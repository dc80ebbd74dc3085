use std::collections::HashSet;

use crate::error::SnapshotIntegrityError;
use crate::resource_state::ResourceState;
use crate::step::Op;
use crate::urn::Urn;

/// Metadata recorded alongside the resource list.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Manifest {
    pub time: String,
    pub magic: String,
    pub version: String,
    pub plugins: Vec<String>,
}

/// A half-complete operation left behind by an interrupted run: the row it
/// concerns and the op that was in flight when the run stopped.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PendingOperation {
    pub urn: Urn,
    pub op: Op,
}

/// The persisted state of a stack: an ordered resource list plus manifest
/// and optional pending-operation records.
///
/// Ordering is significant: the integrity invariants (parent-before-child,
/// provider-before-consumer) are defined in terms of sequence position, not
/// just reachability.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    pub manifest: Manifest,
    pub resources: Vec<ResourceState>,
    pub pending_operations: Vec<PendingOperation>,
}

impl Snapshot {
    pub fn empty(manifest: Manifest) -> Self {
        Self {
            manifest,
            resources: Vec::new(),
            pending_operations: Vec::new(),
        }
    }

    /// The index of the live row for `urn`, if one exists.
    pub fn find_live(&self, urn: &Urn) -> Option<usize> {
        self.resources.iter().position(|r| r.is_live() && &r.urn == urn)
    }

    /// Verify every invariant from the data model section, returning the
    /// first violation found (scanned in sequence order, matching the
    /// "first violation" contract persist callers rely on).
    pub fn verify_integrity(&self) -> Result<(), SnapshotIntegrityError> {
        let mut seen_before: HashSet<&Urn> = HashSet::new();
        let mut live_seen: HashSet<&Urn> = HashSet::new();
        let mut custom_provider_urns: HashSet<&Urn> = HashSet::new();

        for row in &self.resources {
            if row.is_live() {
                if !live_seen.insert(&row.urn) {
                    return Err(SnapshotIntegrityError::DuplicateLiveUrn { urn: row.urn.clone() });
                }
            }
            if row.custom && row.r#type.starts_with("pulumi:providers:") {
                custom_provider_urns.insert(&row.urn);
            }

            if let Some(parent) = &row.parent {
                if !seen_before.contains(parent) {
                    return Err(SnapshotIntegrityError::MissingParent {
                        urn: row.urn.clone(),
                        parent: parent.clone(),
                    });
                }
            }
            if let Some(provider) = &row.provider {
                if !custom_provider_urns.contains(&provider.urn) {
                    return Err(SnapshotIntegrityError::UnresolvedProvider {
                        urn: row.urn.clone(),
                        provider: provider.urn.clone(),
                    });
                }
                if !seen_before.contains(&provider.urn) {
                    return Err(SnapshotIntegrityError::ProviderAfterConsumer {
                        provider: provider.urn.clone(),
                        consumer: row.urn.clone(),
                    });
                }
            }
            for dep in &row.dependencies {
                if !seen_before.contains(dep) && dep != &row.urn {
                    return Err(SnapshotIntegrityError::DanglingReference {
                        urn: row.urn.clone(),
                        field: "dependencies",
                        target: dep.clone(),
                    });
                }
            }
            for urns in row.property_dependencies.values() {
                for dep in urns {
                    if !seen_before.contains(dep) {
                        return Err(SnapshotIntegrityError::DanglingReference {
                            urn: row.urn.clone(),
                            field: "propertyDependencies",
                            target: dep.clone(),
                        });
                    }
                }
            }
            if let Some(dw) = &row.deleted_with {
                if !seen_before.contains(dw) {
                    return Err(SnapshotIntegrityError::DanglingReference {
                        urn: row.urn.clone(),
                        field: "deletedWith",
                        target: dw.clone(),
                    });
                }
            }

            seen_before.insert(&row.urn);
        }

        Ok(())
    }
}
