use converge_core::{Manifest, PropertyMap, PropertyValue, ResourceState, Snapshot, Urn};

/// Build a URN for `stack`/`proj` with no parent chain, defaulting `type` to
/// `test:index:Resource` so call sites that don't care about the type token
/// can omit it.
pub fn urn(stack: &str, name: &str) -> Urn {
    Urn::new(stack, "proj", "", "test:index:Resource", name)
}

/// Build a URN under an explicit type and parent chain.
pub fn urn_typed(stack: &str, parent_chain: &str, r#type: &str, name: &str) -> Urn {
    Urn::new(stack, "proj", parent_chain, r#type, name)
}

/// A plain (non-secret, non-computed) property value, for fixtures that
/// don't need the full `PropertyValue` taxonomy.
pub fn plain(value: impl Into<serde_json::Value>) -> PropertyValue {
    PropertyValue::Plain(value.into())
}

/// Fluent builder over [`ResourceState`], mirroring the teacher's
/// chain-returning-`Self` test helpers rather than a separate builder type
/// with its own fields.
pub struct StateBuilder(ResourceState);

impl StateBuilder {
    pub fn new(urn: Urn, custom: bool, r#type: impl Into<String>) -> Self {
        Self(ResourceState::new(urn, custom, r#type))
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.0.id = id.into();
        self
    }

    pub fn parent(mut self, parent: Urn) -> Self {
        self.0.parent = Some(parent);
        self
    }

    pub fn provider(mut self, provider: converge_core::ProviderReference) -> Self {
        self.0.provider = Some(provider);
        self
    }

    pub fn input(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.0.inputs.insert(key.into(), value);
        self
    }

    pub fn output(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.0.outputs.insert(key.into(), value);
        self
    }

    pub fn depends_on(mut self, dep: Urn) -> Self {
        self.0.dependencies.push(dep);
        self
    }

    pub fn protect(mut self, protect: bool) -> Self {
        self.0.protect = protect;
        self
    }

    pub fn deleted(mut self) -> Self {
        self.0.delete_flag = true;
        self
    }

    pub fn pending_replacement(mut self) -> Self {
        self.0.pending_replacement = true;
        self
    }

    pub fn external(mut self) -> Self {
        self.0.external = true;
        self
    }

    pub fn build(self) -> ResourceState {
        self.0
    }
}

/// A throwaway manifest for snapshot fixtures; the timestamp is fixed rather
/// than wall-clock since tests need deterministic equality.
pub fn test_manifest() -> Manifest {
    Manifest {
        time: "2026-01-01T00:00:00Z".into(),
        magic: "converge-test".into(),
        version: "1".into(),
        plugins: Vec::new(),
    }
}

/// Fluent builder over [`Snapshot`], appending rows in call order (the order
/// the integrity invariants are defined against).
pub struct SnapshotBuilder(Snapshot);

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self(Snapshot::empty(test_manifest()))
    }

    pub fn with_resource(mut self, state: ResourceState) -> Self {
        self.0.resources.push(state);
        self
    }

    pub fn build(self) -> Snapshot {
        self.0
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_builder_produces_a_usable_row() {
        let state = StateBuilder::new(urn("dev", "a"), true, "test:index:Resource")
            .id("res-1")
            .input("size", plain(serde_json::json!(3)))
            .protect(true)
            .build();
        assert_eq!(state.id, "res-1");
        assert!(state.protect);
        assert!(state.inputs.contains_key("size"));
    }

    #[test]
    fn snapshot_builder_preserves_insertion_order() {
        let parent = urn("dev", "parent");
        let child = urn_typed("dev", "test:index:Resource", "test:index:Child", "child");
        let snapshot = SnapshotBuilder::new()
            .with_resource(StateBuilder::new(parent.clone(), false, "test:index:Resource").build())
            .with_resource(StateBuilder::new(child, true, "test:index:Child").parent(parent).build())
            .build();
        assert!(snapshot.verify_integrity().is_ok());
    }
}
