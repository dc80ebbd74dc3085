use converge_core::{Alias, PropertyDependencyMap, PropertyMap, ProviderReference, Urn};

/// What gave rise to this registration, distinguishing the three monitor
/// entry points that all funnel into the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Register,
    Read,
    Import,
}

/// A single resource registration, already URN-assigned by the monitor
/// (stack/project/parent-type-chain/type/name are baked into `urn`). The
/// generator never sees the wire-level RPC shape, only this normalized form.
#[derive(Debug, Clone)]
pub struct Registration {
    pub urn: Urn,
    pub custom: bool,
    pub source: Source,
    pub r#type: String,
    pub parent: Option<Urn>,
    pub provider: Option<ProviderReference>,
    pub inputs: PropertyMap,
    pub dependencies: Vec<Urn>,
    pub property_dependencies: PropertyDependencyMap,
    pub aliases: Vec<Alias>,
    /// Legacy alias URNs carried verbatim rather than as specs.
    pub alias_urns: Vec<Urn>,
    pub protect: Option<bool>,
    pub delete_before_replace: Option<bool>,
    pub deleted_with: Option<Urn>,
    pub ignore_changes: Vec<String>,
    pub additional_secret_outputs: Vec<String>,
    pub replace_on_changes: Vec<String>,
    pub retain_on_delete: bool,
    /// URNs that must also be replaced if this registration ends up replaced.
    pub replace_with: Vec<Urn>,
    /// Populated only for `Source::Read`/`Source::Import`: the external id
    /// being adopted.
    pub external_id: Option<String>,
}

impl Registration {
    pub fn new(urn: Urn, custom: bool, r#type: impl Into<String>) -> Self {
        Self {
            urn,
            custom,
            source: Source::Register,
            r#type: r#type.into(),
            parent: None,
            provider: None,
            inputs: PropertyMap::new(),
            dependencies: Vec::new(),
            property_dependencies: PropertyDependencyMap::new(),
            aliases: Vec::new(),
            alias_urns: Vec::new(),
            protect: None,
            delete_before_replace: None,
            deleted_with: None,
            ignore_changes: Vec::new(),
            additional_secret_outputs: Vec::new(),
            replace_on_changes: Vec::new(),
            retain_on_delete: false,
            replace_with: Vec::new(),
            external_id: None,
        }
    }

    /// All declared aliases, legacy `alias_urns` folded in as `Alias::Full`.
    pub fn all_aliases(&self) -> Vec<Alias> {
        let mut out = self.aliases.clone();
        out.extend(self.alias_urns.iter().cloned().map(Alias::Full));
        out
    }
}
