use std::collections::HashMap;

use async_trait::async_trait;
use tonic::Status;

use converge_core::{Alias as GeneratorAlias, AliasParent, AliasSpec, PropertyMap, Urn, UrnParseError};
use converge_generator::Source;

/// Wire form of a declared alias: either a full prior URN or a spec resolved
/// relative to the registering resource's own coordinates.
#[derive(Debug, Clone)]
pub enum AliasWire {
    Full(String),
    Spec {
        name: Option<String>,
        r#type: Option<String>,
        project: Option<String>,
        stack: Option<String>,
        /// `None` means unset (inherit); `Some("")` is the back-compat
        /// empty-parent form an old SDK sends for "no parent".
        parent_urn: Option<String>,
        no_parent: bool,
    },
}

impl AliasWire {
    /// Normalize this wire alias into the core `Alias` type, applying the
    /// old-SDK empty-parent-means-no-parent quirk.
    pub fn into_alias(self, old_sdk: bool) -> Result<GeneratorAlias, UrnParseError> {
        match self {
            AliasWire::Full(urn) => Ok(GeneratorAlias::Full(Urn::parse(urn)?)),
            AliasWire::Spec { name, r#type, project, stack, parent_urn, no_parent } => {
                let parent = if no_parent {
                    Some(AliasParent::NoParent)
                } else {
                    match parent_urn {
                        Some(ref s) if s.is_empty() && old_sdk => Some(AliasParent::NoParent),
                        Some(s) if !s.is_empty() => Some(AliasParent::Urn(Urn::parse(s)?)),
                        _ => None,
                    }
                };
                Ok(GeneratorAlias::Spec(AliasSpec { name, r#type, project, stack, parent }))
            }
        }
    }
}

/// Wire form of `RegisterResource`. URN assignment, provider resolution, and
/// alias materialization happen downstream of this boundary; this struct
/// only carries what the language runtime actually sent.
#[derive(Debug, Clone)]
pub struct RegisterResourceRequest {
    pub r#type: String,
    pub name: String,
    pub custom: bool,
    pub parent_urn: Option<String>,
    /// Explicit provider reference in `<providerURN>::<id>` wire form.
    pub provider: Option<String>,
    pub version: Option<String>,
    pub dependencies: Vec<String>,
    pub property_dependencies: HashMap<String, Vec<String>>,
    pub inputs: PropertyMap,
    pub aliases: Vec<AliasWire>,
    pub alias_urns: Vec<String>,
    pub delete_before_replace: Option<bool>,
    pub protect: Option<bool>,
    pub deleted_with: Option<String>,
    pub ignore_changes: Vec<String>,
    pub additional_secret_outputs: Vec<String>,
    pub replace_on_changes: Vec<String>,
    pub retain_on_delete: bool,
    pub replace_with: Vec<String>,
    pub remote: bool,
}

impl RegisterResourceRequest {
    pub fn new(r#type: impl Into<String>, name: impl Into<String>, custom: bool) -> Self {
        Self {
            r#type: r#type.into(),
            name: name.into(),
            custom,
            parent_urn: None,
            provider: None,
            version: None,
            dependencies: Vec::new(),
            property_dependencies: HashMap::new(),
            inputs: PropertyMap::new(),
            aliases: Vec::new(),
            alias_urns: Vec::new(),
            delete_before_replace: None,
            protect: None,
            deleted_with: None,
            ignore_changes: Vec::new(),
            additional_secret_outputs: Vec::new(),
            replace_on_changes: Vec::new(),
            retain_on_delete: false,
            replace_with: Vec::new(),
            remote: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegisterResourceResponse {
    pub urn: Urn,
    pub id: String,
    pub outputs: PropertyMap,
}

#[derive(Debug, Clone)]
pub struct RegisterResourceOutputsRequest {
    pub urn: Urn,
    pub outputs: PropertyMap,
}

#[derive(Debug, Clone)]
pub struct ReadResourceRequest {
    pub r#type: String,
    pub name: String,
    pub id: String,
    pub parent_urn: Option<String>,
    pub inputs: PropertyMap,
    pub provider: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReadResourceResponse {
    pub urn: Urn,
    pub outputs: PropertyMap,
}

#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub token: String,
    pub args: PropertyMap,
    pub provider: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InvokeResponse {
    pub r#return: PropertyMap,
    pub failures: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CallRequest {
    pub token: String,
    pub args: PropertyMap,
    pub arg_dependencies: HashMap<String, Vec<String>>,
    pub provider: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CallResponse {
    pub r#return: PropertyMap,
    pub return_dependencies: HashMap<String, Vec<String>>,
    pub failures: Vec<String>,
}

/// Features the engine can negotiate with a connecting SDK via
/// `SupportsFeature`. The engine always answers `true` for these; an SDK
/// that doesn't ask is assumed not to use them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    AliasSpecs,
    DeletedWith,
    OutputValues,
    ResourceReferences,
}

impl Feature {
    pub fn parse(id: &str) -> Option<Self> {
        match id {
            "aliasSpecs" => Some(Feature::AliasSpecs),
            "deletedWith" => Some(Feature::DeletedWith),
            "outputValues" => Some(Feature::OutputValues),
            "resourceReferences" => Some(Feature::ResourceReferences),
            _ => None,
        }
    }
}

/// The Resource Monitor RPC surface: the single entry point the language
/// runtime talks to. Implementations normalize wire requests (URN
/// construction, provider resolution, alias materialization, back-compat
/// header quirks) before handing a `Registration` to the step generator —
/// callers of this trait never see generator-internal types leak back out.
#[async_trait]
pub trait ResourceMonitor: Send + Sync {
    async fn register_resource(
        &self,
        req: RegisterResourceRequest,
        metadata: &tonic::metadata::MetadataMap,
    ) -> Result<RegisterResourceResponse, Status>;

    async fn register_resource_outputs(&self, req: RegisterResourceOutputsRequest) -> Result<(), Status>;

    async fn read_resource(
        &self,
        req: ReadResourceRequest,
        metadata: &tonic::metadata::MetadataMap,
    ) -> Result<ReadResourceResponse, Status>;

    /// Data-source invocation, proxied straight through to the resolved
    /// provider. Not part of the resource lifecycle the step generator
    /// plans, so it bypasses `Registration` entirely.
    async fn invoke(&self, req: InvokeRequest) -> Result<InvokeResponse, Status>;

    /// Remote-method invocation against a component's provider, proxied the
    /// same way as `invoke`.
    async fn call(&self, req: CallRequest) -> Result<CallResponse, Status>;

    fn supports_feature(&self, feature: &str) -> bool {
        Feature::parse(feature).is_some()
    }
}

/// `Source::Read`/`Source::Import` discriminate the three monitor entry
/// points a registration can originate from; re-exported here so callers
/// building a `Registration` from wire requests don't need a second import.
pub type RegistrationSource = Source;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_alias_parses_the_urn_verbatim() {
        let wire = AliasWire::Full("urn:converge:dev::proj::t::n".into());
        let alias = wire.into_alias(false).unwrap();
        assert!(matches!(alias, GeneratorAlias::Full(_)));
    }

    #[test]
    fn empty_parent_is_unset_for_a_modern_sdk() {
        let wire = AliasWire::Spec { name: None, r#type: None, project: None, stack: None, parent_urn: Some(String::new()), no_parent: false };
        let alias = wire.into_alias(false).unwrap();
        match alias {
            GeneratorAlias::Spec(spec) => assert!(spec.parent.is_none()),
            _ => panic!("expected a spec alias"),
        }
    }

    #[test]
    fn empty_parent_means_no_parent_for_an_old_sdk() {
        let wire = AliasWire::Spec { name: None, r#type: None, project: None, stack: None, parent_urn: Some(String::new()), no_parent: false };
        let alias = wire.into_alias(true).unwrap();
        match alias {
            GeneratorAlias::Spec(spec) => assert!(matches!(spec.parent, Some(AliasParent::NoParent))),
            _ => panic!("expected a spec alias"),
        }
    }

    #[test]
    fn explicit_no_parent_flag_wins_regardless_of_sdk_age() {
        let wire = AliasWire::Spec { name: None, r#type: None, project: None, stack: None, parent_urn: None, no_parent: true };
        let alias = wire.into_alias(false).unwrap();
        match alias {
            GeneratorAlias::Spec(spec) => assert!(matches!(spec.parent, Some(AliasParent::NoParent))),
            _ => panic!("expected a spec alias"),
        }
    }
}
