use std::collections::HashMap;
use std::fmt;

use crate::urn::Urn;

/// A reference to the provider instance that manages a custom resource, in
/// wire form `<providerURN>::<providerID>`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProviderReference {
    pub urn: Urn,
    pub id: String,
}

impl ProviderReference {
    pub fn new(urn: Urn, id: impl Into<String>) -> Self {
        Self { urn, id: id.into() }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (urn, id) = s.split_once("::")?;
        Some(Self {
            urn: Urn::parse(urn.to_string()).ok()?,
            id: id.to_string(),
        })
    }
}

impl fmt::Display for ProviderReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.urn, self.id)
    }
}

/// A property value, discriminated per the persisted-snapshot encoding rules:
/// plain JSON values pass through; secret, computed, asset/archive,
/// resource-reference, and output-value properties carry explicit markers so
/// the engine never treats a secret as a plain string.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PropertyValue {
    Plain(serde_json::Value),
    Secret(Box<PropertyValue>),
    Computed,
    Asset { path: String },
    Archive { path: String },
    ResourceReference { urn: Urn, id: Option<String> },
    OutputValue {
        value: Option<Box<PropertyValue>>,
        secret: bool,
        dependencies: Vec<Urn>,
    },
}

impl PropertyValue {
    /// Whether this value (or anything it wraps) carries the secret marker.
    pub fn is_secret(&self) -> bool {
        match self {
            PropertyValue::Secret(_) => true,
            PropertyValue::OutputValue { secret, .. } => *secret,
            _ => false,
        }
    }

    /// Whether this value is the sentinel "not yet known" computed marker.
    pub fn is_computed(&self) -> bool {
        matches!(self, PropertyValue::Computed)
    }
}

/// A bag of named property values, as carried by Inputs/Outputs.
pub type PropertyMap = HashMap<String, PropertyValue>;

/// Per-key lists of URNs a resource's individual input properties depend on.
pub type PropertyDependencyMap = HashMap<String, Vec<Urn>>;

/// A single row of persisted resource state.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceState {
    pub urn: Urn,
    pub custom: bool,
    #[serde(rename = "delete")]
    pub delete_flag: bool,
    pub pending_replacement: bool,
    pub external: bool,
    pub id: String,
    pub r#type: String,
    pub parent: Option<Urn>,
    pub provider: Option<ProviderReference>,
    pub inputs: PropertyMap,
    pub outputs: PropertyMap,
    pub dependencies: Vec<Urn>,
    pub property_dependencies: PropertyDependencyMap,
    pub deleted_with: Option<Urn>,
    pub protect: bool,
    pub retain_on_delete: bool,
    pub additional_secret_outputs: Vec<String>,
    pub init_errors: Vec<String>,
    pub modified: Option<String>,
    pub created: Option<String>,
}

impl ResourceState {
    /// A fresh, empty row for `urn`; callers fill in inputs/outputs/etc.
    pub fn new(urn: Urn, custom: bool, r#type: impl Into<String>) -> Self {
        Self {
            urn,
            custom,
            delete_flag: false,
            pending_replacement: false,
            external: false,
            id: String::new(),
            r#type: r#type.into(),
            parent: None,
            provider: None,
            inputs: PropertyMap::new(),
            outputs: PropertyMap::new(),
            dependencies: Vec::new(),
            property_dependencies: PropertyDependencyMap::new(),
            deleted_with: None,
            protect: false,
            retain_on_delete: false,
            additional_secret_outputs: Vec::new(),
            init_errors: Vec::new(),
            modified: None,
            created: None,
        }
    }

    /// A row is "live" (counts toward the at-most-one-live-row-per-URN
    /// invariant) when it is not tombstoned for deletion.
    pub fn is_live(&self) -> bool {
        !self.delete_flag
    }

    /// Every URN this row references, for integrity verification and URN
    /// normalization rewrites. Does not include `urn` itself.
    pub fn referenced_urns(&self) -> Vec<Urn> {
        let mut refs = Vec::new();
        if let Some(p) = &self.parent {
            refs.push(p.clone());
        }
        if let Some(p) = &self.provider {
            refs.push(p.urn.clone());
        }
        refs.extend(self.dependencies.iter().cloned());
        for urns in self.property_dependencies.values() {
            refs.extend(urns.iter().cloned());
        }
        if let Some(d) = &self.deleted_with {
            refs.push(d.clone());
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_reference_round_trips_through_display() {
        let urn = Urn::new("test", "proj", "", "pulumi:providers:aws", "default");
        let r#ref = ProviderReference::new(urn, "0xdeadbeef");
        let rendered = r#ref.to_string();
        let parsed = ProviderReference::parse(&rendered).unwrap();
        assert_eq!(parsed, r#ref);
    }

    #[test]
    fn secret_and_output_value_markers_are_detected() {
        let secret = PropertyValue::Secret(Box::new(PropertyValue::Plain(serde_json::json!("x"))));
        assert!(secret.is_secret());

        let output = PropertyValue::OutputValue {
            value: None,
            secret: true,
            dependencies: vec![],
        };
        assert!(output.is_secret());

        let plain = PropertyValue::Plain(serde_json::json!(1));
        assert!(!plain.is_secret());
    }

    #[test]
    fn referenced_urns_collects_every_pointer_field() {
        let mut row = ResourceState::new(Urn::new("test", "proj", "", "t", "n"), true, "t");
        let parent = Urn::new("test", "proj", "", "parent", "p");
        let dep = Urn::new("test", "proj", "", "t", "d");
        let deleted_with = Urn::new("test", "proj", "", "t", "dw");
        row.parent = Some(parent.clone());
        row.dependencies = vec![dep.clone()];
        row.deleted_with = Some(deleted_with.clone());
        row.property_dependencies.insert("prop".into(), vec![dep.clone()]);

        let refs = row.referenced_urns();
        assert!(refs.contains(&parent));
        assert!(refs.contains(&dep));
        assert!(refs.contains(&deleted_with));
    }

    #[test]
    fn is_live_reflects_delete_flag() {
        let mut row = ResourceState::new(Urn::new("test", "proj", "", "t", "n"), true, "t");
        assert!(row.is_live());
        row.delete_flag = true;
        assert!(!row.is_live());
    }
}
