use std::collections::HashSet;

use crate::urn::Urn;

/// A hard ceiling on the number of URNs a single registration's alias
/// resolution may materialize, guarding against multiplicative blowup from
/// deeply nested inherited aliases.
pub const MAX_ALIASES_PER_REGISTRATION: usize = 4096;

/// An alias spec: a partial URN description used to derive an alias URN
/// relative to the registering resource's own coordinates. Unset fields fall
/// back to the registering resource's own value.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct AliasSpec {
    pub name: Option<String>,
    pub r#type: Option<String>,
    pub project: Option<String>,
    pub stack: Option<String>,
    pub parent: Option<AliasParent>,
}

/// An alias spec's parent field: either a concrete URN or an explicit
/// "no parent" declaration (distinct from "unset, inherit mine").
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AliasParent {
    Urn(Urn),
    NoParent,
}

/// A declared alias: either a fully materialized prior URN or a spec to
/// resolve against the registering resource's coordinates.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Alias {
    Full(Urn),
    Spec(AliasSpec),
}

/// The coordinates of a resource being registered, used to fill in unset
/// alias-spec fields and as the seed for inherited-alias derivation.
#[derive(Debug, Clone)]
pub struct RegistrationCoords {
    pub stack: String,
    pub project: String,
    pub r#type: String,
    pub name: String,
    /// The parent's resolved type chain, empty if there is no component parent.
    pub parent_type_chain: String,
    /// The parent's own URN, if any (component or custom).
    pub parent_urn: Option<Urn>,
}

impl Alias {
    /// Materialize this alias into a concrete URN given the registering
    /// resource's coordinates. A spec alias inherits any unset field from
    /// `coords`; `parent: NoParent` drops the type-chain prefix entirely.
    pub fn materialize(&self, coords: &RegistrationCoords) -> Urn {
        match self {
            Alias::Full(urn) => urn.clone(),
            Alias::Spec(spec) => {
                let stack = spec.stack.as_deref().unwrap_or(&coords.stack);
                let project = spec.project.as_deref().unwrap_or(&coords.project);
                let r#type = spec.r#type.as_deref().unwrap_or(&coords.r#type);
                let name = spec.name.as_deref().unwrap_or(&coords.name);
                let parent_type_chain = match &spec.parent {
                    Some(AliasParent::NoParent) => String::new(),
                    Some(AliasParent::Urn(p)) => p.type_chain().to_string(),
                    None => coords.parent_type_chain.clone(),
                };
                Urn::new(stack, project, &parent_type_chain, r#type, name)
            }
        }
    }
}

/// Resolve the full, deduplicated, capped set of alias URNs for a
/// registration: its own declared aliases plus aliases inherited from the
/// parent's alias set.
///
/// `parent_aliases` are the already-materialized alias URNs of this
/// resource's parent (empty if there is no parent or the parent declared
/// none). Inherited aliases are synthesized by re-deriving this resource's
/// URN under each parent alias's type chain in turn.
///
/// Declaration order is preserved for the resource's own aliases; inherited
/// aliases follow, deduplicated against everything already materialized
/// before being appended — recursion never explores a URN already seen.
pub fn resolve_alias_urns(
    declared: &[Alias],
    coords: &RegistrationCoords,
    parent_aliases: &[Urn],
) -> Vec<Urn> {
    let mut seen: HashSet<Urn> = HashSet::new();
    let mut out = Vec::new();

    for alias in declared {
        let urn = alias.materialize(coords);
        if seen.insert(urn.clone()) {
            out.push(urn);
            if out.len() >= MAX_ALIASES_PER_REGISTRATION {
                return out;
            }
        }
    }

    for parent_alias in parent_aliases {
        if out.len() >= MAX_ALIASES_PER_REGISTRATION {
            break;
        }
        let inherited = Urn::new(
            &coords.stack,
            &coords.project,
            parent_alias.type_chain(),
            &coords.r#type,
            &coords.name,
        );
        if seen.insert(inherited.clone()) {
            out.push(inherited);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords() -> RegistrationCoords {
        RegistrationCoords {
            stack: "test".into(),
            project: "proj".into(),
            r#type: "pkgA:index:t1".into(),
            name: "n2".into(),
            parent_type_chain: String::new(),
            parent_urn: None,
        }
    }

    #[test]
    fn materialize_full_alias_is_identity() {
        let urn = Urn::new("test", "proj", "", "pkgA:index:t1", "n1");
        let alias = Alias::Full(urn.clone());
        assert_eq!(alias.materialize(&coords()), urn);
    }

    #[test]
    fn materialize_spec_alias_fills_unset_fields() {
        let alias = Alias::Spec(AliasSpec {
            name: Some("n1".into()),
            ..Default::default()
        });
        let urn = alias.materialize(&coords());
        assert_eq!(urn.name(), "n1");
        assert_eq!(urn.r#type(), "pkgA:index:t1");
        assert_eq!(urn.project(), "proj");
    }

    #[test]
    fn resolve_dedupes_and_preserves_declaration_order() {
        let urn1 = Urn::new("test", "proj", "", "pkgA:index:t1", "n1");
        let declared = vec![Alias::Full(urn1.clone()), Alias::Full(urn1.clone())];
        let out = resolve_alias_urns(&declared, &coords(), &[]);
        assert_eq!(out, vec![urn1]);
    }

    #[test]
    fn inherited_aliases_reflect_parent_type_chain() {
        let parent_alias = Urn::new("test", "proj", "", "pkgA:index:t1-new", "p1");
        let out = resolve_alias_urns(&[], &coords(), &[parent_alias.clone()]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].type_chain(), "pkgA:index:t1-new$pkgA:index:t1");
    }

    #[test]
    fn alias_count_is_capped() {
        let declared: Vec<Alias> = (0..MAX_ALIASES_PER_REGISTRATION + 50)
            .map(|i| Alias::Full(Urn::new("test", "proj", "", "t", &format!("n{i}"))))
            .collect();
        let out = resolve_alias_urns(&declared, &coords(), &[]);
        assert_eq!(out.len(), MAX_ALIASES_PER_REGISTRATION);
    }
}
