use std::fmt;

/// The authority token every URN begins with: `urn:converge:<stack>::<project>::<typechain>::<name>`.
const AUTHORITY: &str = "converge";

/// A canonical identifier for a resource within a stack/project.
///
/// Shaped `urn:converge:<stack>::<project>::<type-chain>::<name>`. The
/// type-chain is a `$`-separated list of the resource's own type preceded by
/// the type chain of its parent component — custom-resource parents are
/// excluded from the chain, only component ancestors contribute.
///
/// Equality is byte-exact: two URNs are equal iff their rendered strings are
/// identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Urn(String);

/// Error returned when a string does not parse as a well-formed URN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrnParseError {
    pub input: String,
    pub reason: &'static str,
}

impl fmt::Display for UrnParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid URN '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for UrnParseError {}

impl Urn {
    /// Build a URN from its constituent parts.
    ///
    /// `parent_type_chain` is the already-resolved type chain of the parent
    /// component (empty if there is no component parent); `own_type` is this
    /// resource's own type token.
    pub fn new(stack: &str, project: &str, parent_type_chain: &str, own_type: &str, name: &str) -> Self {
        let type_chain = if parent_type_chain.is_empty() {
            own_type.to_string()
        } else {
            format!("{parent_type_chain}${own_type}")
        };
        Urn(format!("urn:{AUTHORITY}:{stack}::{project}::{type_chain}::{name}"))
    }

    /// Parse a URN from its canonical string form.
    pub fn parse(s: impl Into<String>) -> Result<Self, UrnParseError> {
        let s = s.into();
        let rest = s.strip_prefix(&format!("urn:{AUTHORITY}:")).ok_or(UrnParseError {
            input: s.clone(),
            reason: "missing 'urn:converge:' prefix",
        })?;
        let parts: Vec<&str> = rest.split("::").collect();
        if parts.len() != 4 {
            return Err(UrnParseError {
                input: s,
                reason: "expected exactly four '::'-separated segments after the stack",
            });
        }
        if parts[2].is_empty() || parts[3].is_empty() {
            return Err(UrnParseError {
                input: s,
                reason: "type chain and name must be non-empty",
            });
        }
        Ok(Urn(s))
    }

    /// The raw string form of this URN.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn segments(&self) -> Vec<&str> {
        self.0
            .strip_prefix(&format!("urn:{AUTHORITY}:"))
            .expect("Urn invariant: always well-formed")
            .split("::")
            .collect()
    }

    /// The resource's declared name (the final URN segment).
    pub fn name(&self) -> &str {
        self.segments()[3]
    }

    /// The resource's own type token (the last `$`-separated element of the type chain).
    pub fn r#type(&self) -> &str {
        let chain = self.segments()[2];
        chain.rsplit('$').next().unwrap_or(chain)
    }

    /// The full `$`-separated type chain.
    pub fn type_chain(&self) -> &str {
        self.segments()[2]
    }

    /// The project segment.
    pub fn project(&self) -> &str {
        self.segments()[1]
    }

    /// The stack-qualifier segment (everything between `urn:converge:` and the project).
    pub fn stack(&self) -> &str {
        self.segments()[0]
    }

    /// Produce a new URN with the name replaced, keeping stack/project/type-chain.
    pub fn with_name(&self, name: &str) -> Urn {
        Urn::new(self.stack(), self.project(), &self.parent_type_chain(), self.r#type(), name)
    }

    /// The type chain with this resource's own type stripped off (i.e. the parent's chain).
    pub fn parent_type_chain(&self) -> String {
        let chain = self.type_chain();
        match chain.rfind('$') {
            Some(idx) => chain[..idx].to_string(),
            None => String::new(),
        }
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Urn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_urn_without_parent_chain() {
        let u = Urn::new("test", "proj", "", "pkgA:index:t1", "n1");
        assert_eq!(u.as_str(), "urn:converge:test::proj::pkgA:index:t1::n1");
        assert_eq!(u.name(), "n1");
        assert_eq!(u.r#type(), "pkgA:index:t1");
        assert_eq!(u.parent_type_chain(), "");
    }

    #[test]
    fn new_urn_with_parent_chain() {
        let u = Urn::new("test", "proj", "pkgA:index:t1", "pkgA:index:t2", "n1-sub");
        assert_eq!(u.type_chain(), "pkgA:index:t1$pkgA:index:t2");
        assert_eq!(u.r#type(), "pkgA:index:t2");
        assert_eq!(u.parent_type_chain(), "pkgA:index:t1");
    }

    #[test]
    fn equality_is_byte_exact() {
        let a = Urn::new("test", "proj", "", "t1", "n1");
        let b = Urn::new("test", "proj", "", "t1", "n1");
        assert_eq!(a, b);
        let c = Urn::new("test", "proj", "", "t1", "n2");
        assert_ne!(a, c);
    }

    #[test]
    fn parse_round_trips() {
        let u = Urn::new("test", "proj", "t1", "t2", "child");
        let parsed = Urn::parse(u.as_str().to_string()).unwrap();
        assert_eq!(u, parsed);
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert!(Urn::parse("not-a-urn").is_err());
        assert!(Urn::parse("urn:converge:test::proj::t1").is_err());
    }

    #[test]
    fn with_name_preserves_type_chain() {
        let u = Urn::new("test", "proj", "t1", "t2", "old");
        let renamed = u.with_name("new");
        assert_eq!(renamed.type_chain(), u.type_chain());
        assert_eq!(renamed.name(), "new");
    }
}
