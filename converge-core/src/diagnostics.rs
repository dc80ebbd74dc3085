use crate::urn::Urn;

/// Severity of a structured diagnostic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// What kind of decision or outcome produced a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DiagnosticKind {
    ProtectViolation,
    DuplicateUrn,
    DuplicateAlias,
    AliasCapReached,
    TargetIntegrityViolation,
    StepFailed,
    Cancelled,
    Other(String),
}

/// A structured diagnostic event: what happened, how severe, and which
/// resource it concerns. A front-end (out of scope here) may render these;
/// the core only produces and publishes them.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub urn: Option<Urn>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            urn: None,
            message: message.into(),
        }
    }

    pub fn for_urn(mut self, urn: Urn) -> Self {
        self.urn = Some(urn);
        self
    }

    pub fn protect_violation(urn: Urn) -> Self {
        Diagnostic::new(
            DiagnosticKind::ProtectViolation,
            Severity::Error,
            format!("{urn} is protected and cannot be destroyed"),
        )
        .for_urn(urn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protect_violation_names_the_urn_in_message_and_field() {
        let urn = Urn::new("test", "proj", "", "t", "n");
        let diag = Diagnostic::protect_violation(urn.clone());
        assert_eq!(diag.urn, Some(urn.clone()));
        assert_eq!(diag.severity, Severity::Error);
        assert!(diag.message.contains(&urn.to_string()));
    }
}
