use converge_core::{Diagnostic, Op, Urn};

/// Published whenever the generator or executor produces a structured
/// diagnostic (protect violation, duplicate alias, step failure, ...).
#[derive(Debug, Clone)]
pub struct DiagnosticEvent(pub Diagnostic);

/// Published at each step-lifecycle transition the snapshot manager
/// journals, mirroring Begin/Success/Failure so a subscriber can render
/// progress without coupling to the snapshot manager's internals.
#[derive(Debug, Clone)]
pub enum StepEvent {
    Begun { urn: Urn, op: Op },
    Succeeded { urn: Urn, op: Op },
    Failed { urn: Urn, op: Op, reason: String },
}

impl StepEvent {
    pub fn urn(&self) -> &Urn {
        match self {
            StepEvent::Begun { urn, .. } | StepEvent::Succeeded { urn, .. } | StepEvent::Failed { urn, .. } => urn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_event_urn_accessor_covers_all_variants() {
        let urn = Urn::new("test", "proj", "", "t", "n");
        let begun = StepEvent::Begun { urn: urn.clone(), op: Op::Create };
        let failed = StepEvent::Failed { urn: urn.clone(), op: Op::Create, reason: "x".into() };
        assert_eq!(begun.urn(), &urn);
        assert_eq!(failed.urn(), &urn);
    }
}
