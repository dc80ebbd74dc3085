//! Sequential step generator: old-resource lookup (URN-before-alias
//! priority), diff dispatch, replace decomposition, ReplaceWith propagation,
//! protect inheritance and target-set scoping.

mod generator;
mod registration;
mod state;

pub use converge_core::TargetSet;
pub use generator::StepGenerator;
pub use registration::{Registration, Source};
