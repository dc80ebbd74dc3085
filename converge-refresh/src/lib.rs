//! Reconciles a persisted snapshot against live provider state: reads every
//! targeted, live, custom resource through its provider and folds the result
//! back in, cascading away anything whose backing resource disappeared.

mod apply;
mod engine;
mod runner;

pub use apply::apply_refresh;
pub use engine::{reconfigure_for_refresh_with_program, RefreshEngine, RefreshReport};
pub use runner::RefreshOutcome;
