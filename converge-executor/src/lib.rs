//! Bounded, cancellable scheduler for step plans: the antichain discipline
//! from the data model (per-URN total order, dependency-closure ordering,
//! reverse-topological deletes) implemented as a parallel worker pool.

mod executor;
mod graph;

pub use executor::{ExecutionReport, StepExecutor, StepRunner};
pub use graph::{build_graph, StepGraph};
