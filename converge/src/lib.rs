//! Wires the resource monitor, step generator, executor, snapshot manager,
//! provider registry and refresh engine into a single library surface an
//! embedding application drives: construct an [`Engine`], call
//! [`Engine::begin_update`] (or [`Engine::destroy`] / [`Engine::refresh`]),
//! serve the resulting sink behind a [`converge_grpc::MonitorService`] to a
//! language runtime, and persist the result through a
//! [`converge_snapshot::PersistencePort`].

mod driver;
mod engine;
mod runner;
mod sink;

pub use engine::{Engine, UpdateReport, UpdateSession};
pub use runner::UpdateRunner;
pub use sink::EngineSink;
