//! In-process event bus used for diagnostics and step-lifecycle
//! notifications. The engine core never requires a subscriber to be
//! present — emitting is fire-and-forget from the generator/executor's
//! point of view — but a front-end (out of scope here) can subscribe to
//! render progress or surface diagnostics.

mod bus;
pub mod events;

pub use bus::EventBus;
pub use events::{DiagnosticEvent, StepEvent};
