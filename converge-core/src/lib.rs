//! Core data model for the Convergence deployment engine.
//!
//! This crate has no knowledge of gRPC, providers, or scheduling — it
//! defines the shapes (`Urn`, `Alias`, `ResourceState`, `Step`, `Snapshot`)
//! and cross-cutting concerns (errors, diagnostics, config, logging) that
//! every other `converge-*` crate builds on.

pub mod alias;
pub mod config;
pub mod diagnostics;
pub mod diff;
pub mod error;
pub mod logging;
pub mod resource_state;
pub mod snapshot;
pub mod step;
pub mod target;
pub mod urn;

pub use alias::{Alias, AliasParent, AliasSpec, RegistrationCoords};
pub use diagnostics::{Diagnostic, DiagnosticKind, Severity};
pub use diff::{DetailedDiffEntry, DiffResult};
pub use error::{EngineError, SnapshotIntegrityError};
pub use resource_state::{PropertyDependencyMap, PropertyMap, PropertyValue, ProviderReference, ResourceState};
pub use snapshot::{Manifest, PendingOperation, Snapshot};
pub use step::{Op, ReplacementReason, Step};
pub use target::TargetSet;
pub use urn::{Urn, UrnParseError};
