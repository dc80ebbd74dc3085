//! Fixture builders and an in-memory provider double for exercising the
//! engine without a real provider plugin or persisted snapshot backend.

mod fixtures;
mod provider;

pub use fixtures::{plain, test_manifest, urn, urn_typed, SnapshotBuilder, StateBuilder};
pub use provider::{FakeProvider, FakeProviderScript, SingleLoader};
