//! Provider RPC contract, at the trait-abstraction level: Configure, Check,
//! Diff, Create, Update, Delete, Read, Cancel are already expressed as
//! [`converge_registry::ProviderHandle`], and plugin construction as
//! [`converge_registry::Loader`]. What belongs here is the gRPC-specific
//! half of that boundary — mapping a provider's failure modes onto
//! `tonic::Status` the way the resource monitor does for generator errors —
//! since the wire encoding of a plugin's RPC methods is a transport detail
//! a `Loader` implementation owns, not something this crate prescribes.

pub use crate::error::provider_error_to_status;
pub use converge_registry::{Loader, ProviderError, ProviderHandle};
