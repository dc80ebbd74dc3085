//! Resource Monitor RPC contract: the single entry point the language
//! runtime talks to. Back-compat quirks (old-SDK alias semantics, feature
//! negotiation) are concentrated at this boundary so the rest of the engine
//! only ever sees normalized `Registration`s.

mod error;
mod headers;
mod monitor;
pub mod provider;
mod service;
mod sink;

pub use error::engine_error_to_status;
pub use headers::MonitorHeaders;
pub use monitor::{
    AliasWire, CallRequest, CallResponse, Feature, InvokeRequest, InvokeResponse, ReadResourceRequest, ReadResourceResponse,
    RegisterResourceOutputsRequest, RegisterResourceRequest, RegisterResourceResponse, RegistrationSource, ResourceMonitor,
};
pub use service::MonitorService;
pub use sink::{RegistrationOutcome, RegistrationSink};
