//! Capabilities
//!
//! Typed, described operations the orchestrator can invoke on the oracle's behalf.

pub mod builtin;
pub mod registry;
pub mod spec;

pub use builtin::builtin_registry;
pub use registry::{handler, CapabilityCall, CapabilityHandler, CapabilityRegistry};
pub use spec::{CapabilityFamily, CapabilitySpec, InvocationRequest, ParameterSpec, ParameterType, ReturnShape};
