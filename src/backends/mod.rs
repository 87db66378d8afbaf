// ============================================================================
// File: src/backends/mod.rs
// ----------------------------------------------------------------------------
// Backend trait definitions and module organization for apcon transports.
//
// Provides a unified interface to the access point daemon:
// - ControlBackend trait for the control operations
// - Shared data types and backend error types
// - Provider list with availability probes and fixed preference order
// - Platform-conditional transport implementations
// ============================================================================

mod trait_def;
mod types;
mod errors;
mod factory;

// Re-export core types and traits
pub use trait_def::ControlBackend;
pub use types::{
    ApEventCallback, ApInfo, ApParameters, DisconnectReason, FailureCallback, FailureListeners,
    MacAddr, MacAddrParseError,
};
pub use errors::{BackendError, BackendResult};
pub use factory::{default_providers, ProviderEntry, TransportPaths};

// Platform-conditional transport imports
#[cfg(target_os = "linux")]
pub mod http_api;
#[cfg(target_os = "linux")]
pub use http_api::HttpApiBackend;

#[cfg(target_os = "linux")]
pub mod ctrl_socket;
#[cfg(target_os = "linux")]
pub use ctrl_socket::CtrlSocketBackend;
