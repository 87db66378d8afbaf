// ============================================================================
// File: src/error.rs
// ----------------------------------------------------------------------------
// Controller-level error taxonomy.
//
// Public controller operations report plain booleans, mirroring the daemon's
// accept/reject answers; these errors are what gets logged on the failure
// paths, so every "false" has one well-defined reason attached to it.
// ============================================================================

use crate::config::ConfigError;

/// Why a controller operation failed.
#[derive(Debug, thiserror::Error)]
pub enum ApconError {
    /// No provider's transport is declared on this host
    #[error("no backend transport is available for the access point daemon")]
    NoBackendAvailable,

    /// An operation ran while no backend is active
    #[error("cannot call {op}: controller is not initialized")]
    NotInitialized { op: &'static str },

    /// `initialize` ran while a backend is already active
    #[error("controller is already initialized with backend {backend}")]
    AlreadyInitialized { backend: &'static str },

    /// The selected backend failed its one-time setup
    #[error("backend {backend} failed to initialize")]
    BackendInitFailed { backend: &'static str },

    /// The caller's access point configuration is structurally invalid
    #[error("rejecting access point config: {0}")]
    Config(#[from] ConfigError),
}
