// ============================================================================
// File: src/lib.rs
// ----------------------------------------------------------------------------
// Crate root:
// - Module declarations and public re-exports
// - The entry point is controller::ApdController
// ============================================================================

//! Control-plane client for the `apd` access point daemon.
//!
//! [`ApdController`] is the way in: it probes which control transports the
//! host offers, brings up exactly one backend behind the
//! [`backends::ControlBackend`] trait and serializes every operation through
//! a single lock. Operations answer with plain success flags, mirroring the
//! daemon's accept/reject responses; the reasons go to the log.
//!
//! Death notifications, AP event callbacks and one-shot failure listeners are
//! delivered through an [`event::EventContext`] bound to a multi-thread tokio
//! runtime. Controller operations block their calling thread for the round
//! trip, so drive the controller from threads that are not themselves runtime
//! workers.

pub mod backends;
pub mod config;
pub mod controller;
pub mod death;
pub mod error;
pub mod event;
pub mod freq_history;
pub mod vendor;

pub use backends::{
    ApEventCallback, ApInfo, ControlBackend, DisconnectReason, FailureCallback, MacAddr,
    TransportPaths,
};
pub use config::{AccessPointConfig, ApSecurity, ChannelRange};
pub use controller::{ApdController, ControllerState};
pub use death::{DeathCookie, DeathHandler};
pub use error::ApconError;
pub use event::EventContext;
pub use freq_history::FreqHistory;
pub use vendor::{VendorApiVersion, VendorHwModeParams, VendorTuning};
