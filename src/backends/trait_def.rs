// ============================================================================
// File: src/backends/trait_def.rs
// ----------------------------------------------------------------------------
// ControlBackend trait definition
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::backends::types::{
    ApEventCallback, ApParameters, DisconnectReason, FailureCallback, MacAddr,
};
use crate::death::{DeathCookie, DeathHandler};

/// Control channel to the access point daemon.
///
/// All operations are synchronous from the caller's point of view and may
/// block for one remote round trip. Boolean returns mirror the daemon's
/// accept/reject answer; transport failures are logged by the backend and
/// reported as `false`.
pub trait ControlBackend: Send + Sync + fmt::Debug {
    /// One-time channel setup.
    ///
    /// Callers must not invoke this twice on the same instance; the
    /// controller enforces that by construction.
    ///
    /// # Returns
    /// true once the channel to the daemon is usable
    fn initialize(&self) -> bool;

    /// Begin hosting an access point.
    ///
    /// # Arguments
    /// * `iface` - Kernel interface to host on
    /// * `params` - Validated configuration plus negotiated vendor extras
    /// * `metered` - Advertise the network as metered
    /// * `on_failure` - Fired at most once, asynchronously, if the AP later
    ///   fails outside any caller's control flow
    fn start_access_point(
        &self,
        iface: &str,
        params: &ApParameters,
        metered: bool,
        on_failure: FailureCallback,
    ) -> bool;

    /// Tear down the access point on `iface` and disarm its failure listener.
    fn stop_access_point(&self, iface: &str) -> bool;

    /// Force-deauthenticate one connected client.
    fn disconnect_client(&self, iface: &str, client: &MacAddr, reason: DisconnectReason) -> bool;

    /// Whether this transport can deliver unsolicited AP events.
    fn supports_event_callback(&self) -> bool;

    /// Register the event callback for `iface`, replacing any previous one.
    ///
    /// Only meaningful when [`ControlBackend::supports_event_callback`] is
    /// true; the controller gates on that before delegating.
    fn register_event_callback(&self, iface: &str, callback: Arc<dyn ApEventCallback>) -> bool;

    /// Arm death detection for the underlying connection.
    ///
    /// Mints a fresh cookie; the handler receives it when the connection
    /// breaks. Registering again replaces the previous watch.
    fn register_death_handler(&self, handler: Arc<dyn DeathHandler>) -> bool;

    /// Disarm death detection without firing the handler.
    fn deregister_death_handler(&self) -> bool;

    /// Cookie of the currently armed death watch, if any.
    fn death_cookie(&self) -> Option<DeathCookie>;

    /// True once `initialize` has begun connecting.
    fn is_initialization_started(&self) -> bool;

    /// True while the channel to the daemon is up.
    fn is_initialization_complete(&self) -> bool;

    /// Nudge the platform to bring the daemon up.
    ///
    /// Safe to call when the daemon is already running.
    fn start_daemon(&self) -> bool;

    /// Forward the verbose flag to the daemon. Failures are ignored; logging
    /// verbosity is never worth failing an operation over.
    fn enable_verbose_logging(&self, verbose: bool);

    /// Drop the channel. Idempotent; never panics.
    fn terminate(&self);

    /// Append a diagnostic description of this backend to `w`.
    fn dump(&self, w: &mut dyn fmt::Write) -> fmt::Result;

    /// Short transport identifier used in logs.
    fn name(&self) -> &'static str;
}
