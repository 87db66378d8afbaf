// ============================================================================
// File: src/controller/ops.rs
// ----------------------------------------------------------------------------
// Public controller operations:
// - Backend selection and one-time initialization
// - Access point start/stop/disconnect delegation
// - Event and death handler registration
// - Verbose logging, daemon startup, terminate, diagnostic dump
// ============================================================================

use std::fmt;
use std::sync::Arc;

use log::{debug, error, info};

use super::{handle_death, ActiveBackend, ApdController, ControllerState};
use crate::backends::{ApEventCallback, ApParameters, DisconnectReason, FailureCallback, MacAddr};
use crate::config::AccessPointConfig;
use crate::death::{DeathCookie, DeathHandler};
use crate::error::ApconError;
use crate::vendor::{VendorApiVersion, VendorExtension};

impl ApdController {
    /// Select and initialize a backend.
    ///
    /// Providers are evaluated in preference order and the first one whose
    /// probe reports the transport present is instantiated; later probes are
    /// not consulted. Fails without touching the active backend when one
    /// already exists.
    ///
    /// # Returns
    /// true once a backend is active; false leaves the previous state intact
    pub fn initialize(&self) -> bool {
        let mut inner = self.lock();
        if inner.state == ControllerState::Active {
            let name = inner.active.as_ref().map(|a| a.name).unwrap_or("unknown");
            error!("{}", ApconError::AlreadyInitialized { backend: name });
            return false;
        }

        let Some(entry) = self.providers().iter().find(|p| (p.declared)()) else {
            error!("{}", ApconError::NoBackendAvailable);
            return false;
        };
        info!("selected backend {}", entry.name);

        let backend = (entry.create)(self.events());
        if !backend.initialize() {
            error!("{}", ApconError::BackendInitFailed { backend: entry.name });
            return false;
        }

        // Death plumbing: the backend owns the watch, we keep the cookie to
        // recognize which link a notification belongs to.
        let weak = Arc::downgrade(self.inner_arc());
        let forwarder = Arc::new(move |cookie: DeathCookie| {
            if let Some(inner) = weak.upgrade() {
                handle_death(&inner, cookie);
            }
        });
        if !backend.register_death_handler(forwarder) {
            error!("backend {} refused the death handler", entry.name);
            backend.terminate();
            return false;
        }
        let Some(cookie) = backend.death_cookie() else {
            error!("backend {} armed no death watch", entry.name);
            backend.terminate();
            return false;
        };

        if inner.backend_verbose {
            backend.enable_verbose_logging(true);
        }

        inner.vendor =
            VendorExtension::negotiate(&self.paths().vendor_manifest, self.tuning().clone());
        inner.active = Some(ActiveBackend {
            backend,
            cookie,
            name: entry.name,
        });
        inner.state = ControllerState::Active;
        info!("controller active on backend {} (cookie {cookie})", entry.name);
        true
    }

    /// Begin hosting an access point described by `config`.
    ///
    /// The vendor bundle for the negotiated extension version is built here
    /// and travels with the primary parameters. `on_failure` fires at most
    /// once, asynchronously, if the AP later fails on its own.
    pub fn start_access_point(
        &self,
        config: &AccessPointConfig,
        metered: bool,
        on_failure: FailureCallback,
    ) -> bool {
        let inner = self.lock();
        let Some(active) = inner.active.as_ref() else {
            error!("{}", ApconError::NotInitialized { op: "start_access_point" });
            return false;
        };
        if let Err(err) = config.validate() {
            error!("{}", ApconError::from(err));
            return false;
        }
        if inner.verbose {
            debug!(
                "start_access_point iface={} ssid={} metered={metered} via {}",
                config.iface,
                config.ssid_display(),
                active.name
            );
        }
        let params = ApParameters {
            config: config.clone(),
            vendor: inner.vendor.as_ref().map(|v| v.iface_params(config)),
        };
        active
            .backend
            .start_access_point(&config.iface, &params, metered, on_failure)
    }

    /// Tear down the access point on `iface`.
    pub fn stop_access_point(&self, iface: &str) -> bool {
        let inner = self.lock();
        let Some(active) = inner.active.as_ref() else {
            error!("{}", ApconError::NotInitialized { op: "stop_access_point" });
            return false;
        };
        if inner.verbose {
            debug!("stop_access_point iface={iface} via {}", active.name);
        }
        active.backend.stop_access_point(iface)
    }

    /// Force-deauthenticate one connected client.
    pub fn disconnect_client(
        &self,
        iface: &str,
        client: &MacAddr,
        reason: DisconnectReason,
    ) -> bool {
        let inner = self.lock();
        let Some(active) = inner.active.as_ref() else {
            error!("{}", ApconError::NotInitialized { op: "disconnect_client" });
            return false;
        };
        if inner.verbose {
            debug!("disconnect_client iface={iface} client={client} via {}", active.name);
        }
        active.backend.disconnect_client(iface, client, reason)
    }

    /// Whether the active backend can deliver unsolicited AP events.
    pub fn supports_event_callback(&self) -> bool {
        let inner = self.lock();
        match inner.active.as_ref() {
            Some(active) => active.backend.supports_event_callback(),
            None => {
                debug!("supports_event_callback: controller is not initialized");
                false
            }
        }
    }

    /// Register the event callback for `iface`, replacing any previous one.
    ///
    /// Returns false without delegating when the active backend cannot
    /// deliver events; that is an expected condition, not an error.
    pub fn register_event_callback(
        &self,
        iface: &str,
        callback: Arc<dyn ApEventCallback>,
    ) -> bool {
        let inner = self.lock();
        let Some(active) = inner.active.as_ref() else {
            error!("{}", ApconError::NotInitialized { op: "register_event_callback" });
            return false;
        };
        if !active.backend.supports_event_callback() {
            debug!("backend {} does not support event callbacks", active.name);
            return false;
        }
        active.backend.register_event_callback(iface, callback)
    }

    /// Register the death handler. One handler per controller; registering
    /// again replaces the previous one.
    pub fn register_death_handler(&self, handler: Arc<dyn DeathHandler>) -> bool {
        let mut inner = self.lock();
        if inner.death_handler.is_some() {
            error!("death handler already registered, replacing it");
        }
        inner.death_handler = Some(handler);
        true
    }

    /// Drop the registered death handler.
    pub fn deregister_death_handler(&self) -> bool {
        let mut inner = self.lock();
        if inner.death_handler.is_none() {
            error!("no death handler registered");
        }
        inner.death_handler = None;
        true
    }

    /// True once the active backend has begun connecting.
    pub fn is_initialization_started(&self) -> bool {
        let inner = self.lock();
        inner
            .active
            .as_ref()
            .map(|a| a.backend.is_initialization_started())
            .unwrap_or(false)
    }

    /// True while the active backend's channel is up.
    pub fn is_initialization_complete(&self) -> bool {
        let inner = self.lock();
        inner
            .active
            .as_ref()
            .map(|a| a.backend.is_initialization_complete())
            .unwrap_or(false)
    }

    /// Ask the platform to bring the daemon up.
    pub fn start_daemon(&self) -> bool {
        let inner = self.lock();
        let Some(active) = inner.active.as_ref() else {
            error!("{}", ApconError::NotInitialized { op: "start_daemon" });
            return false;
        };
        active.backend.start_daemon()
    }

    /// Set verbose logging for the controller and the daemon.
    ///
    /// Both flags are cached, so a backend initialized later still picks the
    /// daemon-side flag up.
    pub fn enable_verbose_logging(&self, verbose: bool, backend_verbose: bool) {
        let mut inner = self.lock();
        inner.verbose = verbose;
        inner.backend_verbose = backend_verbose;
        if let Some(active) = inner.active.as_ref() {
            active.backend.enable_verbose_logging(backend_verbose);
        }
    }

    /// Shut the active backend down and release it.
    ///
    /// The death handler does not fire for an explicit terminate and is
    /// dropped with the backend; a later `initialize()` starts with no
    /// handler registered. Safe to call repeatedly and from any state.
    pub fn terminate(&self) {
        let mut inner = self.lock();
        if let Some(active) = inner.active.take() {
            info!("terminating backend {}", active.name);
            active.backend.terminate();
        }
        inner.vendor = None;
        inner.death_handler = None;
        inner.state = ControllerState::Terminated;
    }

    /// Whether a vendor extension was negotiated at initialize time.
    pub fn uses_vendor_extension(&self) -> bool {
        self.lock().vendor.is_some()
    }

    /// Negotiated vendor extension version, if the platform carries one.
    pub fn vendor_api_version(&self) -> Option<VendorApiVersion> {
        self.lock().vendor.as_ref().map(|v| v.version())
    }

    /// Write a diagnostic description of the controller to `w`.
    pub fn dump(&self, w: &mut dyn fmt::Write) -> fmt::Result {
        let inner = self.lock();
        writeln!(w, "ApdController")?;
        writeln!(w, "state: {}", inner.state)?;
        writeln!(
            w,
            "verbose: {} (backend: {})",
            inner.verbose, inner.backend_verbose
        )?;
        for provider in self.providers() {
            writeln!(
                w,
                "provider {}: declared={}",
                provider.name,
                (provider.declared)()
            )?;
        }
        match inner.vendor.as_ref() {
            Some(vendor) => writeln!(w, "vendor extension: {}", vendor.version())?,
            None => writeln!(w, "vendor extension: none")?,
        }
        writeln!(
            w,
            "death handler registered: {}",
            inner.death_handler.is_some()
        )?;
        match inner.active.as_ref() {
            Some(active) => {
                writeln!(w, "active backend: {} (cookie {})", active.name, active.cookie)?;
                active.backend.dump(w)
            }
            None => writeln!(w, "active backend: none"),
        }
    }
}
