// ============================================================================
// File: src/controller/mod.rs
// ----------------------------------------------------------------------------
// Single-handle controller facade over the daemon backends.
//
// Provides the one entry point upstream code talks to:
// - Backend selection in fixed preference order at initialize time
// - One lock serializing every public operation against teardown
// - Death notification plumbing with stale-cookie protection
// - Vendor extension negotiation alongside the primary backend
// ============================================================================

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info};

use crate::backends::{default_providers, ControlBackend, ProviderEntry, TransportPaths};
use crate::death::{DeathCookie, DeathHandler};
use crate::event::EventContext;
use crate::vendor::{VendorExtension, VendorTuning};

mod ops;


/// Lifecycle of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No backend selected yet, or the last one died.
    Uninitialized,
    /// A backend is active and serving operations.
    Active,
    /// Explicitly shut down; a new `initialize()` may bring it back.
    Terminated,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerState::Uninitialized => "uninitialized",
            ControllerState::Active => "active",
            ControllerState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// The selected backend plus everything minted alongside it.
///
/// At most one exists per controller; created only by a successful
/// `initialize()`, destroyed by `terminate()` or death teardown.
pub(crate) struct ActiveBackend {
    pub(crate) backend: Box<dyn ControlBackend>,
    pub(crate) cookie: DeathCookie,
    pub(crate) name: &'static str,
}

pub(crate) struct Inner {
    pub(crate) state: ControllerState,
    pub(crate) active: Option<ActiveBackend>,
    pub(crate) death_handler: Option<Arc<dyn DeathHandler>>,
    pub(crate) verbose: bool,
    pub(crate) backend_verbose: bool,
    pub(crate) vendor: Option<VendorExtension>,
}

/// Control-plane facade for the access point daemon.
///
/// One instance per daemon connection. Every public operation acquires the
/// instance lock, checks whether a backend is active, and either delegates
/// or logs and returns the operation's failure value. Remote calls happen
/// with the lock held, so a slow daemon stalls other callers rather than
/// reordering them.
pub struct ApdController {
    inner: Arc<Mutex<Inner>>,
    providers: Vec<ProviderEntry>,
    paths: TransportPaths,
    tuning: VendorTuning,
    events: EventContext,
}

impl ApdController {
    /// Create a controller using the platform's default transports.
    pub fn new(paths: TransportPaths, events: EventContext) -> Self {
        let providers = default_providers(&paths);
        Self::with_providers(providers, paths, VendorTuning::default(), events)
    }

    /// Create a controller with platform tuning for the vendor extension.
    pub fn with_tuning(paths: TransportPaths, tuning: VendorTuning, events: EventContext) -> Self {
        let providers = default_providers(&paths);
        Self::with_providers(providers, paths, tuning, events)
    }

    /// Create a controller over an explicit provider list.
    ///
    /// The list's order is the preference order; it is never re-ranked.
    /// This is also the seam tests use to inject fake backends.
    pub fn with_providers(
        providers: Vec<ProviderEntry>,
        paths: TransportPaths,
        tuning: VendorTuning,
        events: EventContext,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: ControllerState::Uninitialized,
                active: None,
                death_handler: None,
                verbose: false,
                backend_verbose: false,
                vendor: None,
            })),
            providers,
            paths,
            tuning,
            events,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ControllerState {
        self.lock().state
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn inner_arc(&self) -> &Arc<Mutex<Inner>> {
        &self.inner
    }

    pub(crate) fn providers(&self) -> &[ProviderEntry] {
        &self.providers
    }

    pub(crate) fn paths(&self) -> &TransportPaths {
        &self.paths
    }

    pub(crate) fn tuning(&self) -> &VendorTuning {
        &self.tuning
    }

    pub(crate) fn events(&self) -> &EventContext {
        &self.events
    }
}

impl fmt::Debug for ApdController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("ApdController")
            .field("state", &inner.state)
            .field(
                "active",
                &inner.active.as_ref().map(|a| a.name).unwrap_or("none"),
            )
            .field("providers", &self.providers)
            .finish()
    }
}

/// Act on a death notification from whichever backend link minted `cookie`.
///
/// Runs on the event context. Takes the controller lock, so it can never
/// observe a half-updated state; the registered handler is invoked after the
/// lock is released.
pub(crate) fn handle_death(inner: &Mutex<Inner>, cookie: DeathCookie) {
    let handler = {
        let mut guard = inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(active) = guard.active.as_ref() else {
            debug!("death notification (cookie {cookie}) with no active backend");
            return;
        };
        if active.cookie != cookie {
            info!("ignoring stale death notification (cookie {cookie})");
            return;
        }
        error!("backend {} died (cookie {cookie})", active.name);
        if let Some(dead) = guard.active.take() {
            // Best-effort resource cleanup; the channel is already gone.
            dead.backend.terminate();
        }
        guard.state = ControllerState::Uninitialized;
        guard.vendor = None;
        guard.death_handler.clone()
    };
    // Recovery is the owner's job; all we do is tell them.
    if let Some(handler) = handler {
        handler.on_death(cookie);
    }
}
