// ============================================================================
// File: src/backends/http_api/mod.rs
// ----------------------------------------------------------------------------
// Modern transport: JSON over HTTP/1 on the daemon's Unix socket.
//
// Control operations each run one request/response exchange. A long-lived
// event stream carries unsolicited AP events; the stream breaking is the
// death signal for the whole channel.
// ============================================================================

mod client;
mod events;
mod types;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info};
use tokio::task::JoinHandle;

use crate::backends::trait_def::ControlBackend;
use crate::backends::types::{
    ApEventCallback, ApParameters, DisconnectReason, FailureCallback, FailureListeners, MacAddr,
};
use crate::death::{DeathCookie, DeathHandler, DeathWatch};
use crate::event::EventContext;

use events::DaemonEvent;
use types::{DisconnectRequest, LogLevelRequest, StartApRequest, StatusResponse};

/// State the event watcher task shares with the backend.
pub(crate) struct Shared {
    listeners: FailureListeners,
    callbacks: Mutex<HashMap<String, Arc<dyn ApEventCallback>>>,
    watch: Mutex<Option<Arc<DeathWatch>>>,
    terminated: AtomicBool,
    connected: AtomicBool,
    events: EventContext,
}

impl Shared {
    fn callbacks(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn ApEventCallback>>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn watch(&self) -> MutexGuard<'_, Option<Arc<DeathWatch>>> {
        self.watch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route one decoded event to the armed listener and registered callback.
    ///
    /// Everything is posted through the event context so deliveries stay
    /// ordered with death notifications.
    fn dispatch(&self, event: DaemonEvent) {
        match event {
            DaemonEvent::ApFailure { iface, instance } => {
                info!("daemon reports AP failure on {iface}/{instance}");
                if let Some(on_failure) = self.listeners.take(&iface) {
                    self.events.post(on_failure);
                }
                if let Some(callback) = self.callbacks().get(&iface).cloned() {
                    self.events
                        .post(move || callback.on_failure(&iface, &instance));
                }
            }
            DaemonEvent::ApInfoChanged { info } => {
                if let Some(callback) = self.callbacks().get(&info.iface).cloned() {
                    self.events.post(move || callback.on_info_changed(info));
                }
            }
            DaemonEvent::ClientChanged {
                iface,
                client,
                connected,
            } => {
                if let Some(callback) = self.callbacks().get(&iface).cloned() {
                    self.events.post(move || {
                        callback.on_connected_clients_changed(&iface, client, connected)
                    });
                }
            }
        }
    }

    /// Called by the watcher when the event stream ends for any reason.
    fn channel_broken(&self) {
        if self.terminated.load(Ordering::SeqCst) {
            debug!("event stream closed after terminate, staying quiet");
            return;
        }
        // Liveness drops before the notification; a death handler never
        // observes a still-connected channel.
        self.connected.store(false, Ordering::SeqCst);
        if let Some(watch) = self.watch().as_ref() {
            watch.notify_died();
        }
    }
}

/// Control backend speaking the daemon's HTTP API over a Unix socket.
pub struct HttpApiBackend {
    socket_path: PathBuf,
    shared: Arc<Shared>,
    started: AtomicBool,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl HttpApiBackend {
    pub const NAME: &'static str = "http-api";

    /// Availability probe: the daemon (or its socket activator) has created
    /// the API socket. Pure path check, no I/O.
    pub fn service_declared(socket_path: &Path) -> bool {
        socket_path.exists()
    }

    pub fn new(socket_path: PathBuf, events: EventContext) -> Self {
        Self {
            socket_path,
            shared: Arc::new(Shared {
                listeners: FailureListeners::new(),
                callbacks: Mutex::new(HashMap::new()),
                watch: Mutex::new(None),
                terminated: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                events,
            }),
            started: AtomicBool::new(false),
            watcher: Mutex::new(None),
        }
    }

    /// Drive a channel future to completion from a synchronous call site.
    ///
    /// Callers must not already be on the runtime; the controller only ever
    /// invokes backends from plain threads.
    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.shared.events.runtime().block_on(fut)
    }

    fn require_connected(&self, op: &'static str) -> bool {
        if self.shared.connected.load(Ordering::SeqCst) {
            true
        } else {
            error!("cannot {op}: http-api channel is not connected");
            false
        }
    }
}

impl ControlBackend for HttpApiBackend {
    fn initialize(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            error!("http-api backend initialized twice");
            return false;
        }
        match self.block_on(client::api_get::<StatusResponse>(
            &self.socket_path,
            "/v1/status",
        )) {
            Ok(status) => {
                info!(
                    "connected to apd {} at {}",
                    status.version,
                    self.socket_path.display()
                );
                self.shared.connected.store(true, Ordering::SeqCst);
                let handle = self.shared.events.runtime().spawn(events::watch_events(
                    self.socket_path.clone(),
                    self.shared.clone(),
                ));
                *self.watcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                true
            }
            Err(err) => {
                error!("http-api initialization failed: {err:#}");
                false
            }
        }
    }

    fn start_access_point(
        &self,
        iface: &str,
        params: &ApParameters,
        metered: bool,
        on_failure: FailureCallback,
    ) -> bool {
        if !self.require_connected("start_access_point") {
            return false;
        }
        let request = StartApRequest {
            params: params.clone(),
            metered,
        };
        let path = format!("/v1/aps/{iface}");
        match self.block_on(client::api_put(&self.socket_path, &path, &request)) {
            Ok(()) => {
                self.shared.listeners.arm(iface, on_failure);
                debug!("access point started on {iface}");
                true
            }
            Err(err) => {
                error!("start_access_point({iface}) failed: {err:#}");
                false
            }
        }
    }

    fn stop_access_point(&self, iface: &str) -> bool {
        if !self.require_connected("stop_access_point") {
            return false;
        }
        let path = format!("/v1/aps/{iface}");
        match self.block_on(client::api_delete(&self.socket_path, &path)) {
            Ok(()) => {
                self.shared.listeners.disarm(iface);
                debug!("access point stopped on {iface}");
                true
            }
            Err(err) => {
                error!("stop_access_point({iface}) failed: {err:#}");
                false
            }
        }
    }

    fn disconnect_client(&self, iface: &str, client: &MacAddr, reason: DisconnectReason) -> bool {
        if !self.require_connected("disconnect_client") {
            return false;
        }
        let request = DisconnectRequest {
            client: *client,
            reason,
        };
        let path = format!("/v1/aps/{iface}/disconnect");
        match self.block_on(client::api_put(&self.socket_path, &path, &request)) {
            Ok(()) => true,
            Err(err) => {
                error!("disconnect_client({iface}, {client}) failed: {err:#}");
                false
            }
        }
    }

    fn supports_event_callback(&self) -> bool {
        true
    }

    fn register_event_callback(&self, iface: &str, callback: Arc<dyn ApEventCallback>) -> bool {
        // Registration is local; the event stream already carries every
        // interface's events.
        self.shared
            .callbacks()
            .insert(iface.to_string(), callback);
        debug!("event callback registered for {iface}");
        true
    }

    fn register_death_handler(&self, handler: Arc<dyn DeathHandler>) -> bool {
        let mut watch = self.shared.watch();
        if let Some(old) = watch.take() {
            old.unlink();
        }
        let armed = DeathWatch::link(handler, self.shared.events.clone());
        debug!("death watch armed (cookie {})", armed.cookie());
        *watch = Some(armed);
        true
    }

    fn deregister_death_handler(&self) -> bool {
        match self.shared.watch().take() {
            Some(watch) => watch.unlink(),
            None => error!("no death watch armed"),
        }
        true
    }

    fn death_cookie(&self) -> Option<DeathCookie> {
        self.shared.watch().as_ref().map(|w| w.cookie())
    }

    fn is_initialization_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn is_initialization_complete(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn start_daemon(&self) -> bool {
        // Connecting is the nudge: a socket-activated daemon starts on the
        // first accepted connection.
        match self.block_on(client::api_get::<StatusResponse>(
            &self.socket_path,
            "/v1/status",
        )) {
            Ok(status) => {
                info!("apd {} is up", status.version);
                true
            }
            Err(err) => {
                error!("daemon start nudge failed: {err:#}");
                false
            }
        }
    }

    fn enable_verbose_logging(&self, verbose: bool) {
        if !self.shared.connected.load(Ordering::SeqCst) {
            return;
        }
        let request = LogLevelRequest { verbose };
        if let Err(err) = self.block_on(client::api_put(
            &self.socket_path,
            "/v1/log-level",
            &request,
        )) {
            debug!("daemon ignored log level request: {err:#}");
        }
    }

    fn terminate(&self) {
        if self.shared.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(watch) = self.shared.watch().take() {
            watch.unlink();
        }
        if let Some(handle) = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        self.shared.listeners.clear();
        self.shared.callbacks().clear();
        self.shared.connected.store(false, Ordering::SeqCst);
        debug!("http-api backend terminated");
    }

    fn dump(&self, w: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(w, "backend: {}", Self::NAME)?;
        writeln!(w, "  socket: {}", self.socket_path.display())?;
        writeln!(
            w,
            "  init started/complete: {}/{}",
            self.is_initialization_started(),
            self.is_initialization_complete()
        )?;
        writeln!(
            w,
            "  armed failure listeners: {:?}",
            self.shared.listeners.armed_ifaces()
        )?;
        match self.death_cookie() {
            Some(cookie) => writeln!(w, "  death watch: armed ({cookie})"),
            None => writeln!(w, "  death watch: none"),
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}

impl fmt::Debug for HttpApiBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpApiBackend")
            .field("socket_path", &self.socket_path)
            .field("started", &self.started.load(Ordering::SeqCst))
            .field("connected", &self.shared.connected.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_is_false_for_missing_socket() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(!HttpApiBackend::service_declared(
            &dir.path().join("api.sock")
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn death_watch_replaces_on_reregister() {
        let backend = HttpApiBackend::new(PathBuf::from("/nonexistent"), EventContext::current());
        assert_eq!(backend.death_cookie(), None);

        assert!(backend.register_death_handler(Arc::new(|_cookie: DeathCookie| {})));
        let first = backend.death_cookie().expect("armed");

        assert!(backend.register_death_handler(Arc::new(|_cookie: DeathCookie| {})));
        let second = backend.death_cookie().expect("armed");
        assert_ne!(first, second);

        assert!(backend.deregister_death_handler());
        assert_eq!(backend.death_cookie(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dump_names_the_transport() {
        let backend = HttpApiBackend::new(PathBuf::from("/run/apd/api.sock"), EventContext::current());
        let mut out = String::new();
        backend.dump(&mut out).expect("dump");
        assert!(out.contains("backend: http-api"));
        assert!(out.contains("init started/complete: false/false"));
    }
}
