// ============================================================================
// File: src/backends/ctrl_socket/mod.rs
// ----------------------------------------------------------------------------
// Legacy transport: line-oriented requests over Unix datagram sockets.
//
// One bound socket issues requests against the daemon's global control
// socket; a second one ATTACHes to receive unsolicited messages. The
// transport predates the event stream, so it cannot deliver structured AP
// events, only the AP-DISABLED / TERMINATING one-liners.
// ============================================================================

mod wire;

use std::fmt;
use std::net::Shutdown;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::backends::errors::{BackendError, BackendResult};
use crate::backends::trait_def::ControlBackend;
use crate::backends::types::{
    ApEventCallback, ApParameters, DisconnectReason, FailureCallback, FailureListeners, MacAddr,
};
use crate::death::{DeathCookie, DeathHandler, DeathWatch};
use crate::event::EventContext;

use wire::{Reply, Unsolicited};

const GLOBAL_SOCKET: &str = "global";
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// State shared with the attach thread.
struct Shared {
    listeners: FailureListeners,
    watch: Mutex<Option<Arc<DeathWatch>>>,
    terminated: AtomicBool,
    connected: AtomicBool,
    events: EventContext,
}

impl Shared {
    fn watch(&self) -> MutexGuard<'_, Option<Arc<DeathWatch>>> {
        self.watch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn channel_broken(&self) {
        if self.terminated.load(Ordering::SeqCst) {
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

/// Request half of the channel. One request in flight at a time; the
/// controller's own lock already serializes callers.
struct RequestSocket {
    socket: UnixDatagram,
    global: PathBuf,
}

impl RequestSocket {
    fn open(dir: &Path, global: PathBuf) -> BackendResult<Self> {
        let socket = UnixDatagram::bind(dir.join("req.sock"))?;
        socket.set_read_timeout(Some(REPLY_TIMEOUT))?;
        Ok(Self { socket, global })
    }

    fn request(&self, cmd: &str) -> BackendResult<Reply> {
        self.socket.send_to(cmd.as_bytes(), &self.global)?;
        let mut buf = [0u8; 4096];
        let n = self.socket.recv(&mut buf)?;
        let raw = std::str::from_utf8(&buf[..n])
            .map_err(|_| BackendError::malformed("reply is not UTF-8"))?;
        wire::parse_reply(raw)
    }
}

struct Channel {
    request: RequestSocket,
    attach_socket: Option<UnixDatagram>,
    attach_thread: Option<thread::JoinHandle<()>>,
    _dir: tempfile::TempDir,
}

/// Control backend speaking the legacy datagram protocol.
pub struct CtrlSocketBackend {
    ctrl_dir: PathBuf,
    shared: Arc<Shared>,
    channel: Mutex<Option<Channel>>,
    started: AtomicBool,
}

impl CtrlSocketBackend {
    pub const NAME: &'static str = "ctrl-socket";

    /// Availability probe: the daemon's global control socket exists.
    pub fn service_declared(ctrl_dir: &Path) -> bool {
        ctrl_dir.join(GLOBAL_SOCKET).exists()
    }

    pub fn new(ctrl_dir: PathBuf, events: EventContext) -> Self {
        Self {
            ctrl_dir,
            shared: Arc::new(Shared {
                listeners: FailureListeners::new(),
                watch: Mutex::new(None),
                terminated: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                events,
            }),
            channel: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    fn open_channel(&self) -> BackendResult<Channel> {
        let global = self.ctrl_dir.join(GLOBAL_SOCKET);
        let dir = tempfile::tempdir()?;
        let request = RequestSocket::open(dir.path(), global.clone())?;
        match request.request(wire::PING)? {
            Reply::Pong => {}
            other => {
                return Err(BackendError::malformed(format!(
                    "expected PONG, got {other:?}"
                )));
            }
        }
        // A second socket has to ATTACH for unsolicited messages; losing it
        // only costs failure listeners, not the control channel.
        let (attach_socket, attach_thread) = match self.open_attach(dir.path(), &global) {
            Ok((socket, thread)) => (Some(socket), Some(thread)),
            Err(err) => {
                warn!("attach failed, unsolicited events disabled: {err}");
                (None, None)
            }
        };
        Ok(Channel {
            request,
            attach_socket,
            attach_thread,
            _dir: dir,
        })
    }

    fn open_attach(
        &self,
        dir: &Path,
        global: &Path,
    ) -> BackendResult<(UnixDatagram, thread::JoinHandle<()>)> {
        let socket = UnixDatagram::bind(dir.join("ev.sock"))?;
        socket.set_read_timeout(Some(REPLY_TIMEOUT))?;
        socket.send_to(wire::ATTACH.as_bytes(), global)?;
        let mut buf = [0u8; 256];
        let n = socket.recv(&mut buf)?;
        let raw = std::str::from_utf8(&buf[..n])
            .map_err(|_| BackendError::malformed("reply is not UTF-8"))?;
        match wire::parse_reply(raw)? {
            Reply::Ok => {}
            other => {
                return Err(BackendError::malformed(format!(
                    "expected OK to ATTACH, got {other:?}"
                )));
            }
        }
        // Event receives block until terminate shuts the socket down.
        socket.set_read_timeout(None)?;
        let reader = socket.try_clone()?;
        let shared = self.shared.clone();
        let thread = thread::Builder::new()
            .name("apcon-ctrl-events".to_string())
            .spawn(move || event_loop(reader, shared))?;
        Ok((socket, thread))
    }

    /// Run one request, log any failure, and translate transport loss into
    /// a death notification.
    fn checked_request(&self, op: &'static str, cmd: String) -> bool {
        let guard = self.channel.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(channel) = guard.as_ref() else {
            error!("cannot {op}: ctrl-socket channel is not connected");
            return false;
        };
        match channel.request.request(&cmd) {
            Ok(Reply::Ok) | Ok(Reply::Pong) => true,
            Ok(Reply::Fail(reason)) => {
                error!("daemon rejected {op}: {reason}");
                false
            }
            Err(err) => {
                error!("{op} failed: {err}");
                if matches!(err, BackendError::Io { .. }) {
                    drop(guard);
                    self.shared.channel_broken();
                }
                false
            }
        }
    }
}

/// Blocking receive loop on the attach socket.
///
/// Exits when terminate shuts the socket down, when the daemon announces it
/// is exiting, or on a receive error; the latter two count as death.
fn event_loop(socket: UnixDatagram, shared: Arc<Shared>) {
    let mut buf = [0u8; 4096];
    loop {
        match socket.recv(&mut buf) {
            Ok(0) => {
                if shared.terminated.load(Ordering::SeqCst) {
                    return;
                }
                // Zero-length datagrams are legal; keep listening.
                continue;
            }
            Ok(n) => {
                let raw = String::from_utf8_lossy(&buf[..n]);
                match wire::parse_unsolicited(&raw) {
                    Some(Unsolicited::ApDisabled { iface }) => {
                        info!("daemon reports AP down on {iface}");
                        if let Some(on_failure) = shared.listeners.take(&iface) {
                            shared.events.post(on_failure);
                        }
                    }
                    Some(Unsolicited::Terminating) => {
                        debug!("daemon announced termination");
                        shared.channel_broken();
                        return;
                    }
                    None => debug!("ignoring unsolicited message: {}", raw.trim()),
                }
            }
            Err(err) => {
                if shared.terminated.load(Ordering::SeqCst) {
                    return;
                }
                debug!("attach socket read failed: {err}");
                shared.channel_broken();
                return;
            }
        }
    }
}

impl ControlBackend for CtrlSocketBackend {
    fn initialize(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            error!("ctrl-socket backend initialized twice");
            return false;
        }
        match self.open_channel() {
            Ok(channel) => {
                info!(
                    "connected to apd control socket at {}",
                    self.ctrl_dir.join(GLOBAL_SOCKET).display()
                );
                *self.channel.lock().unwrap_or_else(PoisonError::into_inner) = Some(channel);
                self.shared.connected.store(true, Ordering::SeqCst);
                true
            }
            Err(err) => {
                error!("ctrl-socket initialization failed: {err}");
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
        let cmd = wire::enable(iface, params, metered);
        if self.checked_request("start_access_point", cmd) {
            self.shared.listeners.arm(iface, on_failure);
            debug!("access point started on {iface}");
            true
        } else {
            false
        }
    }

    fn stop_access_point(&self, iface: &str) -> bool {
        if self.checked_request("stop_access_point", wire::disable(iface)) {
            self.shared.listeners.disarm(iface);
            debug!("access point stopped on {iface}");
            true
        } else {
            false
        }
    }

    fn disconnect_client(&self, iface: &str, client: &MacAddr, reason: DisconnectReason) -> bool {
        self.checked_request("disconnect_client", wire::disconnect(iface, client, reason))
    }

    fn supports_event_callback(&self) -> bool {
        false
    }

    fn register_event_callback(&self, iface: &str, _callback: Arc<dyn ApEventCallback>) -> bool {
        debug!("ctrl-socket transport cannot deliver AP events (iface {iface})");
        false
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
        if self.shared.connected.load(Ordering::SeqCst) {
            return self.checked_request("start_daemon", wire::PING.to_string());
        }
        let global = self.ctrl_dir.join(GLOBAL_SOCKET);
        if global.exists() {
            return true;
        }
        match Command::new("apd").arg("-B").arg("-g").arg(&global).spawn() {
            Ok(child) => {
                info!("spawned apd (pid {})", child.id());
                true
            }
            Err(err) => {
                error!("failed to spawn apd: {err}");
                false
            }
        }
    }

    fn enable_verbose_logging(&self, verbose: bool) {
        if !self.shared.connected.load(Ordering::SeqCst) {
            return;
        }
        let guard = self.channel.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(channel) = guard.as_ref() {
            match channel.request.request(&wire::log_level(verbose)) {
                Ok(Reply::Fail(reason)) => debug!("daemon ignored log level request: {reason}"),
                Ok(_) => {}
                Err(err) => debug!("log level request failed: {err}"),
            }
        }
    }

    fn terminate(&self) {
        if self.shared.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(watch) = self.shared.watch().take() {
            watch.unlink();
        }
        let channel = self
            .channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(channel) = channel {
            if let Some(socket) = &channel.attach_socket {
                let _ = socket.send_to(wire::DETACH.as_bytes(), &channel.request.global);
                let _ = socket.shutdown(Shutdown::Both);
            }
            if let Some(thread) = channel.attach_thread {
                let _ = thread.join();
            }
        }
        self.shared.listeners.clear();
        self.shared.connected.store(false, Ordering::SeqCst);
        debug!("ctrl-socket backend terminated");
    }

    fn dump(&self, w: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(w, "backend: {}", Self::NAME)?;
        writeln!(w, "  ctrl dir: {}", self.ctrl_dir.display())?;
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

impl fmt::Debug for CtrlSocketBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CtrlSocketBackend")
            .field("ctrl_dir", &self.ctrl_dir)
            .field("started", &self.started.load(Ordering::SeqCst))
            .field("connected", &self.shared.connected.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_requires_global_socket() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(!CtrlSocketBackend::service_declared(dir.path()));
        std::fs::write(dir.path().join(GLOBAL_SOCKET), b"").expect("touch");
        assert!(CtrlSocketBackend::service_declared(dir.path()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn events_are_unsupported() {
        let dir = tempfile::tempdir().expect("temp dir");
        let backend = CtrlSocketBackend::new(dir.path().to_path_buf(), EventContext::current());
        assert!(!backend.supports_event_callback());

        struct Nop;
        impl ApEventCallback for Nop {
            fn on_failure(&self, _iface: &str, _instance: &str) {}
            fn on_info_changed(&self, _info: crate::backends::ApInfo) {}
            fn on_connected_clients_changed(
                &self,
                _iface: &str,
                _client: MacAddr,
                _connected: bool,
            ) {
            }
        }
        assert!(!backend.register_event_callback("wlan1", Arc::new(Nop)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn terminate_without_channel_is_idempotent() {
        let dir = tempfile::tempdir().expect("temp dir");
        let backend = CtrlSocketBackend::new(dir.path().to_path_buf(), EventContext::current());
        backend.terminate();
        backend.terminate();
        assert!(!backend.is_initialization_complete());
    }
}
