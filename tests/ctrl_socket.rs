// ============================================================================
// File: tests/ctrl_socket.rs
// ----------------------------------------------------------------------------
// Integration tests for the legacy control socket transport, run against a
// scripted in-process datagram daemon.
// ============================================================================

#![cfg(target_os = "linux")]

use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use apcon::backends::{
    ApParameters, ControlBackend, CtrlSocketBackend, DisconnectReason, MacAddr, TransportPaths,
};
use apcon::config::AccessPointConfig;
use apcon::controller::{ApdController, ControllerState};
use apcon::death::DeathCookie;
use apcon::event::EventContext;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Scripted stand-in for the daemon's control socket endpoint.
///
/// Binds the global socket inside a fresh temp dir, answers every request
/// synchronously, and records the raw request lines. Unsolicited event lines
/// queued through `emit` are pushed to whichever address last attached.
struct FakeDaemon {
    ctrl_dir: PathBuf,
    requests: Arc<Mutex<Vec<String>>>,
    line_tx: mpsc::Sender<String>,
    _dir: tempfile::TempDir,
}

impl FakeDaemon {
    fn spawn() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let ctrl_dir = dir.path().join("ctrl");
        std::fs::create_dir(&ctrl_dir).expect("ctrl dir");
        let socket = UnixDatagram::bind(ctrl_dir.join("global")).expect("bind global socket");
        socket
            .set_read_timeout(Some(Duration::from_millis(25)))
            .expect("read timeout");

        let requests = Arc::new(Mutex::new(Vec::new()));
        let (line_tx, line_rx) = mpsc::channel();
        let recorded = requests.clone();
        thread::spawn(move || daemon_loop(socket, recorded, line_rx));

        Self {
            ctrl_dir,
            requests,
            line_tx,
            _dir: dir,
        }
    }

    /// Queue an unsolicited event line for the attached client.
    fn emit(&self, line: &str) {
        self.line_tx.send(line.to_string()).expect("daemon alive");
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Wait until the daemon has recorded a request matching `pred`.
    fn wait_for_request(&self, what: &str, pred: impl Fn(&str) -> bool) {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            if self.requests().iter().any(|r| pred(r)) {
                return;
            }
            assert!(Instant::now() < deadline, "daemon never saw {what}");
            thread::sleep(Duration::from_millis(10));
        }
    }
}

fn daemon_loop(
    socket: UnixDatagram,
    requests: Arc<Mutex<Vec<String>>>,
    line_rx: mpsc::Receiver<String>,
) {
    let mut attached: Option<PathBuf> = None;
    let mut buf = [0u8; 4096];
    loop {
        // Flush scripted event lines first so emission order is preserved
        // relative to request handling.
        loop {
            match line_rx.try_recv() {
                Ok(line) => {
                    if let Some(path) = &attached {
                        let _ = socket.send_to(line.as_bytes(), path);
                    }
                }
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => return,
            }
        }

        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(_) => return,
        };
        let request = String::from_utf8_lossy(&buf[..n]).to_string();
        requests.lock().expect("requests lock").push(request.clone());

        let reply = match request.split_whitespace().next().unwrap_or("") {
            "PING" => "PONG",
            "ATTACH" => {
                attached = from.as_pathname().map(|p| p.to_path_buf());
                "OK"
            }
            "DETACH" => {
                attached = None;
                "OK"
            }
            "ENABLE" => {
                if request.starts_with("ENABLE bad ") {
                    "FAIL no such interface"
                } else {
                    "OK"
                }
            }
            "DISABLE" | "DISCONNECT" | "LOG_LEVEL" => "OK",
            _ => "FAIL unknown command",
        };
        if let Some(path) = from.as_pathname() {
            let _ = socket.send_to(reply.as_bytes(), path);
        }
    }
}

/// Control operations block their calling thread, so tests drive them from
/// the test thread and hand the runtime to the event context only.
fn runtime_events() -> (tokio::runtime::Runtime, EventContext) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("runtime");
    let events = EventContext::new(runtime.handle().clone());
    (runtime, events)
}

fn ap_params(iface: &str) -> ApParameters {
    ApParameters {
        config: AccessPointConfig::new(iface, b"it-ap".to_vec()),
        vendor: None,
    }
}

#[test]
fn lifecycle_commands_reach_the_daemon() {
    let daemon = FakeDaemon::spawn();
    let (_rt, events) = runtime_events();
    assert!(CtrlSocketBackend::service_declared(&daemon.ctrl_dir));

    let backend = CtrlSocketBackend::new(daemon.ctrl_dir.clone(), events);
    assert!(!backend.is_initialization_started());
    assert!(backend.initialize());
    assert!(backend.is_initialization_started());
    assert!(backend.is_initialization_complete());
    assert!(!backend.supports_event_callback());

    assert!(backend.start_access_point("wlan1", &ap_params("wlan1"), false, Box::new(|| {})));
    let client = MacAddr::new([0x02, 0, 0, 0, 0, 0x01]);
    assert!(backend.disconnect_client("wlan1", &client, DisconnectReason::ApBusy));
    assert!(backend.stop_access_point("wlan1"));
    backend.enable_verbose_logging(true);
    // Already connected, so this degrades to a liveness ping.
    assert!(backend.start_daemon());

    backend.terminate();
    assert!(!backend.is_initialization_complete());
    daemon.wait_for_request("DETACH", |r| r == "DETACH");

    let requests = daemon.requests();
    assert_eq!(requests.iter().filter(|r| *r == "PING").count(), 2);
    assert!(requests.iter().any(|r| r == "ATTACH"));
    assert!(requests
        .iter()
        .any(|r| r.starts_with("ENABLE wlan1 ssid=") && !r.contains("metered")));
    assert!(requests
        .iter()
        .any(|r| r == "DISCONNECT wlan1 02:00:00:00:00:01 5"));
    assert!(requests.iter().any(|r| r == "DISABLE wlan1"));
    assert!(requests.iter().any(|r| r == "LOG_LEVEL DEBUG"));
}

#[test]
fn daemon_rejection_reports_false() {
    let daemon = FakeDaemon::spawn();
    let (_rt, events) = runtime_events();
    let backend = CtrlSocketBackend::new(daemon.ctrl_dir.clone(), events);
    assert!(backend.initialize());

    assert!(!backend.start_access_point("bad", &ap_params("bad"), false, Box::new(|| {})));
    // A rejected request leaves the channel itself healthy.
    assert!(backend.is_initialization_complete());
    assert!(backend.start_access_point("wlan1", &ap_params("wlan1"), false, Box::new(|| {})));
    backend.terminate();
}

#[test]
fn ap_disabled_fires_failure_listener_once() {
    let daemon = FakeDaemon::spawn();
    let (_rt, events) = runtime_events();
    let backend = CtrlSocketBackend::new(daemon.ctrl_dir.clone(), events);

    let (death_tx, death_rx) = mpsc::channel();
    assert!(backend.register_death_handler(Arc::new(move |cookie: DeathCookie| {
        let _ = death_tx.send(cookie);
    })));
    assert!(backend.initialize());
    let cookie = backend.death_cookie().expect("death watch armed");

    let (fail_tx, fail_rx) = mpsc::channel();
    assert!(backend.start_access_point(
        "wlan1",
        &ap_params("wlan1"),
        false,
        Box::new(move || {
            let _ = fail_tx.send(());
        }),
    ));

    daemon.emit("<3>AP-DISABLED wlan1");
    fail_rx.recv_timeout(TIMEOUT).expect("listener fired");

    // The listener was consumed; a repeat notification has nobody left to
    // tell. The TERMINATING line behind it serves as an ordering fence: once
    // the death handler has run, both earlier lines were processed.
    daemon.emit("<3>AP-DISABLED wlan1");
    daemon.emit("<3>CTRL-EVENT-TERMINATING");
    let died = death_rx.recv_timeout(TIMEOUT).expect("death delivered");
    assert_eq!(died, cookie);
    assert!(fail_rx.try_recv().is_err());
    assert!(death_rx.try_recv().is_err());
    assert!(!backend.is_initialization_complete());
}

#[test]
fn controller_full_stack_over_ctrl_socket() {
    let daemon = FakeDaemon::spawn();
    let (_rt, events) = runtime_events();
    // No HTTP API socket on disk, so selection falls through to the
    // control socket transport.
    let paths = TransportPaths::new()
        .with_api_socket(daemon.ctrl_dir.join("missing-api.sock"))
        .with_ctrl_dir(daemon.ctrl_dir.clone())
        .with_vendor_manifest(daemon.ctrl_dir.join("missing-vendor.json"));
    let controller = ApdController::new(paths, events);

    let (death_tx, death_rx) = mpsc::channel();
    assert!(controller.register_death_handler(Arc::new(move |cookie: DeathCookie| {
        let _ = death_tx.send(cookie);
    })));
    assert!(controller.initialize());
    assert_eq!(controller.state(), ControllerState::Active);
    assert!(!controller.supports_event_callback());
    assert!(controller.vendor_api_version().is_none());

    let config = AccessPointConfig::new("wlan1", b"e2e-ap".to_vec());
    assert!(controller.start_access_point(&config, false, Box::new(|| {})));
    assert!(controller.stop_access_point("wlan1"));

    // Daemon shutdown propagates through the attach thread to the
    // registered handler and resets the controller.
    daemon.emit("<3>CTRL-EVENT-TERMINATING");
    death_rx.recv_timeout(TIMEOUT).expect("death delivered");
    assert_eq!(controller.state(), ControllerState::Uninitialized);

    // The daemon is still there, so the controller can come back.
    assert!(controller.initialize());
    assert_eq!(controller.state(), ControllerState::Active);
    controller.terminate();
    assert_eq!(controller.state(), ControllerState::Terminated);
}
