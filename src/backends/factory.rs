// ============================================================================
// File: src/backends/factory.rs
// ----------------------------------------------------------------------------
// Backend provider list and transport path configuration
// ============================================================================

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::backends::trait_def::ControlBackend;
use crate::event::EventContext;

#[cfg(target_os = "linux")]
use crate::backends::{CtrlSocketBackend, HttpApiBackend};

/// Filesystem locations of the daemon's transports.
///
/// Defaults follow the conventional layout under `/run/apd`. Tests and
/// embedded deployments override them with the `with_*` builders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportPaths {
    /// Unix socket carrying the daemon's HTTP API.
    pub api_socket: PathBuf,
    /// Directory of per-interface legacy control sockets.
    pub ctrl_dir: PathBuf,
    /// Vendor capability manifest, present only on platforms that carry the
    /// vendor extension.
    pub vendor_manifest: PathBuf,
}

impl Default for TransportPaths {
    fn default() -> Self {
        Self {
            api_socket: PathBuf::from("/run/apd/api.sock"),
            ctrl_dir: PathBuf::from("/run/apd/ctrl"),
            vendor_manifest: PathBuf::from("/run/apd/vendor.json"),
        }
    }
}

impl TransportPaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.api_socket = path.into();
        self
    }

    pub fn with_ctrl_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.ctrl_dir = path.into();
        self
    }

    pub fn with_vendor_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.vendor_manifest = path.into();
        self
    }
}

/// One selectable backend transport.
///
/// `declared` is the availability probe: cheap, side-effect-free, no
/// blocking I/O. `create` builds the backend and is only called after the
/// probe reported the transport present.
pub struct ProviderEntry {
    pub name: &'static str,
    pub declared: Box<dyn Fn() -> bool + Send + Sync>,
    pub create: Box<dyn Fn(&EventContext) -> Box<dyn ControlBackend> + Send + Sync>,
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("name", &self.name)
            .finish()
    }
}

/// Build the provider list in fixed preference order: the HTTP API transport
/// first, the legacy control socket as fallback.
///
/// The order is decided here, once; selection never re-ranks it.
#[cfg(target_os = "linux")]
pub fn default_providers(paths: &TransportPaths) -> Vec<ProviderEntry> {
    let api_socket = paths.api_socket.clone();
    let api_socket_create = paths.api_socket.clone();
    let ctrl_dir = paths.ctrl_dir.clone();
    let ctrl_dir_create = paths.ctrl_dir.clone();

    vec![
        ProviderEntry {
            name: HttpApiBackend::NAME,
            declared: Box::new(move || HttpApiBackend::service_declared(&api_socket)),
            create: Box::new(move |events| {
                Box::new(HttpApiBackend::new(api_socket_create.clone(), events.clone()))
            }),
        },
        ProviderEntry {
            name: CtrlSocketBackend::NAME,
            declared: Box::new(move || CtrlSocketBackend::service_declared(&ctrl_dir)),
            create: Box::new(move |events| {
                Box::new(CtrlSocketBackend::new(ctrl_dir_create.clone(), events.clone()))
            }),
        },
    ]
}

/// No transports exist off Linux; the controller reports no backend
/// available rather than failing to compile.
#[cfg(not(target_os = "linux"))]
pub fn default_providers(_paths: &TransportPaths) -> Vec<ProviderEntry> {
    Vec::new()
}
