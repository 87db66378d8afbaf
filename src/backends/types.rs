// ============================================================================
// File: src/backends/types.rs
// ----------------------------------------------------------------------------
// Shared backend data types: addresses, reasons, event surfaces, and the
// per-interface failure listener registry.
// ============================================================================

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::config::AccessPointConfig;
use crate::vendor::VendorIfaceParams;

/// IEEE 802 MAC address.
///
/// Serializes as the usual colon-separated hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({self})")
    }
}

/// Error from parsing a textual MAC address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid MAC address '{input}'")]
pub struct MacAddrParseError {
    input: String,
}

impl FromStr for MacAddr {
    type Err = MacAddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || MacAddrParseError {
            input: s.to_string(),
        };
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in &mut octets {
            let part = parts.next().ok_or_else(bad)?;
            if part.len() != 2 {
                return Err(bad());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| bad())?;
        }
        if parts.next().is_some() {
            return Err(bad());
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = MacAddrParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

/// Reason delivered to a client being deauthenticated.
///
/// Maps onto the IEEE 802.11 reason codes the daemon puts on the air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// No particular reason (code 1).
    Unspecified,
    /// The client's previous authentication is no longer valid (code 2).
    PrevAuthNotValid,
    /// The AP is too loaded to keep serving this client (code 5).
    ApBusy,
}

impl DisconnectReason {
    /// Wire reason code.
    pub fn code(self) -> u16 {
        match self {
            DisconnectReason::Unspecified => 1,
            DisconnectReason::PrevAuthNotValid => 2,
            DisconnectReason::ApBusy => 5,
        }
    }
}

/// Snapshot describing one running AP instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApInfo {
    /// Interface the AP was started on.
    pub iface: String,
    /// Daemon-side instance identifier (differs from `iface` for bridged APs).
    pub instance: String,
    /// Operating frequency in MHz.
    pub freq_mhz: u32,
    /// BSSID the instance is beaconing as.
    pub bssid: MacAddr,
}

/// Callback surface for unsolicited access point events.
///
/// Registered per interface; registering again for the same interface
/// replaces the previous callback. Invocations arrive on the event context,
/// never on a thread that is inside a control operation.
pub trait ApEventCallback: Send + Sync {
    /// The AP instance failed and is no longer serving clients.
    fn on_failure(&self, iface: &str, instance: &str);

    /// Operating parameters of an instance changed.
    fn on_info_changed(&self, info: ApInfo);

    /// A client associated (`connected` true) or disassociated.
    fn on_connected_clients_changed(&self, iface: &str, client: MacAddr, connected: bool);
}

/// One-shot callback armed when an access point is started.
pub type FailureCallback = Box<dyn FnOnce() + Send>;

/// Per-interface registry of armed failure callbacks.
///
/// Armed by `start_access_point`, disarmed by `stop_access_point`, consumed
/// at most once when the daemon reports the interface down.
#[derive(Default)]
pub struct FailureListeners {
    inner: Mutex<HashMap<String, FailureCallback>>,
}

impl FailureListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `callback` for `iface`, replacing any previous one.
    pub fn arm(&self, iface: &str, callback: FailureCallback) {
        self.lock().insert(iface.to_string(), callback);
    }

    /// Drop the listener for `iface` without firing it.
    pub fn disarm(&self, iface: &str) {
        self.lock().remove(iface);
    }

    /// Take the listener for `iface`, if one is armed.
    pub fn take(&self, iface: &str) -> Option<FailureCallback> {
        self.lock().remove(iface)
    }

    /// Drop every armed listener.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Interfaces with a listener currently armed, sorted for stable output.
    pub fn armed_ifaces(&self) -> Vec<String> {
        let mut ifaces: Vec<String> = self.lock().keys().cloned().collect();
        ifaces.sort();
        ifaces
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, FailureCallback>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for FailureListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureListeners")
            .field("armed", &self.armed_ifaces())
            .finish()
    }
}

/// Everything a backend needs to bring up one access point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApParameters {
    /// Caller-supplied radio and security configuration, already validated.
    pub config: AccessPointConfig,
    /// Vendor bundle for the negotiated extension version, when one exists.
    #[serde(default)]
    pub vendor: Option<VendorIfaceParams>,
}
