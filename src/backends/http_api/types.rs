//! Request/response types for the daemon's HTTP API

use serde::{Deserialize, Serialize};

use crate::backends::types::{ApParameters, DisconnectReason, MacAddr};

/// Start an access point on an interface
/// API: PUT /v1/aps/{iface}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartApRequest {
    /// Radio and security configuration plus optional vendor bundle
    #[serde(flatten)]
    pub params: ApParameters,

    /// Advertise the network as metered
    pub metered: bool,
}

/// Deauthenticate one client
/// API: PUT /v1/aps/{iface}/disconnect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectRequest {
    pub client: MacAddr,
    pub reason: DisconnectReason,
}

/// Set the daemon log level
/// API: PUT /v1/log-level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLevelRequest {
    pub verbose: bool,
}

/// Daemon status handshake
/// API: GET /v1/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Daemon version string
    pub version: String,
}

/// Error payload the daemon attaches to rejected requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonFault {
    /// Human-readable description of what the daemon objected to
    pub fault_message: String,
}
