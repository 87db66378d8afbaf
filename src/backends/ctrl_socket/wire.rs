// ============================================================================
// File: src/backends/ctrl_socket/wire.rs
// ----------------------------------------------------------------------------
// Text protocol primitives for the legacy control socket.
//
// Requests are single lines; the daemon answers `OK`, `FAIL <reason>` or
// `PONG`. Attached clients additionally receive unsolicited one-liners
// framed with a syslog-style priority prefix, e.g. `<3>AP-DISABLED wlan1`.
// ============================================================================

use crate::backends::errors::{BackendError, BackendResult};
use crate::backends::types::{ApParameters, DisconnectReason, MacAddr};
use crate::config::ApSecurity;

pub const PING: &str = "PING";
pub const ATTACH: &str = "ATTACH";
pub const DETACH: &str = "DETACH";

/// Encode the ENABLE request bringing up an AP on `iface`.
///
/// SSID and passphrase travel hex-encoded so arbitrary bytes survive the
/// whitespace-tokenized line format.
pub fn enable(iface: &str, params: &ApParameters, metered: bool) -> String {
    let config = &params.config;
    let mut cmd = format!("ENABLE {iface} ssid={}", hex(&config.ssid));
    cmd.push_str(&format!(" band={}", config.band_mask));
    if let Some(channel) = config.channel {
        cmd.push_str(&format!(" chan={channel}"));
    }
    if config.hidden {
        cmd.push_str(" hidden=1");
    }
    cmd.push_str(&format!(" sec={}", config.security.protocol_name()));
    match &config.security {
        ApSecurity::Open | ApSecurity::Owe => {}
        ApSecurity::Wpa2Psk { passphrase }
        | ApSecurity::Wpa3Sae { passphrase }
        | ApSecurity::Wpa3SaeTransition { passphrase } => {
            cmd.push_str(&format!(" pass={}", hex(passphrase.as_bytes())));
        }
    }
    if let Some(country) = &config.country_code {
        cmd.push_str(&format!(" country={country}"));
    }
    if let Some(bridge) = params
        .vendor
        .as_ref()
        .and_then(|v| v.base().bridge_iface.as_deref())
    {
        cmd.push_str(&format!(" bridge={bridge}"));
    }
    if metered {
        cmd.push_str(" metered=1");
    }
    cmd
}

pub fn disable(iface: &str) -> String {
    format!("DISABLE {iface}")
}

pub fn disconnect(iface: &str, client: &MacAddr, reason: DisconnectReason) -> String {
    format!("DISCONNECT {iface} {client} {}", reason.code())
}

pub fn log_level(verbose: bool) -> String {
    format!("LOG_LEVEL {}", if verbose { "DEBUG" } else { "INFO" })
}

/// Replies the daemon sends to requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Fail(String),
    Pong,
}

pub fn parse_reply(raw: &str) -> BackendResult<Reply> {
    let raw = raw.trim();
    if raw == "OK" {
        return Ok(Reply::Ok);
    }
    if raw == "PONG" {
        return Ok(Reply::Pong);
    }
    if let Some(reason) = raw.strip_prefix("FAIL") {
        return Ok(Reply::Fail(reason.trim().to_string()));
    }
    Err(BackendError::malformed(raw))
}

/// Unsolicited messages pushed to attached clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unsolicited {
    /// The AP on `iface` went down on its own.
    ApDisabled { iface: String },
    /// The daemon is exiting.
    Terminating,
}

/// Parse an unsolicited line. Lines we do not recognize are `None`; the
/// daemon is free to emit messages newer than this client.
pub fn parse_unsolicited(raw: &str) -> Option<Unsolicited> {
    let body = strip_priority(raw.trim());
    if let Some(rest) = body.strip_prefix("AP-DISABLED") {
        let iface = rest.trim();
        if iface.is_empty() {
            return None;
        }
        return Some(Unsolicited::ApDisabled {
            iface: iface.to_string(),
        });
    }
    if body.starts_with("CTRL-EVENT-TERMINATING") {
        return Some(Unsolicited::Terminating);
    }
    None
}

fn strip_priority(raw: &str) -> &str {
    if let Some(rest) = raw.strip_prefix('<') {
        if let Some(end) = rest.find('>') {
            return &rest[end + 1..];
        }
    }
    raw
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccessPointConfig, BAND_2GHZ, BAND_5GHZ};
    use crate::vendor::{build_iface_params, VendorApiVersion, VendorTuning};

    #[test]
    fn enable_encodes_open_defaults() {
        let params = ApParameters {
            config: AccessPointConfig::new("wlan1", b"ap".to_vec()),
            vendor: None,
        };
        assert_eq!(
            enable("wlan1", &params, false),
            "ENABLE wlan1 ssid=6170 band=1 sec=open"
        );
    }

    #[test]
    fn enable_encodes_everything() {
        let config = AccessPointConfig::new("wlan1", b"ap".to_vec())
            .with_band_mask(BAND_2GHZ | BAND_5GHZ)
            .with_channel(36)
            .with_hidden(true)
            .with_security(crate::config::ApSecurity::Wpa2Psk {
                passphrase: "pw".repeat(4),
            })
            .with_country_code("DE");
        let tuning = VendorTuning::new().with_bridge_iface("br0");
        let vendor = build_iface_params(VendorApiVersion::V1_0, &config, &tuning);
        let params = ApParameters {
            config,
            vendor: Some(vendor),
        };

        let cmd = enable("wlan1", &params, true);
        assert!(cmd.starts_with("ENABLE wlan1 ssid=6170 "));
        assert!(cmd.contains(" band=3"));
        assert!(cmd.contains(" chan=36"));
        assert!(cmd.contains(" hidden=1"));
        assert!(cmd.contains(" sec=wpa2-psk"));
        assert!(cmd.contains(&format!(" pass={}", hex(b"pwpwpwpw"))));
        assert!(cmd.contains(" country=DE"));
        assert!(cmd.contains(" bridge=br0"));
        assert!(cmd.ends_with(" metered=1"));
    }

    #[test]
    fn disconnect_carries_reason_code() {
        let mac = MacAddr::new([2, 0, 0, 0, 0, 1]);
        assert_eq!(
            disconnect("wlan1", &mac, DisconnectReason::ApBusy),
            "DISCONNECT wlan1 02:00:00:00:00:01 5"
        );
    }

    #[test]
    fn replies_parse() {
        assert_eq!(parse_reply("OK\n").unwrap(), Reply::Ok);
        assert_eq!(parse_reply("PONG").unwrap(), Reply::Pong);
        assert_eq!(
            parse_reply("FAIL no such interface").unwrap(),
            Reply::Fail("no such interface".to_string())
        );
        assert!(parse_reply("UNEXPECTED").is_err());
    }

    #[test]
    fn unsolicited_parses_with_and_without_priority() {
        assert_eq!(
            parse_unsolicited("<3>AP-DISABLED wlan1"),
            Some(Unsolicited::ApDisabled {
                iface: "wlan1".to_string()
            })
        );
        assert_eq!(
            parse_unsolicited("AP-DISABLED wlan1"),
            Some(Unsolicited::ApDisabled {
                iface: "wlan1".to_string()
            })
        );
        assert_eq!(
            parse_unsolicited("<3>CTRL-EVENT-TERMINATING"),
            Some(Unsolicited::Terminating)
        );
        assert_eq!(parse_unsolicited("<2>AP-ENABLED wlan1"), None);
        assert_eq!(parse_unsolicited("AP-DISABLED"), None);
    }

    #[test]
    fn log_level_maps_verbose_flag() {
        assert_eq!(log_level(true), "LOG_LEVEL DEBUG");
        assert_eq!(log_level(false), "LOG_LEVEL INFO");
    }
}
