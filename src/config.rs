// ============================================================================
// File: src/config.rs
// ----------------------------------------------------------------------------
// Access point configuration passed to `start_access_point`.
//
// Validation happens once, up front, before anything is sent to a backend.
// Backends may assume a validated config.
// ============================================================================

use serde::{Deserialize, Serialize};

/// The access point should beacon on the 2.4 GHz band.
pub const BAND_2GHZ: u32 = 1 << 0;
/// The access point should beacon on the 5 GHz band.
pub const BAND_5GHZ: u32 = 1 << 1;
/// The access point should beacon on the 6 GHz band.
pub const BAND_6GHZ: u32 = 1 << 2;

const BAND_MASK_ALL: u32 = BAND_2GHZ | BAND_5GHZ | BAND_6GHZ;

/// Inclusive channel range, used for constrained automatic channel selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRange {
    pub start: u32,
    pub end: u32,
}

impl ChannelRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }
}

/// Link-layer security mode for the access point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ApSecurity {
    /// Open network, no encryption.
    Open,
    /// Opportunistic Wireless Encryption. Encrypted link, no passphrase.
    Owe,
    /// WPA2-PSK (passphrase 8..=63 printable ASCII bytes).
    Wpa2Psk { passphrase: String },
    /// WPA3-SAE only.
    Wpa3Sae { passphrase: String },
    /// WPA3-SAE transition mode (WPA2 + SAE mixed).
    Wpa3SaeTransition { passphrase: String },
}

impl ApSecurity {
    /// Short protocol tag, used in logs and the wire config.
    pub fn protocol_name(&self) -> &'static str {
        match self {
            ApSecurity::Open => "open",
            ApSecurity::Owe => "owe",
            ApSecurity::Wpa2Psk { .. } => "wpa2-psk",
            ApSecurity::Wpa3Sae { .. } => "wpa3-sae",
            ApSecurity::Wpa3SaeTransition { .. } => "wpa3-sae-transition",
        }
    }
}

/// Configuration for one access point interface.
///
/// Build with [`AccessPointConfig::new`] plus the `with_*` helpers, then the
/// controller validates it before handing it to the active backend.
///
/// # Examples
/// ```
/// use apcon::config::{AccessPointConfig, ApSecurity, BAND_5GHZ};
///
/// let config = AccessPointConfig::new("wlan1", b"lab-ap".to_vec())
///     .with_band_mask(BAND_5GHZ)
///     .with_security(ApSecurity::Wpa2Psk { passphrase: "hunter2hunter2".into() });
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPointConfig {
    /// Kernel interface the AP runs on, e.g. `wlan1`.
    pub iface: String,
    /// Raw SSID bytes, 1..=32. Not required to be UTF-8.
    pub ssid: Vec<u8>,
    /// Omit the SSID from beacons.
    #[serde(default)]
    pub hidden: bool,
    /// Bitmask of `BAND_*` constants the AP may use.
    pub band_mask: u32,
    /// Fixed channel. `None` requests automatic channel selection.
    #[serde(default)]
    pub channel: Option<u32>,
    /// Security mode.
    pub security: ApSecurity,
    /// ISO 3166-1 alpha-2 country code for regulatory domain, if known.
    #[serde(default)]
    pub country_code: Option<String>,
}

impl AccessPointConfig {
    /// Create a config with the given interface and SSID, defaulting to an
    /// open 2.4 GHz network with automatic channel selection.
    pub fn new(iface: impl Into<String>, ssid: Vec<u8>) -> Self {
        Self {
            iface: iface.into(),
            ssid,
            hidden: false,
            band_mask: BAND_2GHZ,
            channel: None,
            security: ApSecurity::Open,
            country_code: None,
        }
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn with_band_mask(mut self, band_mask: u32) -> Self {
        self.band_mask = band_mask;
        self
    }

    pub fn with_channel(mut self, channel: u32) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_security(mut self, security: ApSecurity) -> Self {
        self.security = security;
        self
    }

    pub fn with_country_code(mut self, code: impl Into<String>) -> Self {
        self.country_code = Some(code.into());
        self
    }

    /// SSID rendered for logs: UTF-8 if it is, hex otherwise.
    pub fn ssid_display(&self) -> String {
        match std::str::from_utf8(&self.ssid) {
            Ok(s) => s.to_string(),
            Err(_) => {
                let mut out = String::with_capacity(2 + self.ssid.len() * 2);
                out.push_str("0x");
                for b in &self.ssid {
                    out.push_str(&format!("{b:02x}"));
                }
                out
            }
        }
    }

    /// Check structural validity.
    ///
    /// # Returns
    /// `Ok(())` when the config can be handed to a backend, otherwise the
    /// first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iface.is_empty() {
            return Err(ConfigError::EmptyInterface);
        }
        if self.ssid.is_empty() || self.ssid.len() > 32 {
            return Err(ConfigError::InvalidSsidLength {
                len: self.ssid.len(),
            });
        }
        if self.band_mask == 0 || self.band_mask & !BAND_MASK_ALL != 0 {
            return Err(ConfigError::InvalidBandMask {
                mask: self.band_mask,
            });
        }
        if let Some(ch) = self.channel {
            if ch == 0 {
                return Err(ConfigError::InvalidChannel { channel: ch });
            }
        }
        match &self.security {
            ApSecurity::Open | ApSecurity::Owe => {}
            ApSecurity::Wpa2Psk { passphrase }
            | ApSecurity::Wpa3SaeTransition { passphrase } => {
                let len = passphrase.len();
                if !(8..=63).contains(&len) {
                    return Err(ConfigError::InvalidPassphraseLength { len });
                }
            }
            ApSecurity::Wpa3Sae { passphrase } => {
                let len = passphrase.len();
                if !(1..=63).contains(&len) {
                    return Err(ConfigError::InvalidPassphraseLength { len });
                }
            }
        }
        Ok(())
    }
}

/// Problems a config can have before it ever reaches a backend.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("interface name must not be empty")]
    EmptyInterface,

    #[error("SSID must be 1..=32 bytes, got {len}")]
    InvalidSsidLength { len: usize },

    #[error("band mask {mask:#b} has no valid band bits")]
    InvalidBandMask { mask: u32 },

    #[error("channel {channel} is not a valid channel number")]
    InvalidChannel { channel: u32 },

    #[error("passphrase length {len} is outside the allowed range")]
    InvalidPassphraseLength { len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AccessPointConfig {
        AccessPointConfig::new("wlan1", b"test-ap".to_vec())
    }

    #[test]
    fn default_config_is_valid() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn empty_ssid_rejected() {
        let cfg = AccessPointConfig::new("wlan1", Vec::new());
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InvalidSsidLength { len: 0 })
        );
    }

    #[test]
    fn oversized_ssid_rejected() {
        let cfg = AccessPointConfig::new("wlan1", vec![b'x'; 33]);
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InvalidSsidLength { len: 33 })
        );
    }

    #[test]
    fn zero_band_mask_rejected() {
        let cfg = base().with_band_mask(0);
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidBandMask { mask: 0 }));
    }

    #[test]
    fn unknown_band_bits_rejected() {
        let cfg = base().with_band_mask(1 << 7);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidBandMask { .. })
        ));
    }

    #[test]
    fn short_psk_passphrase_rejected() {
        let cfg = base().with_security(ApSecurity::Wpa2Psk {
            passphrase: "short".into(),
        });
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InvalidPassphraseLength { len: 5 })
        );
    }

    #[test]
    fn sae_allows_short_password() {
        let cfg = base().with_security(ApSecurity::Wpa3Sae {
            passphrase: "pw".into(),
        });
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn owe_carries_no_passphrase() {
        let cfg = base().with_security(ApSecurity::Owe);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.security.protocol_name(), "owe");
    }

    #[test]
    fn non_utf8_ssid_renders_as_hex() {
        let cfg = AccessPointConfig::new("wlan1", vec![0xff, 0x00, 0xab]);
        assert_eq!(cfg.ssid_display(), "0xff00ab");
    }
}
