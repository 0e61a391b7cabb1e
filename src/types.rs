//! Canonical network models returned to API callers.
//!
//! Every type serializes as a flat JSON object with camelCase field names.
//! BSSID is the identity of a scanned network; SSID may be absent and is not
//! unique, so it is only used as a key for saved profiles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Security family advertised by an access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SecurityType {
    WPA,
    WEP,
    WSN,
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WPA => write!(f, "WPA"),
            Self::WEP => write!(f, "WEP"),
            Self::WSN => write!(f, "WSN"),
        }
    }
}

/// A network seen in the most recent scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedNetwork {
    /// `None` when the access point hides its SSID.
    pub ssid: Option<String>,
    /// Channel frequency in MHz.
    pub frequency: u32,
    pub bssid: String,
    pub secure_flags: BTreeSet<SecurityType>,
    pub secure: bool,
    /// dBm from the supplicant, 0-100 quality from NetworkManager.
    pub signal_strength: i32,
}

impl ScannedNetwork {
    /// SSID for display; hidden networks fall back to their BSSID.
    pub fn label(&self) -> &str {
        self.ssid.as_deref().unwrap_or(&self.bssid)
    }
}

/// A profile persisted by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedNetwork {
    /// Supplicant network id in decimal, or NetworkManager profile UUID.
    pub network_id: String,
    pub ssid: String,
    /// Empty unless the backend knows the associated access point.
    pub bssid: String,
    pub connected: bool,
}

/// A saved profile that is currently associated, enriched with link attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedNetwork {
    #[serde(flatten)]
    pub profile: SavedNetwork,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure_flags: Option<BTreeSet<SecurityType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_strength: Option<i32>,
}

/// Association state of the active interface.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub supplicant_state: String,
    pub key_management: Option<String>,
    pub ip_address: Option<String>,
    pub ssid: Option<String>,
    pub mac_address: Option<String>,
    pub bssid: Option<String>,
    pub frequency: Option<u32>,
}

impl NetworkStatus {
    pub fn is_associated_with(&self, ssid: &str) -> bool {
        self.ssid.as_deref() == Some(ssid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanned_network_serializes_flat_camel_case() {
        let network = ScannedNetwork {
            ssid: None,
            frequency: 2412,
            bssid: "aa:bb:cc:dd:ee:ff".into(),
            secure_flags: BTreeSet::from([SecurityType::WSN, SecurityType::WPA]),
            secure: true,
            signal_strength: -48,
        };

        let json = serde_json::to_value(&network).unwrap();
        assert_eq!(json["ssid"], serde_json::Value::Null);
        assert_eq!(json["secureFlags"], serde_json::json!(["WPA", "WSN"]));
        assert_eq!(json["signalStrength"], -48);
        assert_eq!(network.label(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn connected_network_flattens_profile() {
        let connected = ConnectedNetwork {
            profile: SavedNetwork {
                network_id: "0".into(),
                ssid: "HomeNet".into(),
                bssid: "11:22:33:44:55:66".into(),
                connected: true,
            },
            frequency: Some(5180),
            secure_flags: None,
            secure: None,
            signal_strength: None,
        };

        let json = serde_json::to_value(&connected).unwrap();
        assert_eq!(json["networkId"], "0");
        assert_eq!(json["connected"], true);
        assert_eq!(json["frequency"], 5180);
        assert!(json.get("secureFlags").is_none());
    }
}
