//! Converts raw backend scan records into [`ScannedNetwork`]s.
//!
//! Capability flags are loosely structured and differ per backend. The
//! supplicant prints bracketed groups (`[WPA2-PSK-CCMP][ESS]`), nmcli prints
//! whitespace separated tokens (`WPA1 WPA2`, `--` for none). Classification is
//! a marker-substring match over the tokens, so token order never matters.

use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use crate::backend::RawNetwork;
use crate::error::{WifiError, WifiResult};
use crate::types::{ScannedNetwork, SecurityType};

const MARKERS: [(&str, SecurityType); 4] = [
    ("WPA", SecurityType::WPA),
    ("WEP", SecurityType::WEP),
    ("WSN", SecurityType::WSN),
    // The supplicant reports WPA3-only networks as RSN
    ("RSN", SecurityType::WSN),
];

/// Split a flag string into its tokens.
fn flag_tokens(flags: &str) -> WifiResult<Vec<&str>> {
    let flags = flags.trim();
    if flags.is_empty() || flags == "--" {
        return Ok(Vec::new());
    }

    if !flags.starts_with('[') {
        return Ok(flags.split_whitespace().collect());
    }

    let mut tokens = Vec::new();
    let mut rest = flags;
    while !rest.is_empty() {
        let inner = rest
            .strip_prefix('[')
            .ok_or_else(|| WifiError::Parse(format!("stray text in flags '{}'", flags)))?;
        let end = inner
            .find(']')
            .ok_or_else(|| WifiError::Parse(format!("unterminated group in flags '{}'", flags)))?;
        tokens.push(&inner[..end]);
        rest = inner[end + 1..].trim_start();
    }

    Ok(tokens)
}

/// Set of security families whose marker appears in `flags`.
pub fn classify_flags(flags: &str) -> WifiResult<BTreeSet<SecurityType>> {
    let mut found = BTreeSet::new();

    for token in flag_tokens(flags)? {
        let token = token.to_ascii_uppercase();
        for (marker, security) in MARKERS {
            if token.contains(marker) {
                found.insert(security);
            }
        }
    }

    Ok(found)
}

/// Normalize one record. Unparseable flags degrade to an insecure record.
pub fn normalize(raw: RawNetwork) -> ScannedNetwork {
    let secure_flags = match classify_flags(&raw.flags) {
        Ok(flags) => flags,
        Err(e) => {
            warn!("Treating {} as insecure: {}", raw.bssid, e);
            BTreeSet::new()
        }
    };

    ScannedNetwork {
        ssid: raw.ssid.filter(|s| !s.is_empty()),
        frequency: raw.frequency,
        secure: !secure_flags.is_empty(),
        secure_flags,
        bssid: raw.bssid,
        signal_strength: raw.signal,
    }
}

/// Normalize a whole scan batch.
///
/// Records are deduplicated by BSSID, keeping the strongest reading, and
/// returned strongest first.
pub fn normalize_all(records: Vec<RawNetwork>) -> Vec<ScannedNetwork> {
    let mut by_bssid: HashMap<String, ScannedNetwork> = HashMap::new();

    for record in records {
        let network = normalize(record);
        let key = network.bssid.to_ascii_lowercase();
        match by_bssid.get(&key) {
            Some(existing) if existing.signal_strength >= network.signal_strength => {}
            _ => {
                by_bssid.insert(key, network);
            }
        }
    }

    let mut networks: Vec<ScannedNetwork> = by_bssid.into_values().collect();
    networks.sort_by(|a, b| {
        b.signal_strength
            .cmp(&a.signal_strength)
            .then_with(|| a.bssid.cmp(&b.bssid))
    });
    networks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(bssid: &str, flags: &str, signal: i32) -> RawNetwork {
        RawNetwork {
            ssid: Some("Net".into()),
            bssid: bssid.into(),
            frequency: 2437,
            signal,
            flags: flags.into(),
        }
    }

    #[test]
    fn wpa2_psk_is_wpa_only() {
        let network = normalize(raw("aa:aa:aa:aa:aa:01", "[WPA2-PSK-CCMP][ESS]", -40));
        assert_eq!(network.secure_flags, BTreeSet::from([SecurityType::WPA]));
        assert!(network.secure);
    }

    #[test]
    fn ess_only_is_open() {
        let network = normalize(raw("aa:aa:aa:aa:aa:02", "[ESS]", -70));
        assert!(network.secure_flags.is_empty());
        assert!(!network.secure);
    }

    #[test]
    fn malformed_flags_are_insecure() {
        for flags in ["[WPA2-PSK-CCMP", "[WEP]]", "[ESS]junk[WEP]"] {
            let network = normalize(raw("aa:aa:aa:aa:aa:03", flags, -60));
            assert!(network.secure_flags.is_empty(), "flags {flags:?}");
            assert!(!network.secure);
        }
    }

    #[test]
    fn empty_and_dashes_are_open() {
        assert!(classify_flags("").unwrap().is_empty());
        assert!(classify_flags("--").unwrap().is_empty());
    }

    #[test]
    fn nmcli_tokens_classify() {
        let flags = classify_flags("WPA1 WPA2 802.1X").unwrap();
        assert_eq!(flags, BTreeSet::from([SecurityType::WPA]));
        assert_eq!(
            classify_flags("WEP").unwrap(),
            BTreeSet::from([SecurityType::WEP])
        );
    }

    #[test]
    fn classification_ignores_token_order() {
        let a = classify_flags("[WEP][RSN-SAE-CCMP][WPA-PSK-TKIP][ESS]").unwrap();
        let b = classify_flags("[ESS][WPA-PSK-TKIP][WEP][RSN-SAE-CCMP]").unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a,
            BTreeSet::from([SecurityType::WPA, SecurityType::WEP, SecurityType::WSN])
        );
    }

    #[test]
    fn empty_ssid_becomes_hidden() {
        let mut record = raw("aa:aa:aa:aa:aa:04", "[ESS]", -50);
        record.ssid = Some(String::new());
        assert_eq!(normalize(record).ssid, None);
    }

    #[test]
    fn batch_keeps_bad_records_and_dedups_by_bssid() {
        let networks = normalize_all(vec![
            raw("aa:aa:aa:aa:aa:01", "[WPA2-PSK-CCMP][ESS]", -70),
            raw("AA:AA:AA:AA:AA:01", "[WPA2-PSK-CCMP][ESS]", -40),
            raw("aa:aa:aa:aa:aa:02", "[broken", -55),
            raw("aa:aa:aa:aa:aa:03", "[ESS]", -80),
        ]);

        assert_eq!(networks.len(), 3);
        assert_eq!(networks[0].signal_strength, -40);
        assert_eq!(networks[1].bssid, "aa:aa:aa:aa:aa:02");
        assert!(!networks[1].secure);
        assert_eq!(networks[2].bssid, "aa:aa:aa:aa:aa:03");
    }

    #[test]
    fn same_ssid_different_bssid_are_kept() {
        let networks = normalize_all(vec![
            raw("aa:aa:aa:aa:aa:01", "[ESS]", -40),
            raw("aa:aa:aa:aa:aa:02", "[ESS]", -41),
        ]);
        assert_eq!(networks.len(), 2);
    }
}
