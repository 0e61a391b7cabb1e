//! Last successful snapshots of scan and saved-profile results.
//!
//! Each snapshot is replaced as a whole on success and left alone on failure,
//! so readers never see a mix of two points in time.

use tracing::debug;

use crate::types::{SavedNetwork, ScannedNetwork};

#[derive(Debug, Clone, Default)]
pub struct StatusCache {
    scan: Option<Vec<ScannedNetwork>>,
    saved: Option<Vec<SavedNetwork>>,
}

impl StatusCache {
    /// `None` until a scan has succeeded at least once.
    pub fn scan(&self) -> Option<&[ScannedNetwork]> {
        self.scan.as_deref()
    }

    pub fn saved(&self) -> Option<&[SavedNetwork]> {
        self.saved.as_deref()
    }

    pub fn replace_scan(&mut self, networks: Vec<ScannedNetwork>) {
        debug!("Scan cache now holds {} network(s)", networks.len());
        self.scan = Some(networks);
    }

    pub fn replace_saved(&mut self, networks: Vec<SavedNetwork>) {
        debug!("Saved cache now holds {} profile(s)", networks.len());
        self.saved = Some(networks);
    }

    /// Cached scan entry for `bssid`, compared case-insensitively.
    pub fn scanned_by_bssid(&self, bssid: &str) -> Option<&ScannedNetwork> {
        self.scan()?
            .iter()
            .find(|n| n.bssid.eq_ignore_ascii_case(bssid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn scanned(bssid: &str) -> ScannedNetwork {
        ScannedNetwork {
            ssid: Some("Net".into()),
            frequency: 2412,
            bssid: bssid.into(),
            secure_flags: BTreeSet::new(),
            secure: false,
            signal_strength: -50,
        }
    }

    #[test]
    fn empty_until_first_success() {
        let cache = StatusCache::default();
        assert!(cache.scan().is_none());
        assert!(cache.saved().is_none());
    }

    #[test]
    fn replacement_is_wholesale() {
        let mut cache = StatusCache::default();
        cache.replace_scan(vec![scanned("aa:00"), scanned("aa:01")]);
        cache.replace_scan(vec![scanned("aa:02")]);

        let bssids: Vec<_> = cache.scan().unwrap().iter().map(|n| n.bssid.as_str()).collect();
        assert_eq!(bssids, ["aa:02"]);
    }

    #[test]
    fn empty_scan_is_still_a_snapshot() {
        let mut cache = StatusCache::default();
        cache.replace_scan(Vec::new());
        assert_eq!(cache.scan().map(|s| s.len()), Some(0));
    }

    #[test]
    fn lookup_ignores_bssid_case() {
        let mut cache = StatusCache::default();
        cache.replace_scan(vec![scanned("AA:BB:CC:DD:EE:FF")]);
        assert!(cache.scanned_by_bssid("aa:bb:cc:dd:ee:ff").is_some());
        assert!(cache.scanned_by_bssid("00:00:00:00:00:00").is_none());
    }
}
