//! WiFi network scanning.
//!
//! # Scanning Process
//!
//! 1. Asks the backend to scan; it returns once results are ready or reports
//!    that another scan is already running
//! 2. Normalizes the raw records (security classification, BSSID dedup)
//! 3. Sorts networks by signal strength (strongest first)
//! 4. Replaces the cached scan snapshot
//!
//! A busy backend is not an error: the last successful snapshot is served
//! instead, or an empty list when there has never been one.
//!
//! # Example
//!
//! ```no_run
//! # async fn run(manager: &wifid::WifiManager) -> wifid::WifiResult<()> {
//! use wifid::scan::display_networks;
//!
//! let networks = manager.scan().await?;
//! display_networks(&networks);
//! # Ok(())
//! # }
//! ```

use tracing::{info, warn};

use crate::backend::ScanOutcome;
use crate::error::{WifiError, WifiResult};
use crate::manager::WifiManager;
use crate::normalize::normalize_all;
use crate::types::ScannedNetwork;

impl WifiManager {
    /// Scans for WiFi networks visible to the managed interface.
    ///
    /// # Returns
    /// - `Ok(Vec<ScannedNetwork>)` sorted by signal, strongest first
    /// - `Err(WifiError::Timeout)` if no results arrived before the scan deadline
    /// - `Err(WifiError::Scan)` if the backend rejected or aborted the scan
    ///
    /// On error the cached snapshot is left untouched.
    pub async fn scan(&self) -> WifiResult<Vec<ScannedNetwork>> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let result = match inner.connector.backend().await {
            Ok(backend) => backend.scan().await,
            Err(e) => Err(e),
        };
        inner.connector.observe(&result);

        match result {
            Ok(ScanOutcome::Completed(records)) => {
                let networks = normalize_all(records);
                info!("Scan on {} found {} network(s)", self.interface, networks.len());
                inner.cache.replace_scan(networks.clone());
                Ok(networks)
            }
            Ok(ScanOutcome::Busy) => {
                let cached = inner.cache.scan().map(<[_]>::to_vec).unwrap_or_default();
                info!("Scanner busy, serving {} cached network(s)", cached.len());
                Ok(cached)
            }
            Err(e) => {
                warn!("Scan on {} failed: {}", self.interface, e);
                Err(e.into_operation(WifiError::Scan))
            }
        }
    }

    /// The last successful scan, without touching the backend.
    pub async fn cached_scan(&self) -> Option<Vec<ScannedNetwork>> {
        self.inner.lock().await.cache.scan().map(<[_]>::to_vec)
    }
}

/// Displays a list of networks in a formatted table.
///
/// # Output Format
/// ```text
/// SSID                             SIGNAL      BSSID             FREQ SECURITY
/// ------------------------------------------------------------------------------
/// MyHomeNetwork                    -42 ████    aa:bb:cc:dd:ee:01 2437 WPA
/// OpenCafe                         -71 ██░░    aa:bb:cc:dd:ee:02 5180
/// ```
pub fn display_networks(networks: &[ScannedNetwork]) {
    if networks.is_empty() {
        println!("No networks found.");
        return;
    }

    println!(
        "{:<32} {:<11} {:<17} {:>4} {}",
        "SSID", "SIGNAL", "BSSID", "FREQ", "SECURITY"
    );
    println!("{}", "-".repeat(78));

    for network in networks {
        let security = network
            .secure_flags
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");

        println!(
            "{:<32} {:>4} {:<6} {:<17} {:>4} {}",
            truncate_ssid(network.label(), 32),
            network.signal_strength,
            signal_to_bar(network.signal_strength),
            network.bssid,
            network.frequency,
            security
        );
    }
}

/// Truncates an SSID to at most `max_len` characters, ending in "..." when cut.
pub(crate) fn truncate_ssid(ssid: &str, max_len: usize) -> String {
    if ssid.chars().count() > max_len {
        let kept: String = ssid.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        ssid.to_string()
    }
}

/// Converts a signal reading to a 4-segment bar.
///
/// Negative values are dBm (supplicant) and are mapped onto 0-100 quality
/// first; non-negative values are already a percentage (NetworkManager).
///
/// - `████` - 80-100%
/// - `███░` - 60-79%
/// - `██░░` - 40-59%
/// - `█░░░` - 20-39%
/// - `░░░░` - below 20%
pub(crate) fn signal_to_bar(signal: i32) -> &'static str {
    let quality = if signal < 0 {
        (2 * (signal + 100)).clamp(0, 100)
    } else {
        signal.min(100)
    };

    match quality {
        80..=100 => "████",
        60..=79 => "███░",
        40..=59 => "██░░",
        20..=39 => "█░░░",
        _ => "░░░░",
    }
}
