//! WiFi profile and radio management.
//!
//! Saved and connected profile listings, connect / disconnect / forget, and
//! radio toggling. Each mutation returns only after the backend has
//! acknowledged it, and refreshes the saved-profile snapshot afterwards.
//!
//! # Example
//!
//! ```no_run
//! # async fn run(manager: &wifid::WifiManager) -> wifid::WifiResult<()> {
//! // Connect to a network
//! manager.connect("MyNetwork", "password123").await?;
//!
//! // Check status
//! let status = manager.status().await?;
//! println!("IP: {:?}", status.ip_address);
//!
//! // Disconnect, which also disables autoconnect for the profile
//! manager.disconnect("MyNetwork").await?;
//! # Ok(())
//! # }
//! ```

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::StatusCache;
use crate::error::{WifiError, WifiResult};
use crate::manager::{Inner, WifiManager};
use crate::scan::truncate_ssid;
use crate::types::{ConnectedNetwork, NetworkStatus, SavedNetwork};

/// Fetch the saved list and replace the cached snapshot.
///
/// When the backend fails the previous snapshot is served instead, if any.
async fn refresh_saved(inner: &mut Inner) -> WifiResult<Vec<SavedNetwork>> {
    let result = match inner.connector.backend().await {
        Ok(backend) => backend.list_saved().await,
        Err(e) => Err(e),
    };
    inner.connector.observe(&result);

    match result {
        Ok(saved) => {
            inner.cache.replace_saved(saved.clone());
            Ok(saved)
        }
        Err(e) => match inner.cache.saved() {
            Some(cached) => {
                warn!("Listing saved networks failed, serving cached list: {}", e);
                Ok(cached.to_vec())
            }
            None => {
                warn!("Listing saved networks failed: {}", e);
                Err(e)
            }
        },
    }
}

async fn read_radio(inner: &mut Inner) -> WifiResult<bool> {
    let result = match inner.connector.backend().await {
        Ok(backend) => backend.radio_enabled().await,
        Err(e) => Err(e),
    };
    inner.connector.observe(&result);
    result
}

/// Add live link attributes to a connected profile.
///
/// The access point is the profile's own BSSID, or the one from `status`
/// when the interface is on this SSID. Security and signal come from the
/// cached scan entry for that BSSID; frequency falls back to `status`.
pub fn enrich(
    mut profile: SavedNetwork,
    status: Option<&NetworkStatus>,
    cache: &StatusCache,
) -> ConnectedNetwork {
    let live = status.filter(|s| s.is_associated_with(&profile.ssid));

    if profile.bssid.is_empty() {
        if let Some(bssid) = live.and_then(|s| s.bssid.clone()) {
            profile.bssid = bssid;
        }
    }

    let scanned = (!profile.bssid.is_empty())
        .then(|| cache.scanned_by_bssid(&profile.bssid))
        .flatten();

    ConnectedNetwork {
        frequency: scanned
            .map(|n| n.frequency)
            .or_else(|| live.and_then(|s| s.frequency)),
        secure_flags: scanned.map(|n| n.secure_flags.clone()),
        secure: scanned.map(|n| n.secure),
        signal_strength: scanned.map(|n| n.signal_strength),
        profile,
    }
}

impl WifiManager {
    /// Profiles the backend has persisted.
    ///
    /// # Returns
    /// - `Ok(Vec<SavedNetwork>)`, from the cache if the backend is failing
    /// - `Err` only if the backend fails and nothing was ever cached
    pub async fn list_saved(&self) -> WifiResult<Vec<SavedNetwork>> {
        let mut inner = self.inner.lock().await;
        refresh_saved(&mut inner).await
    }

    /// Saved profiles the interface is associated with right now.
    ///
    /// Normally zero or one; more are passed through as reported.
    pub async fn list_connected(&self) -> WifiResult<Vec<ConnectedNetwork>> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let connected: Vec<SavedNetwork> = refresh_saved(inner)
            .await?
            .into_iter()
            .filter(|n| n.connected)
            .collect();
        if connected.is_empty() {
            return Ok(Vec::new());
        }

        let result = match inner.connector.backend().await {
            Ok(backend) => backend.status().await,
            Err(e) => Err(e),
        };
        inner.connector.observe(&result);
        let status = match result {
            Ok(status) => Some(status),
            Err(e) => {
                debug!("No live status for enrichment: {}", e);
                None
            }
        };

        Ok(connected
            .into_iter()
            .map(|profile| enrich(profile, status.as_ref(), &inner.cache))
            .collect())
    }

    /// Connects the interface to `ssid`, creating or replacing its profile.
    ///
    /// An empty `password` means an open network.
    ///
    /// # Returns
    /// - `Ok(())` once the backend reports the association complete
    /// - `Err(WifiError::Connect)` on authentication failure, unknown SSID or
    ///   a rejected command
    /// - `Err(WifiError::Timeout)` if association did not finish in time
    pub async fn connect(&self, ssid: &str, password: &str) -> WifiResult<()> {
        if ssid.trim().is_empty() {
            return Err(WifiError::Connect("SSID must not be empty".to_string()));
        }

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        info!("Connecting {} to {}", self.interface, ssid);

        let result = match inner.connector.backend().await {
            Ok(backend) => backend.connect(ssid, password).await,
            Err(e) => Err(e),
        };
        inner.connector.observe(&result);

        if let Err(e) = result {
            warn!("Connecting to {} failed: {}", ssid, e);
            return Err(e.into_operation(WifiError::Connect));
        }

        if let Err(e) = refresh_saved(inner).await {
            debug!("Saved list not refreshed after {}: {}", ssid, e);
        }
        Ok(())
    }

    /// Disconnects from `ssid` and disables autoconnect for its profile so
    /// the interface does not immediately re-associate.
    ///
    /// Disconnecting from a network that is not connected, or not saved at
    /// all, succeeds.
    pub async fn disconnect(&self, ssid: &str) -> WifiResult<()> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        info!("Disconnecting {} from {}", self.interface, ssid);

        let result = match inner.connector.backend().await {
            Ok(backend) => backend.disconnect(ssid).await,
            Err(e) => Err(e),
        };
        inner.connector.observe(&result);

        if let Err(e) = result {
            warn!("Disconnecting from {} failed: {}", ssid, e);
            return Err(e.into_operation(WifiError::Disconnect));
        }

        if let Err(e) = refresh_saved(inner).await {
            debug!("Saved list not refreshed after {}: {}", ssid, e);
        }
        Ok(())
    }

    /// Removes every saved profile for `ssid`. Idempotent.
    pub async fn forget(&self, ssid: &str) -> WifiResult<()> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        info!("Forgetting {}", ssid);

        let result = match inner.connector.backend().await {
            Ok(backend) => backend.forget(ssid).await,
            Err(e) => Err(e),
        };
        inner.connector.observe(&result);

        if let Err(e) = result {
            warn!("Forgetting {} failed: {}", ssid, e);
            return Err(e.into_operation(WifiError::Forget));
        }

        if let Err(e) = refresh_saved(inner).await {
            debug!("Saved list not refreshed after {}: {}", ssid, e);
        }
        Ok(())
    }

    /// Turns the radio on or off and reports the state actually observed.
    ///
    /// The request is skipped when the radio is already in the wanted state.
    /// Otherwise the state is polled until it matches or the settle window
    /// closes; the radio command can silently do nothing, so the result may
    /// differ from `enable`.
    pub async fn toggle_radio(&self, enable: bool) -> WifiResult<bool> {
        let mut inner = self.inner.lock().await;

        let current = read_radio(&mut inner)
            .await
            .map_err(|e| e.into_operation(WifiError::Toggle))?;
        if current == enable {
            debug!("Radio already {}", if enable { "on" } else { "off" });
            return Ok(current);
        }

        let result = match inner.connector.backend().await {
            Ok(backend) => backend.set_radio(enable).await,
            Err(e) => Err(e),
        };
        inner.connector.observe(&result);
        result.map_err(|e| e.into_operation(WifiError::Toggle))?;

        let deadline = Instant::now() + self.timeouts.radio_settle();
        let mut observed = current;
        loop {
            tokio::time::sleep(self.timeouts.poll_interval()).await;

            match read_radio(&mut inner).await {
                Ok(state) => observed = state,
                Err(e) => debug!("Radio state read failed while settling: {}", e),
            }
            if observed == enable {
                info!("Radio {}", if enable { "on" } else { "off" });
                return Ok(observed);
            }
            if Instant::now() >= deadline {
                warn!(
                    "Radio did not settle to {} within {:?}",
                    if enable { "on" } else { "off" },
                    self.timeouts.radio_settle()
                );
                return Ok(observed);
            }
        }
    }
}

/// Displays connection status information in a human-readable format.
///
/// # Output Format
/// ```text
/// Interface: wlan0
/// State:     COMPLETED
/// Connected: HomeNet (11:22:33:44:55:66, 2437 MHz)
/// Security:  WPA2-PSK
/// IP:        192.168.1.23
/// MAC:       dc:a6:32:00:11:22
/// ```
pub fn display_status(interface: &str, status: &NetworkStatus) {
    println!("Interface: {}", interface);
    println!("State:     {}", status.supplicant_state);

    match (&status.ssid, &status.bssid) {
        (Some(ssid), Some(bssid)) => match status.frequency {
            Some(freq) => println!("Connected: {} ({}, {} MHz)", ssid, bssid, freq),
            None => println!("Connected: {} ({})", ssid, bssid),
        },
        (Some(ssid), None) => println!("Connected: {}", ssid),
        _ => println!("Connected: (none)"),
    }

    if let Some(ref key_mgmt) = status.key_management {
        println!("Security:  {}", key_mgmt);
    }
    if let Some(ref ip) = status.ip_address {
        println!("IP:        {}", ip);
    }
    if let Some(ref mac) = status.mac_address {
        println!("MAC:       {}", mac);
    }
}

/// Displays saved profiles, marking the connected ones.
pub fn display_saved(networks: &[SavedNetwork]) {
    if networks.is_empty() {
        println!("No saved networks.");
        return;
    }

    println!("{:<38} {:<32} {:<17} {}", "ID", "SSID", "BSSID", "CONNECTED");
    println!("{}", "-".repeat(98));
    for network in networks {
        println!(
            "{:<38} {:<32} {:<17} {}",
            network.network_id,
            truncate_ssid(&network.ssid, 32),
            network.bssid,
            if network.connected { "yes" } else { "" }
        );
    }
}
