//! NetworkManager backend.
//!
//! Used when the supplicant's control socket is not reachable. Every
//! operation is one or more `nmcli` invocations in terse mode, parsed here.
//!
//! # Requirements
//!
//! - NetworkManager must be installed and running
//! - The `nmcli` command must be available in PATH
//! - The daemon user must be allowed to modify connections

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{BackendKind, RawNetwork, ScanOutcome, WifiBackend};
use crate::command::{CommandOutput, CommandRunner};
use crate::config::TimeoutConfig;
use crate::error::{WifiError, WifiResult};
use crate::types::{NetworkStatus, SavedNetwork};

/// Text nmcli prints when a rescan is refused because one is running.
/// Matched literally; other nmcli versions or locales will not match.
pub const BUSY_MARKER: &str = "Scanning not allowed";

const WIRELESS_TYPE: &str = "802-11-wireless";

/// Split one line of `nmcli -t` output into fields.
///
/// Terse mode separates fields with `:` and escapes literal colons and
/// backslashes inside values as `\:` and `\\`.
pub fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);

    fields
}

/// Undo terse escaping on a single value.
fn unescape(value: &str) -> String {
    split_terse(value).join(":")
}

/// An access point row from `nmcli device wifi list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPoint {
    pub in_use: bool,
    pub network: RawNetwork,
}

/// Parse "2437 MHz" into 2437.
fn parse_frequency(value: &str) -> Option<u32> {
    value.split_whitespace().next()?.parse().ok()
}

/// Parse `nmcli -t -f IN-USE,SSID,BSSID,FREQ,SIGNAL,SECURITY device wifi list`.
///
/// Malformed rows are logged and skipped.
pub fn parse_access_points(stdout: &str) -> Vec<AccessPoint> {
    let mut access_points = Vec::new();

    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let fields = split_terse(line);
        if fields.len() < 6 {
            warn!("Skipping access point row with {} fields: {}", fields.len(), line);
            continue;
        }

        let (Some(frequency), Ok(signal)) =
            (parse_frequency(&fields[3]), fields[4].trim().parse::<i32>())
        else {
            warn!("Skipping access point row with bad frequency or signal: {}", line);
            continue;
        };

        let ssid = fields[1].clone();
        access_points.push(AccessPoint {
            in_use: fields[0].trim() == "*",
            network: RawNetwork {
                ssid: (!ssid.is_empty()).then_some(ssid),
                bssid: fields[2].clone(),
                frequency,
                signal,
                flags: fields[5].clone(),
            },
        });
    }

    access_points
}

/// A saved connection profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub uuid: String,
    pub active: bool,
    pub device: String,
}

/// Parse `nmcli -t -f NAME,UUID,TYPE,ACTIVE,DEVICE connection show`,
/// keeping wireless profiles only.
pub fn parse_profiles(stdout: &str) -> Vec<Profile> {
    stdout
        .lines()
        .filter_map(|line| {
            let fields = split_terse(line);
            if fields.len() < 5 || fields[2] != WIRELESS_TYPE {
                return None;
            }
            Some(Profile {
                name: fields[0].clone(),
                uuid: fields[1].clone(),
                active: fields[3] == "yes",
                device: fields[4].clone(),
            })
        })
        .collect()
}

/// Fields of `nmcli -t device show` we care about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub state: String,
    pub connection: Option<String>,
    pub hwaddr: Option<String>,
    pub ip_address: Option<String>,
}

/// Parse `nmcli -t -f GENERAL.STATE,GENERAL.CONNECTION,GENERAL.HWADDR,IP4.ADDRESS device show`.
///
/// Values are split at the first colon only: MAC addresses contain more.
pub fn parse_device_show(stdout: &str) -> DeviceInfo {
    let mut info = DeviceInfo::default();

    for line in stdout.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = unescape(value.trim());
        let present = (!value.is_empty() && value != "--").then(|| value.clone());

        match key {
            // "100 (connected)" -> "connected"
            "GENERAL.STATE" => {
                info.state = value
                    .split_once('(')
                    .and_then(|(_, rest)| rest.split_once(')'))
                    .map(|(inner, _)| inner.to_string())
                    .unwrap_or(value);
            }
            "GENERAL.CONNECTION" => info.connection = present,
            "GENERAL.HWADDR" => info.hwaddr = present,
            // First address only; drop the prefix length.
            k if k.starts_with("IP4.ADDRESS") && info.ip_address.is_none() => {
                info.ip_address = present.map(|ip| match ip.split_once('/') {
                    Some((addr, _)) => addr.to_string(),
                    None => ip,
                });
            }
            _ => {}
        }
    }

    info
}

/// Controls one interface through `nmcli`.
pub struct NmcliBackend {
    interface: String,
    timeouts: TimeoutConfig,
    runner: Arc<dyn CommandRunner>,
}

impl NmcliBackend {
    /// Verify NetworkManager is running and bind to `interface`.
    ///
    /// # Command Executed
    /// ```bash
    /// nmcli -t -f RUNNING general
    /// ```
    pub async fn open(
        interface: &str,
        timeouts: TimeoutConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> WifiResult<Self> {
        let backend = Self {
            interface: interface.to_string(),
            timeouts,
            runner,
        };

        let output = backend.nmcli(&["-t", "-f", "RUNNING", "general"]).await?;
        if !output.success || output.stdout.trim() != "running" {
            return Err(WifiError::Connection(format!(
                "NetworkManager is not running: {}",
                output.message()
            )));
        }

        info!("Using NetworkManager for {}", interface);
        Ok(backend)
    }

    async fn nmcli(&self, args: &[&str]) -> WifiResult<CommandOutput> {
        self.runner.run("nmcli", args, self.timeouts.command()).await
    }

    async fn access_points(&self) -> WifiResult<Vec<AccessPoint>> {
        let output = self
            .nmcli(&[
                "-t",
                "-f",
                "IN-USE,SSID,BSSID,FREQ,SIGNAL,SECURITY",
                "device",
                "wifi",
                "list",
                "ifname",
                &self.interface,
                "--rescan",
                "no",
            ])
            .await?;

        if !output.success {
            return Err(WifiError::Scan(output.message()));
        }
        Ok(parse_access_points(&output.stdout))
    }

    /// The access point the interface is associated with, if any.
    async fn in_use_access_point(&self) -> Option<RawNetwork> {
        match self.access_points().await {
            Ok(aps) => aps.into_iter().find(|ap| ap.in_use).map(|ap| ap.network),
            Err(e) => {
                debug!("Could not read access points: {}", e);
                None
            }
        }
    }

    async fn profiles(&self) -> WifiResult<Vec<Profile>> {
        let output = self
            .nmcli(&["-t", "-f", "NAME,UUID,TYPE,ACTIVE,DEVICE", "connection", "show"])
            .await?;

        if !output.success {
            return Err(WifiError::Command(output.message()));
        }
        Ok(parse_profiles(&output.stdout))
    }

    async fn profiles_for(&self, ssid: &str) -> WifiResult<Vec<Profile>> {
        Ok(self
            .profiles()
            .await?
            .into_iter()
            .filter(|p| p.name == ssid)
            .collect())
    }

    async fn key_management(&self, connection: &str) -> Option<String> {
        let output = self
            .nmcli(&[
                "-g",
                "802-11-wireless-security.key-mgmt",
                "connection",
                "show",
                "id",
                connection,
            ])
            .await
            .ok()?;

        if !output.success {
            return None;
        }
        let key_mgmt = output.stdout.trim();
        Some(if key_mgmt.is_empty() {
            "NONE".to_string()
        } else {
            key_mgmt.to_string()
        })
    }
}

#[async_trait]
impl WifiBackend for NmcliBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::NetworkManager
    }

    async fn status(&self) -> WifiResult<NetworkStatus> {
        let output = self
            .nmcli(&[
                "-t",
                "-f",
                "GENERAL.STATE,GENERAL.CONNECTION,GENERAL.HWADDR,IP4.ADDRESS",
                "device",
                "show",
                &self.interface,
            ])
            .await?;

        if !output.success {
            return Err(WifiError::Command(output.message()));
        }

        let device = parse_device_show(&output.stdout);
        let key_management = match &device.connection {
            Some(name) => self.key_management(name).await,
            None => None,
        };
        let link = if device.connection.is_some() {
            self.in_use_access_point().await
        } else {
            None
        };

        Ok(NetworkStatus {
            supplicant_state: device.state,
            key_management,
            ip_address: device.ip_address,
            ssid: link.as_ref().and_then(|ap| ap.ssid.clone()),
            mac_address: device.hwaddr,
            bssid: link.as_ref().map(|ap| ap.bssid.clone()),
            frequency: link.map(|ap| ap.frequency),
        })
    }

    /// Ask NetworkManager for a fresh scan, then read its AP list.
    ///
    /// # Commands Executed
    /// ```bash
    /// nmcli device wifi rescan ifname <interface>
    /// nmcli -t -f IN-USE,SSID,BSSID,FREQ,SIGNAL,SECURITY device wifi list ifname <interface> --rescan no
    /// ```
    async fn scan(&self) -> WifiResult<ScanOutcome> {
        let output = self
            .runner
            .run(
                "nmcli",
                &["device", "wifi", "rescan", "ifname", &self.interface],
                self.timeouts.scan(),
            )
            .await?;

        if !output.success {
            let message = output.message();
            if message.contains(BUSY_MARKER) {
                debug!("Rescan refused, scan already in progress");
                return Ok(ScanOutcome::Busy);
            }
            return Err(WifiError::Scan(message));
        }

        // rescan returns once the request is queued, not when results land
        tokio::time::sleep(self.timeouts.scan_settle()).await;

        let networks = self
            .access_points()
            .await?
            .into_iter()
            .map(|ap| ap.network)
            .collect();
        Ok(ScanOutcome::Completed(networks))
    }

    async fn list_saved(&self) -> WifiResult<Vec<SavedNetwork>> {
        let profiles = self.profiles().await?;

        let is_connected = |p: &Profile| p.active && p.device == self.interface;
        let active_bssid = if profiles.iter().any(is_connected) {
            self.in_use_access_point().await.map(|ap| ap.bssid)
        } else {
            None
        };

        Ok(profiles
            .iter()
            .map(|p| {
                let connected = is_connected(p);
                SavedNetwork {
                    network_id: p.uuid.clone(),
                    ssid: p.name.clone(),
                    bssid: if connected {
                        active_bssid.clone().unwrap_or_default()
                    } else {
                        String::new()
                    },
                    connected,
                }
            })
            .collect())
    }

    /// # Command Executed
    /// ```bash
    /// nmcli --wait <secs> device wifi connect <ssid> [password <password>] ifname <interface>
    /// ```
    async fn connect(&self, ssid: &str, password: &str) -> WifiResult<()> {
        let wait = self.timeouts.connect().as_secs().max(1).to_string();
        let mut args = vec!["--wait", wait.as_str(), "device", "wifi", "connect", ssid];
        if !password.is_empty() {
            args.extend(["password", password]);
        }
        args.extend(["ifname", self.interface.as_str()]);

        // nmcli enforces --wait itself; allow a little on top of it
        let timeout = self.timeouts.connect() + self.timeouts.command();
        let output = self.runner.run("nmcli", &args, timeout).await?;

        if !output.success {
            return Err(WifiError::Connect(output.message()));
        }

        info!("Connected {} to {}", self.interface, ssid);
        Ok(())
    }

    /// Disable autoconnect on every profile named `ssid`, then bring the
    /// active one down.
    async fn disconnect(&self, ssid: &str) -> WifiResult<()> {
        let profiles = self.profiles_for(ssid).await?;
        if profiles.is_empty() {
            debug!("No saved profile for {}, nothing to disconnect", ssid);
            return Ok(());
        }

        for profile in &profiles {
            let output = self
                .nmcli(&[
                    "connection",
                    "modify",
                    "uuid",
                    &profile.uuid,
                    "connection.autoconnect",
                    "no",
                ])
                .await?;
            if !output.success {
                return Err(WifiError::Disconnect(output.message()));
            }

            if profile.active {
                let output = self
                    .nmcli(&["connection", "down", "uuid", &profile.uuid])
                    .await?;
                let message = output.message();
                if !output.success && !message.contains("not an active connection") {
                    return Err(WifiError::Disconnect(message));
                }
            }
        }

        info!("Disconnected {} from {}", self.interface, ssid);
        Ok(())
    }

    async fn forget(&self, ssid: &str) -> WifiResult<()> {
        for profile in self.profiles_for(ssid).await? {
            let output = self
                .nmcli(&["connection", "delete", "uuid", &profile.uuid])
                .await?;
            if !output.success {
                return Err(WifiError::Forget(output.message()));
            }
            info!("Deleted profile {} ({})", profile.name, profile.uuid);
        }
        Ok(())
    }

    async fn radio_enabled(&self) -> WifiResult<bool> {
        let output = self.nmcli(&["radio", "wifi"]).await?;
        if !output.success {
            return Err(WifiError::Command(output.message()));
        }

        match output.stdout.trim() {
            "enabled" => Ok(true),
            "disabled" => Ok(false),
            other => Err(WifiError::Parse(format!("unexpected radio state '{}'", other))),
        }
    }

    async fn set_radio(&self, enable: bool) -> WifiResult<()> {
        let state = if enable { "on" } else { "off" };
        let output = self.nmcli(&["radio", "wifi", state]).await?;
        if !output.success {
            return Err(WifiError::Toggle(output.message()));
        }
        Ok(())
    }
}
