use std::fs;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::backend::nmcli::split_terse;
use crate::command::CommandRunner;
use crate::error::{WifiError, WifiResult};

/// Where the kernel publishes network devices.
pub const SYSFS_NET: &str = "/sys/class/net";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiInterface {
    pub name: String,
    pub state: String,
    pub is_usb: bool,
}

/// List wireless interfaces from a sysfs tree, sorted by name.
///
/// An entry counts as wireless when it has a `wireless` directory or a
/// `phy80211` link. P2P companion devices are skipped.
pub fn list_sysfs_interfaces(root: &Path) -> Vec<WifiInterface> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot read {}: {}", root.display(), e);
            return Vec::new();
        }
    };

    let mut interfaces = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("p2p") {
            continue;
        }

        let dir = root.join(&name);
        if !dir.join("wireless").exists() && !dir.join("phy80211").exists() {
            continue;
        }

        let state = fs::read_to_string(dir.join("operstate"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        interfaces.push(WifiInterface {
            is_usb: is_usb_interface(root, &name),
            name,
            state,
        });
    }

    interfaces.sort_by(|a, b| a.name.cmp(&b.name));
    interfaces
}

/// Parse `nmcli -t -f DEVICE,TYPE,STATE device` output.
pub fn parse_nmcli_devices(stdout: &str, root: &Path) -> Vec<WifiInterface> {
    let mut interfaces = Vec::new();

    for line in stdout.lines() {
        let parts = split_terse(line);
        if parts.len() >= 3 && parts[1] == "wifi" && !parts[0].starts_with("p2p") {
            interfaces.push(WifiInterface {
                is_usb: is_usb_interface(root, &parts[0]),
                name: parts[0].clone(),
                state: parts[2].clone(),
            });
        }
    }

    interfaces
}

/// List wireless interfaces as reported by NetworkManager.
pub async fn list_nmcli_interfaces(
    runner: &dyn CommandRunner,
    timeout: Duration,
) -> WifiResult<Vec<WifiInterface>> {
    let output = runner
        .run("nmcli", &["-t", "-f", "DEVICE,TYPE,STATE", "device"], timeout)
        .await?;

    if !output.success {
        return Err(WifiError::Command(output.message()));
    }

    Ok(parse_nmcli_devices(&output.stdout, Path::new(SYSFS_NET)))
}

/// Check if a network interface is USB-based by examining sysfs
fn is_usb_interface(root: &Path, interface_name: &str) -> bool {
    let device_path = root.join(interface_name).join("device");

    if !device_path.exists() {
        return false;
    }

    // Try to resolve the symlink and check if it contains "usb"
    if let Ok(resolved) = fs::read_link(&device_path) {
        if resolved.to_string_lossy().contains("usb") {
            return true;
        }
    }

    // Alternative: check uevent file for USB
    if let Ok(content) = fs::read_to_string(device_path.join("uevent")) {
        if content.contains("usb") {
            return true;
        }
    }

    false
}

/// Enumerate wireless interfaces: sysfs first, NetworkManager as fallback.
///
/// Fails with [`WifiError::NoInterfaceFound`] when both come back empty.
pub async fn discover_interfaces(
    runner: &dyn CommandRunner,
    timeout: Duration,
) -> WifiResult<Vec<WifiInterface>> {
    discover_interfaces_in(Path::new(SYSFS_NET), runner, timeout).await
}

pub async fn discover_interfaces_in(
    root: &Path,
    runner: &dyn CommandRunner,
    timeout: Duration,
) -> WifiResult<Vec<WifiInterface>> {
    let mut interfaces = list_sysfs_interfaces(root);

    if interfaces.is_empty() {
        debug!("No wireless interfaces in sysfs, asking NetworkManager");
        interfaces = match list_nmcli_interfaces(runner, timeout).await {
            Ok(found) => found,
            Err(e) => {
                debug!("NetworkManager device listing failed: {}", e);
                Vec::new()
            }
        };
    }

    if interfaces.is_empty() {
        return Err(WifiError::NoInterfaceFound);
    }

    info!(
        "Discovered wireless interfaces: {}",
        interfaces
            .iter()
            .map(|i| i.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(interfaces)
}

/// Resolve interface: use provided name or take the first discovered one
pub fn resolve_interface(
    requested: Option<&str>,
    interfaces: Vec<WifiInterface>,
) -> WifiResult<WifiInterface> {
    match requested {
        Some(name) => interfaces
            .into_iter()
            .find(|i| i.name == name)
            .ok_or_else(|| WifiError::InterfaceNotFound(name.to_string())),
        None => interfaces.into_iter().next().ok_or(WifiError::NoInterfaceFound),
    }
}
