//! Radio on/off through `rfkill`, for backends with no radio command of their own.

use std::time::Duration;

use crate::command::CommandRunner;
use crate::error::{WifiError, WifiResult};

/// True when at least one wifi device is neither soft nor hard blocked.
///
/// Input is `rfkill list wifi`:
///
/// ```text
/// 0: phy0: Wireless LAN
///         Soft blocked: no
///         Hard blocked: no
/// ```
pub fn parse_rfkill_list(stdout: &str) -> WifiResult<bool> {
    let mut devices = Vec::new();
    let mut soft = false;
    let mut hard = false;
    let mut in_device = false;

    for line in stdout.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !line.starts_with(char::is_whitespace) {
            if in_device {
                devices.push(!soft && !hard);
            }
            in_device = true;
            soft = false;
            hard = false;
        } else if let Some(value) = trimmed.strip_prefix("Soft blocked:") {
            soft = value.trim() == "yes";
        } else if let Some(value) = trimmed.strip_prefix("Hard blocked:") {
            hard = value.trim() == "yes";
        }
    }
    if in_device {
        devices.push(!soft && !hard);
    }

    if devices.is_empty() {
        return Err(WifiError::Parse("rfkill reported no wifi devices".to_string()));
    }
    Ok(devices.into_iter().any(|enabled| enabled))
}

pub async fn radio_enabled(runner: &dyn CommandRunner, timeout: Duration) -> WifiResult<bool> {
    let output = runner.run("rfkill", &["list", "wifi"], timeout).await?;
    if !output.success {
        return Err(WifiError::Command(output.message()));
    }
    parse_rfkill_list(&output.stdout)
}

pub async fn set_radio(runner: &dyn CommandRunner, enable: bool, timeout: Duration) -> WifiResult<()> {
    let action = if enable { "unblock" } else { "block" };
    let output = runner.run("rfkill", &[action, "wifi"], timeout).await?;
    if !output.success {
        return Err(WifiError::Toggle(output.message()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unblocked_device_is_enabled() {
        let out = "0: phy0: Wireless LAN\n\tSoft blocked: no\n\tHard blocked: no\n";
        assert!(parse_rfkill_list(out).unwrap());
    }

    #[test]
    fn soft_blocked_device_is_disabled() {
        let out = "0: phy0: Wireless LAN\n\tSoft blocked: yes\n\tHard blocked: no\n";
        assert!(!parse_rfkill_list(out).unwrap());
    }

    #[test]
    fn any_enabled_device_counts() {
        let out = "0: phy0: Wireless LAN\n\tSoft blocked: no\n\tHard blocked: yes\n\
                   1: phy1: Wireless LAN\n\tSoft blocked: no\n\tHard blocked: no\n";
        assert!(parse_rfkill_list(out).unwrap());
    }

    #[test]
    fn no_devices_is_a_parse_error() {
        assert!(matches!(parse_rfkill_list(""), Err(WifiError::Parse(_))));
    }
}
