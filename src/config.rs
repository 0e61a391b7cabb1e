use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interface to control; auto-discovered when unset.
    pub interface: Option<String>,
    pub log_level: String,
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub timeouts: TimeoutConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: None,
            log_level: "info".to_string(),
            server: ServerConfig::default(),
            backend: BackendConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5050,
        }
    }
}

/// Which backend to try first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BackendPreference {
    /// Supplicant control socket, NetworkManager if that fails
    #[default]
    Auto,
    Supplicant,
    NetworkManager,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub preferred: BackendPreference,
    /// Directory holding the supplicant's per-interface control sockets.
    pub ctrl_dir: PathBuf,
    /// Directory where our own reply sockets are bound.
    pub client_dir: PathBuf,
    /// Fall back to the other backend when the preferred one is unreachable.
    pub fallback: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            preferred: BackendPreference::Auto,
            ctrl_dir: PathBuf::from("/run/wpa_supplicant"),
            client_dir: PathBuf::from("/tmp"),
            fallback: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub command_ms: u64,
    pub scan_secs: u64,
    pub connect_secs: u64,
    pub radio_settle_secs: u64,
    pub poll_interval_ms: u64,
    pub scan_settle_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_ms: 3000,
            scan_secs: 10,
            connect_secs: 30,
            radio_settle_secs: 5,
            poll_interval_ms: 250,
            scan_settle_ms: 500,
        }
    }
}

impl TimeoutConfig {
    pub fn command(&self) -> Duration {
        Duration::from_millis(self.command_ms)
    }

    pub fn scan(&self) -> Duration {
        Duration::from_secs(self.scan_secs)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn radio_settle(&self) -> Duration {
        Duration::from_secs(self.radio_settle_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn scan_settle(&self) -> Duration {
        Duration::from_millis(self.scan_settle_ms)
    }
}

impl Config {
    /// Load from `path`, or from the default location when `None`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Interface override; blank means auto-discover.
    pub fn interface(&self) -> Option<&str> {
        self.interface
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join("wifid").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.server.port, 5050);
        assert_eq!(config.timeouts.command(), Duration::from_secs(3));
        assert_eq!(config.interface(), None);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            interface = "wlan1"
            log_level = "debug"

            [backend]
            preferred = "network-manager"

            [timeouts]
            scan_secs = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.interface(), Some("wlan1"));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.backend.preferred, BackendPreference::NetworkManager);
        assert!(config.backend.fallback);
        assert_eq!(config.timeouts.scan(), Duration::from_secs(4));
        assert_eq!(config.timeouts.connect_secs, 30);
    }

    #[test]
    fn blank_interface_means_auto() {
        let config = Config::parse("interface = \"  \"").unwrap();
        assert_eq!(config.interface(), None);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server]\nport = \"not a number\"\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn missing_file_is_defaults_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.toml"))).unwrap();
        let reparsed = Config::parse(&config.to_toml().unwrap()).unwrap();
        assert_eq!(config, reparsed);
    }
}
