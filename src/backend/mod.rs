//! Backends that drive the host's wireless stack.
//!
//! Two implementations sit behind [`WifiBackend`]: a direct session on the
//! supplicant's control socket, and a fallback that shells out to `nmcli`.
//! Which one is used is decided at startup by the [`crate::connector`].

pub mod nmcli;
pub mod rfkill;
pub mod supplicant;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::command::{CommandRunner, SystemRunner};
use crate::config::{BackendConfig, Config, TimeoutConfig};
use crate::error::WifiResult;
use crate::types::{NetworkStatus, SavedNetwork};

pub use nmcli::NmcliBackend;
pub use supplicant::SupplicantBackend;

/// One access point as reported by a backend, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNetwork {
    pub ssid: Option<String>,
    pub bssid: String,
    pub frequency: u32,
    pub signal: i32,
    /// Capability flags in the backend's own vocabulary.
    pub flags: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed(Vec<RawNetwork>),
    /// Another scan is already in flight; no fresh results.
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Supplicant,
    NetworkManager,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Supplicant => write!(f, "wpa_supplicant"),
            Self::NetworkManager => write!(f, "NetworkManager"),
        }
    }
}

/// Operations every backend offers for one interface.
///
/// Errors follow one rule: [`crate::WifiError::Connection`] means the
/// channel itself is gone, [`crate::WifiError::Timeout`] means the backend did
/// not answer in time, anything else is an operation failure.
#[async_trait]
pub trait WifiBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn status(&self) -> WifiResult<NetworkStatus>;

    /// Trigger a scan and wait for it to complete.
    async fn scan(&self) -> WifiResult<ScanOutcome>;

    async fn list_saved(&self) -> WifiResult<Vec<SavedNetwork>>;

    /// Associate with `ssid`. Returns once the backend confirms the link.
    async fn connect(&self, ssid: &str, password: &str) -> WifiResult<()>;

    /// Drop the link to `ssid` and stop it from autoconnecting.
    async fn disconnect(&self, ssid: &str) -> WifiResult<()>;

    /// Delete every saved profile for `ssid`. No match is not an error.
    async fn forget(&self, ssid: &str) -> WifiResult<()>;

    async fn radio_enabled(&self) -> WifiResult<bool>;

    async fn set_radio(&self, enable: bool) -> WifiResult<()>;

    /// Release the channel. Further calls may fail.
    async fn close(&self) {}
}

/// Opens a backend of the requested kind.
#[async_trait]
pub trait BackendOpener: Send + Sync {
    async fn open(&self, kind: BackendKind) -> WifiResult<Box<dyn WifiBackend>>;
}

/// Opens the real backends for one interface.
pub struct SystemOpener {
    interface: String,
    backend: BackendConfig,
    timeouts: TimeoutConfig,
    runner: Arc<dyn CommandRunner>,
}

impl SystemOpener {
    pub fn new(interface: impl Into<String>, config: &Config) -> Self {
        Self::with_runner(interface, config, Arc::new(SystemRunner))
    }

    pub fn with_runner(
        interface: impl Into<String>,
        config: &Config,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            interface: interface.into(),
            backend: config.backend.clone(),
            timeouts: config.timeouts.clone(),
            runner,
        }
    }
}

#[async_trait]
impl BackendOpener for SystemOpener {
    async fn open(&self, kind: BackendKind) -> WifiResult<Box<dyn WifiBackend>> {
        match kind {
            BackendKind::Supplicant => {
                let backend = SupplicantBackend::open(
                    &self.interface,
                    &self.backend,
                    self.timeouts.clone(),
                    self.runner.clone(),
                )
                .await?;
                Ok(Box::new(backend))
            }
            BackendKind::NetworkManager => {
                let backend =
                    NmcliBackend::open(&self.interface, self.timeouts.clone(), self.runner.clone())
                        .await?;
                Ok(Box::new(backend))
            }
        }
    }
}
