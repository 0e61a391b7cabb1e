//! The Wi-Fi control component.
//!
//! A [`WifiManager`] is built once at startup for one interface and shared by
//! whatever serves requests. The connector and the cache sit behind a single
//! async mutex, so backend operations run one at a time in arrival order.
//!
//! Operations are split by concern: scanning lives in [`crate::scan`],
//! profile and radio mutations in [`crate::connection`].

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::backend::{BackendKind, BackendOpener, SystemOpener};
use crate::cache::StatusCache;
use crate::command::{CommandRunner, SystemRunner};
use crate::config::{Config, TimeoutConfig};
use crate::connector::{Connector, ConnectorState};
use crate::error::WifiResult;
use crate::interface::{discover_interfaces, resolve_interface};
use crate::types::NetworkStatus;

/// State guarded by the manager's lock.
pub(crate) struct Inner {
    pub(crate) connector: Connector,
    pub(crate) cache: StatusCache,
}

pub struct WifiManager {
    pub(crate) interface: String,
    pub(crate) timeouts: TimeoutConfig,
    pub(crate) inner: Mutex<Inner>,
}

impl WifiManager {
    /// Discover the interface and open a control channel for it.
    ///
    /// Any failure here is fatal: without an interface and a reachable
    /// backend there is nothing to control.
    pub async fn start(config: &Config) -> WifiResult<Self> {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
        let interfaces = discover_interfaces(runner.as_ref(), config.timeouts.command()).await?;
        let interface = resolve_interface(config.interface(), interfaces)?;
        info!("Using interface {}", interface.name);

        let opener = SystemOpener::with_runner(interface.name.as_str(), config, runner);
        Self::open(interface.name, Box::new(opener), config).await
    }

    /// Open a manager for a known interface with the given opener.
    pub async fn open(
        interface: impl Into<String>,
        opener: Box<dyn BackendOpener>,
        config: &Config,
    ) -> WifiResult<Self> {
        let mut connector = Connector::new(opener, config.backend.preferred, config.backend.fallback);
        connector.open().await?;

        Ok(Self {
            interface: interface.into(),
            timeouts: config.timeouts.clone(),
            inner: Mutex::new(Inner {
                connector,
                cache: StatusCache::default(),
            }),
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub async fn backend_kind(&self) -> Option<BackendKind> {
        self.inner.lock().await.connector.kind()
    }

    pub async fn connector_state(&self) -> ConnectorState {
        self.inner.lock().await.connector.state()
    }

    pub async fn status(&self) -> WifiResult<NetworkStatus> {
        let mut inner = self.inner.lock().await;

        let result = match inner.connector.backend().await {
            Ok(backend) => backend.status().await,
            Err(e) => Err(e),
        };
        inner.connector.observe(&result);

        if let Err(e) = &result {
            warn!("Status of {} failed: {}", self.interface, e);
        }
        result
    }

    /// Close the control channel. Later calls fail with a connection error.
    pub async fn shutdown(&self) {
        self.inner.lock().await.connector.close().await;
    }
}
