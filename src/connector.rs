//! Owns the control channel and its lifecycle.
//!
//! ```text
//! Uninitialized -> Connecting -> Connected <-> Degraded
//!                      |                         |
//!                      +--> Degraded (fallback) -+--> Closed
//! ```
//!
//! Opening walks the candidate backends in preference order. A channel-level
//! failure during any operation marks the connector degraded; the next caller
//! asking for the backend gets a freshly reopened one, the same kind first.

use std::fmt;

use tracing::{info, warn};

use crate::backend::{BackendKind, BackendOpener, WifiBackend};
use crate::config::BackendPreference;
use crate::error::{WifiError, WifiResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Uninitialized,
    Connecting,
    Connected,
    Degraded,
    Closed,
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Degraded => "degraded",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Backends to try, most preferred first.
pub fn candidates(preference: BackendPreference, fallback: bool) -> Vec<BackendKind> {
    let order = match preference {
        BackendPreference::Auto | BackendPreference::Supplicant => {
            [BackendKind::Supplicant, BackendKind::NetworkManager]
        }
        BackendPreference::NetworkManager => {
            [BackendKind::NetworkManager, BackendKind::Supplicant]
        }
    };
    let take = if fallback { 2 } else { 1 };
    order.into_iter().take(take).collect()
}

pub struct Connector {
    opener: Box<dyn BackendOpener>,
    candidates: Vec<BackendKind>,
    state: ConnectorState,
    backend: Option<Box<dyn WifiBackend>>,
    /// Kind of the most recently opened backend, retried first on reopen.
    last_kind: Option<BackendKind>,
}

impl Connector {
    pub fn new(opener: Box<dyn BackendOpener>, preference: BackendPreference, fallback: bool) -> Self {
        Self {
            opener,
            candidates: candidates(preference, fallback),
            state: ConnectorState::Uninitialized,
            backend: None,
            last_kind: None,
        }
    }

    pub fn state(&self) -> ConnectorState {
        self.state
    }

    pub fn kind(&self) -> Option<BackendKind> {
        self.backend.as_ref().map(|b| b.kind())
    }

    /// Open the first reachable backend.
    ///
    /// Fails with [`WifiError::Connection`] listing every cause when none is.
    pub async fn open(&mut self) -> WifiResult<()> {
        if self.state == ConnectorState::Closed {
            return Err(WifiError::Connection("connector is closed".to_string()));
        }

        let mut order = self.candidates.clone();
        if let Some(pos) = self
            .last_kind
            .and_then(|kind| order.iter().position(|k| *k == kind))
        {
            let kind = order.remove(pos);
            order.insert(0, kind);
        }

        if let Some(old) = self.backend.take() {
            old.close().await;
        }

        let mut causes = Vec::new();
        for kind in order {
            if !causes.is_empty() {
                warn!("Falling back to {}", kind);
            }
            self.state = ConnectorState::Connecting;

            match self.opener.open(kind).await {
                Ok(backend) => {
                    info!("Control channel open via {}", kind);
                    self.backend = Some(backend);
                    self.last_kind = Some(kind);
                    self.state = ConnectorState::Connected;
                    return Ok(());
                }
                Err(e) => {
                    warn!("{} unavailable: {}", kind, e);
                    causes.push(format!("{}: {}", kind, e));
                    self.state = ConnectorState::Degraded;
                }
            }
        }

        self.state = ConnectorState::Degraded;
        Err(WifiError::Connection(if causes.is_empty() {
            "no backend configured".to_string()
        } else {
            causes.join("; ")
        }))
    }

    /// The live backend, reopening the channel first if it was lost.
    pub async fn backend(&mut self) -> WifiResult<&dyn WifiBackend> {
        match self.state {
            ConnectorState::Closed => {
                return Err(WifiError::Connection("connector is closed".to_string()));
            }
            ConnectorState::Connected => {}
            _ => {
                info!("Reopening control channel ({})", self.state);
                self.open().await?;
            }
        }

        self.backend
            .as_deref()
            .ok_or_else(|| WifiError::Connection("no open backend".to_string()))
    }

    /// Record the outcome of an operation on the backend.
    pub fn observe<T>(&mut self, result: &WifiResult<T>) {
        match result {
            Err(e) if e.is_channel_failure() && self.state == ConnectorState::Connected => {
                warn!("Control channel failed: {}", e);
                self.state = ConnectorState::Degraded;
            }
            Ok(_) if self.state == ConnectorState::Degraded && self.backend.is_some() => {
                self.state = ConnectorState::Connected;
            }
            _ => {}
        }
    }

    pub async fn close(&mut self) {
        if let Some(backend) = self.backend.take() {
            backend.close().await;
        }
        if self.state != ConnectorState::Closed {
            info!("Control channel closed");
        }
        self.state = ConnectorState::Closed;
    }
}
