//! Wi-Fi control daemon library.
//!
//! Discovers the host's wireless interface, keeps a control channel open to
//! wpa_supplicant (or NetworkManager when the supplicant socket is not
//! reachable), and exposes scan, saved-profile, connect, disconnect, forget
//! and radio operations over a small HTTP API.
//!
//! # Modules
//!
//! - [`backend`] - Supplicant and NetworkManager backends behind one trait
//! - [`cache`] - Last successful scan and saved-profile snapshots
//! - [`command`] - Timeout-bounded external program execution
//! - [`config`] - TOML configuration
//! - [`connection`] - Saved/connected profiles, connect, disconnect, forget, radio
//! - [`connector`] - Control channel lifecycle and backend fallback
//! - [`error`] - Error taxonomy
//! - [`interface`] - Wireless interface discovery
//! - [`manager`] - The [`WifiManager`] component
//! - [`normalize`] - Raw scan records to [`ScannedNetwork`]
//! - [`scan`] - Scanning with busy-backend fallback
//! - [`server`] - HTTP routes
//! - [`types`] - Network models returned to callers
//!
//! # Example Usage
//!
//! ```no_run
//! use wifid::{Config, WifiManager};
//!
//! # async fn run() -> wifid::WifiResult<()> {
//! let manager = WifiManager::start(&Config::default()).await?;
//!
//! for network in manager.scan().await? {
//!     println!("{} {}", network.label(), network.signal_strength);
//! }
//!
//! manager.connect("HomeNet", "password123").await?;
//! # Ok(())
//! # }
//! ```

/// Backends that drive the wireless stack.
/// A direct wpa_supplicant control-socket session and an `nmcli` fallback.
pub mod backend;

/// Last successful scan and saved-profile snapshots, replaced wholesale.
pub mod cache;

/// External program execution with a hard timeout.
pub mod command;

/// Configuration module for daemon settings.
/// Handles reading TOML config files and defaults.
pub mod config;

/// Connection module for saved profiles and radio control.
pub mod connection;

/// Control channel lifecycle and backend fallback.
pub mod connector;

/// Error module defining the library's error taxonomy.
/// Uses `thiserror` for ergonomic error handling.
pub mod error;

/// Interface module for WiFi adapter discovery.
/// Handles listing interfaces, detecting USB adapters, and interface resolution.
pub mod interface;

/// The Wi-Fi control component shared by the CLI and the HTTP server.
pub mod manager;

/// Security classification and deduplication of scan records.
pub mod normalize;

/// Scan module for discovering available WiFi networks.
pub mod scan;

/// Server module exposing the manager over HTTP with Axum.
pub mod server;

/// Network models returned to callers, serialized as camelCase JSON.
pub mod types;

// Re-export the component and its configuration
pub use config::Config;
pub use manager::WifiManager;

// Re-export the error type for library users
pub use error::{WifiError, WifiResult};

// Re-export interface-related items for discovering WiFi adapters
pub use interface::{WifiInterface, discover_interfaces, resolve_interface};

// Re-export the data model
pub use types::{ConnectedNetwork, NetworkStatus, SavedNetwork, ScannedNetwork, SecurityType};
