use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use wifid::{
    Config, WifiManager,
    command::SystemRunner,
    config::{self, BackendPreference},
    connection, interface, scan, server,
};

#[derive(Parser)]
#[command(name = "wifid")]
#[command(about = "Control the host's WiFi interface over a small HTTP API")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Interface to use (defaults to the first wireless interface)
    #[arg(short, long, global = true)]
    interface: Option<String>,

    /// Backend to try first
    #[arg(short, long, global = true, value_enum)]
    backend: Option<BackendPreference>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum RadioState {
    On,
    Off,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API daemon
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List available WiFi interfaces
    Interfaces,

    /// Show connection status
    Status,

    /// Scan for WiFi networks
    Scan,

    /// List saved network profiles
    Saved,

    /// List connected network profiles
    Connected,

    /// Connect to a WiFi network
    Connect {
        /// SSID of the network to connect to
        ssid: String,

        /// Password for the network (omit for open networks)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Disconnect from a network and disable its autoconnect
    Disconnect {
        /// SSID of the network to disconnect from
        ssid: String,
    },

    /// Delete a saved network profile
    Forget {
        /// SSID of the profile to delete
        ssid: String,
    },

    /// Turn the WiFi radio on or off
    Radio {
        #[arg(value_enum)]
        state: RadioState,
    },

    /// Show the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = Config::load(cli.config.as_deref())?;
    if let Some(interface) = cli.interface {
        cfg.interface = Some(interface);
    }
    if let Some(backend) = cli.backend {
        cfg.backend.preferred = backend;
    }
    init_tracing(&cfg, cli.debug);

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                cfg.server.port = port;
            }
            cmd_serve(&cfg).await
        }
        Commands::Interfaces => cmd_interfaces(&cfg).await,
        Commands::Status => cmd_status(&cfg).await,
        Commands::Scan => cmd_scan(&cfg).await,
        Commands::Saved => cmd_saved(&cfg).await,
        Commands::Connected => cmd_connected(&cfg).await,
        Commands::Connect { ssid, password } => {
            cmd_connect(&cfg, &ssid, password.as_deref().unwrap_or_default()).await
        }
        Commands::Disconnect { ssid } => cmd_disconnect(&cfg, &ssid).await,
        Commands::Forget { ssid } => cmd_forget(&cfg, &ssid).await,
        Commands::Radio { state } => cmd_radio(&cfg, matches!(state, RadioState::On)).await,
        Commands::ShowConfig => cmd_show_config(&cfg, cli.config),
    }
}

/// `RUST_LOG` wins; otherwise `--debug`, then the configured level.
fn init_tracing(cfg: &Config, debug: bool) {
    let fallback = if debug { "debug" } else { cfg.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn start(cfg: &Config) -> Result<WifiManager> {
    WifiManager::start(cfg)
        .await
        .context("Failed to initialise Wi-Fi control")
}

async fn cmd_serve(cfg: &Config) -> Result<()> {
    let manager = Arc::new(start(cfg).await?);

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        server::shutdown_signal().await;
        trigger.cancel();
    });

    server::run_server(manager, &cfg.server, shutdown).await
}

async fn cmd_interfaces(cfg: &Config) -> Result<()> {
    let interfaces = interface::discover_interfaces(&SystemRunner, cfg.timeouts.command()).await?;

    println!("{:<16} {:<12} {}", "INTERFACE", "STATE", "TYPE");
    println!("{}", "-".repeat(40));

    for iface in interfaces {
        let iface_type = if iface.is_usb { "USB" } else { "Built-in" };
        println!("{:<16} {:<12} {}", iface.name, iface.state, iface_type);
    }

    Ok(())
}

async fn cmd_status(cfg: &Config) -> Result<()> {
    let manager = start(cfg).await?;
    let status = manager.status().await?;
    connection::display_status(manager.interface(), &status);

    manager.shutdown().await;
    Ok(())
}

async fn cmd_scan(cfg: &Config) -> Result<()> {
    let manager = start(cfg).await?;
    println!("Scanning on interface: {}", manager.interface());
    println!();

    let networks = manager.scan().await?;
    scan::display_networks(&networks);

    manager.shutdown().await;
    Ok(())
}

async fn cmd_saved(cfg: &Config) -> Result<()> {
    let manager = start(cfg).await?;
    let saved = manager.list_saved().await?;
    connection::display_saved(&saved);

    manager.shutdown().await;
    Ok(())
}

async fn cmd_connected(cfg: &Config) -> Result<()> {
    let manager = start(cfg).await?;
    let connected = manager.list_connected().await?;

    if connected.is_empty() {
        println!("Not connected.");
    }
    for network in connected {
        let freq = network
            .frequency
            .map(|f| format!("{} MHz", f))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{} ({}, {})",
            network.profile.ssid, network.profile.bssid, freq
        );
    }

    manager.shutdown().await;
    Ok(())
}

async fn cmd_connect(cfg: &Config, ssid: &str, password: &str) -> Result<()> {
    let manager = start(cfg).await?;
    println!("Connecting to '{}' on interface {}...", ssid, manager.interface());

    manager.connect(ssid, password).await?;
    println!("Connected successfully!");

    // Show status after connecting
    println!();
    let status = manager.status().await?;
    connection::display_status(manager.interface(), &status);

    manager.shutdown().await;
    Ok(())
}

async fn cmd_disconnect(cfg: &Config, ssid: &str) -> Result<()> {
    let manager = start(cfg).await?;
    println!("Disconnecting '{}' on interface {}...", ssid, manager.interface());

    manager.disconnect(ssid).await?;
    println!("Disconnected.");

    manager.shutdown().await;
    Ok(())
}

async fn cmd_forget(cfg: &Config, ssid: &str) -> Result<()> {
    let manager = start(cfg).await?;
    manager.forget(ssid).await?;
    println!("Forgot '{}'.", ssid);

    manager.shutdown().await;
    Ok(())
}

async fn cmd_radio(cfg: &Config, enable: bool) -> Result<()> {
    let manager = start(cfg).await?;
    let actual = manager.toggle_radio(enable).await?;
    let word = |on: bool| if on { "on" } else { "off" };

    manager.shutdown().await;
    if actual != enable {
        bail!("Radio is still {} after requesting {}", word(actual), word(enable));
    }
    println!("Radio {}.", word(actual));
    Ok(())
}

fn cmd_show_config(cfg: &Config, path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(p) => p,
        None => config::config_path()?,
    };
    println!("Config file: {}", path.display());
    println!();
    print!("{}", cfg.to_toml()?);

    Ok(())
}
