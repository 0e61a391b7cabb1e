//! Direct session with wpa_supplicant over its control interface.
//!
//! The supplicant listens on a Unix datagram socket per interface, usually
//! `/run/wpa_supplicant/<interface>`. A client binds its own socket, sends a
//! text command and reads back a single datagram reply. Scan and association
//! completion are observed through unsolicited `CTRL-EVENT-*` notifications,
//! received on a second socket that is `ATTACH`ed only for the length of the
//! operation waiting on them. A monitor left attached while idle fills its
//! receive queue, and the supplicant drops monitors it cannot write to.
//!
//! # Requirements
//!
//! - wpa_supplicant running with `ctrl_interface` enabled for the interface
//! - write access to the control directory and to the client directory
//! - `update_config=1` for saved profiles to survive a restart (optional)

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UnixDatagram;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{BackendKind, RawNetwork, ScanOutcome, WifiBackend, rfkill};
use crate::command::CommandRunner;
use crate::config::{BackendConfig, TimeoutConfig};
use crate::error::{WifiError, WifiResult};
use crate::types::{NetworkStatus, SavedNetwork};

const REPLY_BUFFER: usize = 8192;
const BUSY_RETRY: Duration = Duration::from_millis(100);

static NEXT_SOCKET: AtomicUsize = AtomicUsize::new(0);

/// One bound client socket connected to the supplicant.
struct CtrlSocket {
    socket: UnixDatagram,
    local: PathBuf,
}

impl CtrlSocket {
    fn connect(client_dir: &Path, ctrl_path: &Path) -> WifiResult<Self> {
        let n = NEXT_SOCKET.fetch_add(1, Ordering::Relaxed);
        let local = client_dir.join(format!("wpa_ctrl_{}-{}", std::process::id(), n));
        let _ = std::fs::remove_file(&local);

        let socket = UnixDatagram::bind(&local).map_err(|e| {
            WifiError::Connection(format!("cannot bind {}: {}", local.display(), e))
        })?;
        let ctrl = Self { socket, local };

        ctrl.socket.connect(ctrl_path).map_err(|e| {
            WifiError::Connection(format!("cannot reach {}: {}", ctrl_path.display(), e))
        })?;
        Ok(ctrl)
    }

    /// Discard datagrams left over from earlier timed-out exchanges.
    fn drain(&self) {
        let mut buf = [0u8; REPLY_BUFFER];
        let mut dropped = 0;
        while self.socket.try_recv(&mut buf).is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Dropped {} stale datagram(s)", dropped);
        }
    }

    async fn recv_before(&self, deadline: Instant) -> WifiResult<Option<String>> {
        let mut buf = vec![0u8; REPLY_BUFFER];
        match tokio::time::timeout_at(deadline, self.socket.recv(&mut buf)).await {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(WifiError::Connection(format!("control socket read: {}", e))),
            Ok(Ok(n)) => Ok(Some(String::from_utf8_lossy(&buf[..n]).into_owned())),
        }
    }

    /// Send `cmd` once and return the raw reply.
    async fn request_once(&self, cmd: &str, timeout: Duration) -> WifiResult<String> {
        self.drain();
        self.socket
            .send(cmd.as_bytes())
            .await
            .map_err(|e| WifiError::Connection(format!("control socket write: {}", e)))?;

        self.recv_before(Instant::now() + timeout)
            .await?
            .ok_or_else(|| WifiError::Timeout(format!("no reply to {}", verb(cmd))))
    }

    /// Send `cmd`, retrying while the supplicant answers `FAIL-BUSY`.
    async fn request(&self, cmd: &str, timeout: Duration) -> WifiResult<String> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let reply = self.request_once(cmd, remaining).await?;
            if reply.trim_end() != "FAIL-BUSY" {
                return Ok(reply);
            }
            if Instant::now() + BUSY_RETRY >= deadline {
                return Err(WifiError::Timeout(format!("{} stayed busy", verb(cmd))));
            }
            tokio::time::sleep(BUSY_RETRY).await;
        }
    }
}

impl Drop for CtrlSocket {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.local);
    }
}

/// A client socket attached for events for the length of one operation.
struct EventMonitor {
    socket: CtrlSocket,
}

impl EventMonitor {
    async fn attach(client_dir: &Path, ctrl_path: &Path, timeout: Duration) -> WifiResult<Self> {
        let socket = CtrlSocket::connect(client_dir, ctrl_path)?;
        let reply = socket.request("ATTACH", timeout).await?;
        if reply.trim() != "OK" {
            return Err(WifiError::Connection(format!(
                "event monitor refused: {}",
                reply.trim()
            )));
        }
        Ok(Self { socket })
    }

    /// Next event before `deadline`, without its level prefix.
    async fn next_event(&self, deadline: Instant) -> WifiResult<Option<String>> {
        Ok(self
            .socket
            .recv_before(deadline)
            .await?
            .map(|message| event_text(&message).to_string()))
    }

    /// Stop event delivery. Events still queued ahead of the reply are skipped.
    async fn detach(self, timeout: Duration) {
        if let Err(e) = self.socket.socket.send(b"DETACH").await {
            debug!("DETACH failed: {}", e);
            return;
        }
        let deadline = Instant::now() + timeout;
        loop {
            match self.socket.recv_before(deadline).await {
                Ok(Some(reply)) if reply.starts_with('<') => continue,
                Ok(Some(reply)) if reply.trim() == "OK" => return,
                Ok(Some(reply)) => {
                    debug!("DETACH returned {}", reply.trim());
                    return;
                }
                Ok(None) => {
                    debug!("No reply to DETACH");
                    return;
                }
                Err(e) => {
                    debug!("DETACH failed: {}", e);
                    return;
                }
            }
        }
    }
}

/// Command name without arguments, for messages.
fn verb(cmd: &str) -> &str {
    cmd.split_whitespace().next().unwrap_or(cmd)
}

/// Command text safe for logs.
fn loggable(cmd: &str) -> String {
    match cmd.find(" psk ") {
        Some(idx) => format!("{} psk ********", &cmd[..idx]),
        None => cmd.to_string(),
    }
}

/// Strip the `<level>` prefix from an event message.
fn event_text(message: &str) -> &str {
    let message = message.trim();
    match message.strip_prefix('<').and_then(|rest| rest.split_once('>')) {
        Some((_, text)) => text,
        None => message,
    }
}

/// Value for `SET_NETWORK <id> ssid`: quoted when printable, hex otherwise.
fn ssid_value(ssid: &str) -> String {
    if ssid.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
        format!("\"{}\"", ssid)
    } else {
        ssid.bytes().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Parse `STATUS` key=value output.
pub fn parse_status(text: &str) -> NetworkStatus {
    let mut status = NetworkStatus {
        supplicant_state: "UNKNOWN".to_string(),
        ..NetworkStatus::default()
    };

    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().to_string();
        match key {
            "wpa_state" => status.supplicant_state = value,
            "key_mgmt" => status.key_management = Some(value),
            "ip_address" => status.ip_address = Some(value),
            "ssid" => status.ssid = Some(value),
            "address" => status.mac_address = Some(value),
            "bssid" => status.bssid = Some(value),
            "freq" => status.frequency = value.parse().ok(),
            _ => {}
        }
    }

    status
}

/// Parse `SCAN_RESULTS`: a header line, then
/// `bssid \t frequency \t signal level \t flags \t ssid` rows.
///
/// Rows that do not parse are logged and skipped.
pub fn parse_scan_results(text: &str) -> Vec<RawNetwork> {
    let mut networks = Vec::new();

    for line in text.lines().skip(1).filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 4 {
            warn!("Skipping scan row with {} fields: {:?}", fields.len(), line);
            continue;
        }

        let (Ok(frequency), Ok(signal)) = (fields[1].parse::<u32>(), fields[2].parse::<i32>())
        else {
            warn!("Skipping scan row with bad frequency or signal: {:?}", line);
            continue;
        };

        let ssid = fields.get(4).copied().unwrap_or_default();
        networks.push(RawNetwork {
            ssid: (!ssid.is_empty()).then(|| ssid.to_string()),
            bssid: fields[0].to_string(),
            frequency,
            signal,
            flags: fields[3].to_string(),
        });
    }

    networks
}

/// A row of `LIST_NETWORKS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEntry {
    pub id: String,
    pub ssid: String,
    pub bssid: String,
    pub current: bool,
    pub disabled: bool,
}

/// Parse `LIST_NETWORKS`: a header line, then
/// `network id \t ssid \t bssid \t flags` rows.
pub fn parse_network_list(text: &str) -> Vec<NetworkEntry> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 3 || fields[0].parse::<u32>().is_err() {
                if !line.trim().is_empty() {
                    warn!("Skipping network row: {:?}", line);
                }
                return None;
            }
            let flags = fields.get(3).copied().unwrap_or_default();
            Some(NetworkEntry {
                id: fields[0].to_string(),
                ssid: fields[1].to_string(),
                bssid: fields[2].to_string(),
                current: flags.contains("[CURRENT]"),
                disabled: flags.contains("[DISABLED]"),
            })
        })
        .collect()
}

/// wpa_supplicant control-socket backend.
pub struct SupplicantBackend {
    interface: String,
    ctrl: CtrlSocket,
    ctrl_path: PathBuf,
    client_dir: PathBuf,
    timeouts: TimeoutConfig,
    runner: Arc<dyn CommandRunner>,
}

impl SupplicantBackend {
    /// Open the request socket, check the supplicant answers and accepts
    /// event monitors.
    pub async fn open(
        interface: &str,
        config: &BackendConfig,
        timeouts: TimeoutConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> WifiResult<Self> {
        let ctrl_path = config.ctrl_dir.join(interface);
        let no_answer = |e: WifiError| match e {
            WifiError::Timeout(msg) => WifiError::Connection(msg),
            other => other,
        };

        let ctrl = CtrlSocket::connect(&config.client_dir, &ctrl_path)?;
        let pong = ctrl
            .request("PING", timeouts.command())
            .await
            .map_err(no_answer)?;
        if pong.trim() != "PONG" {
            return Err(WifiError::Connection(format!(
                "unexpected PING reply from {}: {}",
                ctrl_path.display(),
                pong.trim()
            )));
        }

        EventMonitor::attach(&config.client_dir, &ctrl_path, timeouts.command())
            .await
            .map_err(no_answer)?
            .detach(timeouts.command())
            .await;

        info!("Connected to wpa_supplicant at {}", ctrl_path.display());
        Ok(Self {
            interface: interface.to_string(),
            ctrl,
            ctrl_path,
            client_dir: config.client_dir.clone(),
            timeouts,
            runner,
        })
    }

    /// Run a command; a `FAIL` reply is an error.
    async fn command(&self, cmd: &str) -> WifiResult<String> {
        debug!("{} <- {}", self.interface, loggable(cmd));
        let reply = self.ctrl.request(cmd, self.timeouts.command()).await?;
        if reply.starts_with("FAIL") {
            return Err(WifiError::Command(format!("{} returned {}", verb(cmd), reply.trim())));
        }
        Ok(reply)
    }

    /// Run a command whose only success reply is `OK`.
    async fn expect_ok(&self, cmd: &str) -> WifiResult<()> {
        let reply = self.command(cmd).await?;
        if reply.trim() != "OK" {
            return Err(WifiError::Command(format!(
                "{} returned {}",
                verb(cmd),
                reply.trim()
            )));
        }
        Ok(())
    }

    async fn networks(&self) -> WifiResult<Vec<NetworkEntry>> {
        Ok(parse_network_list(&self.command("LIST_NETWORKS").await?))
    }

    /// Persist the network list. Fails when `update_config=0`; only logged.
    async fn save_config(&self) {
        if let Err(e) = self.expect_ok("SAVE_CONFIG").await {
            warn!("Could not persist supplicant config: {}", e);
        }
    }

    async fn monitor(&self) -> WifiResult<EventMonitor> {
        EventMonitor::attach(&self.client_dir, &self.ctrl_path, self.timeouts.command()).await
    }

    async fn wait_for_association(&self, monitor: &EventMonitor, ssid: &str) -> WifiResult<()> {
        let deadline = Instant::now() + self.timeouts.connect();
        loop {
            let Some(event) = monitor.next_event(deadline).await? else {
                return Err(WifiError::Timeout(format!(
                    "no association with {} within {:?}",
                    ssid,
                    self.timeouts.connect()
                )));
            };
            debug!("{} event: {}", self.interface, event);

            if event.starts_with("CTRL-EVENT-CONNECTED") {
                return Ok(());
            }
            if event.starts_with("CTRL-EVENT-SSID-TEMP-DISABLED") && event.contains("WRONG_KEY") {
                return Err(WifiError::Connect(format!("authentication failed for {}", ssid)));
            }
            if event.starts_with("CTRL-EVENT-NETWORK-NOT-FOUND") {
                return Err(WifiError::Connect(format!("{} not found", ssid)));
            }
        }
    }

    async fn configure_and_select(&self, id: &str, ssid: &str, password: &str) -> WifiResult<()> {
        self.expect_ok(&format!("SET_NETWORK {} ssid {}", id, ssid_value(ssid)))
            .await?;
        if password.is_empty() {
            self.expect_ok(&format!("SET_NETWORK {} key_mgmt NONE", id))
                .await?;
        } else {
            self.expect_ok(&format!("SET_NETWORK {} psk \"{}\"", id, password))
                .await?;
        }

        let monitor = self.monitor().await?;
        let result = match self.expect_ok(&format!("SELECT_NETWORK {}", id)).await {
            Ok(()) => self.wait_for_association(&monitor, ssid).await,
            Err(e) => Err(e),
        };
        monitor.detach(self.timeouts.command()).await;
        result
    }

    /// Request a scan and wait for its results event.
    async fn trigger_and_wait_for_scan(&self, monitor: &EventMonitor) -> WifiResult<()> {
        let reply = self
            .ctrl
            .request_once("SCAN", self.timeouts.command())
            .await?;
        match reply.trim() {
            "OK" => {}
            // A scan is already running; its results event will do.
            "FAIL-BUSY" => debug!("Scan already in progress on {}", self.interface),
            other => return Err(WifiError::Scan(format!("SCAN returned {}", other))),
        }

        let deadline = Instant::now() + self.timeouts.scan();
        loop {
            let Some(event) = monitor.next_event(deadline).await? else {
                return Err(WifiError::Timeout(format!(
                    "no scan results within {:?}",
                    self.timeouts.scan()
                )));
            };
            if event.starts_with("CTRL-EVENT-SCAN-RESULTS") {
                return Ok(());
            }
            if event.starts_with("CTRL-EVENT-SCAN-FAILED") {
                return Err(WifiError::Scan(event));
            }
        }
    }

    /// Poll `STATUS` until the interface is no longer on `ssid`.
    async fn wait_until_left(&self, ssid: &str) -> WifiResult<()> {
        let deadline = Instant::now() + self.timeouts.command();
        loop {
            let status = parse_status(&self.command("STATUS").await?);
            if !status.is_associated_with(ssid) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(WifiError::Timeout(format!("still associated with {}", ssid)));
            }
            tokio::time::sleep(self.timeouts.poll_interval()).await;
        }
    }
}

#[async_trait]
impl WifiBackend for SupplicantBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Supplicant
    }

    async fn status(&self) -> WifiResult<NetworkStatus> {
        Ok(parse_status(&self.command("STATUS").await?))
    }

    async fn scan(&self) -> WifiResult<ScanOutcome> {
        let monitor = self.monitor().await?;
        let waited = self.trigger_and_wait_for_scan(&monitor).await;
        monitor.detach(self.timeouts.command()).await;
        waited?;

        let text = self
            .command("SCAN_RESULTS")
            .await
            .map_err(|e| e.into_operation(WifiError::Scan))?;
        Ok(ScanOutcome::Completed(parse_scan_results(&text)))
    }

    async fn list_saved(&self) -> WifiResult<Vec<SavedNetwork>> {
        let entries = self.networks().await?;

        let current_bssid = if entries.iter().any(|e| e.current) {
            self.status().await.ok().and_then(|s| s.bssid)
        } else {
            None
        };

        Ok(entries
            .into_iter()
            .map(|entry| {
                let bssid = if entry.current {
                    current_bssid.clone().unwrap_or_default()
                } else if entry.bssid == "any" {
                    String::new()
                } else {
                    entry.bssid
                };
                SavedNetwork {
                    network_id: entry.id,
                    ssid: entry.ssid,
                    bssid,
                    connected: entry.current,
                }
            })
            .collect())
    }

    /// Add a fresh entry for `ssid` and select it.
    ///
    /// `SELECT_NETWORK` disables every other network, so previously enabled
    /// entries are re-enabled either way. On success older entries for the
    /// same SSID are replaced; on failure the new entry is removed.
    async fn connect(&self, ssid: &str, password: &str) -> WifiResult<()> {
        let previous = self
            .networks()
            .await
            .map_err(|e| e.into_operation(WifiError::Connect))?;

        let id = self
            .command("ADD_NETWORK")
            .await
            .map_err(|e| e.into_operation(WifiError::Connect))?
            .trim()
            .to_string();
        if id.parse::<u32>().is_err() {
            return Err(WifiError::Connect(format!("ADD_NETWORK returned {}", id)));
        }

        match self.configure_and_select(&id, ssid, password).await {
            Ok(()) => {
                for old in previous.iter().filter(|n| n.ssid == ssid) {
                    if let Err(e) = self.expect_ok(&format!("REMOVE_NETWORK {}", old.id)).await {
                        warn!("Could not remove old entry {} for {}: {}", old.id, ssid, e);
                    }
                }
                for other in previous.iter().filter(|n| n.ssid != ssid && !n.disabled) {
                    if let Err(e) = self.expect_ok(&format!("ENABLE_NETWORK {}", other.id)).await {
                        warn!("Could not re-enable entry {}: {}", other.id, e);
                    }
                }
                self.save_config().await;
                info!("Connected {} to {}", self.interface, ssid);
                Ok(())
            }
            Err(e) => {
                warn!("Connecting to {} failed, rolling back: {}", ssid, e);
                if let Err(e) = self.expect_ok(&format!("REMOVE_NETWORK {}", id)).await {
                    warn!("Could not remove entry {}: {}", id, e);
                }
                for entry in previous.iter().filter(|n| !n.disabled) {
                    if let Err(e) = self.expect_ok(&format!("ENABLE_NETWORK {}", entry.id)).await {
                        warn!("Could not re-enable entry {}: {}", entry.id, e);
                    }
                }
                Err(e.into_operation(WifiError::Connect))
            }
        }
    }

    /// Disabling an entry drops its link and keeps it from autoconnecting.
    async fn disconnect(&self, ssid: &str) -> WifiResult<()> {
        let wrap = |e: WifiError| e.into_operation(WifiError::Disconnect);

        let matching: Vec<NetworkEntry> = self
            .networks()
            .await
            .map_err(wrap)?
            .into_iter()
            .filter(|n| n.ssid == ssid)
            .collect();
        if matching.is_empty() {
            debug!("No saved entry for {}, nothing to disconnect", ssid);
            return Ok(());
        }

        for entry in &matching {
            self.expect_ok(&format!("DISABLE_NETWORK {}", entry.id))
                .await
                .map_err(wrap)?;
        }
        self.save_config().await;

        self.wait_until_left(ssid).await.map_err(wrap)?;
        info!("Disconnected {} from {}", self.interface, ssid);
        Ok(())
    }

    async fn forget(&self, ssid: &str) -> WifiResult<()> {
        let wrap = |e: WifiError| e.into_operation(WifiError::Forget);

        let mut removed = 0;
        for entry in self.networks().await.map_err(wrap)? {
            if entry.ssid == ssid {
                self.expect_ok(&format!("REMOVE_NETWORK {}", entry.id))
                    .await
                    .map_err(wrap)?;
                removed += 1;
            }
        }

        if removed > 0 {
            self.save_config().await;
            info!("Removed {} saved entries for {}", removed, ssid);
        }
        Ok(())
    }

    async fn radio_enabled(&self) -> WifiResult<bool> {
        rfkill::radio_enabled(self.runner.as_ref(), self.timeouts.command()).await
    }

    async fn set_radio(&self, enable: bool) -> WifiResult<()> {
        rfkill::set_radio(self.runner.as_ref(), enable, self.timeouts.command()).await
    }
}
