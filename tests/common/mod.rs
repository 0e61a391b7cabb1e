#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use wifid::backend::{BackendKind, BackendOpener, RawNetwork, ScanOutcome, WifiBackend};
use wifid::config::TimeoutConfig;
use wifid::{Config, NetworkStatus, SavedNetwork, WifiError, WifiManager, WifiResult};

/// Simulated host: access points in range, saved profiles, radio.
#[derive(Default)]
pub struct FakeHost {
    pub access_points: Vec<RawNetwork>,
    /// Networks in range and the password they accept.
    pub passwords: HashMap<String, String>,
    pub saved: Vec<String>,
    pub connected: Option<String>,
    pub radio: bool,
    /// `set_radio` reports success but changes nothing.
    pub radio_stuck: bool,
    /// Outcomes returned by the next scans, before falling back to a full scan.
    pub scripted_scans: VecDeque<WifiResult<ScanOutcome>>,
    pub fail_saved: bool,
    /// Each operation holds the backend this long before answering.
    pub op_delay: Option<Duration>,
    pub in_flight: usize,
    pub max_in_flight: usize,
    pub calls: Vec<String>,
}

pub type Host = Arc<Mutex<FakeHost>>;

pub fn ap(ssid: &str, bssid: &str, flags: &str, signal: i32) -> RawNetwork {
    RawNetwork {
        ssid: Some(ssid.to_string()),
        bssid: bssid.to_string(),
        frequency: 2437,
        signal,
        flags: flags.to_string(),
    }
}

/// Two networks in range, HomeNet saved and connected, radio on.
pub fn home_host() -> Host {
    let mut host = FakeHost {
        radio: true,
        ..FakeHost::default()
    };
    host.access_points = vec![
        ap("HomeNet", "11:22:33:44:55:66", "[WPA2-PSK-CCMP][ESS]", -42),
        ap("OpenCafe", "11:22:33:44:55:77", "[ESS]", -70),
    ];
    host.passwords.insert("HomeNet".into(), "correct horse".into());
    host.passwords.insert("OpenCafe".into(), String::new());
    host.saved.push("HomeNet".into());
    host.connected = Some("HomeNet".into());
    Arc::new(Mutex::new(host))
}

pub struct FakeBackend {
    kind: BackendKind,
    host: Host,
}

impl FakeBackend {
    /// Stay busy for `op_delay`, tracking how many operations overlap.
    async fn work(&self) {
        let delay = {
            let mut host = self.host.lock().unwrap();
            host.in_flight += 1;
            host.max_in_flight = host.max_in_flight.max(host.in_flight);
            host.op_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.host.lock().unwrap().in_flight -= 1;
    }

    fn record(&self, call: String) -> std::sync::MutexGuard<'_, FakeHost> {
        let mut host = self.host.lock().unwrap();
        host.calls.push(call);
        host
    }
}

#[async_trait]
impl WifiBackend for FakeBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn status(&self) -> WifiResult<NetworkStatus> {
        let host = self.record("status".into());
        let link = host
            .connected
            .as_ref()
            .and_then(|ssid| host.access_points.iter().find(|a| a.ssid.as_ref() == Some(ssid)));
        Ok(NetworkStatus {
            supplicant_state: if link.is_some() { "COMPLETED" } else { "DISCONNECTED" }.into(),
            ssid: link.and_then(|a| a.ssid.clone()),
            bssid: link.map(|a| a.bssid.clone()),
            frequency: link.map(|a| a.frequency),
            ..NetworkStatus::default()
        })
    }

    async fn scan(&self) -> WifiResult<ScanOutcome> {
        self.work().await;
        let mut host = self.record("scan".into());
        match host.scripted_scans.pop_front() {
            Some(outcome) => outcome,
            None => Ok(ScanOutcome::Completed(host.access_points.clone())),
        }
    }

    async fn list_saved(&self) -> WifiResult<Vec<SavedNetwork>> {
        self.work().await;
        let host = self.record("list_saved".into());
        if host.fail_saved {
            return Err(WifiError::Command("LIST_NETWORKS returned FAIL".into()));
        }
        Ok(host
            .saved
            .iter()
            .enumerate()
            .map(|(id, ssid)| {
                let connected = host.connected.as_ref() == Some(ssid);
                SavedNetwork {
                    network_id: id.to_string(),
                    ssid: ssid.clone(),
                    bssid: String::new(),
                    connected,
                }
            })
            .collect())
    }

    async fn connect(&self, ssid: &str, password: &str) -> WifiResult<()> {
        self.work().await;
        let mut host = self.record(format!("connect {}", ssid));
        let expected = host.passwords.get(ssid).cloned();
        match expected {
            None => Err(WifiError::Connect(format!("{} not found", ssid))),
            Some(expected) if expected != password => {
                Err(WifiError::Connect(format!("authentication failed for {}", ssid)))
            }
            Some(_) => {
                if !host.saved.iter().any(|s| s == ssid) {
                    host.saved.push(ssid.to_string());
                }
                host.connected = Some(ssid.to_string());
                Ok(())
            }
        }
    }

    async fn disconnect(&self, ssid: &str) -> WifiResult<()> {
        self.work().await;
        let mut host = self.record(format!("disconnect {}", ssid));
        if host.connected.as_deref() == Some(ssid) {
            host.connected = None;
        }
        Ok(())
    }

    async fn forget(&self, ssid: &str) -> WifiResult<()> {
        self.work().await;
        let mut host = self.record(format!("forget {}", ssid));
        host.saved.retain(|s| s != ssid);
        if host.connected.as_deref() == Some(ssid) {
            host.connected = None;
        }
        Ok(())
    }

    async fn radio_enabled(&self) -> WifiResult<bool> {
        Ok(self.record("radio_enabled".into()).radio)
    }

    async fn set_radio(&self, enable: bool) -> WifiResult<()> {
        let mut host = self.record(format!("set_radio {}", enable));
        if !host.radio_stuck {
            host.radio = enable;
        }
        Ok(())
    }
}

pub struct FakeOpener {
    pub host: Host,
}

#[async_trait]
impl BackendOpener for FakeOpener {
    async fn open(&self, kind: BackendKind) -> WifiResult<Box<dyn WifiBackend>> {
        Ok(Box::new(FakeBackend {
            kind,
            host: self.host.clone(),
        }))
    }
}

pub fn test_config() -> Config {
    Config {
        timeouts: TimeoutConfig {
            radio_settle_secs: 1,
            poll_interval_ms: 10,
            scan_settle_ms: 0,
            ..TimeoutConfig::default()
        },
        ..Config::default()
    }
}

pub async fn manager(host: &Host) -> WifiManager {
    WifiManager::open(
        "wlan0",
        Box::new(FakeOpener { host: host.clone() }),
        &test_config(),
    )
    .await
    .unwrap()
}

pub fn calls(host: &Host) -> Vec<String> {
    host.lock().unwrap().calls.clone()
}
