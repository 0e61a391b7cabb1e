mod common;

use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Host, ap, calls, home_host, manager};
use wifid::backend::ScanOutcome;
use wifid::command::{CommandOutput, CommandRunner};
use wifid::connector::ConnectorState;
use wifid::interface::discover_interfaces_in;
use wifid::{SecurityType, WifiError, WifiManager, WifiResult, resolve_interface};

struct NoTools;

#[async_trait]
impl CommandRunner for NoTools {
    async fn run(&self, program: &str, _: &[&str], _: Duration) -> WifiResult<CommandOutput> {
        Err(WifiError::Connection(format!("{} not installed", program)))
    }
}

fn connected_ssids(networks: &[wifid::ConnectedNetwork]) -> Vec<String> {
    networks.iter().map(|n| n.profile.ssid.clone()).collect()
}

#[tokio::test]
async fn discovered_wlan0_scans_and_classifies() {
    let sysfs = tempfile::tempdir().unwrap();
    let wlan0 = sysfs.path().join("wlan0");
    fs::create_dir_all(wlan0.join("wireless")).unwrap();
    fs::write(wlan0.join("operstate"), "up\n").unwrap();
    fs::create_dir_all(sysfs.path().join("eth0")).unwrap();

    let interfaces = discover_interfaces_in(sysfs.path(), &NoTools, Duration::from_secs(1))
        .await
        .unwrap();
    let interface = resolve_interface(None, interfaces).unwrap();
    assert_eq!(interface.name, "wlan0");

    let host = home_host();
    let manager = WifiManager::open(
        interface.name,
        Box::new(common::FakeOpener { host: host.clone() }),
        &common::test_config(),
    )
    .await
    .unwrap();
    assert_eq!(manager.connector_state().await, ConnectorState::Connected);
    assert_eq!(manager.interface(), "wlan0");

    let networks = manager.scan().await.unwrap();
    assert_eq!(networks.len(), 2);

    let home = networks.iter().find(|n| n.ssid.as_deref() == Some("HomeNet")).unwrap();
    assert_eq!(home.secure_flags, BTreeSet::from([SecurityType::WPA]));
    assert!(home.secure);

    let cafe = networks.iter().find(|n| n.ssid.as_deref() == Some("OpenCafe")).unwrap();
    assert!(cafe.secure_flags.is_empty());
    assert!(!cafe.secure);
}

#[tokio::test]
async fn bad_flags_do_not_fail_the_batch() {
    let host = home_host();
    host.lock()
        .unwrap()
        .access_points
        .push(ap("Weird", "11:22:33:44:55:88", "[WPA2-PSK", -60));
    let manager = manager(&host).await;

    let networks = manager.scan().await.unwrap();
    assert_eq!(networks.len(), 3);
    let weird = networks.iter().find(|n| n.label() == "Weird").unwrap();
    assert!(!weird.secure);
    assert!(weird.secure_flags.is_empty());
}

#[tokio::test]
async fn wrong_password_is_a_connect_error() {
    let host = home_host();
    host.lock().unwrap().connected = None;
    let manager = manager(&host).await;

    let err = manager.connect("HomeNet", "wrongpass").await.unwrap_err();
    assert!(matches!(err, WifiError::Connect(_)), "got {err:?}");

    let connected = manager.list_connected().await.unwrap();
    assert!(!connected_ssids(&connected).contains(&"HomeNet".to_string()));
}

#[tokio::test]
async fn connect_then_list_connected_is_enriched() {
    let host = home_host();
    host.lock().unwrap().connected = None;
    let manager = manager(&host).await;
    manager.scan().await.unwrap();

    manager.connect("OpenCafe", "").await.unwrap();

    let connected = manager.list_connected().await.unwrap();
    assert_eq!(connected_ssids(&connected), ["OpenCafe"]);
    assert_eq!(connected[0].profile.bssid, "11:22:33:44:55:77");
    assert_eq!(connected[0].secure, Some(false));
    assert_eq!(connected[0].signal_strength, Some(-70));
}

#[tokio::test]
async fn mutation_succeeds_when_saved_refresh_fails() {
    let host = home_host();
    host.lock().unwrap().connected = None;
    host.lock().unwrap().fail_saved = true;
    let manager = manager(&host).await;

    manager.connect("OpenCafe", "").await.unwrap();
    manager.forget("OpenCafe").await.unwrap();
    assert!(calls(&host).iter().filter(|c| *c == "list_saved").count() >= 2);
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let host = home_host();
    let manager = manager(&host).await;
    assert_eq!(connected_ssids(&manager.list_connected().await.unwrap()), ["HomeNet"]);

    manager.disconnect("HomeNet").await.unwrap();
    assert!(manager.list_connected().await.unwrap().is_empty());

    manager.disconnect("HomeNet").await.unwrap();
    assert!(manager.list_connected().await.unwrap().is_empty());

    // profile survives a disconnect
    let saved = manager.list_saved().await.unwrap();
    assert!(saved.iter().any(|n| n.ssid == "HomeNet" && !n.connected));
}

#[tokio::test]
async fn forgetting_an_unknown_ssid_succeeds() {
    let host = home_host();
    let manager = manager(&host).await;

    manager.forget("NeverSaved").await.unwrap();
    let saved = manager.list_saved().await.unwrap();
    assert!(saved.iter().all(|n| n.ssid != "NeverSaved"));

    manager.forget("HomeNet").await.unwrap();
    assert!(manager.list_saved().await.unwrap().is_empty());
}

#[tokio::test]
async fn enabling_twice_is_idempotent() {
    let host = home_host();
    let manager = manager(&host).await;

    assert!(manager.toggle_radio(true).await.unwrap());
    assert!(manager.toggle_radio(true).await.unwrap());
    assert!(!calls(&host).iter().any(|c| c.starts_with("set_radio")));
}

#[tokio::test]
async fn toggle_waits_for_the_radio() {
    let host = home_host();
    let manager = manager(&host).await;

    assert!(!manager.toggle_radio(false).await.unwrap());
    assert!(!host.lock().unwrap().radio);
    assert!(manager.toggle_radio(true).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn toggle_reports_observed_state_when_command_is_ignored() {
    let host = home_host();
    host.lock().unwrap().radio_stuck = true;
    let manager = manager(&host).await;

    assert!(manager.toggle_radio(false).await.unwrap());
    let polls = calls(&host).iter().filter(|c| *c == "radio_enabled").count();
    assert!(polls > 2, "only {polls} polls");
}

#[tokio::test]
async fn busy_scan_serves_previous_results() {
    let host = home_host();
    let manager = manager(&host).await;
    let first = manager.scan().await.unwrap();

    host.lock().unwrap().scripted_scans.push_back(Ok(ScanOutcome::Busy));
    let second = manager.scan().await.unwrap();
    assert_eq!(first, second);
    assert!(!second.is_empty());
}

#[tokio::test]
async fn busy_scan_without_history_is_empty() {
    let host = home_host();
    host.lock().unwrap().scripted_scans.push_back(Ok(ScanOutcome::Busy));
    let manager = manager(&host).await;

    assert!(manager.scan().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_scan_keeps_the_cache() {
    let host = home_host();
    let manager = manager(&host).await;
    let first = manager.scan().await.unwrap();

    host.lock()
        .unwrap()
        .scripted_scans
        .push_back(Err(WifiError::Scan("CTRL-EVENT-SCAN-FAILED ret=-16".into())));
    assert!(matches!(manager.scan().await, Err(WifiError::Scan(_))));

    host.lock()
        .unwrap()
        .scripted_scans
        .push_back(Err(WifiError::Timeout("no scan results".into())));
    assert!(manager.scan().await.unwrap_err().is_timeout());

    assert_eq!(manager.cached_scan().await, Some(first));
}

#[tokio::test]
async fn empty_scan_is_not_an_error() {
    let host = home_host();
    host.lock().unwrap().access_points.clear();
    let manager = manager(&host).await;

    assert!(manager.scan().await.unwrap().is_empty());
    assert_eq!(manager.cached_scan().await, Some(Vec::new()));
}

#[tokio::test]
async fn saved_list_degrades_to_cache() {
    let host: Host = home_host();
    let manager = manager(&host).await;
    let fresh = manager.list_saved().await.unwrap();

    host.lock().unwrap().fail_saved = true;
    assert_eq!(manager.list_saved().await.unwrap(), fresh);
}

#[tokio::test]
async fn saved_list_fails_without_cache() {
    let host = home_host();
    host.lock().unwrap().fail_saved = true;
    let manager = manager(&host).await;

    assert!(manager.list_saved().await.is_err());
}

#[tokio::test]
async fn lost_channel_is_reopened() {
    let host = home_host();
    let manager = manager(&host).await;

    host.lock()
        .unwrap()
        .scripted_scans
        .push_back(Err(WifiError::Connection("socket closed".into())));
    assert!(manager.scan().await.unwrap_err().is_channel_failure());
    assert_eq!(manager.connector_state().await, ConnectorState::Degraded);

    assert_eq!(manager.scan().await.unwrap().len(), 2);
    assert_eq!(manager.connector_state().await, ConnectorState::Connected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn operations_never_overlap_on_the_channel() {
    let host = home_host();
    host.lock().unwrap().op_delay = Some(Duration::from_millis(20));
    let manager = Arc::new(manager(&host).await);

    let mut tasks = Vec::new();
    for i in 0..4 {
        let m = manager.clone();
        tasks.push(tokio::spawn(async move { m.scan().await.map(|_| ()) }));
        let m = manager.clone();
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                m.connect("HomeNet", "correct horse").await
            } else {
                m.disconnect("HomeNet").await
            }
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let host = host.lock().unwrap();
    assert_eq!(host.in_flight, 0);
    assert_eq!(host.max_in_flight, 1);
}

#[tokio::test]
async fn shutdown_closes_the_channel() {
    let host = home_host();
    let manager = manager(&host).await;

    manager.shutdown().await;
    assert_eq!(manager.connector_state().await, ConnectorState::Closed);
    assert!(manager.status().await.unwrap_err().is_channel_failure());
}
