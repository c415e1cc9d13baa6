//! Observer checks against a real browser. Ignored by default; set
//! `TABPILOT_CDP_CONTRACT=1` (and optionally `TABPILOT_ENDPOINT`) to run them.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use cdp_adapter::{BrowserConnection, ConnectionConfig, LoadCondition};
use perceiver_structural::{ObserverConfig, StateChange, StateObserver};

fn live_enabled() -> bool {
    env::var("TABPILOT_CDP_CONTRACT")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

async fn connect() -> Arc<BrowserConnection> {
    let mut cfg = ConnectionConfig::default();
    if let Ok(endpoint) = env::var("TABPILOT_ENDPOINT") {
        cfg.endpoint = endpoint;
    }
    let conn = Arc::new(BrowserConnection::chromium(cfg));
    conn.connect(None).await.expect("connect");
    conn
}

#[tokio::test]
#[ignore = "requires a browser with remote debugging; set TABPILOT_CDP_CONTRACT=1"]
async fn navigation_is_detected_as_url_change() {
    if !live_enabled() {
        eprintln!("skipping live observer test (TABPILOT_CDP_CONTRACT not enabled)");
        return;
    }

    let conn = connect().await;
    let observer = StateObserver::for_host(conn.clone(), ObserverConfig::default());

    conn.navigate("https://example.com").await.expect("navigate");
    conn.wait_for_load(LoadCondition::Load, Duration::from_secs(15))
        .await
        .expect("first page loads");
    let before = observer.capture().await.expect("capture");
    assert!(observer.looks_loaded(&before));

    let again = observer.capture().await.expect("capture");
    assert!(!observer.detect_change(&before, &again).changed);

    conn.navigate("https://example.org").await.expect("navigate");
    let changes = observer
        .wait_for_change_from(&before, Duration::from_secs(15))
        .await
        .expect("wait for change");
    assert!(changes.changed);
    assert!(changes
        .changes
        .iter()
        .any(|change| matches!(change, StateChange::Url { .. })));

    conn.disconnect().await;
}

#[tokio::test]
#[ignore = "requires a browser with remote debugging; set TABPILOT_CDP_CONTRACT=1"]
async fn disconnected_observer_reports_not_connected() {
    if !live_enabled() {
        eprintln!("skipping live observer test (TABPILOT_CDP_CONTRACT not enabled)");
        return;
    }

    let conn = connect().await;
    let observer = StateObserver::for_host(conn.clone(), ObserverConfig::default());
    conn.disconnect().await;
    assert_eq!(
        observer.capture().await.err(),
        Some(perceiver_structural::ObserveError::NotConnected)
    );
}
