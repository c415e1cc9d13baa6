use std::sync::Arc;
use std::time::Duration;

use cdp_adapter::{AdapterError, ScriptHost};
use chrono::Utc;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::differ::detect_change_with_threshold;
use crate::errors::ObserveError;
use crate::model::{ChangeSet, LoadPhase, Observation, ObserverConfig, StructureSignal};
use crate::ports::{PageProbe, ScriptPort};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Cheap, order-sensitive fingerprint of the structure counters (FNV-1a).
///
/// Only meant to flag "something changed"; collisions are expected and harmless.
pub fn content_hash(signal: &StructureSignal) -> String {
    let mut hash = FNV_OFFSET;
    let material = format!(
        "{}:{}:{}",
        signal.node_count, signal.html_length, signal.text_length
    );
    for byte in material.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{hash:016x}")
}

/// Captures [`Observation`]s and answers readiness/change questions about the current page.
pub struct StateObserver {
    probe: Arc<dyn PageProbe>,
    cfg: ObserverConfig,
}

impl StateObserver {
    pub fn new(probe: Arc<dyn PageProbe>, cfg: ObserverConfig) -> Self {
        Self { probe, cfg }
    }

    /// Observer over any script host, typically the live browser connection.
    pub fn for_host<H>(host: Arc<H>, cfg: ObserverConfig) -> Self
    where
        H: ScriptHost + 'static,
    {
        Self::new(Arc::new(ScriptPort::new(host)), cfg)
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.cfg
    }

    /// Capture a snapshot. Sub-check failures fall back to defaults; only a lost
    /// connection fails the whole capture.
    pub async fn capture(&self) -> Result<Observation, ObserveError> {
        if !self.probe.is_connected() {
            return Err(ObserveError::NotConnected);
        }

        let (url, title) = degrade("identity", self.probe.identity().await)?.unwrap_or_default();
        let load_phase = degrade("ready_state", self.probe.ready_state().await)?
            .map(|state| LoadPhase::from_ready_state(&state))
            .unwrap_or_default();
        let has_loading_indicator =
            degrade("loading_indicator", self.probe.loading_indicator().await)?.unwrap_or(false);
        let has_modal_overlay =
            degrade("modal_overlay", self.probe.modal_overlay().await)?.unwrap_or(false);
        let signal =
            degrade("structure", self.probe.structure_signal().await)?.unwrap_or_default();
        let visible_element_count =
            degrade("visible_count", self.probe.visible_count().await)?.unwrap_or(0);

        Ok(Observation {
            url,
            title,
            load_phase,
            has_loading_indicator,
            has_modal_overlay,
            content_hash: content_hash(&signal),
            visible_element_count,
            text_length: signal.text_length,
            timestamp: Utc::now(),
        })
    }

    pub fn detect_change(&self, previous: &Observation, current: &Observation) -> ChangeSet {
        detect_change_with_threshold(previous, current, self.cfg.visible_delta_threshold)
    }

    /// Capture a baseline, then wait for the page to move away from it.
    pub async fn wait_for_change(&self, timeout: Duration) -> Result<ChangeSet, ObserveError> {
        let baseline = self.capture().await?;
        self.wait_for_change_from(&baseline, timeout).await
    }

    /// Poll until the page differs from `baseline`; an unchanged set on timeout.
    pub async fn wait_for_change_from(
        &self,
        baseline: &Observation,
        timeout: Duration,
    ) -> Result<ChangeSet, ObserveError> {
        let deadline = Instant::now() + timeout;
        let interval = Duration::from_millis(self.cfg.change_poll_interval_ms.max(1));
        loop {
            let current = self.capture().await?;
            let changes = self.detect_change(baseline, &current);
            if changes.changed {
                debug!(target: "state-observer", count = changes.changes.len(), "page changed");
                return Ok(changes);
            }
            if Instant::now() + interval > deadline {
                return Ok(ChangeSet::unchanged());
            }
            sleep(interval).await;
        }
    }

    /// Ready state complete, no loading indicator, and a non-trivial amount of content.
    pub async fn is_page_loaded(&self) -> Result<bool, ObserveError> {
        let observation = self.capture().await?;
        Ok(self.looks_loaded(&observation))
    }

    pub fn looks_loaded(&self, observation: &Observation) -> bool {
        observation.load_phase == LoadPhase::Complete
            && !observation.has_loading_indicator
            && (observation.visible_element_count >= self.cfg.min_loaded_elements
                || observation.text_length >= self.cfg.min_loaded_text)
    }

    pub async fn wait_for_page_loaded(&self, timeout: Duration) -> Result<bool, ObserveError> {
        let deadline = Instant::now() + timeout;
        let interval = Duration::from_millis(self.cfg.loaded_poll_interval_ms.max(1));
        loop {
            if self.is_page_loaded().await? {
                return Ok(true);
            }
            if Instant::now() + interval > deadline {
                return Ok(false);
            }
            sleep(interval).await;
        }
    }
}

/// Swallow a sub-check failure, except a lost connection.
fn degrade<T>(check: &'static str, result: Result<T, AdapterError>) -> Result<Option<T>, ObserveError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_connected() => Err(ObserveError::NotConnected),
        Err(err) => {
            warn!(target: "state-observer", check, error = %err, "sub-check failed; using default");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cdp_adapter::AdapterErrorKind;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeProbe {
        connected: bool,
        urls: Mutex<VecDeque<String>>,
        ready: String,
        loading: bool,
        modal_fails: bool,
        calls: AtomicUsize,
    }

    impl FakeProbe {
        fn page(url: &str) -> Self {
            Self {
                connected: true,
                urls: Mutex::new(VecDeque::from([url.to_string()])),
                ready: "complete".into(),
                loading: false,
                modal_fails: false,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PageProbe for FakeProbe {
        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn identity(&self) -> Result<(String, String), AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut urls = self.urls.lock();
            let url = if urls.len() > 1 {
                urls.pop_front().unwrap_or_default()
            } else {
                urls.front().cloned().unwrap_or_default()
            };
            Ok((url, "Title".into()))
        }

        async fn ready_state(&self) -> Result<String, AdapterError> {
            Ok(self.ready.clone())
        }

        async fn loading_indicator(&self) -> Result<bool, AdapterError> {
            Ok(self.loading)
        }

        async fn modal_overlay(&self) -> Result<bool, AdapterError> {
            if self.modal_fails {
                return Err(AdapterError::new(AdapterErrorKind::ScriptException)
                    .with_hint("boom"));
            }
            Ok(false)
        }

        async fn structure_signal(&self) -> Result<StructureSignal, AdapterError> {
            Ok(StructureSignal {
                node_count: 120,
                html_length: 5_000,
                text_length: 800,
            })
        }

        async fn visible_count(&self) -> Result<u64, AdapterError> {
            Ok(42)
        }
    }

    fn observer(probe: FakeProbe) -> StateObserver {
        StateObserver::new(Arc::new(probe), ObserverConfig::default())
    }

    #[test]
    fn content_hash_is_stable_and_change_sensitive() {
        let a = StructureSignal {
            node_count: 10,
            html_length: 200,
            text_length: 50,
        };
        let mut b = a;
        assert_eq!(content_hash(&a), content_hash(&b));
        b.html_length += 1;
        assert_ne!(content_hash(&a), content_hash(&b));
        assert_eq!(content_hash(&a).len(), 16);
    }

    #[tokio::test]
    async fn capture_reads_every_field() {
        let obs = observer(FakeProbe::page("https://example.com/"))
            .capture()
            .await
            .expect("capture");
        assert_eq!(obs.url, "https://example.com/");
        assert_eq!(obs.title, "Title");
        assert_eq!(obs.load_phase, LoadPhase::Complete);
        assert_eq!(obs.visible_element_count, 42);
        assert_eq!(obs.text_length, 800);
        assert!(!obs.has_loading_indicator);
    }

    #[tokio::test]
    async fn failed_sub_check_degrades_to_default() {
        let mut probe = FakeProbe::page("https://example.com/");
        probe.modal_fails = true;
        let obs = observer(probe).capture().await.expect("capture survives");
        assert!(!obs.has_modal_overlay);
        assert_eq!(obs.url, "https://example.com/");
    }

    #[tokio::test]
    async fn disconnected_probe_fails_fast() {
        let mut probe = FakeProbe::page("https://example.com/");
        probe.connected = false;
        let err = observer(probe).capture().await.expect_err("disconnected");
        assert_eq!(err, ObserveError::NotConnected);
        assert_eq!(err.to_string(), "Browser not connected");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_change_sees_url_transition() {
        let probe = FakeProbe {
            urls: Mutex::new(VecDeque::from([
                "https://a.example/".to_string(),
                "https://a.example/".to_string(),
                "https://b.example/".to_string(),
            ])),
            ..FakeProbe::page("unused")
        };
        let changes = observer(probe)
            .wait_for_change(Duration::from_secs(5))
            .await
            .expect("wait");
        assert!(changes.changed);
        assert!(changes.has_url_change());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_change_times_out_unchanged() {
        let probe = Arc::new(FakeProbe::page("https://a.example/"));
        let observer = StateObserver::new(probe.clone(), ObserverConfig::default());
        let changes = observer
            .wait_for_change(Duration::from_secs(1))
            .await
            .expect("wait");
        assert!(!changes.changed);
        assert!(probe.calls.load(Ordering::SeqCst) >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn page_with_spinner_is_not_loaded() {
        let mut probe = FakeProbe::page("https://example.com/");
        probe.loading = true;
        let observer = observer(probe);
        assert!(!observer.is_page_loaded().await.expect("probe"));
        assert!(!observer
            .wait_for_page_loaded(Duration::from_secs(2))
            .await
            .expect("wait"));
    }

    #[tokio::test]
    async fn loading_ready_state_is_not_loaded() {
        let mut probe = FakeProbe::page("https://example.com/");
        probe.ready = "interactive".into();
        assert!(!observer(probe).is_page_loaded().await.expect("probe"));
        assert!(observer(FakeProbe::page("https://example.com/"))
            .is_page_loaded()
            .await
            .expect("probe"));
    }
}
