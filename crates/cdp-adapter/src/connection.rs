//! Connection lifecycle: connect, disconnect, reconnect, liveness and the current-page pointer.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::{key_definition, LoadCondition, NETWORK_IDLE_WINDOW_MS};
use crate::config::ConnectionConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::events::{ConnectionEvent, EventKind};
use crate::metrics;
use crate::registry::{PageEntry, PageRegistry};
use crate::transport::{
    CdpTransport, ChromiumConnector, CommandTarget, TransportConnector, TransportEvent,
};
use crate::EventBus;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connected,
    /// Connected, but at least one liveness check failed since the last success.
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub endpoint: Option<String>,
    pub last_error: Option<String>,
    pub current_target: Option<String>,
    pub current_url: Option<String>,
    pub liveness_failures: u32,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.state != ConnectionState::Disconnected
    }
}

/// Minimal page-script surface shared by the executor and the observer.
#[async_trait]
pub trait ScriptHost: Send + Sync {
    fn is_connected(&self) -> bool;
    async fn evaluate(&self, expression: &str) -> Result<Value, AdapterError>;
}

/// Filtered view over the connection event bus.
pub struct EventSubscription {
    rx: broadcast::Receiver<ConnectionEvent>,
    kinds: Option<HashSet<EventKind>>,
}

impl EventSubscription {
    /// Next event matching the filter; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    let wanted = self
                        .kinds
                        .as_ref()
                        .map(|kinds| kinds.contains(&event.kind()))
                        .unwrap_or(true);
                    if wanted {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(target: "cdp-adapter", skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

struct LiveLink {
    endpoint: String,
    transport: Arc<dyn CdpTransport>,
    registry: PageRegistry,
    current: RwLock<Option<String>>,
    state: RwLock<ConnectionState>,
    liveness_failures: AtomicU32,
    shutdown: CancellationToken,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    command_timeout: Duration,
    auto_accept_dialogs: bool,
}

impl LiveLink {
    fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn current_entry(&self) -> Option<PageEntry> {
        let target = self.current.read().clone()?;
        self.registry.get(&target)
    }

    fn current_session(&self) -> Option<(String, String)> {
        let entry = self.current_entry()?;
        let session = entry.cdp_session?;
        Some((entry.target_id, session))
    }

    fn is_current_session(&self, session: Option<&str>) -> bool {
        match (session, self.current_session()) {
            (Some(session), Some((_, current))) => session == current,
            _ => false,
        }
    }

    async fn send(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        let start = Instant::now();
        metrics::record_command();
        debug!(target: "cdp-adapter", method, ?target, "sending command");
        let result = match tokio::time::timeout(
            self.command_timeout,
            self.transport.send_command(target, method, params),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                .with_hint(format!("{method} timed out"))
                .retriable(true)),
        };
        match &result {
            Ok(_) => metrics::record_command_success(start.elapsed()),
            Err(_) => metrics::record_command_failure(),
        }
        result
    }

    async fn send_page(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        let (_, session) = self.current_session().ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::TargetNotFound).with_hint("no active page")
        })?;
        self.send(CommandTarget::Session(session), method, params)
            .await
    }

    async fn attach(&self, target_id: &str) -> Result<String, AdapterError> {
        let response = self
            .send(
                CommandTarget::Browser,
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session = response
            .get("sessionId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint("attachToTarget missing sessionId")
            })?
            .to_string();
        self.registry.set_session(target_id, session.clone());

        for method in ["Page.enable", "Runtime.enable"] {
            self.send(CommandTarget::Session(session.clone()), method, json!({}))
                .await?;
        }
        debug!(target: "cdp-adapter", target_id, session = %session, "page listeners attached");
        Ok(session)
    }

    async fn create_target(&self, url: &str) -> Result<String, AdapterError> {
        let response = self
            .send(
                CommandTarget::Browser,
                "Target.createTarget",
                json!({ "url": url }),
            )
            .await?;
        let target_id = response
            .get("targetId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint("createTarget missing targetId")
            })?
            .to_string();
        self.registry.upsert(PageEntry {
            target_id: target_id.clone(),
            cdp_session: None,
            browser_context_id: None,
            url: url.to_string(),
            title: String::new(),
        });
        Ok(target_id)
    }

    /// Pick an existing page (or create one) and make it current.
    async fn select_initial_page(&self) -> Result<String, AdapterError> {
        let response = self
            .send(CommandTarget::Browser, "Target.getTargets", json!({}))
            .await?;
        let infos = response
            .get("targetInfos")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut chosen = None;
        for entry in infos.iter().filter_map(PageEntry::from_target_info) {
            let internal = entry.url.starts_with("devtools://")
                || entry.url.starts_with("chrome-extension://");
            if chosen.is_none() && !internal {
                chosen = Some(entry.target_id.clone());
            }
            self.registry.upsert(entry);
        }

        let target_id = match chosen {
            Some(target_id) => target_id,
            None => {
                info!(target: "cdp-adapter", "no usable page found; creating one");
                self.create_target("about:blank").await?
            }
        };

        self.attach(&target_id).await?;
        *self.current.write() = Some(target_id.clone());
        Ok(target_id)
    }

    async fn ping(&self) -> Result<(), AdapterError> {
        self.send_page(
            "Runtime.evaluate",
            json!({ "expression": "1", "returnByValue": true }),
        )
        .await
        .map(|_| ())
    }

    fn mark_lost(&self, bus: &EventBus, last_error: &RwLock<Option<String>>, reason: String) {
        {
            let mut state = self.state.write();
            if *state == ConnectionState::Disconnected {
                return;
            }
            *state = ConnectionState::Disconnected;
        }
        *last_error.write() = Some(reason.clone());
        metrics::record_connection_lost();
        warn!(target: "cdp-adapter", endpoint = %self.endpoint, error = %reason, "connection lost");
        let _ = bus.send(ConnectionEvent::ConnectionLost {
            endpoint: self.endpoint.clone(),
            error: reason,
        });
        self.shutdown.cancel();
    }

    async fn handle_event(&self, event: TransportEvent, bus: &EventBus) {
        let session = event.session_id.as_deref();
        let params = &event.params;
        match event.method.as_str() {
            "Target.targetCreated" => {
                let Some(info) = params.get("targetInfo") else {
                    return;
                };
                if let Some(entry) = PageEntry::from_target_info(info) {
                    if self.registry.contains(&entry.target_id) {
                        return;
                    }
                    let target_id = entry.target_id.clone();
                    let url = entry.url.clone();
                    self.registry.upsert(entry);
                    info!(target: "cdp-adapter", target_id = %target_id, url = %url, "new tab opened");
                    let _ = bus.send(ConnectionEvent::NewTab { target_id, url });
                }
            }
            "Target.targetInfoChanged" => {
                if let Some(entry) = params
                    .get("targetInfo")
                    .and_then(PageEntry::from_target_info)
                {
                    self.registry.upsert(entry);
                }
            }
            "Target.targetDestroyed" => {
                if let Some(target_id) = params.get("targetId").and_then(|v| v.as_str()) {
                    self.registry.remove(target_id);
                    let mut current = self.current.write();
                    if current.as_deref() == Some(target_id) {
                        warn!(target: "cdp-adapter", target_id, "current page was closed");
                        *current = None;
                    }
                }
            }
            "Page.frameNavigated" => {
                let frame = params.get("frame");
                let is_main = frame
                    .map(|frame| frame.get("parentId").is_none())
                    .unwrap_or(false);
                let url = frame
                    .and_then(|frame| frame.get("url"))
                    .and_then(|v| v.as_str());
                if let (true, Some(url), Some(session)) = (is_main, url, session) {
                    if let Some(target_id) = self.registry.target_for_session(session) {
                        self.registry.set_url(&target_id, url.to_string());
                    }
                }
            }
            "Page.loadEventFired" => {
                if !self.is_current_session(session) {
                    return;
                }
                if let Some(entry) = self.current_entry() {
                    let url = (!entry.url.is_empty()).then_some(entry.url);
                    let _ = bus.send(ConnectionEvent::PageLoad {
                        target_id: entry.target_id,
                        url,
                    });
                }
            }
            "Page.javascriptDialogOpening" => {
                let Some(session) = session else {
                    return;
                };
                let dialog_type = params
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("alert")
                    .to_string();
                let message = params
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let mut accepted = false;
                if self.auto_accept_dialogs {
                    let prompt_text = params
                        .get("defaultPrompt")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default();
                    match self
                        .send(
                            CommandTarget::Session(session.to_string()),
                            "Page.handleJavaScriptDialog",
                            json!({ "accept": true, "promptText": prompt_text }),
                        )
                        .await
                    {
                        Ok(_) => accepted = true,
                        Err(err) => {
                            warn!(target: "cdp-adapter", ?err, "failed to accept dialog")
                        }
                    }
                }
                let target_id = self
                    .registry
                    .target_for_session(session)
                    .unwrap_or_default();
                info!(target: "cdp-adapter", dialog_type = %dialog_type, accepted, "page dialog");
                let _ = bus.send(ConnectionEvent::Dialog {
                    target_id,
                    dialog_type,
                    message,
                    accepted,
                });
            }
            "Runtime.consoleAPICalled" => {
                if !self.is_current_session(session) {
                    return;
                }
                let level = params
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("log")
                    .to_string();
                let text = params
                    .get("args")
                    .and_then(|v| v.as_array())
                    .map(|args| {
                        args.iter()
                            .map(remote_object_text)
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .unwrap_or_default();
                self.emit_console(bus, level, text);
            }
            "Runtime.exceptionThrown" => {
                if !self.is_current_session(session) {
                    return;
                }
                let details = params.get("exceptionDetails");
                let text = details
                    .and_then(|d| d.get("exception"))
                    .and_then(|e| e.get("description"))
                    .or_else(|| details.and_then(|d| d.get("text")))
                    .and_then(|v| v.as_str())
                    .unwrap_or("uncaught exception")
                    .to_string();
                self.emit_console(bus, "error".to_string(), text);
            }
            _ => {}
        }
    }

    fn emit_console(&self, bus: &EventBus, level: String, text: String) {
        let target_id = self.current.read().clone().unwrap_or_default();
        let _ = bus.send(ConnectionEvent::Console {
            target_id,
            level,
            text,
        });
    }
}

fn remote_object_text(arg: &Value) -> String {
    match arg.get("value") {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => arg
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
    }
}

/// Owner of the single link to a remote browser.
pub struct BrowserConnection {
    cfg: ConnectionConfig,
    connector: Arc<dyn TransportConnector>,
    bus: EventBus,
    link: RwLock<Option<Arc<LiveLink>>>,
    last_endpoint: RwLock<Option<String>>,
    last_error: Arc<RwLock<Option<String>>>,
    lifecycle: Mutex<()>,
}

impl BrowserConnection {
    pub fn new(cfg: ConnectionConfig, connector: Arc<dyn TransportConnector>) -> Self {
        let (bus, _) = crate::event_bus(cfg.event_buffer);
        Self {
            cfg,
            connector,
            bus,
            link: RwLock::new(None),
            last_endpoint: RwLock::new(None),
            last_error: Arc::new(RwLock::new(None)),
            lifecycle: Mutex::new(()),
        }
    }

    /// Connection backed by a real DevTools websocket.
    pub fn chromium(cfg: ConnectionConfig) -> Self {
        let connector = ChromiumConnector::new(cfg.discovery_timeout(), cfg.command_timeout());
        Self::new(cfg, Arc::new(connector))
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.cfg
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.bus.subscribe()
    }

    pub fn subscribe_to(&self, kinds: &[EventKind]) -> EventSubscription {
        EventSubscription {
            rx: self.bus.subscribe(),
            kinds: (!kinds.is_empty()).then(|| kinds.iter().copied().collect()),
        }
    }

    /// Connect to `endpoint`, or the configured default when `None`.
    pub async fn connect(&self, endpoint: Option<&str>) -> Result<(), AdapterError> {
        let _guard = self.lifecycle.lock().await;
        let endpoint = endpoint
            .map(str::to_string)
            .unwrap_or_else(|| self.cfg.endpoint.clone());

        let has_link = self.link.read().is_some();
        if has_link {
            self.teardown(Some("superseded by new connection".to_string()))
                .await;
        }
        *self.last_endpoint.write() = Some(endpoint.clone());

        match self.establish(&endpoint).await {
            Ok((link, target_id)) => {
                *self.link.write() = Some(Arc::clone(&link));
                *self.last_error.write() = None;
                self.spawn_background(&link);
                info!(target: "cdp-adapter", endpoint = %endpoint, target_id = %target_id, "connected");
                let _ = self.bus.send(ConnectionEvent::Connected {
                    endpoint,
                    target_id,
                });
                Ok(())
            }
            Err(err) => {
                warn!(target: "cdp-adapter", endpoint = %endpoint, error = %err, "connect failed");
                *self.last_error.write() = Some(err.message());
                Err(err)
            }
        }
    }

    async fn establish(&self, endpoint: &str) -> Result<(Arc<LiveLink>, String), AdapterError> {
        let transport = self.connector.open(endpoint).await?;
        if let Err(err) = transport.start().await {
            transport.close().await;
            return Err(err);
        }

        let link = Arc::new(LiveLink {
            endpoint: endpoint.to_string(),
            transport: Arc::clone(&transport),
            registry: PageRegistry::new(),
            current: RwLock::new(None),
            state: RwLock::new(ConnectionState::Connected),
            liveness_failures: AtomicU32::new(0),
            shutdown: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(Vec::new()),
            command_timeout: self.cfg.command_timeout(),
            auto_accept_dialogs: self.cfg.auto_accept_dialogs,
        });

        match link.select_initial_page().await {
            Ok(target_id) => Ok((link, target_id)),
            Err(err) => {
                transport.close().await;
                Err(err)
            }
        }
    }

    fn spawn_background(&self, link: &Arc<LiveLink>) {
        let mut handles = Vec::with_capacity(2);
        handles.push(tokio::spawn(pump_events(
            Arc::clone(link),
            self.bus.clone(),
            Arc::clone(&self.last_error),
        )));

        if self.cfg.liveness_interval_ms > 0 {
            handles.push(tokio::spawn(run_liveness(
                Arc::clone(link),
                self.bus.clone(),
                Arc::clone(&self.last_error),
                self.cfg.liveness_interval(),
                self.cfg.liveness_failure_threshold.max(1),
            )));
        }
        link.tasks.lock().extend(handles);
    }

    /// Stop background checks and drop local references. The remote browser keeps running.
    pub async fn disconnect(&self) {
        let _guard = self.lifecycle.lock().await;
        self.teardown(Some("disconnect requested".to_string()))
            .await;
    }

    async fn teardown(&self, reason: Option<String>) {
        let link = self.link.write().take();
        let Some(link) = link else {
            return;
        };
        link.shutdown.cancel();
        *link.state.write() = ConnectionState::Disconnected;
        for handle in link.tasks.lock().drain(..) {
            handle.abort();
        }
        link.transport.close().await;
        link.registry.clear();
        info!(target: "cdp-adapter", endpoint = %link.endpoint, "disconnected");
        let _ = self.bus.send(ConnectionEvent::Disconnected {
            endpoint: link.endpoint.clone(),
            reason,
        });
    }

    /// Disconnect, then connect again to the last endpoint.
    pub async fn reconnect(&self) -> Result<(), AdapterError> {
        let endpoint = self
            .last_endpoint
            .read()
            .clone()
            .unwrap_or_else(|| self.cfg.endpoint.clone());
        let last_error = self.last_error.read().clone();
        metrics::record_reconnect();
        info!(target: "cdp-adapter", endpoint = %endpoint, "reconnecting");
        let _ = self.bus.send(ConnectionEvent::Reconnecting {
            endpoint: endpoint.clone(),
            last_error,
        });
        self.disconnect().await;
        self.connect(Some(&endpoint)).await
    }

    /// Snapshot of the connection; reports `Disconnected` rather than failing.
    pub fn status(&self) -> ConnectionStatus {
        let last_error = self.last_error.read().clone();
        let link = self.link.read().clone();
        match link {
            Some(link) => {
                let current = link.current_entry();
                ConnectionStatus {
                    state: link.state(),
                    endpoint: Some(link.endpoint.clone()),
                    last_error,
                    current_target: current.as_ref().map(|entry| entry.target_id.clone()),
                    current_url: current.map(|entry| entry.url),
                    liveness_failures: link.liveness_failures.load(Ordering::Relaxed),
                }
            }
            None => ConnectionStatus {
                state: ConnectionState::Disconnected,
                endpoint: self.last_endpoint.read().clone(),
                last_error,
                current_target: None,
                current_url: None,
                liveness_failures: 0,
            },
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link
            .read()
            .as_ref()
            .map(|link| link.state() != ConnectionState::Disconnected)
            .unwrap_or(false)
    }

    fn active_link(&self) -> Result<Arc<LiveLink>, AdapterError> {
        self.link
            .read()
            .clone()
            .filter(|link| link.state() != ConnectionState::Disconnected)
            .ok_or_else(AdapterError::not_connected)
    }

    pub fn current_page(&self) -> Option<PageEntry> {
        self.active_link().ok()?.current_entry()
    }

    pub fn list_pages(&self) -> Vec<PageEntry> {
        self.active_link()
            .map(|link| link.registry.list())
            .unwrap_or_default()
    }

    /// Make `target_id` the current page, attaching page listeners if needed.
    pub async fn switch_to_page(&self, target_id: &str) -> Result<PageEntry, AdapterError> {
        let link = self.active_link()?;
        let entry = link.registry.get(target_id).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::TargetNotFound)
                .with_hint(format!("unknown page {target_id}"))
        })?;
        if entry.cdp_session.is_none() {
            link.attach(target_id).await?;
        }
        link.send(
            CommandTarget::Browser,
            "Target.activateTarget",
            json!({ "targetId": target_id }),
        )
        .await?;
        *link.current.write() = Some(target_id.to_string());
        info!(target: "cdp-adapter", target_id, "switched current page");
        link.registry.get(target_id).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::TargetNotFound)
                .with_hint(format!("page {target_id} closed while switching"))
        })
    }

    /// Open a new tab at `url` and make it current.
    pub async fn open_page(&self, url: &str) -> Result<PageEntry, AdapterError> {
        let link = self.active_link()?;
        let target_id = link.create_target(url).await?;
        self.switch_to_page(&target_id).await
    }

    pub async fn send_browser_command(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        self.active_link()?
            .send(CommandTarget::Browser, method, params)
            .await
    }

    pub async fn send_page_command(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        self.active_link()?.send_page(method, params).await
    }

    /// Evaluate `expression` in the current page, awaiting promises and returning by value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, AdapterError> {
        let response = self
            .send_page_command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "awaitPromise": true,
                    "returnByValue": true,
                    "userGesture": true,
                }),
            )
            .await?;

        if let Some(details) = response.get("exceptionDetails") {
            let description = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(|v| v.as_str())
                .or_else(|| details.get("text").and_then(|v| v.as_str()))
                .unwrap_or("script raised an exception")
                .to_string();
            return Err(AdapterError::new(AdapterErrorKind::ScriptException)
                .with_hint(description.clone())
                .with_data(json!({
                    "message": description,
                    "line": details.get("lineNumber"),
                    "column": details.get("columnNumber"),
                    "stack": details.get("stackTrace"),
                })));
        }

        Ok(response
            .get("result")
            .and_then(|res| res.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    pub async fn navigate(&self, url: &str) -> Result<(), AdapterError> {
        let link = self.active_link()?;
        let response = link.send_page("Page.navigate", json!({ "url": url })).await?;
        if let Some(error_text) = response
            .get("errorText")
            .and_then(|v| v.as_str())
            .filter(|text| !text.is_empty())
        {
            return Err(AdapterError::new(AdapterErrorKind::NavigationFailed)
                .with_hint(format!("{url}: {error_text}"))
                .retriable(true));
        }
        if let Some((target_id, _)) = link.current_session() {
            link.registry.set_url(&target_id, url.to_string());
        }
        Ok(())
    }

    /// Poll the current document until `condition` holds or `timeout` elapses.
    pub async fn wait_for_load(
        &self,
        condition: LoadCondition,
        timeout: Duration,
    ) -> Result<(), AdapterError> {
        let deadline = Instant::now() + timeout;
        let idle_window = Duration::from_millis(NETWORK_IDLE_WINDOW_MS);
        let mut last_resources: Option<(u64, Instant)> = None;

        loop {
            if Instant::now() >= deadline {
                return Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                    .with_hint(format!("wait for {} timed out", condition.as_str()))
                    .retriable(true));
            }

            let probe = self
                .evaluate(
                    "({ readyState: document.readyState, resources: performance.getEntriesByType('resource').length })",
                )
                .await;
            match probe {
                Ok(value) => {
                    let ready_state = value
                        .get("readyState")
                        .and_then(|v| v.as_str())
                        .unwrap_or("loading");
                    if condition.ready_state_satisfied(ready_state) {
                        if condition != LoadCondition::NetworkIdle {
                            return Ok(());
                        }
                        let resources = value.get("resources").and_then(|v| v.as_u64()).unwrap_or(0);
                        match last_resources {
                            Some((count, since)) if count == resources => {
                                if since.elapsed() >= idle_window {
                                    return Ok(());
                                }
                            }
                            _ => last_resources = Some((resources, Instant::now())),
                        }
                    } else {
                        last_resources = None;
                    }
                }
                Err(err) if err.is_not_connected() => return Err(err),
                Err(err) => {
                    debug!(target: "cdp-adapter", ?err, "load probe failed; retrying");
                }
            }

            sleep(Duration::from_millis(100)).await;
        }
    }

    pub async fn capture_screenshot(&self, full_page: bool) -> Result<Vec<u8>, AdapterError> {
        let params = if full_page {
            let metrics = self
                .send_page_command("Page.getLayoutMetrics", json!({}))
                .await?;
            let size = metrics
                .get("cssContentSize")
                .or_else(|| metrics.get("contentSize"));
            let dimension = |key: &str| {
                size.and_then(|s| s.get(key))
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.0)
            };
            json!({
                "format": "png",
                "captureBeyondViewport": true,
                "clip": {
                    "x": 0,
                    "y": 0,
                    "width": dimension("width"),
                    "height": dimension("height"),
                    "scale": 1,
                },
            })
        } else {
            json!({ "format": "png" })
        };

        let response = self
            .send_page_command("Page.captureScreenshot", params)
            .await?;
        let data = response
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal).with_hint("missing screenshot data")
            })?;
        STANDARD
            .decode(data)
            .map_err(|err| AdapterError::new(AdapterErrorKind::Internal).with_hint(err.to_string()))
    }

    pub async fn press_key(&self, key: &str) -> Result<(), AdapterError> {
        let def = key_definition(key).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("unknown key '{key}'"))
        })?;
        let mut down = json!({
            "type": "keyDown",
            "key": def.key,
            "code": def.code,
            "windowsVirtualKeyCode": def.key_code,
            "nativeVirtualKeyCode": def.key_code,
        });
        if let Some(text) = &def.text {
            down["text"] = json!(text);
        }
        self.send_page_command("Input.dispatchKeyEvent", down)
            .await?;
        self.send_page_command(
            "Input.dispatchKeyEvent",
            json!({
                "type": "keyUp",
                "key": def.key,
                "code": def.code,
                "windowsVirtualKeyCode": def.key_code,
                "nativeVirtualKeyCode": def.key_code,
            }),
        )
        .await
        .map(|_| ())
    }

    /// Type `text` one keystroke at a time into the focused element.
    pub async fn type_characters(&self, text: &str) -> Result<(), AdapterError> {
        for ch in text.chars() {
            if ch == '\n' {
                self.press_key("Enter").await?;
                continue;
            }
            let key = ch.to_string();
            self.send_page_command(
                "Input.dispatchKeyEvent",
                json!({ "type": "keyDown", "key": key, "text": key }),
            )
            .await?;
            self.send_page_command(
                "Input.dispatchKeyEvent",
                json!({ "type": "keyUp", "key": key }),
            )
            .await?;
        }
        Ok(())
    }

    pub async fn insert_text(&self, text: &str) -> Result<(), AdapterError> {
        self.send_page_command("Input.insertText", json!({ "text": text }))
            .await
            .map(|_| ())
    }

    pub async fn dispatch_mouse_event(
        &self,
        kind: &str,
        x: f64,
        y: f64,
        click_count: u32,
    ) -> Result<(), AdapterError> {
        let mut payload = json!({ "type": kind, "x": x, "y": y });
        if kind != "mouseMoved" {
            payload["button"] = json!("left");
            payload["clickCount"] = json!(click_count);
        }
        self.send_page_command("Input.dispatchMouseEvent", payload)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl ScriptHost for BrowserConnection {
    fn is_connected(&self) -> bool {
        BrowserConnection::is_connected(self)
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, AdapterError> {
        BrowserConnection::evaluate(self, expression).await
    }
}

async fn pump_events(link: Arc<LiveLink>, bus: EventBus, last_error: Arc<RwLock<Option<String>>>) {
    debug!(target: "cdp-adapter", endpoint = %link.endpoint, "event pump entered");
    loop {
        tokio::select! {
            _ = link.shutdown.cancelled() => break,
            event = link.transport.next_event() => {
                match event {
                    Some(event) => {
                        metrics::record_event();
                        link.handle_event(event, &bus).await;
                    }
                    None => {
                        if !link.shutdown.is_cancelled() {
                            link.mark_lost(&bus, &last_error, "devtools transport closed".to_string());
                        }
                        break;
                    }
                }
            }
        }
    }
    debug!(target: "cdp-adapter", "event pump exiting");
}

async fn run_liveness(
    link: Arc<LiveLink>,
    bus: EventBus,
    last_error: Arc<RwLock<Option<String>>>,
    period: Duration,
    threshold: u32,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = link.shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match link.ping().await {
            Ok(()) => {
                if link.liveness_failures.swap(0, Ordering::Relaxed) > 0 {
                    info!(target: "cdp-adapter", "liveness restored");
                }
                let mut state = link.state.write();
                if *state == ConnectionState::Degraded {
                    *state = ConnectionState::Connected;
                }
            }
            Err(err) => {
                metrics::record_liveness_failure();
                let failures = link.liveness_failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(target: "cdp-adapter", failures, threshold, error = %err, "liveness check failed");
                if failures >= threshold {
                    link.mark_lost(
                        &bus,
                        &last_error,
                        format!("liveness check failed {failures} times: {err}"),
                    );
                    link.transport.close().await;
                    break;
                }
                let mut state = link.state.write();
                if *state == ConnectionState::Connected {
                    *state = ConnectionState::Degraded;
                }
            }
        }
    }
}
