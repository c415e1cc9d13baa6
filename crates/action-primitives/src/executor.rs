//! Action executor
//!
//! Runs one [`Action`] at a time against a [`PageDriver`]: checks the connection,
//! dispatches to the matching primitive, retries retryable failures with a linear
//! backoff, records the selector trail and publishes an [`OperationEvent`].

use std::sync::Arc;
use std::time::Duration;

use cdp_adapter::BrowserConnection;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::driver::{CdpPageDriver, PageDriver};
use crate::errors::ActionError;
use crate::primitives::{
    execute_navigate, execute_pointer, execute_press, execute_run_code, execute_screenshot,
    execute_wait, execute_wait_for_selector, ExecCtx, PointerOp, PrimitiveOutcome,
};
use crate::types::{
    Action, ActionArgs, ActionResult, AttemptStatus, ExecutorConfig, OperationEvent,
    SelectorAttempt,
};

pub struct ActionExecutor {
    driver: Arc<dyn PageDriver>,
    cfg: ExecutorConfig,
    events: broadcast::Sender<OperationEvent>,
    vars: Mutex<Map<String, Value>>,
}

impl ActionExecutor {
    pub fn new(driver: Arc<dyn PageDriver>, cfg: ExecutorConfig) -> Self {
        let (events, _) = broadcast::channel(cfg.event_buffer.max(1));
        Self {
            driver,
            cfg,
            events,
            vars: Mutex::new(Map::new()),
        }
    }

    /// Executor driving the live browser connection
    pub fn for_connection(conn: Arc<BrowserConnection>, cfg: ExecutorConfig) -> Self {
        Self::new(Arc::new(CdpPageDriver::new(conn)), cfg)
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.cfg
    }

    pub fn is_connected(&self) -> bool {
        self.driver.is_connected()
    }

    /// Operation events, one per finished action
    pub fn subscribe(&self) -> broadcast::Receiver<OperationEvent> {
        self.events.subscribe()
    }

    /// Variables visible to `runCode` as `vars`
    pub fn variables(&self) -> Map<String, Value> {
        self.vars.lock().clone()
    }

    pub fn set_variable(&self, name: impl Into<String>, value: Value) {
        self.vars.lock().insert(name.into(), value);
    }

    pub fn clear_variables(&self) {
        self.vars.lock().clear();
    }

    /// New action using the configured `max_retries`
    pub fn action(&self, args: ActionArgs) -> Action {
        Action::new(args).with_max_retries(self.cfg.max_retries)
    }

    /// Build and execute in one step.
    pub async fn run(&self, args: ActionArgs) -> (Action, ActionResult) {
        let mut action = self.action(args);
        let result = self.execute(&mut action).await;
        (action, result)
    }

    /// Execute `action` and record its result. An already finished action is not re-run.
    pub async fn execute(&self, action: &mut Action) -> ActionResult {
        if let Some(result) = action.result() {
            return result.clone();
        }

        let started = Instant::now();
        action.started_at = Some(Utc::now());
        let attempts = action.max_retries.max(1);

        let outcome = loop {
            if !self.driver.is_connected() {
                break Err(ActionError::NotConnected);
            }
            match self.dispatch(&action.id, &action.args).await {
                Ok(outcome) => break Ok(outcome),
                Err(err) => {
                    action.selector_attempts = attempts_of(&err);
                    let attempt = action.retry_count + 1;
                    if !err.is_retryable() || attempt >= attempts {
                        break Err(err);
                    }
                    let backoff = self.cfg.retry_backoff_ms * u64::from(attempt);
                    warn!(
                        target: "action-executor",
                        action_id = %action.id,
                        kind = %action.kind,
                        attempt,
                        backoff_ms = backoff,
                        error = %err,
                        "action failed; retrying"
                    );
                    action.retry_count += 1;
                    sleep(Duration::from_millis(backoff)).await;
                }
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let result = match outcome {
            Ok(outcome) => {
                action.selector_attempts = outcome.attempts.clone();
                let mut result = ActionResult::success(outcome.data.clone(), duration_ms);
                result.verified = outcome.verified();
                result.alternatives_tried = alternatives(&outcome.attempts);
                result.matched = outcome.matched;
                result
            }
            Err(err) => {
                let mut result = ActionResult::failure(&err, duration_ms);
                result.alternatives_tried = action.selector_attempts.clone();
                result
            }
        };

        info!(
            target: "action-executor",
            action_id = %action.id,
            kind = %action.kind,
            success = result.success,
            retries = action.retry_count,
            duration_ms,
            verified = ?result.verified,
            "action finished"
        );

        action.finish(result.clone());
        self.publish(action, &result);
        result
    }

    async fn dispatch(&self, action_id: &str, args: &ActionArgs) -> Result<PrimitiveOutcome, ActionError> {
        let ctx = ExecCtx::new(action_id, self.driver.as_ref(), &self.cfg);
        match args {
            ActionArgs::Navigate { url, wait_until } => execute_navigate(&ctx, url, *wait_until).await,
            ActionArgs::Click { target } => execute_pointer(&ctx, target, PointerOp::Click).await,
            ActionArgs::Hover { target } => execute_pointer(&ctx, target, PointerOp::Hover).await,
            ActionArgs::Type {
                target,
                text,
                clear,
            } => {
                let op = PointerOp::Fill {
                    text,
                    clear: *clear,
                };
                execute_pointer(&ctx, target, op).await
            }
            ActionArgs::Select { target, value } => {
                execute_pointer(&ctx, target, PointerOp::Select { value }).await
            }
            ActionArgs::Press { key } => execute_press(&ctx, key).await,
            ActionArgs::Wait { duration_ms } => execute_wait(&ctx, *duration_ms).await,
            ActionArgs::Screenshot { path, full_page } => {
                execute_screenshot(&ctx, path.as_deref(), *full_page).await
            }
            ActionArgs::WaitForSelector { target, timeout_ms } => {
                execute_wait_for_selector(&ctx, target, *timeout_ms).await
            }
            ActionArgs::RunCode { code, store_as } => {
                let vars = Value::Object(self.variables());
                let outcome = execute_run_code(&ctx, code, &vars).await?;
                if let Some(name) = store_as {
                    let value = outcome
                        .data
                        .as_ref()
                        .and_then(|data| data.get("value"))
                        .cloned()
                        .unwrap_or(Value::Null);
                    self.set_variable(name.clone(), value);
                }
                Ok(outcome)
            }
        }
    }

    fn publish(&self, action: &Action, result: &ActionResult) {
        let event = OperationEvent {
            action_id: action.id.clone(),
            kind: action.kind,
            args: action.args.to_value(),
            success: result.success,
            matched: result.matched.as_ref().map(|c| c.expression.clone()),
            alternatives: result.alternatives_tried.clone(),
            timestamp: Utc::now(),
        };
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

fn attempts_of(err: &ActionError) -> Vec<SelectorAttempt> {
    match err {
        ActionError::ElementNotFound { attempted, .. } => attempted.clone(),
        _ => Vec::new(),
    }
}

/// Candidates tried before the one that matched
fn alternatives(attempts: &[SelectorAttempt]) -> Vec<SelectorAttempt> {
    attempts
        .iter()
        .filter(|attempt| attempt.status != AttemptStatus::Matched)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{CodeOutput, ElementProbe, SelectedOption};
    use crate::types::ActionKind;
    use action_locator::{CandidateStrategy, StrategyKind};
    use async_trait::async_trait;
    use cdp_adapter::{AdapterError, AdapterErrorKind, LoadCondition};
    use serde_json::json;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeDriver {
        disconnected: AtomicBool,
        usable: HashSet<String>,
        broken: HashSet<String>,
        fields: Mutex<HashMap<String, String>>,
        url: Mutex<String>,
        nav_failures: AtomicUsize,
        calls: Mutex<Vec<String>>,
    }

    impl FakeDriver {
        fn with_usable(expressions: &[&str]) -> Self {
            Self {
                usable: expressions.iter().map(|e| e.to_string()).collect(),
                url: Mutex::new("https://start.example/".into()),
                ..Self::default()
            }
        }

        fn record(&self, call: String) {
            self.calls.lock().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn check(&self, candidate: &CandidateStrategy) -> Result<(), AdapterError> {
            if self.broken.contains(&candidate.expression) {
                return Err(AdapterError::new(AdapterErrorKind::Internal).with_hint("element detached"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PageDriver for FakeDriver {
        fn is_connected(&self) -> bool {
            !self.disconnected.load(Ordering::SeqCst)
        }

        async fn probe(&self, candidate: &CandidateStrategy) -> Result<ElementProbe, AdapterError> {
            self.record(format!("probe {}", candidate.expression));
            let usable = self.usable.contains(&candidate.expression);
            Ok(ElementProbe {
                found: usable,
                visible: usable,
                ..ElementProbe::default()
            })
        }

        async fn click(&self, candidate: &CandidateStrategy) -> Result<(), AdapterError> {
            self.record(format!("click {}", candidate.expression));
            self.check(candidate)
        }

        async fn hover(&self, candidate: &CandidateStrategy) -> Result<(), AdapterError> {
            self.record(format!("hover {}", candidate.expression));
            self.check(candidate)
        }

        async fn fill(&self, candidate: &CandidateStrategy, text: &str, clear: bool) -> Result<(), AdapterError> {
            self.record(format!("fill {}", candidate.expression));
            self.check(candidate)?;
            let mut fields = self.fields.lock();
            let entry = fields.entry(candidate.expression.clone()).or_default();
            if clear {
                entry.clear();
            }
            entry.push_str(text);
            Ok(())
        }

        async fn select(&self, candidate: &CandidateStrategy, value: &str) -> Result<SelectedOption, AdapterError> {
            self.record(format!("select {}", candidate.expression));
            self.fields
                .lock()
                .insert(candidate.expression.clone(), value.to_string());
            Ok(SelectedOption {
                value: value.to_string(),
                label: value.to_uppercase(),
            })
        }

        async fn field_value(&self, candidate: &CandidateStrategy) -> Result<Option<String>, AdapterError> {
            Ok(self.fields.lock().get(&candidate.expression).cloned())
        }

        async fn navigate(&self, url: &str, _wait_until: LoadCondition, _timeout: Duration) -> Result<(), AdapterError> {
            self.record(format!("navigate {url}"));
            if self
                .nav_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(AdapterError::new(AdapterErrorKind::NavTimeout).with_hint("load timed out"));
            }
            *self.url.lock() = url.to_string();
            Ok(())
        }

        async fn press(&self, key: &str) -> Result<(), AdapterError> {
            self.record(format!("press {key}"));
            Ok(())
        }

        async fn screenshot(&self, _full_page: bool) -> Result<Vec<u8>, AdapterError> {
            self.record("screenshot".into());
            Ok(vec![0x89, b'P', b'N', b'G'])
        }

        async fn run_code(&self, code: &str, vars: &Value) -> Result<CodeOutput, AdapterError> {
            self.record(format!("run {code}"));
            if code.contains("throw") {
                return Err(AdapterError::new(AdapterErrorKind::ScriptException)
                    .with_hint("boom")
                    .with_data(json!({
                        "message": "boom",
                        "stack": "Error: boom\n    at <anonymous>:3:9",
                        "line": 3,
                        "column": 9,
                        "logs": ["before"],
                    })));
            }
            Ok(CodeOutput {
                value: json!({ "seen": vars.clone() }),
                logs: vec!["hello".into()],
            })
        }

        async fn current_url(&self) -> Result<String, AdapterError> {
            Ok(self.url.lock().clone())
        }
    }

    fn executor(driver: Arc<FakeDriver>) -> ActionExecutor {
        ActionExecutor::new(driver, ExecutorConfig::default())
    }

    fn single_shot(driver: Arc<FakeDriver>) -> ActionExecutor {
        let cfg = ExecutorConfig {
            max_retries: 1,
            ..ExecutorConfig::default()
        };
        ActionExecutor::new(driver, cfg)
    }

    #[tokio::test(start_paused = true)]
    async fn css_candidate_is_tried_first() {
        let driver = Arc::new(FakeDriver::with_usable(&["#submit", "text=\"#submit\""]));
        let (action, result) = executor(driver.clone())
            .run(ActionArgs::Click {
                target: "#submit".into(),
            })
            .await;
        assert!(result.success);
        let matched = result.matched.expect("matched");
        assert_eq!(matched.kind, StrategyKind::Css);
        assert!(result.alternatives_tried.is_empty());
        assert_eq!(action.selector_attempts.len(), 1);
        assert!(driver.calls().contains(&"click #submit".to_string()));
        assert_eq!(result.verified, None);
    }

    #[tokio::test(start_paused = true)]
    async fn unusable_candidates_fall_through() {
        let driver = Arc::new(FakeDriver::with_usable(&["[data-testid=\"Sign in\"]"]));
        let (_, result) = executor(driver)
            .run(ActionArgs::Hover {
                target: "Sign in".into(),
            })
            .await;
        assert!(result.success);
        assert_eq!(result.matched.expect("matched").kind, StrategyKind::TestId);
        assert_eq!(result.alternatives_tried.len(), 1);
        assert_eq!(result.alternatives_tried[0].status, AttemptStatus::Unusable);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_cascade_lists_every_candidate() {
        let driver = Arc::new(FakeDriver::with_usable(&[]));
        let (action, result) = single_shot(driver)
            .run(ActionArgs::Click {
                target: "Checkout".into(),
            })
            .await;
        assert!(!result.success);
        assert_eq!(result.error_kind.as_deref(), Some("element_not_found"));
        let message = result.error.expect("error");
        for expression in [
            "text=\"Checkout\"",
            "[data-testid=\"Checkout\"]",
            "role=*[name=\"Checkout\"]",
            "[placeholder=\"Checkout\"]",
            "label=\"Checkout\"",
        ] {
            assert!(message.contains(expression), "{message} lacks {expression}");
        }
        assert!(message.contains("last error:"));
        assert_eq!(action.selector_attempts.len(), 5);
        assert_eq!(result.alternatives_tried.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_operation_moves_to_next_candidate() {
        let mut driver = FakeDriver::with_usable(&["#go", "text=\"#go\""]);
        driver.broken.insert("#go".into());
        let driver = Arc::new(driver);
        let (_, result) = executor(driver.clone())
            .run(ActionArgs::Click {
                target: "#go".into(),
            })
            .await;
        assert!(result.success);
        assert_eq!(result.matched.expect("matched").kind, StrategyKind::Text);
        assert_eq!(result.alternatives_tried[0].status, AttemptStatus::Failed);
        assert_eq!(
            result.alternatives_tried[0].error.as_deref(),
            Some("element detached")
        );
        let calls = driver.calls();
        assert!(calls.contains(&"click #go".to_string()));
        assert!(calls.contains(&"click text=\"#go\"".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn type_replaces_or_appends() {
        let driver = Arc::new(FakeDriver::with_usable(&["#q"]));
        driver.fields.lock().insert("#q".into(), "old".into());
        let exec = executor(driver.clone());

        let (_, appended) = exec
            .run(ActionArgs::Type {
                target: "#q".into(),
                text: "new".into(),
                clear: false,
            })
            .await;
        assert!(appended.success);
        assert_eq!(appended.verified, Some(true));
        assert_eq!(driver.fields.lock().get("#q").map(String::as_str), Some("oldnew"));

        let (_, replaced) = exec
            .run(ActionArgs::Type {
                target: "#q".into(),
                text: "fresh".into(),
                clear: true,
            })
            .await;
        assert_eq!(replaced.verified, Some(true));
        assert_eq!(driver.fields.lock().get("#q").map(String::as_str), Some("fresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_executor_makes_no_calls() {
        let driver = Arc::new(FakeDriver::with_usable(&["#a"]));
        driver.disconnected.store(true, Ordering::SeqCst);
        let (action, result) = executor(driver.clone())
            .run(ActionArgs::Click { target: "#a".into() })
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Browser not connected"));
        assert_eq!(action.retry_count, 0);
        assert!(driver.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failures_back_off_linearly() {
        let driver = Arc::new(FakeDriver::with_usable(&[]));
        driver.nav_failures.store(2, Ordering::SeqCst);
        let started = Instant::now();
        let (action, result) = executor(driver.clone())
            .run(ActionArgs::Navigate {
                url: "example.com".into(),
                wait_until: None,
            })
            .await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(action.retry_count, 2);
        assert!(started.elapsed() >= Duration::from_millis(1_500));
        let navigations: Vec<_> = driver
            .calls()
            .into_iter()
            .filter(|call| call.starts_with("navigate"))
            .collect();
        assert_eq!(navigations, vec!["navigate https://example.com"; 3]);
        assert_eq!(result.verified, Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_stop_after_max_retries() {
        let driver = Arc::new(FakeDriver::with_usable(&[]));
        driver.nav_failures.store(10, Ordering::SeqCst);
        let (action, result) = executor(driver)
            .run(ActionArgs::Navigate {
                url: "https://slow.example".into(),
                wait_until: Some(LoadCondition::Load),
            })
            .await;
        assert!(!result.success);
        assert_eq!(result.error_kind.as_deref(), Some("operation_timeout"));
        assert_eq!(action.retry_count, 2);
    }

    #[tokio::test]
    async fn unknown_key_is_not_retried() {
        let driver = Arc::new(FakeDriver::with_usable(&[]));
        let (action, result) = executor(driver.clone())
            .run(ActionArgs::Press {
                key: "Hyper".into(),
            })
            .await;
        assert_eq!(result.error_kind.as_deref(), Some("invalid_args"));
        assert_eq!(action.retry_count, 0);
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_quoted_target_is_rejected_without_probing() {
        let driver = Arc::new(FakeDriver::with_usable(&[]));
        let (action, result) = executor(driver.clone())
            .run(ActionArgs::Click {
                target: "\"\"".into(),
            })
            .await;
        assert!(!result.success);
        assert_eq!(result.error_kind.as_deref(), Some("invalid_args"));
        assert_eq!(action.retry_count, 0);
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn run_code_failure_carries_details() {
        let driver = Arc::new(FakeDriver::with_usable(&[]));
        let mut action = Action::new(ActionArgs::RunCode {
            code: "throw new Error('boom')".into(),
            store_as: None,
        })
        .with_max_retries(1);
        let result = executor(driver).execute(&mut action).await;
        assert!(!result.success);
        assert_eq!(result.error_kind.as_deref(), Some("execution_error"));
        let details = result.error_details.expect("details");
        assert_eq!(details["line"], 3);
        assert_eq!(details["column"], 9);
        assert_eq!(details["logs"], json!(["before"]));
    }

    #[tokio::test]
    async fn run_code_stores_value_in_variables() {
        let driver = Arc::new(FakeDriver::with_usable(&[]));
        let exec = executor(driver);
        exec.set_variable("n", json!(1));
        let (_, result) = exec
            .run(ActionArgs::RunCode {
                code: "vars.n".into(),
                store_as: Some("snapshot".into()),
            })
            .await;
        assert!(result.success);
        assert_eq!(result.data.expect("data")["logs"], json!(["hello"]));
        assert_eq!(
            exec.variables().get("snapshot"),
            Some(&json!({ "seen": { "n": 1 } }))
        );
    }

    #[tokio::test]
    async fn select_reports_option() {
        let driver = Arc::new(FakeDriver::with_usable(&["select#country"]));
        let (_, result) = executor(driver)
            .run(ActionArgs::Select {
                target: "select#country".into(),
                value: "us".into(),
            })
            .await;
        assert!(result.success);
        assert_eq!(result.data.expect("data")["label"], "US");
        assert_eq!(result.verified, Some(true));
    }

    #[tokio::test]
    async fn screenshot_is_written_to_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let driver = Arc::new(FakeDriver::with_usable(&[]));
        let cfg = ExecutorConfig {
            screenshot_dir: dir.path().join("shots").display().to_string(),
            ..ExecutorConfig::default()
        };
        let exec = ActionExecutor::new(driver, cfg);
        let (_, result) = exec
            .run(ActionArgs::Screenshot {
                path: None,
                full_page: None,
            })
            .await;
        assert!(result.success, "{:?}", result.error);
        let data = result.data.expect("data");
        let path = data["path"].as_str().expect("path");
        assert_eq!(std::fs::read(path).expect("file").len(), 4);
        assert_eq!(data["fullPage"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn operation_event_is_published() {
        let driver = Arc::new(FakeDriver::with_usable(&["#save"]));
        let exec = executor(driver);
        let mut events = exec.subscribe();
        let (action, _) = exec
            .run(ActionArgs::Click {
                target: "#save".into(),
            })
            .await;
        let event = events.recv().await.expect("event");
        assert_eq!(event.action_id, action.id);
        assert_eq!(event.kind, ActionKind::Click);
        assert_eq!(event.args, json!({ "target": "#save" }));
        assert_eq!(event.matched.as_deref(), Some("#save"));
        assert!(event.success);
    }

    #[tokio::test]
    async fn finished_action_is_not_rerun() {
        let driver = Arc::new(FakeDriver::with_usable(&[]));
        let exec = executor(driver.clone());
        let mut action = exec.action(ActionArgs::Press { key: "Enter".into() });
        let first = exec.execute(&mut action).await;
        let second = exec.execute(&mut action).await;
        assert_eq!(first, second);
        assert_eq!(driver.calls(), vec!["press Enter".to_string()]);
    }
}
