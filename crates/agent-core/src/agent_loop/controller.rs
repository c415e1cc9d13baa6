//! Decision loop controller: the observing -> thinking -> acting state machine.
//!
//! One run is strictly sequential. Each stage waits for its browser or model call to
//! settle before the next starts, and cancellation is only checked at stage boundaries,
//! so at most one in-flight action completes after a stop request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use action_primitives::{ActionArgs, ActionKind, ActionResult};
use perceiver_structural::{ObserveError, Observation};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::DecisionLoopConfig;
use super::ports::{ActionRunner, PageObserver};
use super::types::{LoopOutcome, LoopPhase, LoopStatus};
use crate::artifacts::{Artifact, ArtifactSink, NullArtifactSink};
use crate::errors::{AgentError, ErrorKind};
use crate::ledger::ActionSignatureLedger;
use crate::model::{Decision, GoalContext, HistoryEntry};
use crate::planner::{chat_reply, DecisionProvider};

/// Mutable state of a single run.
struct RunState {
    iteration: u32,
    completed_steps: u32,
    consecutive_failures: u32,
    last_failure: Option<String>,
    history: Vec<HistoryEntry>,
    goal: GoalContext,
    ledger: ActionSignatureLedger,
    started: Instant,
}

impl RunState {
    fn new(instruction: &str, cfg: &DecisionLoopConfig) -> Self {
        Self {
            iteration: 0,
            completed_steps: 0,
            consecutive_failures: 0,
            last_failure: None,
            history: Vec::new(),
            goal: GoalContext::new(instruction.trim()),
            ledger: ActionSignatureLedger::new(cfg.loop_window),
            started: Instant::now(),
        }
    }

    fn note_failure(&mut self, message: impl Into<String>) {
        self.consecutive_failures += 1;
        self.last_failure = Some(message.into());
    }
}

/// Drives one instruction to completion against an observer, an action runner and a
/// decision provider.
pub struct DecisionLoop {
    config: DecisionLoopConfig,
    observer: Arc<dyn PageObserver>,
    runner: Arc<dyn ActionRunner>,
    provider: Arc<dyn DecisionProvider>,
    artifacts: Arc<dyn ArtifactSink>,
    status_tx: watch::Sender<LoopStatus>,
    cancel: CancellationToken,
}

impl DecisionLoop {
    pub fn new(
        config: DecisionLoopConfig,
        observer: Arc<dyn PageObserver>,
        runner: Arc<dyn ActionRunner>,
        provider: Arc<dyn DecisionProvider>,
    ) -> Self {
        let (status_tx, _) = watch::channel(LoopStatus::default());
        Self {
            config,
            observer,
            runner,
            provider,
            artifacts: Arc::new(NullArtifactSink),
            status_tx,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_artifacts(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.artifacts = sink;
        self
    }

    /// Share a caller-owned stop signal.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &DecisionLoopConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request a stop; honoured at the next stage boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Status stream. Late subscribers see the latest snapshot immediately.
    pub fn subscribe(&self) -> watch::Receiver<LoopStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> LoopStatus {
        self.status_tx.borrow().clone()
    }

    /// Run `instruction` until it completes or a terminal condition is hit.
    pub async fn run(&self, instruction: &str) -> LoopOutcome {
        let mut run = RunState::new(instruction, &self.config);
        info!(
            target: "decision-loop",
            provider = self.provider.name(),
            max_iterations = self.config.max_iterations,
            "starting decision loop"
        );

        if instruction.trim().is_empty() {
            return self.fail(run, ErrorKind::CannotProceed, "The instruction is empty.");
        }

        loop {
            if self.cancel.is_cancelled() {
                return self.fail(run, ErrorKind::Cancelled, "The task was cancelled.");
            }
            if run.iteration >= self.config.max_iterations {
                let message = format!(
                    "Stopped after reaching the limit of {} iterations.",
                    self.config.max_iterations
                );
                return self.fail(run, ErrorKind::IterationLimitReached, message);
            }
            run.iteration += 1;

            // observing
            self.publish(&run, LoopPhase::Observing, None);
            let observation = match self.observer.observe().await {
                Ok(observation) => observation,
                Err(ObserveError::NotConnected) => {
                    return self.fail(run, ErrorKind::NotConnected, "Browser not connected.");
                }
                Err(err) => {
                    let message = format!("Could not read the page state: {err}");
                    return self.fail(run, ErrorKind::ObservationFailed, message);
                }
            };

            // thinking
            self.publish(&run, LoopPhase::Thinking, None);
            if let Some(reply) = chat_reply(instruction) {
                debug!(target: "decision-loop", "conversational input; no browser action");
                return self.complete(run, reply);
            }

            let decision = match self
                .provider
                .decide(instruction, &observation, &run.history, &run.goal)
                .await
            {
                Ok(decision) => decision,
                Err(AgentError::CannotProceed(reason)) => {
                    let message = format!("Cannot proceed: {reason}.");
                    return self.fail(run, ErrorKind::CannotProceed, message);
                }
                Err(err) => {
                    warn!(
                        target: "decision-loop",
                        iteration = run.iteration,
                        error = %err,
                        "decision failed"
                    );
                    run.note_failure(err.to_string());
                    if let Some(message) = self.failure_ceiling(&run) {
                        return self.fail(run, ErrorKind::ConsecutiveFailureLimitReached, message);
                    }
                    continue;
                }
            };

            if decision.is_complete {
                let message = decision
                    .completion_message
                    .clone()
                    .unwrap_or_else(|| decision.thought.clone());
                return self.complete(run, message);
            }

            let args = match self.accept(&decision) {
                Ok(args) => args,
                Err(err) => {
                    warn!(
                        target: "decision-loop",
                        iteration = run.iteration,
                        error = %err,
                        "decision rejected"
                    );
                    run.note_failure(err.to_string());
                    if let Some(message) = self.failure_ceiling(&run) {
                        return self.fail(run, ErrorKind::ConsecutiveFailureLimitReached, message);
                    }
                    continue;
                }
            };

            let repeats = run.ledger.record(&args);
            if repeats >= self.config.loop_repeat_threshold {
                let message = format!(
                    "The action {} was proposed {repeats} times without progress.",
                    ActionSignatureLedger::signature(&args)
                );
                return self.fail(run, ErrorKind::LoopDetected, message);
            }

            if self.cancel.is_cancelled() {
                return self.fail(run, ErrorKind::Cancelled, "The task was cancelled.");
            }

            // acting
            self.publish(&run, LoopPhase::Acting, None);
            let result = self.act(&mut run, args, decision, &observation).await;

            if !result.success {
                let kind = ErrorKind::from_action_kind(result.error_kind.as_deref().unwrap_or_default());
                if kind == ErrorKind::NotConnected {
                    return self.fail(run, ErrorKind::NotConnected, "Browser not connected.");
                }
                if let Some(message) = self.failure_ceiling(&run) {
                    return self.fail(run, ErrorKind::ConsecutiveFailureLimitReached, message);
                }
            }
        }
    }

    /// Turn a decision into executable arguments.
    fn accept(&self, decision: &Decision) -> Result<ActionArgs, AgentError> {
        let tool = decision
            .tool
            .as_deref()
            .filter(|tool| !tool.trim().is_empty())
            .ok_or_else(|| AgentError::parse("decision has no tool"))?;
        ActionArgs::from_tool(tool, &decision.args)
            .map_err(|err| AgentError::parse(format!("unusable {tool} call: {err}")))
    }

    async fn act(
        &self,
        run: &mut RunState,
        args: ActionArgs,
        decision: Decision,
        observation: &Observation,
    ) -> ActionResult {
        let mut action = self.runner.new_action(args);
        if matches!(action.kind, ActionKind::RunCode | ActionKind::Wait) {
            action = action.with_max_retries(self.config.single_shot_retries);
        }
        info!(
            target: "decision-loop",
            iteration = run.iteration,
            tool = %action.kind,
            source = ?decision.source,
            "executing action"
        );
        let result = self.runner.execute(&mut action).await;

        if result.success {
            run.consecutive_failures = 0;
            run.last_failure = None;
            run.completed_steps += 1;
            run.goal
                .complete_step(format!("{} {}", action.kind, action.args.to_value()));
            self.after_success(&action.kind, &result, observation).await;
        } else {
            let error = result
                .error
                .clone()
                .unwrap_or_else(|| "action failed".to_string());
            warn!(
                target: "decision-loop",
                iteration = run.iteration,
                tool = %action.kind,
                error = %error,
                "action failed"
            );
            run.note_failure(error);
        }

        run.history.push(HistoryEntry {
            iteration: run.iteration,
            thought: decision.thought,
            url: observation.url.clone(),
            action,
        });
        result
    }

    async fn after_success(&self, kind: &ActionKind, result: &ActionResult, before: &Observation) {
        match kind {
            ActionKind::Click | ActionKind::Press if self.config.settle_timeout_ms > 0 => {
                let timeout = Duration::from_millis(self.config.settle_timeout_ms);
                match self.observer.settle(before, timeout).await {
                    Ok(changes) => debug!(
                        target: "decision-loop",
                        changed = changes.changed,
                        "page settled after action"
                    ),
                    Err(err) => debug!(target: "decision-loop", error = %err, "settle skipped"),
                }
            }
            ActionKind::Screenshot | ActionKind::RunCode => {
                if let Some(data) = &result.data {
                    self.artifacts
                        .save(Artifact::new(kind.as_str(), data.clone()))
                        .await;
                }
            }
            _ => {}
        }
    }

    /// Terminal message once the consecutive-failure ceiling is reached.
    fn failure_ceiling(&self, run: &RunState) -> Option<String> {
        if run.consecutive_failures < self.config.max_consecutive_failures {
            return None;
        }
        Some(format!(
            "{} consecutive steps failed; last error: {}.",
            run.consecutive_failures,
            run.last_failure.as_deref().unwrap_or("unknown")
        ))
    }

    fn publish(&self, run: &RunState, phase: LoopPhase, error: Option<(ErrorKind, &str)>) {
        self.status_tx.send_replace(LoopStatus {
            status: phase,
            iteration_count: run.iteration,
            completed_steps: run.completed_steps,
            error: error.map(|(_, message)| message.to_string()),
            error_kind: error.map(|(kind, _)| kind),
        });
    }

    fn complete(&self, run: RunState, message: String) -> LoopOutcome {
        info!(
            target: "decision-loop",
            iterations = run.iteration,
            completed_steps = run.completed_steps,
            "task complete"
        );
        self.publish(&run, LoopPhase::Complete, None);
        LoopOutcome {
            status: LoopPhase::Complete,
            is_complete: true,
            error_kind: None,
            message,
            remediation: None,
            iterations: run.iteration,
            completed_steps: run.completed_steps,
            duration_ms: run.started.elapsed().as_millis() as u64,
            history: run.history,
            goal: run.goal,
        }
    }

    fn fail(&self, run: RunState, kind: ErrorKind, message: impl Into<String>) -> LoopOutcome {
        let message = message.into();
        warn!(
            target: "decision-loop",
            error_kind = %kind,
            iterations = run.iteration,
            error = %message,
            "task stopped"
        );
        self.publish(&run, LoopPhase::Error, Some((kind, message.as_str())));
        LoopOutcome {
            status: LoopPhase::Error,
            is_complete: true,
            error_kind: Some(kind),
            message,
            remediation: Some(kind.remediation().to_string()),
            iterations: run.iteration,
            completed_steps: run.completed_steps,
            duration_ms: run.started.elapsed().as_millis() as u64,
            history: run.history,
            goal: run.goal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::MemoryArtifactSink;
    use crate::model::DecisionSource;
    use crate::planner::FallbackDecisionProvider;
    use action_primitives::{Action, ActionError};
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use perceiver_structural::{ChangeSet, LoadPhase};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeObserver {
        connected: AtomicBool,
        settles: AtomicUsize,
    }

    impl FakeObserver {
        fn online() -> Arc<Self> {
            Arc::new(Self {
                connected: AtomicBool::new(true),
                settles: AtomicUsize::new(0),
            })
        }

        fn offline() -> Arc<Self> {
            let observer = Self::online();
            observer.connected.store(false, Ordering::SeqCst);
            observer
        }
    }

    #[async_trait]
    impl PageObserver for FakeObserver {
        async fn observe(&self) -> Result<Observation, ObserveError> {
            if !self.connected.load(Ordering::SeqCst) {
                return Err(ObserveError::NotConnected);
            }
            Ok(Observation {
                url: "https://example.com/".into(),
                title: "Example".into(),
                load_phase: LoadPhase::Complete,
                has_loading_indicator: false,
                has_modal_overlay: false,
                content_hash: "1:1".into(),
                visible_element_count: 10,
                text_length: 200,
                timestamp: Utc::now(),
            })
        }

        async fn settle(
            &self,
            _baseline: &Observation,
            _timeout: Duration,
        ) -> Result<ChangeSet, ObserveError> {
            self.settles.fetch_add(1, Ordering::SeqCst);
            Ok(ChangeSet::unchanged())
        }
    }

    #[derive(Default)]
    struct FakeRunner {
        executed: Mutex<Vec<ActionArgs>>,
        failure: Option<ActionError>,
        cancel_on_execute: Option<CancellationToken>,
    }

    impl FakeRunner {
        fn failing(err: ActionError) -> Arc<Self> {
            Arc::new(Self {
                failure: Some(err),
                ..Self::default()
            })
        }

        fn count(&self) -> usize {
            self.executed.lock().len()
        }
    }

    #[async_trait]
    impl ActionRunner for FakeRunner {
        fn new_action(&self, args: ActionArgs) -> Action {
            Action::new(args)
        }

        async fn execute(&self, action: &mut Action) -> ActionResult {
            self.executed.lock().push(action.args.clone());
            if let Some(token) = &self.cancel_on_execute {
                token.cancel();
            }
            let result = match &self.failure {
                Some(err) => ActionResult::failure(err, 1),
                None => ActionResult::success(Some(json!({ "path": "shot.png" })), 1),
            };
            action.finish(result.clone());
            result
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    struct Scripted<F>(F);

    #[async_trait]
    impl<F> DecisionProvider for Scripted<F>
    where
        F: Fn(&[HistoryEntry]) -> Result<Decision, AgentError> + Send + Sync,
    {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn decide(
            &self,
            _instruction: &str,
            _observation: &Observation,
            history: &[HistoryEntry],
            _goal: &GoalContext,
        ) -> Result<Decision, AgentError> {
            (self.0)(history)
        }
    }

    fn scripted<F>(decide: F) -> Arc<dyn DecisionProvider>
    where
        F: Fn(&[HistoryEntry]) -> Result<Decision, AgentError> + Send + Sync + 'static,
    {
        Arc::new(Scripted(decide))
    }

    fn step(tool: &str, args: serde_json::Value) -> Result<Decision, AgentError> {
        Ok(Decision::action(DecisionSource::Llm, tool, args, "next"))
    }

    fn build(
        provider: Arc<dyn DecisionProvider>,
        runner: Arc<FakeRunner>,
        observer: Arc<FakeObserver>,
    ) -> DecisionLoop {
        DecisionLoop::new(DecisionLoopConfig::default(), observer, runner, provider)
    }

    #[tokio::test]
    async fn stops_at_exactly_max_iterations() {
        let runner = Arc::new(FakeRunner::default());
        let provider = scripted(|history| step("wait", json!({ "durationMs": history.len() })));
        let outcome = build(provider, runner.clone(), FakeObserver::online())
            .run("keep waiting")
            .await;

        assert_eq!(outcome.error_kind, Some(ErrorKind::IterationLimitReached));
        assert!(outcome.is_complete);
        assert_eq!(outcome.iterations, 20);
        assert_eq!(runner.count(), 20);
        assert_eq!(outcome.completed_steps, 20);
        assert_eq!(outcome.history[0].action.max_retries, 1);
    }

    #[tokio::test]
    async fn third_identical_proposal_is_a_loop() {
        let runner = Arc::new(FakeRunner::default());
        let provider = scripted(|_| step("click", json!({ "target": "Sign in" })));
        let outcome = build(provider, runner.clone(), FakeObserver::online())
            .run("sign in")
            .await;

        assert_eq!(outcome.error_kind, Some(ErrorKind::LoopDetected));
        assert_eq!(runner.count(), 2);
        assert_eq!(outcome.iterations, 3);
        assert!(outcome.message.contains("3 times"));
        assert!(outcome.remediation.is_some());
    }

    #[tokio::test]
    async fn greeting_completes_without_actions() {
        let runner = Arc::new(FakeRunner::default());
        let provider = scripted(|_| Err(AgentError::provider("must not be called")));
        let outcome = build(provider, runner.clone(), FakeObserver::online())
            .run("你好")
            .await;

        assert!(outcome.is_success());
        assert!(outcome.is_complete);
        assert!(outcome.message.starts_with("你好"));
        assert_eq!(runner.count(), 0);
        assert_eq!(outcome.actions_taken(), 0);
    }

    #[tokio::test]
    async fn failed_actions_hit_the_ceiling() {
        let runner = FakeRunner::failing(ActionError::ElementNotFound {
            target: "Buy".into(),
            attempted: Vec::new(),
            last_error: "not visible".into(),
        });
        let provider = scripted(|history| {
            step("click", json!({ "target": format!("Buy {}", history.len()) }))
        });
        let outcome = build(provider, runner.clone(), FakeObserver::online())
            .run("buy it")
            .await;

        assert_eq!(
            outcome.error_kind,
            Some(ErrorKind::ConsecutiveFailureLimitReached)
        );
        assert_eq!(runner.count(), 3);
        assert!(outcome.message.contains("Element not found"));
        assert!(outcome.history.iter().all(|entry| !entry.succeeded()));
    }

    #[tokio::test]
    async fn a_single_parse_failure_is_recoverable() {
        let runner = Arc::new(FakeRunner::default());
        let calls = AtomicUsize::new(0);
        let provider = scripted(move |_| match calls.fetch_add(1, Ordering::SeqCst) {
            0 => Err(AgentError::parse("garbled")),
            _ => Ok(Decision::complete(DecisionSource::Llm, "done")),
        });
        let outcome = build(provider, runner, FakeObserver::online())
            .run("anything")
            .await;

        assert_eq!(outcome.error_kind, None);
        assert_eq!(outcome.message, "done");
        assert_eq!(outcome.iterations, 2);
    }

    #[tokio::test]
    async fn provider_failures_count_as_failed_cycles() {
        let runner = Arc::new(FakeRunner::default());
        let provider = scripted(|_| Err(AgentError::parse("not json")));
        let outcome = build(provider, runner.clone(), FakeObserver::online())
            .run("do something")
            .await;

        assert_eq!(
            outcome.error_kind,
            Some(ErrorKind::ConsecutiveFailureLimitReached)
        );
        assert_eq!(outcome.iterations, 3);
        assert_eq!(runner.count(), 0);
    }

    #[tokio::test]
    async fn cancellation_lets_the_running_action_finish() {
        let token = CancellationToken::new();
        let runner = Arc::new(FakeRunner {
            cancel_on_execute: Some(token.clone()),
            ..FakeRunner::default()
        });
        let provider = scripted(|history| step("wait", json!({ "ms": history.len() })));
        let outcome = build(provider, runner.clone(), FakeObserver::online())
            .with_cancellation(token)
            .run("wait around")
            .await;

        assert_eq!(outcome.error_kind, Some(ErrorKind::Cancelled));
        assert_eq!(runner.count(), 1);
        assert_eq!(outcome.completed_steps, 1);
    }

    #[tokio::test]
    async fn unknown_instruction_without_model_cannot_proceed() {
        let runner = Arc::new(FakeRunner::default());
        let provider = Arc::new(FallbackDecisionProvider::rules_only());
        let outcome = build(provider, runner.clone(), FakeObserver::online())
            .run("fly me to the moon")
            .await;

        assert_eq!(outcome.error_kind, Some(ErrorKind::CannotProceed));
        assert!(outcome
            .remediation
            .as_deref()
            .unwrap_or_default()
            .contains("Rephrase"));
        assert_eq!(runner.count(), 0);
    }

    #[tokio::test]
    async fn rule_instruction_navigates_then_completes() {
        let runner = Arc::new(FakeRunner::default());
        let provider = Arc::new(FallbackDecisionProvider::rules_only());
        let outcome = build(provider, runner.clone(), FakeObserver::online())
            .run("打开 google.com")
            .await;

        assert!(outcome.is_success());
        assert_eq!(runner.count(), 1);
        assert_eq!(outcome.history[0].action.kind, ActionKind::Navigate);
        assert_eq!(
            outcome.history[0].action.args,
            ActionArgs::Navigate {
                url: "https://google.com".into(),
                wait_until: None,
            }
        );
        assert_eq!(outcome.goal.completed_steps.len(), 1);
    }

    #[tokio::test]
    async fn disconnected_browser_is_terminal() {
        let runner = Arc::new(FakeRunner::default());
        let provider = Arc::new(FallbackDecisionProvider::rules_only());
        let outcome = build(provider, runner.clone(), FakeObserver::offline())
            .run("打开 google.com")
            .await;
        assert_eq!(outcome.error_kind, Some(ErrorKind::NotConnected));
        assert_eq!(runner.count(), 0);

        let runner = FakeRunner::failing(ActionError::NotConnected);
        let provider = scripted(|_| step("press", json!({ "key": "Enter" })));
        let outcome = build(provider, runner.clone(), FakeObserver::online())
            .run("press enter")
            .await;
        assert_eq!(outcome.error_kind, Some(ErrorKind::NotConnected));
        assert_eq!(runner.count(), 1);
    }

    #[tokio::test]
    async fn status_stream_reports_the_final_state() {
        let runner = Arc::new(FakeRunner::default());
        let sink = Arc::new(MemoryArtifactSink::new());
        let observer = FakeObserver::online();
        let provider = scripted(|history| match history.len() {
            0 => step("screenshot", json!({})),
            1 => step("click", json!({ "target": "Next" })),
            _ => Ok(Decision::complete(DecisionSource::Llm, "captured")),
        });
        let decision_loop =
            build(provider, runner, observer.clone()).with_artifacts(sink.clone());
        let status = decision_loop.subscribe();

        let outcome = decision_loop.run("take a screenshot then click Next").await;

        assert!(outcome.is_success());
        let latest = status.borrow().clone();
        assert_eq!(latest.status, LoopPhase::Complete);
        assert_eq!(latest.iteration_count, 3);
        assert_eq!(latest.completed_steps, 2);
        assert_eq!(sink.len(), 1);
        assert_eq!(observer.settles.load(Ordering::SeqCst), 1);
    }
}
