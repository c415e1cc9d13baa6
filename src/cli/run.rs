use std::sync::Arc;

use action_primitives::OperationEvent;
use agent_core::{
    DecisionLoop, DecisionProvider, FallbackDecisionProvider, LlmDecisionProvider, LoopOutcome,
    LoopPhase, MemoryArtifactSink, OpenAiChatModel,
};
use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use super::context::CliContext;
use super::output::{emit, OutputFormat};
use crate::config::PilotConfig;

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Instruction, e.g. "打开 example.com 然后 点击 登录" or "open example.com"
    pub instruction: String,

    /// Use the rule table only, even when a model is configured
    #[arg(long)]
    pub no_llm: bool,

    /// Print the final outcome as JSON
    #[arg(long)]
    pub json: bool,

    /// Override `agent.max_iterations`
    #[arg(long)]
    pub max_iterations: Option<u32>,
}

#[derive(Serialize)]
struct RunReport<'a> {
    provider: &'a str,
    #[serde(flatten)]
    outcome: &'a LoopOutcome,
    artifacts: usize,
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let format = if args.json { OutputFormat::Json } else { output };
    let human = format == OutputFormat::Human;

    let connection = ctx.connection();
    if let Err(err) = connection.connect(None).await {
        // the loop reports this as a classified not_connected outcome
        warn!(endpoint = %ctx.config().connection.endpoint, error = %err, "browser connection failed");
    }
    let executor = ctx.executor(&connection);
    let observer = ctx.observer(&connection);
    let provider = build_provider(ctx.config(), args.no_llm);
    let provider_name = provider.name().to_string();

    let mut agent = ctx.config().agent.clone();
    if let Some(max) = args.max_iterations {
        agent.max_iterations = max;
    }
    let sink = Arc::new(MemoryArtifactSink::new());
    let decision_loop =
        DecisionLoop::new(agent, observer, executor.clone(), provider).with_artifacts(sink.clone());

    let cancel = decision_loop.cancellation_token();
    let ctrl_c = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if signal::ctrl_c().await.is_ok() {
                eprintln!("Stopping after the current step...");
                cancel.cancel();
            }
        }
    });

    let status_task = human.then(|| {
        let mut status = decision_loop.subscribe();
        tokio::spawn(async move {
            let mut last = None;
            while status.changed().await.is_ok() {
                let snapshot = status.borrow_and_update().clone();
                let key = (snapshot.status, snapshot.iteration_count);
                if last == Some(key) || snapshot.status.is_terminal() {
                    continue;
                }
                last = Some(key);
                println!(
                    "[{}] iteration {} ({} step(s) done)",
                    snapshot.status, snapshot.iteration_count, snapshot.completed_steps
                );
            }
        })
    });
    let events_task = human.then(|| {
        let mut events = executor.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => print_operation(&event),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    info!(provider = %provider_name, "running instruction");
    let outcome = decision_loop.run(&args.instruction).await;

    ctrl_c.abort();
    if let Some(task) = status_task {
        task.abort();
    }
    if let Some(task) = events_task {
        task.abort();
    }
    connection.disconnect().await;

    let report = RunReport {
        provider: &provider_name,
        outcome: &outcome,
        artifacts: sink.len(),
    };
    emit(format, &report, || print_outcome(&outcome))?;

    if let Some(kind) = outcome.error_kind {
        bail!("task stopped: {kind}");
    }
    Ok(())
}

fn build_provider(config: &PilotConfig, no_llm: bool) -> Arc<dyn DecisionProvider> {
    if no_llm {
        return Arc::new(FallbackDecisionProvider::rules_only());
    }
    let Some(section) = &config.llm else {
        return Arc::new(FallbackDecisionProvider::rules_only());
    };
    let Some(llm) = section.resolve() else {
        warn!(
            variable = %section.api_key_env,
            "model configured but its API key variable is unset; using rules only"
        );
        return Arc::new(FallbackDecisionProvider::rules_only());
    };
    match OpenAiChatModel::new(llm) {
        Ok(model) => {
            let primary: Arc<dyn DecisionProvider> =
                Arc::new(LlmDecisionProvider::new(Arc::new(model)));
            Arc::new(FallbackDecisionProvider::new(Some(primary)))
        }
        Err(err) => {
            warn!(error = %err, "model client unavailable; using rules only");
            Arc::new(FallbackDecisionProvider::rules_only())
        }
    }
}

fn print_operation(event: &OperationEvent) {
    let mark = if event.success { "ok" } else { "failed" };
    match &event.matched {
        Some(matched) => println!("  {} {} via {} -> {}", event.kind, event.args, matched, mark),
        None => println!("  {} {} -> {}", event.kind, event.args, mark),
    }
}

fn print_outcome(outcome: &LoopOutcome) {
    match outcome.status {
        LoopPhase::Complete => println!("Done: {}", outcome.message),
        _ => {
            let kind = outcome
                .error_kind
                .map(|kind| kind.to_string())
                .unwrap_or_else(|| "error".to_string());
            println!("Stopped ({kind}): {}", outcome.message);
            if let Some(hint) = &outcome.remediation {
                println!("Hint: {hint}");
            }
        }
    }
    println!(
        "{} iteration(s), {} step(s) completed, {} ms",
        outcome.iterations, outcome.completed_steps, outcome.duration_ms
    );
}
