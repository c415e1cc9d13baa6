//! Wait primitives - fixed delays and waiting for a target to appear

use std::time::Duration;

use action_locator::resolve;
use serde_json::json;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use super::{triage, ExecCtx, PrimitiveOutcome};
use crate::errors::ActionError;
use crate::types::{AttemptStatus, SelectorAttempt};

/// Sleep for a fixed duration.
pub async fn execute_wait(ctx: &ExecCtx<'_>, duration_ms: u64) -> Result<PrimitiveOutcome, ActionError> {
    debug!(target: "action-executor", action_id = %ctx.action_id, duration_ms, "waiting");
    sleep(Duration::from_millis(duration_ms)).await;
    Ok(PrimitiveOutcome::with_data(json!({ "waitedMs": duration_ms })))
}

/// Execute wait-for-selector primitive
///
/// Each poll round probes every candidate of `target`; the first found and visible one
/// ends the wait. Times out with [`ActionError::OperationTimeout`].
pub async fn execute_wait_for_selector(
    ctx: &ExecCtx<'_>,
    target: &str,
    timeout_ms: Option<u64>,
) -> Result<PrimitiveOutcome, ActionError> {
    let candidates = resolve(target);
    if candidates.is_empty() {
        return Err(ActionError::InvalidArgs(
            "waitForSelector requires a non-empty target".to_string(),
        ));
    }
    let timeout_ms = timeout_ms.unwrap_or(ctx.cfg.wait_for_selector_timeout_ms);
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    let started = Instant::now();

    info!(
        target: "action-executor",
        action_id = %ctx.action_id,
        selector = %target,
        timeout_ms,
        "executing wait-for-selector primitive"
    );

    loop {
        for candidate in &candidates {
            let probe = match ctx.driver.probe(candidate).await {
                Ok(probe) => probe,
                Err(err) => {
                    triage(err)?;
                    continue;
                }
            };
            if probe.usable() {
                return Ok(PrimitiveOutcome {
                    data: Some(json!({
                        "expression": candidate.expression,
                        "waitedMs": started.elapsed().as_millis() as u64,
                    })),
                    matched: Some(candidate.clone()),
                    attempts: vec![SelectorAttempt::from_candidate(
                        candidate,
                        AttemptStatus::Matched,
                        None,
                    )],
                    verification: None,
                });
            }
        }
        if Instant::now() + ctx.poll_interval() > deadline {
            return Err(ActionError::OperationTimeout(format!(
                "{target:?} did not appear within {timeout_ms}ms"
            )));
        }
        sleep(ctx.poll_interval()).await;
    }
}
