//! Pointer primitives - click, hover, type and select with the fallback cascade

use action_locator::{resolve, CandidateStrategy};
use perceiver_structural::{
    verify_click_navigation, verify_selected_value, verify_typed_text, Verification,
};
use serde_json::{json, Value};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use super::{triage, ExecCtx, PrimitiveOutcome};
use crate::driver::ElementProbe;
use crate::errors::ActionError;
use crate::types::{AttemptStatus, SelectorAttempt};

const VISIBILITY_POLL_MS: u64 = 100;

/// Operation applied to the first usable candidate
#[derive(Debug, Clone, Copy)]
pub enum PointerOp<'a> {
    Click,
    Hover,
    Fill { text: &'a str, clear: bool },
    Select { value: &'a str },
}

impl PointerOp<'_> {
    fn name(&self) -> &'static str {
        match self {
            PointerOp::Click => "click",
            PointerOp::Hover => "hover",
            PointerOp::Fill { .. } => "type",
            PointerOp::Select { .. } => "select",
        }
    }
}

/// Poll a candidate until it is found and visible, or the visibility window closes.
async fn wait_usable(
    ctx: &ExecCtx<'_>,
    candidate: &CandidateStrategy,
) -> Result<ElementProbe, ActionError> {
    let deadline = Instant::now() + ctx.visibility_timeout();
    let interval = std::time::Duration::from_millis(VISIBILITY_POLL_MS);
    loop {
        let probe = match ctx.driver.probe(candidate).await {
            Ok(probe) => probe,
            Err(err) => {
                let message = triage(err)?;
                debug!(target: "action-executor", expression = %candidate.expression, error = %message, "probe failed");
                ElementProbe::default()
            }
        };
        if probe.usable() || Instant::now() + interval > deadline {
            return Ok(probe);
        }
        sleep(interval).await;
    }
}

/// Run the operation against one candidate, returning optional result data.
async fn apply(
    ctx: &ExecCtx<'_>,
    candidate: &CandidateStrategy,
    op: PointerOp<'_>,
) -> Result<(Option<Value>, Option<Verification>), cdp_adapter::AdapterError> {
    let verify = ctx.cfg.verify_effects;
    match op {
        PointerOp::Click => {
            let before = if verify {
                ctx.driver.current_url().await.ok()
            } else {
                None
            };
            ctx.driver.click(candidate).await?;
            let verification = match before {
                Some(before) => {
                    let after = ctx.driver.current_url().await.ok();
                    // A click that stays on the page proves nothing either way
                    Some(verify_click_navigation(&before, after.as_deref()))
                        .filter(|v| v.verified)
                }
                None => None,
            };
            Ok((None, verification))
        }
        PointerOp::Hover => {
            ctx.driver.hover(candidate).await?;
            Ok((None, None))
        }
        PointerOp::Fill { text, clear } => {
            let prior = if clear || !verify {
                None
            } else {
                ctx.driver.field_value(candidate).await.ok().flatten()
            };
            ctx.driver.fill(candidate, text, clear).await?;
            if !verify {
                return Ok((None, None));
            }
            let expected = match prior {
                Some(prior) => format!("{prior}{text}"),
                None => text.to_string(),
            };
            let actual = ctx.driver.field_value(candidate).await.ok().flatten();
            Ok((None, Some(verify_typed_text(&expected, actual.as_deref()))))
        }
        PointerOp::Select { value } => {
            let selected = ctx.driver.select(candidate, value).await?;
            let data = json!({ "value": selected.value, "label": selected.label });
            if !verify {
                return Ok((Some(data), None));
            }
            let actual = ctx.driver.field_value(candidate).await.ok().flatten();
            let verification =
                verify_selected_value(value, actual.as_deref(), Some(selected.label.as_str()));
            Ok((Some(data), Some(verification)))
        }
    }
}

/// Execute a pointer primitive
///
/// Resolves `target` into its candidate list and walks it in order:
/// 1. Wait up to the visibility window for the candidate to be found and visible
/// 2. Apply the operation under the interaction timeout
/// 3. On failure record the attempt and move to the next candidate
///
/// The first candidate that succeeds wins. When every candidate fails the error lists
/// all of them together with the last failure.
pub async fn execute_pointer(
    ctx: &ExecCtx<'_>,
    target: &str,
    op: PointerOp<'_>,
) -> Result<PrimitiveOutcome, ActionError> {
    let candidates = resolve(target);
    if candidates.is_empty() {
        return Err(ActionError::InvalidArgs(format!(
            "{} requires a non-empty target",
            op.name()
        )));
    }

    info!(
        target: "action-executor",
        action_id = %ctx.action_id,
        op = op.name(),
        candidates = candidates.len(),
        "executing pointer primitive"
    );

    let mut attempts = Vec::with_capacity(candidates.len());
    let mut last_error = String::from("no candidate was usable");

    for candidate in candidates {
        let probe = wait_usable(ctx, &candidate).await?;
        if !probe.usable() {
            let reason = probe.reason();
            attempts.push(SelectorAttempt::from_candidate(
                &candidate,
                AttemptStatus::Unusable,
                Some(reason),
            ));
            last_error = format!("{}: {reason}", candidate.expression);
            continue;
        }

        match timeout(ctx.interaction_timeout(), apply(ctx, &candidate, op)).await {
            Ok(Ok((data, verification))) => {
                debug!(
                    target: "action-executor",
                    action_id = %ctx.action_id,
                    strategy = %candidate.kind,
                    expression = %candidate.expression,
                    "candidate matched"
                );
                attempts.push(SelectorAttempt::from_candidate(
                    &candidate,
                    AttemptStatus::Matched,
                    None,
                ));
                return Ok(PrimitiveOutcome {
                    data,
                    matched: Some(candidate),
                    attempts,
                    verification,
                });
            }
            Ok(Err(err)) => {
                let message = triage(err)?;
                warn!(
                    target: "action-executor",
                    action_id = %ctx.action_id,
                    expression = %candidate.expression,
                    error = %message,
                    "candidate failed; trying next"
                );
                attempts.push(SelectorAttempt::from_candidate(
                    &candidate,
                    AttemptStatus::Failed,
                    Some(&message),
                ));
                last_error = format!("{}: {message}", candidate.expression);
            }
            Err(_) => {
                let message = format!(
                    "{} timed out after {}ms",
                    op.name(),
                    ctx.cfg.interaction_timeout_ms
                );
                attempts.push(SelectorAttempt::from_candidate(
                    &candidate,
                    AttemptStatus::Failed,
                    Some(&message),
                ));
                last_error = format!("{}: {message}", candidate.expression);
            }
        }
    }

    Err(ActionError::ElementNotFound {
        target: target.to_string(),
        attempted: attempts,
        last_error,
    })
}
