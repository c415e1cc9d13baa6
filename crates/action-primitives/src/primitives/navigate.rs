//! Navigate primitive - load a URL and wait for it to settle

use std::time::Duration;

use cdp_adapter::LoadCondition;
use perceiver_structural::verify_navigation;
use serde_json::json;
use tracing::info;

use super::{ExecCtx, PrimitiveOutcome};
use crate::errors::ActionError;
use crate::types::normalize_url;

/// Execute navigate primitive
///
/// The URL is normalized (scheme added when missing) and the load waits for
/// `wait_until`, falling back to the configured default condition.
pub async fn execute_navigate(
    ctx: &ExecCtx<'_>,
    url: &str,
    wait_until: Option<LoadCondition>,
) -> Result<PrimitiveOutcome, ActionError> {
    let url = normalize_url(url);
    if url.is_empty() {
        return Err(ActionError::InvalidArgs("navigate requires a url".to_string()));
    }
    let condition = wait_until.unwrap_or(ctx.cfg.default_wait_until);

    info!(
        target: "action-executor",
        action_id = %ctx.action_id,
        url = %url,
        wait_until = condition.as_str(),
        "executing navigate primitive"
    );

    ctx.driver
        .navigate(
            &url,
            condition,
            Duration::from_millis(ctx.cfg.navigation_timeout_ms.max(1)),
        )
        .await?;

    let mut outcome = PrimitiveOutcome::with_data(json!({
        "url": url,
        "waitUntil": condition.as_str(),
    }));
    if ctx.cfg.verify_effects {
        let current = ctx.driver.current_url().await.ok();
        if let Some(current) = &current {
            outcome.data = Some(json!({
                "url": url,
                "finalUrl": current,
                "waitUntil": condition.as_str(),
            }));
        }
        outcome.verification = Some(verify_navigation(&url, current.as_deref()));
    }
    Ok(outcome)
}
