use cdp_adapter::key_definition;
use serde_json::json;
use tracing::info;

use super::{ExecCtx, PrimitiveOutcome};
use crate::errors::ActionError;

/// Press and release one named key (`Enter`, `Escape`, `a`, ...) on the focused element.
pub async fn execute_press(ctx: &ExecCtx<'_>, key: &str) -> Result<PrimitiveOutcome, ActionError> {
    let def = key_definition(key)
        .ok_or_else(|| ActionError::InvalidArgs(format!("unknown key '{key}'")))?;
    info!(target: "action-executor", action_id = %ctx.action_id, key = %def.key, "pressing key");
    ctx.driver.press(&def.key).await?;
    Ok(PrimitiveOutcome::with_data(json!({ "key": def.key })))
}
