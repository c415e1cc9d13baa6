use serde_json::{json, Value};
use tracing::{debug, info};

use super::{ExecCtx, PrimitiveOutcome};
use crate::errors::ActionError;

/// Evaluate `code` in the page with `vars` bound as a read-only object.
///
/// Success data is `{ value, logs }`. A thrown error becomes
/// [`ActionError::ExecutionError`] carrying message, stack, line, column and the
/// console output captured before the throw.
pub async fn execute_run_code(
    ctx: &ExecCtx<'_>,
    code: &str,
    vars: &Value,
) -> Result<PrimitiveOutcome, ActionError> {
    if code.trim().is_empty() {
        return Err(ActionError::InvalidArgs("runCode requires code".to_string()));
    }
    info!(
        target: "action-executor",
        action_id = %ctx.action_id,
        code_len = code.len(),
        "executing runCode primitive"
    );

    let output = ctx.driver.run_code(code, vars).await?;
    debug!(target: "action-executor", logs = output.logs.len(), "runCode finished");
    Ok(PrimitiveOutcome::with_data(json!({
        "value": output.value,
        "logs": output.logs,
    })))
}
