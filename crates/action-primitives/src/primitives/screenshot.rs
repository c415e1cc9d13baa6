//! Screenshot primitive - capture the page into a PNG file

use std::path::PathBuf;

use chrono::Utc;
use serde_json::json;
use tracing::info;

use super::{ExecCtx, PrimitiveOutcome};
use crate::errors::ActionError;

/// Default file name under the configured screenshot directory
pub fn screenshot_path(dir: &str, action_id: &str) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d-%H%M%S%3f");
    let short_id: String = action_id.chars().take(8).collect();
    PathBuf::from(dir).join(format!("screenshot-{stamp}-{short_id}.png"))
}

/// Execute screenshot primitive
///
/// Captures the viewport (or the full page) and writes it to `path`, or to a
/// timestamped file in the screenshot directory. Parent directories are created.
pub async fn execute_screenshot(
    ctx: &ExecCtx<'_>,
    path: Option<&str>,
    full_page: Option<bool>,
) -> Result<PrimitiveOutcome, ActionError> {
    let full_page = full_page.unwrap_or(ctx.cfg.full_page_screenshots);
    let bytes = ctx.driver.screenshot(full_page).await?;

    let path = match path {
        Some(path) => PathBuf::from(path),
        None => screenshot_path(&ctx.cfg.screenshot_dir, ctx.action_id),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|err| {
            ActionError::Internal(format!("cannot create {}: {err}", parent.display()))
        })?;
    }
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|err| ActionError::Internal(format!("cannot write {}: {err}", path.display())))?;

    info!(
        target: "action-executor",
        action_id = %ctx.action_id,
        path = %path.display(),
        bytes = bytes.len(),
        full_page,
        "screenshot saved"
    );

    Ok(PrimitiveOutcome::with_data(json!({
        "path": path.display().to_string(),
        "bytes": bytes.len(),
        "fullPage": full_page,
    })))
}
