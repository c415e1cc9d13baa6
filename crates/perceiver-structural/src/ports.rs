use std::sync::Arc;

use async_trait::async_trait;
use cdp_adapter::{AdapterError, AdapterErrorKind, ScriptHost};
use serde_json::Value;

use crate::catalog::{
    loading_indicator_script, modal_overlay_script, IDENTITY_SCRIPT, READY_STATE_SCRIPT,
    STRUCTURE_SIGNAL_SCRIPT, VISIBLE_COUNT_SCRIPT,
};
use crate::model::StructureSignal;

/// Page reads the observer is built from. Each call is one independent sub-check.
#[async_trait]
pub trait PageProbe: Send + Sync {
    fn is_connected(&self) -> bool;
    async fn identity(&self) -> Result<(String, String), AdapterError>;
    async fn ready_state(&self) -> Result<String, AdapterError>;
    async fn loading_indicator(&self) -> Result<bool, AdapterError>;
    async fn modal_overlay(&self) -> Result<bool, AdapterError>;
    async fn structure_signal(&self) -> Result<StructureSignal, AdapterError>;
    async fn visible_count(&self) -> Result<u64, AdapterError>;
}

/// [`PageProbe`] backed by page-script evaluation.
pub struct ScriptPort<H>
where
    H: ScriptHost + ?Sized,
{
    host: Arc<H>,
}

impl<H> ScriptPort<H>
where
    H: ScriptHost + ?Sized,
{
    pub fn new(host: Arc<H>) -> Self {
        Self { host }
    }
}

fn unexpected(what: &str, value: &Value) -> AdapterError {
    AdapterError::new(AdapterErrorKind::Internal)
        .with_hint(format!("unexpected {what} payload: {value}"))
}

#[async_trait]
impl<H> PageProbe for ScriptPort<H>
where
    H: ScriptHost + ?Sized,
{
    fn is_connected(&self) -> bool {
        self.host.is_connected()
    }

    async fn identity(&self) -> Result<(String, String), AdapterError> {
        let value = self.host.evaluate(IDENTITY_SCRIPT).await?;
        let url = value
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| unexpected("identity", &value))?;
        let title = value.get("title").and_then(Value::as_str).unwrap_or_default();
        Ok((url.to_string(), title.to_string()))
    }

    async fn ready_state(&self) -> Result<String, AdapterError> {
        let value = self.host.evaluate(READY_STATE_SCRIPT).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| unexpected("readyState", &value))
    }

    async fn loading_indicator(&self) -> Result<bool, AdapterError> {
        let value = self.host.evaluate(&loading_indicator_script()).await?;
        value.as_bool().ok_or_else(|| unexpected("loading", &value))
    }

    async fn modal_overlay(&self) -> Result<bool, AdapterError> {
        let value = self.host.evaluate(&modal_overlay_script()).await?;
        value.as_bool().ok_or_else(|| unexpected("modal", &value))
    }

    async fn structure_signal(&self) -> Result<StructureSignal, AdapterError> {
        let value = self.host.evaluate(STRUCTURE_SIGNAL_SCRIPT).await?;
        let field = |key: &str| value.get(key).and_then(Value::as_u64);
        match (field("nodeCount"), field("htmlLength"), field("textLength")) {
            (Some(node_count), Some(html_length), Some(text_length)) => Ok(StructureSignal {
                node_count,
                html_length,
                text_length,
            }),
            _ => Err(unexpected("structure", &value)),
        }
    }

    async fn visible_count(&self) -> Result<u64, AdapterError> {
        let value = self.host.evaluate(VISIBLE_COUNT_SCRIPT).await?;
        value.as_u64().ok_or_else(|| unexpected("visible count", &value))
    }
}
