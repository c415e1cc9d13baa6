//! Write-only sink for notable loop artifacts (screenshots, script output).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub label: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl Artifact {
    pub fn new(label: impl Into<String>, data: Value) -> Self {
        Self {
            label: label.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// The loop only ever writes; nothing is read back.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn save(&self, artifact: Artifact);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullArtifactSink;

#[async_trait]
impl ArtifactSink for NullArtifactSink {
    async fn save(&self, _artifact: Artifact) {}
}

/// Keeps artifacts in memory, mostly for tests and the CLI's JSON report.
#[derive(Debug, Default)]
pub struct MemoryArtifactSink {
    items: Mutex<Vec<Artifact>>,
}

impl MemoryArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Artifact> {
        self.items.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[async_trait]
impl ArtifactSink for MemoryArtifactSink {
    async fn save(&self, artifact: Artifact) {
        self.items.lock().push(artifact);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_sink_keeps_order() {
        let sink = MemoryArtifactSink::new();
        sink.save(Artifact::new("screenshot", json!({ "path": "a.png" })))
            .await;
        sink.save(Artifact::new("runCode", json!({ "value": 1 }))).await;
        let items = sink.snapshot();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, "screenshot");
        NullArtifactSink.save(Artifact::new("x", Value::Null)).await;
    }
}
