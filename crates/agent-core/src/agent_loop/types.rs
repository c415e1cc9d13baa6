//! Loop phases, the status snapshot streamed to observers and the final outcome.

use serde::{Deserialize, Serialize};

use crate::errors::ErrorKind;
use crate::model::{GoalContext, HistoryEntry};

/// State-machine phase of the decision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Idle,
    Observing,
    Thinking,
    Acting,
    Complete,
    Error,
}

impl LoopPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopPhase::Idle => "idle",
            LoopPhase::Observing => "observing",
            LoopPhase::Thinking => "thinking",
            LoopPhase::Acting => "acting",
            LoopPhase::Complete => "complete",
            LoopPhase::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopPhase::Complete | LoopPhase::Error)
    }
}

impl std::fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot published on the status channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopStatus {
    pub status: LoopPhase,
    pub iteration_count: u32,
    pub completed_steps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl Default for LoopStatus {
    fn default() -> Self {
        Self {
            status: LoopPhase::Idle,
            iteration_count: 0,
            completed_steps: 0,
            error: None,
            error_kind: None,
        }
    }
}

/// How a run ended. Both normal completion and terminal errors set `is_complete`;
/// `error_kind` tells them apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopOutcome {
    pub status: LoopPhase,
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    pub iterations: u32,
    pub completed_steps: u32,
    pub history: Vec<HistoryEntry>,
    pub goal: GoalContext,
    pub duration_ms: u64,
}

impl LoopOutcome {
    pub fn is_success(&self) -> bool {
        self.status == LoopPhase::Complete && self.error_kind.is_none()
    }

    /// Number of actions the run issued.
    pub fn actions_taken(&self) -> usize {
        self.history.len()
    }

    /// Message followed by the remediation hint, for display.
    pub fn user_message(&self) -> String {
        match &self.remediation {
            Some(hint) => format!("{} {}", self.message, hint),
            None => self.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_camel_case() {
        let status = LoopStatus {
            status: LoopPhase::Error,
            iteration_count: 4,
            completed_steps: 2,
            error: Some("stuck".into()),
            error_kind: Some(ErrorKind::LoopDetected),
        };
        let json = serde_json::to_value(&status).expect("json");
        assert_eq!(json["status"], "error");
        assert_eq!(json["iterationCount"], 4);
        assert_eq!(json["completedSteps"], 2);
        assert_eq!(json["errorKind"], "loop_detected");
        assert!(LoopPhase::Error.is_terminal());
        assert!(!LoopPhase::Acting.is_terminal());
    }
}
