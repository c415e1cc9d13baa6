//! Error types for the action executor

use cdp_adapter::{AdapterError, AdapterErrorKind};
use serde_json::Value;
use thiserror::Error;

use crate::types::SelectorAttempt;

/// Failure taxonomy surfaced to callers of the executor
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActionError {
    /// No live browser connection; nothing was sent
    #[error("Browser not connected")]
    NotConnected,

    /// Every candidate strategy was exhausted
    #[error(
        "Element not found for {target:?}; tried {}; last error: {last_error}",
        describe_attempts(.attempted)
    )]
    ElementNotFound {
        target: String,
        attempted: Vec<SelectorAttempt>,
        last_error: String,
    },

    /// A bounded operation ran out of time
    #[error("Operation timed out: {0}")]
    OperationTimeout(String),

    /// The browser reported a navigation error
    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    /// Arbitrary page code failed; `details` carries stack, line, column and console output
    #[error("Execution error: {message}")]
    ExecutionError { message: String, details: Value },

    /// Arguments could not be interpreted
    #[error("Invalid action arguments: {0}")]
    InvalidArgs(String),

    /// Internal error (protocol or unexpected payloads)
    #[error("Internal error: {0}")]
    Internal(String),
}

fn describe_attempts(attempted: &[SelectorAttempt]) -> String {
    if attempted.is_empty() {
        return "no candidates".to_string();
    }
    attempted
        .iter()
        .map(|attempt| attempt.expression.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ActionError {
    /// Check if another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ActionError::NotConnected | ActionError::InvalidArgs(_))
    }

    /// Stable snake_case identifier
    pub fn kind(&self) -> &'static str {
        match self {
            ActionError::NotConnected => "not_connected",
            ActionError::ElementNotFound { .. } => "element_not_found",
            ActionError::OperationTimeout(_) => "operation_timeout",
            ActionError::NavigationFailed(_) => "navigation_failed",
            ActionError::ExecutionError { .. } => "execution_error",
            ActionError::InvalidArgs(_) => "invalid_args",
            ActionError::Internal(_) => "internal",
        }
    }

    /// Structured diagnostics, when the variant carries any
    pub fn details(&self) -> Option<Value> {
        match self {
            ActionError::ElementNotFound {
                attempted,
                last_error,
                ..
            } => Some(serde_json::json!({
                "attempted": attempted,
                "lastError": last_error,
            })),
            ActionError::ExecutionError { details, .. } => Some(details.clone()),
            _ => None,
        }
    }
}

impl From<AdapterError> for ActionError {
    fn from(err: AdapterError) -> Self {
        let message = err.message();
        match err.kind {
            AdapterErrorKind::NotConnected => ActionError::NotConnected,
            AdapterErrorKind::NavTimeout => ActionError::OperationTimeout(message),
            AdapterErrorKind::NavigationFailed => ActionError::NavigationFailed(message),
            AdapterErrorKind::ScriptException => ActionError::ExecutionError {
                details: err.data.unwrap_or_else(|| serde_json::json!({ "message": message })),
                message,
            },
            AdapterErrorKind::TargetNotFound
            | AdapterErrorKind::CdpIo
            | AdapterErrorKind::Internal => ActionError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AttemptStatus;
    use action_locator::StrategyKind;

    #[test]
    fn not_connected_message_is_exact() {
        assert_eq!(ActionError::NotConnected.to_string(), "Browser not connected");
        assert!(!ActionError::NotConnected.is_retryable());
        assert!(ActionError::OperationTimeout("x".into()).is_retryable());
    }

    #[test]
    fn element_not_found_lists_every_candidate() {
        let attempted = vec![
            SelectorAttempt::new("#go", StrategyKind::Css, AttemptStatus::Unusable, Some("not found")),
            SelectorAttempt::new("text=\"#go\"", StrategyKind::Text, AttemptStatus::Failed, Some("detached")),
        ];
        let err = ActionError::ElementNotFound {
            target: "#go".into(),
            attempted,
            last_error: "detached".into(),
        };
        let text = err.to_string();
        assert!(text.contains("#go, text=\"#go\""), "{text}");
        assert!(text.ends_with("last error: detached"));
        assert_eq!(err.details().expect("details")["attempted"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn adapter_errors_map_onto_taxonomy() {
        let err: ActionError = AdapterError::not_connected().into();
        assert_eq!(err, ActionError::NotConnected);
        let err: ActionError = AdapterError::new(AdapterErrorKind::ScriptException)
            .with_hint("ReferenceError")
            .with_data(serde_json::json!({ "line": 3 }))
            .into();
        assert_eq!(err.kind(), "execution_error");
        assert_eq!(err.details().expect("details")["line"], 3);
    }
}
