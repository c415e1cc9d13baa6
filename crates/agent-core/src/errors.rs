use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors emitted by the agent-core crate.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AgentError {
    /// Raised when a provider's reply cannot be turned into a decision.
    #[error("failed to parse decision: {0}")]
    DecisionParse(String),

    /// Raised when the model transport fails (network, HTTP status, missing key).
    #[error("decision provider failed: {0}")]
    Provider(String),

    /// Raised when no provider can map the instruction onto an action.
    #[error("cannot proceed: {0}")]
    CannotProceed(String),

    /// Raised when an agent request is malformed or missing required fields.
    #[error("invalid agent request: {0}")]
    InvalidRequest(String),
}

impl AgentError {
    /// Helper for reply parsing failures.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::DecisionParse(message.into())
    }

    /// Helper for transport failures.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    pub fn cannot_proceed(message: impl Into<String>) -> Self {
        Self::CannotProceed(message.into())
    }

    /// Helper for wrapping static string errors.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::DecisionParse(_) | AgentError::Provider(_) => ErrorKind::DecisionParseFailed,
            AgentError::CannotProceed(_) | AgentError::InvalidRequest(_) => ErrorKind::CannotProceed,
        }
    }
}

/// Programmatic classification of a terminal loop error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotConnected,
    ElementNotFound,
    OperationTimeout,
    NavigationFailed,
    ExecutionError,
    LoopDetected,
    IterationLimitReached,
    ConsecutiveFailureLimitReached,
    DecisionParseFailed,
    CannotProceed,
    Cancelled,
    ObservationFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotConnected => "not_connected",
            ErrorKind::ElementNotFound => "element_not_found",
            ErrorKind::OperationTimeout => "operation_timeout",
            ErrorKind::NavigationFailed => "navigation_failed",
            ErrorKind::ExecutionError => "execution_error",
            ErrorKind::LoopDetected => "loop_detected",
            ErrorKind::IterationLimitReached => "iteration_limit_reached",
            ErrorKind::ConsecutiveFailureLimitReached => "consecutive_failure_limit_reached",
            ErrorKind::DecisionParseFailed => "decision_parse_failed",
            ErrorKind::CannotProceed => "cannot_proceed",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::ObservationFailed => "observation_failed",
        }
    }

    /// Map an executor error kind string (`ActionError::kind`) onto the loop taxonomy.
    pub fn from_action_kind(kind: &str) -> Self {
        match kind {
            "not_connected" => ErrorKind::NotConnected,
            "element_not_found" => ErrorKind::ElementNotFound,
            "operation_timeout" => ErrorKind::OperationTimeout,
            "navigation_failed" => ErrorKind::NavigationFailed,
            _ => ErrorKind::ExecutionError,
        }
    }

    /// Plain-language suggestion shown next to a terminal error.
    pub fn remediation(&self) -> &'static str {
        match self {
            ErrorKind::NotConnected => {
                "Start the browser with remote debugging enabled (for example --remote-debugging-port=9222) and reconnect."
            }
            ErrorKind::ElementNotFound => {
                "Describe the element by its visible text or label, or check that the page finished loading."
            }
            ErrorKind::OperationTimeout => {
                "The page is slow to respond; try again or raise the timeout in the configuration."
            }
            ErrorKind::NavigationFailed => "Check the address for typos and that the site is reachable.",
            ErrorKind::ExecutionError => "Inspect the script error details and simplify the code.",
            ErrorKind::LoopDetected => {
                "The same action kept repeating without progress; try a simpler or more specific instruction."
            }
            ErrorKind::IterationLimitReached => {
                "The task needed too many steps; split it into smaller instructions."
            }
            ErrorKind::ConsecutiveFailureLimitReached => {
                "Several actions failed in a row; check the page state and try a simpler instruction."
            }
            ErrorKind::DecisionParseFailed => {
                "The model reply could not be understood; retry or switch to rule-based mode."
            }
            ErrorKind::CannotProceed => {
                "Rephrase the instruction as a direct command, for example \"open example.com\" or \"click Sign in\", or configure a language model."
            }
            ErrorKind::Cancelled => "The task was stopped on request.",
            ErrorKind::ObservationFailed => "The page state could not be read; reload the page and retry.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
