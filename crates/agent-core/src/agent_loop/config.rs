//! Configuration for the decision loop.

use serde::{Deserialize, Serialize};

/// Limits and timings for one observe-think-act run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionLoopConfig {
    /// Cycles before the run stops with `iteration_limit_reached`.
    /// Default: 20
    pub max_iterations: u32,

    /// Failed cycles in a row before the run stops.
    /// Default: 3
    pub max_consecutive_failures: u32,

    /// Number of recent action signatures kept for loop detection.
    /// Default: 10
    pub loop_window: usize,

    /// Occurrences of one signature inside the window that count as a loop.
    /// Default: 3
    pub loop_repeat_threshold: usize,

    /// How long to wait for the page to react after a click or key press.
    /// Default: 2000
    pub settle_timeout_ms: u64,

    /// Attempts for actions with side effects that must not repeat (`runCode`, `wait`).
    /// Default: 1
    pub single_shot_retries: u32,
}

impl Default for DecisionLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            max_consecutive_failures: 3,
            loop_window: 10,
            loop_repeat_threshold: 3,
            settle_timeout_ms: 2_000,
            single_shot_retries: 1,
        }
    }
}

impl DecisionLoopConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max;
        self
    }

    pub fn settle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.settle_timeout_ms = timeout_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg: DecisionLoopConfig =
            serde_json::from_str(r#"{"max_iterations": 5}"#).expect("config");
        assert_eq!(cfg.max_iterations, 5);
        assert_eq!(cfg.max_consecutive_failures, 3);
        assert_eq!(cfg.loop_repeat_threshold, 3);
    }

    #[test]
    fn builder_overrides() {
        let cfg = DecisionLoopConfig::new()
            .max_iterations(7)
            .max_consecutive_failures(2)
            .settle_timeout_ms(0);
        assert_eq!((cfg.max_iterations, cfg.max_consecutive_failures), (7, 2));
        assert_eq!(cfg.settle_timeout_ms, 0);
    }
}
