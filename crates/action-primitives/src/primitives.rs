//! Action primitives
//!
//! One module per family of actions:
//! 1. pointer - click, hover, type and select through the selector cascade
//! 2. navigate - load a URL and wait for the requested load condition
//! 3. wait - fixed delays and waiting for a target to appear
//! 4. keyboard - single key presses
//! 5. screenshot - capture the viewport or full page to disk
//! 6. run_code - evaluate arbitrary page code with shared variables

mod keyboard;
mod navigate;
mod pointer;
mod run_code;
mod screenshot;
mod wait;

pub use keyboard::*;
pub use navigate::*;
pub use pointer::*;
pub use run_code::*;
pub use screenshot::*;
pub use wait::*;

use std::time::Duration;

use action_locator::CandidateStrategy;
use cdp_adapter::AdapterError;
use perceiver_structural::Verification;
use serde_json::Value;

use crate::driver::PageDriver;
use crate::errors::ActionError;
use crate::types::{ExecutorConfig, SelectorAttempt};

/// Everything a primitive needs for one attempt
pub struct ExecCtx<'a> {
    pub action_id: &'a str,
    pub driver: &'a dyn PageDriver,
    pub cfg: &'a ExecutorConfig,
}

impl<'a> ExecCtx<'a> {
    pub fn new(action_id: &'a str, driver: &'a dyn PageDriver, cfg: &'a ExecutorConfig) -> Self {
        Self {
            action_id,
            driver,
            cfg,
        }
    }

    pub fn interaction_timeout(&self) -> Duration {
        Duration::from_millis(self.cfg.interaction_timeout_ms.max(1))
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_millis(self.cfg.visibility_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.cfg.poll_interval_ms.max(1))
    }
}

/// What a successful primitive hands back to the executor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimitiveOutcome {
    pub data: Option<Value>,
    pub matched: Option<CandidateStrategy>,
    pub attempts: Vec<SelectorAttempt>,
    pub verification: Option<Verification>,
}

impl PrimitiveOutcome {
    pub fn with_data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    /// `Some` only for a conclusive check
    pub fn verified(&self) -> Option<bool> {
        self.verification
            .as_ref()
            .filter(|v| v.is_conclusive())
            .map(|v| v.verified)
    }
}

/// Lost connections surface as-is; everything else becomes a readable message.
pub(crate) fn triage(err: AdapterError) -> Result<String, ActionError> {
    if err.is_not_connected() {
        Err(ActionError::NotConnected)
    } else {
        Ok(err.message())
    }
}
