//! Seams between the loop and the browser-facing components.

use std::time::Duration;

use action_primitives::{Action, ActionArgs, ActionExecutor, ActionResult};
use async_trait::async_trait;
use perceiver_structural::{ChangeSet, ObserveError, Observation, StateObserver};

/// Source of page snapshots for the observing stage.
#[async_trait]
pub trait PageObserver: Send + Sync {
    async fn observe(&self) -> Result<Observation, ObserveError>;

    /// Wait (bounded) for the page to move away from `baseline`.
    async fn settle(
        &self,
        baseline: &Observation,
        timeout: Duration,
    ) -> Result<ChangeSet, ObserveError>;
}

#[async_trait]
impl PageObserver for StateObserver {
    async fn observe(&self) -> Result<Observation, ObserveError> {
        self.capture().await
    }

    async fn settle(
        &self,
        baseline: &Observation,
        timeout: Duration,
    ) -> Result<ChangeSet, ObserveError> {
        self.wait_for_change_from(baseline, timeout).await
    }
}

/// Executes actions for the acting stage.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    fn new_action(&self, args: ActionArgs) -> Action;

    async fn execute(&self, action: &mut Action) -> ActionResult;

    fn is_connected(&self) -> bool;
}

#[async_trait]
impl ActionRunner for ActionExecutor {
    fn new_action(&self, args: ActionArgs) -> Action {
        self.action(args)
    }

    async fn execute(&self, action: &mut Action) -> ActionResult {
        ActionExecutor::execute(self, action).await
    }

    fn is_connected(&self) -> bool {
        ActionExecutor::is_connected(self)
    }
}
