//! Decision providers: the rule table, the chat short-circuit and the fallback chain.

pub mod chat;
pub mod rule_based;

use std::sync::Arc;

use async_trait::async_trait;
use perceiver_structural::Observation;
use tracing::warn;

use crate::errors::AgentError;
use crate::model::{Decision, GoalContext, HistoryEntry};

pub use chat::{chat_reply, classify, ChatKind};
pub use rule_based::{key_alias, split_steps, Rule, RuleTable};

/// Chooses the next action (or completion) for an instruction.
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn decide(
        &self,
        instruction: &str,
        observation: &Observation,
        history: &[HistoryEntry],
        goal: &GoalContext,
    ) -> Result<Decision, AgentError>;
}

/// Primary provider (usually the model) with the rule table behind it.
///
/// Without a primary, a rule miss is terminal ([`AgentError::CannotProceed`]). With one,
/// a rule miss after a primary failure reports the primary's error so the loop can count
/// it as a recoverable failed cycle.
pub struct FallbackDecisionProvider {
    primary: Option<Arc<dyn DecisionProvider>>,
    rules: RuleTable,
}

impl FallbackDecisionProvider {
    pub fn new(primary: Option<Arc<dyn DecisionProvider>>) -> Self {
        Self {
            primary,
            rules: RuleTable::new(),
        }
    }

    pub fn rules_only() -> Self {
        Self::new(None)
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }
}

#[async_trait]
impl DecisionProvider for FallbackDecisionProvider {
    fn name(&self) -> &str {
        match &self.primary {
            Some(primary) => primary.name(),
            None => self.rules.name(),
        }
    }

    async fn decide(
        &self,
        instruction: &str,
        observation: &Observation,
        history: &[HistoryEntry],
        goal: &GoalContext,
    ) -> Result<Decision, AgentError> {
        let Some(primary) = &self.primary else {
            return self.rules.decide(instruction, observation, history, goal).await;
        };

        let primary_err = match primary.decide(instruction, observation, history, goal).await {
            Ok(decision) => return Ok(decision),
            Err(err) => err,
        };
        warn!(
            target: "decision-loop",
            provider = primary.name(),
            error = %primary_err,
            "primary provider failed; falling back to rules"
        );
        match self.rules.decide(instruction, observation, history, goal).await {
            Ok(decision) => Ok(decision),
            Err(AgentError::CannotProceed(_)) => Err(primary_err),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::model::DecisionSource;
    use perceiver_structural::LoadPhase;
    use serde_json::json;

    struct Broken;

    #[async_trait]
    impl DecisionProvider for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn decide(
            &self,
            _instruction: &str,
            _observation: &Observation,
            _history: &[HistoryEntry],
            _goal: &GoalContext,
        ) -> Result<Decision, AgentError> {
            Err(AgentError::parse("reply was not JSON"))
        }
    }

    fn blank() -> Observation {
        Observation {
            url: "about:blank".into(),
            title: String::new(),
            load_phase: LoadPhase::Complete,
            has_loading_indicator: false,
            has_modal_overlay: false,
            content_hash: "0".into(),
            visible_element_count: 0,
            text_length: 0,
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn primary_failure_falls_back_to_rules() {
        let provider = FallbackDecisionProvider::new(Some(Arc::new(Broken)));
        let goal = GoalContext::new("打开 google.com");
        let decision = provider
            .decide("打开 google.com", &blank(), &[], &goal)
            .await
            .expect("rules answer");
        assert_eq!(decision.source, DecisionSource::Rules);
        assert_eq!(decision.args, json!({ "url": "google.com" }));
    }

    #[tokio::test]
    async fn rule_miss_without_model_cannot_proceed() {
        let provider = FallbackDecisionProvider::rules_only();
        let goal = GoalContext::new("ponder");
        let err = provider
            .decide("ponder the universe", &blank(), &[], &goal)
            .await
            .expect_err("miss");
        assert_eq!(err.kind(), ErrorKind::CannotProceed);
    }

    #[tokio::test]
    async fn rule_miss_after_model_failure_is_recoverable() {
        let provider = FallbackDecisionProvider::new(Some(Arc::new(Broken)));
        let goal = GoalContext::new("ponder");
        let err = provider
            .decide("ponder the universe", &blank(), &[], &goal)
            .await
            .expect_err("both failed");
        assert_eq!(err.kind(), ErrorKind::DecisionParseFailed);
    }
}
