//! Decisions, history entries and the goal context shared by providers and the loop.

use action_primitives::{Action, ActionResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which provider produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Rules,
    Llm,
    Chat,
}

/// Next step chosen by a decision provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub thought: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default)]
    pub args: Value,
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_message: Option<String>,
    pub source: DecisionSource,
}

impl Decision {
    pub fn action(
        source: DecisionSource,
        tool: impl Into<String>,
        args: Value,
        thought: impl Into<String>,
    ) -> Self {
        Self {
            thought: thought.into(),
            tool: Some(tool.into()),
            args,
            is_complete: false,
            completion_message: None,
            source,
        }
    }

    pub fn complete(source: DecisionSource, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            thought: message.clone(),
            tool: None,
            args: Value::Object(Map::new()),
            is_complete: true,
            completion_message: Some(message),
            source,
        }
    }
}

/// One executed action together with the reasoning that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub iteration: u32,
    pub thought: String,
    /// Page URL when the decision was made
    pub url: String,
    pub action: Action,
}

impl HistoryEntry {
    pub fn result(&self) -> Option<&ActionResult> {
        self.action.result()
    }

    pub fn succeeded(&self) -> bool {
        self.result().map(|r| r.success).unwrap_or(false)
    }

    /// Short single-line rendering for prompts and logs
    pub fn summary(&self) -> String {
        let outcome = match self.result() {
            Some(result) if result.success => "ok".to_string(),
            Some(result) => format!(
                "failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            ),
            None => "pending".to_string(),
        };
        format!(
            "#{} {} {} -> {}",
            self.iteration,
            self.action.kind,
            self.action.args.to_value(),
            outcome
        )
    }
}

/// What the task is trying to achieve and how far it got.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalContext {
    pub original_goal: String,
    pub sub_goals: Vec<String>,
    pub completed_steps: Vec<String>,
    pub current_step: usize,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GoalContext {
    pub fn new(goal: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            original_goal: goal.into(),
            sub_goals: Vec::new(),
            completed_steps: Vec::new(),
            current_step: 0,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn add_sub_goal(&mut self, sub_goal: impl Into<String>) {
        self.sub_goals.push(sub_goal.into());
        self.updated_at = Utc::now();
    }

    /// Record a finished step and advance the pointer.
    pub fn complete_step(&mut self, description: impl Into<String>) {
        self.completed_steps.push(description.into());
        self.current_step += 1;
        self.updated_at = Utc::now();
    }

    pub fn current_sub_goal(&self) -> Option<&str> {
        self.sub_goals.get(self.current_step).map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.sub_goals.clear();
        self.completed_steps.clear();
        self.current_step = 0;
        self.updated_at = Utc::now();
    }

    /// Multi-line rendering for prompts
    pub fn render(&self) -> String {
        let mut out = format!("Goal: {}\n", self.original_goal);
        if !self.sub_goals.is_empty() {
            out.push_str("Sub-goals:\n");
            for (index, sub_goal) in self.sub_goals.iter().enumerate() {
                let mark = if index < self.current_step { "x" } else { " " };
                out.push_str(&format!("  [{mark}] {sub_goal}\n"));
            }
        }
        if !self.completed_steps.is_empty() {
            out.push_str(&format!(
                "Completed steps: {}\n",
                self.completed_steps.join("; ")
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goal_context_tracks_steps() {
        let mut goal = GoalContext::new("buy milk");
        goal.add_sub_goal("open shop");
        goal.add_sub_goal("add milk to cart");
        assert_eq!(goal.current_sub_goal(), Some("open shop"));
        goal.complete_step("navigate https://shop.example");
        assert_eq!(goal.current_sub_goal(), Some("add milk to cart"));
        let rendered = goal.render();
        assert!(rendered.contains("[x] open shop"));
        assert!(rendered.contains("[ ] add milk to cart"));
        goal.clear();
        assert_eq!(goal.current_step, 0);
        assert!(goal.completed_steps.is_empty());
    }

    #[test]
    fn completion_decision_has_no_tool() {
        let decision = Decision::complete(DecisionSource::Chat, "hi");
        assert!(decision.is_complete);
        assert!(decision.tool.is_none());
        assert_eq!(decision.completion_message.as_deref(), Some("hi"));
    }
}
