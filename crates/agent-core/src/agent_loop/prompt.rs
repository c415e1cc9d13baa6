//! Prompt templates for model-driven decisions.

use perceiver_structural::Observation;

use crate::model::{GoalContext, HistoryEntry};

/// History entries included in the user message.
const HISTORY_LIMIT: usize = 10;

pub const DECISION_SYSTEM_PROMPT: &str = r##"You are a browser automation agent. Each turn you receive the user's instruction, a summary of the current page and the actions taken so far. Choose exactly one next action, or report that the task is complete.

## Available Tools
- navigate: {"url": "example.com"} open an address; never type addresses into search boxes
- click: {"target": "Sign in"} click an element by visible text, label, placeholder, test id or CSS selector
- type: {"target": "Search", "text": "rust", "clear": true} fill a field; clear=false appends
- hover: {"target": "Menu"}
- select: {"target": "Country", "value": "Norway"} choose a dropdown option by value or label
- press: {"key": "Enter"} press a key
- wait: {"durationMs": 1000}
- waitForSelector: {"target": "#results", "timeoutMs": 5000}
- screenshot: {"fullPage": false}
- runCode: {"code": "return document.title", "storeAs": "title"} run JavaScript; stored values are visible to later code as vars

## Response Format
Reply with a single JSON object and nothing else:
{"thought": "why this step", "tool": "click", "args": {"target": "Sign in"}, "isComplete": false}

When the instruction is satisfied reply:
{"thought": "what was achieved", "isComplete": true, "completionMessage": "short summary for the user"}

## Rules
- One action per reply.
- Do not repeat an action that already failed with the same arguments; try another target.
- Prefer visible text over CSS selectors.
"##;

pub fn format_system_prompt() -> &'static str {
    DECISION_SYSTEM_PROMPT
}

/// Render instruction, page summary, goal progress and recent history.
pub fn format_user_message(
    instruction: &str,
    observation: &Observation,
    history: &[HistoryEntry],
    goal: &GoalContext,
) -> String {
    let mut message = String::new();
    message.push_str("## Task\n");
    message.push_str(&format!("Instruction: {}\n", instruction.trim()));

    let progress = goal.render();
    if !progress.is_empty() {
        message.push_str("\n## Progress\n");
        message.push_str(&progress);
        message.push('\n');
    }

    message.push_str("\n## Current Page\n");
    message.push_str(&format!("URL: {}\n", observation.url));
    message.push_str(&format!("Title: {}\n", observation.title));
    message.push_str(&format!("Load phase: {}\n", observation.load_phase.as_str()));
    message.push_str(&format!(
        "Visible elements: {}, text length: {}\n",
        observation.visible_element_count, observation.text_length
    ));
    if observation.has_loading_indicator {
        message.push_str("A loading indicator is visible.\n");
    }
    if observation.has_modal_overlay {
        message.push_str("A modal dialog is covering the page.\n");
    }

    message.push_str("\n## Previous Actions\n");
    if history.is_empty() {
        message.push_str("None yet.\n");
    } else {
        let skip = history.len().saturating_sub(HISTORY_LIMIT);
        for entry in &history[skip..] {
            message.push_str(&entry.summary());
            message.push('\n');
        }
    }
    message
}
