use std::sync::Arc;
use std::time::Duration;

use action_primitives::ActionArgs;
use async_trait::async_trait;
use perceiver_structural::Observation;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::agent_loop::prompt::{format_system_prompt, format_user_message};
use crate::errors::AgentError;
use crate::model::{Decision, DecisionSource, GoalContext, HistoryEntry};
use crate::planner::DecisionProvider;

/// Text-in, text-out chat completion seam so vendors (and tests) can plug in.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, system: &str, user: &str) -> Result<String, AgentError>;
}

/// Settings for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            temperature: 0.1,
            timeout_ms: 30_000,
        }
    }
}

pub struct OpenAiChatModel {
    client: Client,
    config: LlmConfig,
    api_key: String,
}

impl OpenAiChatModel {
    pub fn new(config: LlmConfig) -> Result<Self, AgentError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AgentError::invalid_request("missing API key for the language model"))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .build()
            .map_err(|err| AgentError::provider(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String, AgentError> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );
        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                r#type: "json_object".to_string(),
            },
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| AgentError::provider(format!("chat request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<response unavailable>".to_string());
            warn!(target: "decision-loop", %status, "chat completion rejected");
            return Err(AgentError::provider(format!(
                "model endpoint returned {status}: {text}"
            )));
        }

        let response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| AgentError::provider(format!("model response invalid: {err}")))?;
        if let Some(usage) = &response.usage {
            debug!(
                target: "decision-loop",
                input_tokens = usage.prompt_tokens,
                output_tokens = usage.completion_tokens,
                "chat completion usage"
            );
        }
        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_text())
            .ok_or_else(|| AgentError::parse("model response missing content"))
    }
}

/// Decision provider backed by a chat model that answers with a JSON decision.
pub struct LlmDecisionProvider {
    model: Arc<dyn ChatModel>,
}

impl LlmDecisionProvider {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl DecisionProvider for LlmDecisionProvider {
    fn name(&self) -> &str {
        self.model.model_name()
    }

    async fn decide(
        &self,
        instruction: &str,
        observation: &Observation,
        history: &[HistoryEntry],
        goal: &GoalContext,
    ) -> Result<Decision, AgentError> {
        let user = format_user_message(instruction, observation, history, goal);
        let reply = self.model.complete(format_system_prompt(), &user).await?;
        parse_decision(&reply)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecisionPayload {
    #[serde(default)]
    thought: String,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    args: Value,
    #[serde(default, alias = "is_complete", alias = "done")]
    is_complete: bool,
    #[serde(default, alias = "completion_message", alias = "message")]
    completion_message: Option<String>,
}

const COMPLETION_TOOLS: &[&str] = &["done", "complete", "finish", "finished"];

/// Parse a `{thought, tool, args, isComplete, completionMessage}` reply.
///
/// The tool and arguments are validated up front so a malformed reply fails here as
/// a parse error instead of later as an execution error.
pub fn parse_decision(reply: &str) -> Result<Decision, AgentError> {
    let json = extract_json_object(reply)
        .ok_or_else(|| AgentError::parse("model reply contains no JSON object"))?;
    let payload: DecisionPayload = serde_json::from_str(&json)
        .map_err(|err| AgentError::parse(format!("invalid decision JSON: {err}")))?;

    let tool = payload
        .tool
        .map(|tool| tool.trim().to_string())
        .filter(|tool| !tool.is_empty());
    let completion_tool = tool
        .as_deref()
        .map(|tool| COMPLETION_TOOLS.contains(&tool.to_ascii_lowercase().as_str()))
        .unwrap_or(false);

    if payload.is_complete || completion_tool {
        let message = payload
            .completion_message
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| {
                if payload.thought.is_empty() {
                    "Task completed".to_string()
                } else {
                    payload.thought.clone()
                }
            });
        let mut decision = Decision::complete(DecisionSource::Llm, message);
        if !payload.thought.is_empty() {
            decision.thought = payload.thought;
        }
        return Ok(decision);
    }

    let tool = tool.ok_or_else(|| AgentError::parse("decision has neither a tool nor isComplete"))?;
    ActionArgs::from_tool(&tool, &payload.args)
        .map_err(|err| AgentError::parse(format!("unusable tool call: {err}")))?;
    Ok(Decision::action(
        DecisionSource::Llm,
        tool,
        payload.args,
        payload.thought,
    ))
}

/// Pull the first JSON object out of a reply that may wrap it in prose or a code fence.
pub fn extract_json_object(raw: &str) -> Option<String> {
    if raw.trim_start().starts_with('{') {
        return Some(trim_symmetric(raw));
    }

    let fence = "```";
    if let Some(start) = raw.find(fence) {
        let after_fence = &raw[start + fence.len()..];
        let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        if let Some(end) = after_lang.find(fence) {
            let block = &after_lang[..end];
            if block.contains('{') {
                return Some(trim_symmetric(block));
            }
        }
    }

    let (_, rest) = raw.split_once('{')?;
    let mut depth = 1i32;
    for (idx, ch) in rest.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let mut candidate = String::from("{");
                    candidate.push_str(&rest[..=idx]);
                    return Some(trim_symmetric(&candidate));
                }
            }
            _ => {}
        }
    }
    None
}

fn trim_symmetric(value: &str) -> String {
    value.trim().trim_matches('`').trim().to_string()
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    temperature: f32,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: ChatCompletionContent,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChatCompletionContent {
    Text(String),
    Parts(Vec<ChatCompletionPart>),
}

impl ChatCompletionContent {
    fn as_text(&self) -> Option<String> {
        match self {
            ChatCompletionContent::Text(value) => Some(value.clone()),
            ChatCompletionContent::Parts(parts) => {
                let text = parts
                    .iter()
                    .filter_map(|part| part.text.as_ref())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n");
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use serde_json::json;

    struct Scripted(&'static str);

    #[async_trait]
    impl ChatModel for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, system: &str, user: &str) -> Result<String, AgentError> {
            assert!(system.contains("navigate"));
            assert!(user.contains("Instruction:"));
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn parses_action_decision_from_fenced_reply() {
        let reply = "Sure:\n```json\n{\"thought\":\"open it\",\"tool\":\"navigate\",\"args\":{\"url\":\"example.com\"},\"isComplete\":false}\n```";
        let decision = parse_decision(reply).expect("decision");
        assert_eq!(decision.tool.as_deref(), Some("navigate"));
        assert_eq!(decision.args, json!({ "url": "example.com" }));
        assert_eq!(decision.source, DecisionSource::Llm);
        assert!(!decision.is_complete);
    }

    #[test]
    fn parses_completion() {
        let decision = parse_decision(
            r#"{"thought":"all done","isComplete":true,"completionMessage":"Logged in"}"#,
        )
        .expect("decision");
        assert!(decision.is_complete);
        assert_eq!(decision.completion_message.as_deref(), Some("Logged in"));

        let done_tool = parse_decision(r#"{"tool":"done","args":{}}"#).expect("decision");
        assert!(done_tool.is_complete);
    }

    #[test]
    fn rejects_unusable_replies() {
        assert_eq!(
            parse_decision("I think we should click").expect_err("no json").kind(),
            ErrorKind::DecisionParseFailed
        );
        assert!(parse_decision(r#"{"thought":"hmm"}"#).is_err());
        assert!(parse_decision(r#"{"tool":"teleport","args":{}}"#).is_err());
        assert!(parse_decision(r#"{"tool":"click","args":{}}"#).is_err());
    }

    #[test]
    fn extracts_inline_object() {
        assert_eq!(
            extract_json_object("text { \"foo\": {\"bar\": 1} } more").as_deref(),
            Some("{ \"foo\": {\"bar\": 1} }")
        );
        assert!(extract_json_object("no braces").is_none());
    }

    #[test]
    fn model_requires_api_key() {
        assert!(OpenAiChatModel::new(LlmConfig::default()).is_err());
        let cfg = LlmConfig {
            api_key: Some("sk-test".into()),
            ..LlmConfig::default()
        };
        assert!(OpenAiChatModel::new(cfg).is_ok());
    }

    #[tokio::test]
    async fn provider_renders_prompt_and_parses_reply() {
        let provider = LlmDecisionProvider::new(Arc::new(Scripted(
            r#"{"thought":"search","tool":"type","args":{"target":"Search","text":"rust"},"isComplete":false}"#,
        )));
        let observation = Observation {
            url: "https://example.com/".into(),
            title: "Example".into(),
            load_phase: perceiver_structural::LoadPhase::Complete,
            has_loading_indicator: false,
            has_modal_overlay: false,
            content_hash: "abc".into(),
            visible_element_count: 12,
            text_length: 300,
            timestamp: chrono::Utc::now(),
        };
        let goal = GoalContext::new("search rust");
        let decision = provider
            .decide("search rust", &observation, &[], &goal)
            .await
            .expect("decision");
        assert_eq!(decision.tool.as_deref(), Some("type"));
        assert_eq!(provider.name(), "scripted");
    }
}
