//! Configuration file model.
//!
//! Every section falls back to the owning crate's defaults, so a partial YAML file
//! (or none at all) is valid.

use std::env;

use action_primitives::ExecutorConfig;
use agent_core::{DecisionLoopConfig, LlmConfig};
use cdp_adapter::ConnectionConfig;
use perceiver_structural::ObserverConfig;
use serde::{Deserialize, Serialize};

/// Overrides `connection.endpoint`.
pub const ENDPOINT_ENV: &str = "TABPILOT_ENDPOINT";

pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    pub connection: ConnectionConfig,
    pub executor: ExecutorConfig,
    pub observer: ObserverConfig,
    pub agent: DecisionLoopConfig,
    pub llm: Option<LlmSection>,
    pub logging: LoggingConfig,
}

/// Model endpoint settings. The key itself never lives in the file, only the name of
/// the environment variable holding it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub api_base: String,
    pub model: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub timeout_ms: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        let client = LlmConfig::default();
        Self {
            api_base: client.api_base,
            model: client.model,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            temperature: client.temperature,
            timeout_ms: client.timeout_ms,
        }
    }
}

impl LlmSection {
    /// Client settings with the key read from `api_key_env`; `None` when the variable
    /// is unset or empty.
    pub fn resolve(&self) -> Option<LlmConfig> {
        let api_key = env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())?;
        Some(LlmConfig {
            api_base: self.api_base.clone(),
            model: self.model.clone(),
            api_key: Some(api_key),
            temperature: self.temperature,
            timeout_ms: self.timeout_ms,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl PilotConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Apply environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = env::var(ENDPOINT_ENV) {
            let endpoint = endpoint.trim();
            if !endpoint.is_empty() {
                self.connection.endpoint = endpoint.to_string();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::LoadCondition;
    use serial_test::serial;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = PilotConfig::from_yaml_str("").expect("config");
        assert_eq!(cfg.connection.endpoint, "http://127.0.0.1:9222");
        assert_eq!(cfg.connection.liveness_interval_ms, 5_000);
        assert_eq!(cfg.executor.navigation_timeout_ms, 30_000);
        assert_eq!(cfg.executor.interaction_timeout_ms, 5_000);
        assert_eq!(cfg.executor.visibility_timeout_ms, 2_000);
        assert_eq!(cfg.executor.max_retries, 3);
        assert_eq!(cfg.agent.max_iterations, 20);
        assert_eq!(cfg.agent.max_consecutive_failures, 3);
        assert!(cfg.llm.is_none());
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let yaml = r#"
executor:
  screenshot_dir: /tmp/shots
  full_page_screenshots: true
  default_wait_until: load
agent:
  max_iterations: 8
llm:
  model: local-model
  api_base: http://localhost:8000/v1
logging:
  json: true
"#;
        let cfg = PilotConfig::from_yaml_str(yaml).expect("config");
        assert_eq!(cfg.executor.screenshot_dir, "/tmp/shots");
        assert!(cfg.executor.full_page_screenshots);
        assert_eq!(cfg.executor.default_wait_until, LoadCondition::Load);
        assert_eq!(cfg.executor.max_retries, 3);
        assert_eq!(cfg.agent.max_iterations, 8);
        assert_eq!(cfg.agent.loop_repeat_threshold, 3);
        let llm = cfg.llm.expect("llm section");
        assert_eq!(llm.model, "local-model");
        assert_eq!(llm.api_key_env, DEFAULT_API_KEY_ENV);
        assert!(cfg.logging.json);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    #[serial]
    fn endpoint_env_override() {
        env::set_var(ENDPOINT_ENV, "ws://127.0.0.1:9333/devtools/browser/abc");
        let mut cfg = PilotConfig::default();
        cfg.apply_env_overrides();
        env::remove_var(ENDPOINT_ENV);
        assert_eq!(
            cfg.connection.endpoint,
            "ws://127.0.0.1:9333/devtools/browser/abc"
        );
    }

    #[test]
    #[serial]
    fn llm_key_comes_from_named_variable() {
        let section = LlmSection {
            api_key_env: "TABPILOT_TEST_LLM_KEY".to_string(),
            ..LlmSection::default()
        };
        env::remove_var("TABPILOT_TEST_LLM_KEY");
        assert!(section.resolve().is_none());

        env::set_var("TABPILOT_TEST_LLM_KEY", "sk-local");
        let resolved = section.resolve().expect("resolved");
        env::remove_var("TABPILOT_TEST_LLM_KEY");
        assert_eq!(resolved.api_key.as_deref(), Some("sk-local"));
        assert_eq!(resolved.model, section.model);
    }
}
