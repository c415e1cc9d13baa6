//! Core data types for the action executor

use action_locator::{CandidateStrategy, StrategyKind};
use cdp_adapter::LoadCondition;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::errors::ActionError;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Action kinds the executor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    Hover,
    Select,
    Press,
    Wait,
    Screenshot,
    WaitForSelector,
    RunCode,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Navigate => "navigate",
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Hover => "hover",
            ActionKind::Select => "select",
            ActionKind::Press => "press",
            ActionKind::Wait => "wait",
            ActionKind::Screenshot => "screenshot",
            ActionKind::WaitForSelector => "waitForSelector",
            ActionKind::RunCode => "runCode",
        }
    }

    /// Parse a tool name, accepting common aliases and either casing style.
    pub fn from_tool(tool: &str) -> Option<Self> {
        let key: String = tool
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        let kind = match key.as_str() {
            "navigate" | "goto" | "open" | "visit" => ActionKind::Navigate,
            "click" | "tap" => ActionKind::Click,
            "type" | "typetext" | "fill" | "input" => ActionKind::Type,
            "hover" => ActionKind::Hover,
            "select" | "selectoption" => ActionKind::Select,
            "press" | "presskey" | "key" | "keypress" => ActionKind::Press,
            "wait" | "sleep" => ActionKind::Wait,
            "screenshot" | "capture" => ActionKind::Screenshot,
            "waitforselector" | "waitforelement" => ActionKind::WaitForSelector,
            "runcode" | "evaluate" | "eval" | "script" | "executejs" => ActionKind::RunCode,
            _ => return None,
        };
        Some(kind)
    }

    /// Kinds that resolve a target element before acting
    pub fn needs_target(&self) -> bool {
        matches!(
            self,
            ActionKind::Click
                | ActionKind::Type
                | ActionKind::Hover
                | ActionKind::Select
                | ActionKind::WaitForSelector
        )
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_clear() -> bool {
    true
}

/// Per-kind arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ActionArgs {
    Navigate {
        url: String,
        #[serde(default, rename = "waitUntil", skip_serializing_if = "Option::is_none")]
        wait_until: Option<LoadCondition>,
    },
    Click {
        target: String,
    },
    Type {
        target: String,
        text: String,
        /// Replace existing contents (default) or append keystrokes
        #[serde(default = "default_clear")]
        clear: bool,
    },
    Hover {
        target: String,
    },
    Select {
        target: String,
        value: String,
    },
    Press {
        key: String,
    },
    Wait {
        #[serde(rename = "durationMs", alias = "ms")]
        duration_ms: u64,
    },
    Screenshot {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(default, rename = "fullPage", skip_serializing_if = "Option::is_none")]
        full_page: Option<bool>,
    },
    WaitForSelector {
        target: String,
        #[serde(default, rename = "timeoutMs", skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    RunCode {
        code: String,
        #[serde(default, rename = "storeAs", skip_serializing_if = "Option::is_none")]
        store_as: Option<String>,
    },
}

fn str_field<'a>(args: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| args.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn required<'a>(args: &'a Map<String, Value>, keys: &[&str], tool: &str) -> Result<String, ActionError> {
    str_field(args, keys)
        .map(str::to_string)
        .ok_or_else(|| ActionError::InvalidArgs(format!("{tool} requires '{}'", keys[0])))
}

fn u64_field(args: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| match args.get(*key) {
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn bool_field(args: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|key| match args.get(*key) {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

const TARGET_KEYS: &[&str] = &["target", "selector", "element", "locator"];

impl ActionArgs {
    /// Build arguments from a provider's `(tool, args)` pair, tolerating key aliases.
    pub fn from_tool(tool: &str, args: &Value) -> Result<Self, ActionError> {
        let kind = ActionKind::from_tool(tool)
            .ok_or_else(|| ActionError::InvalidArgs(format!("unknown tool '{tool}'")))?;
        let empty = Map::new();
        let map = args.as_object().unwrap_or(&empty);

        let parsed = match kind {
            ActionKind::Navigate => ActionArgs::Navigate {
                url: required(map, &["url", "href", "address"], tool)?,
                wait_until: str_field(map, &["waitUntil", "wait_until"])
                    .and_then(LoadCondition::parse),
            },
            ActionKind::Click => ActionArgs::Click {
                target: required(map, TARGET_KEYS, tool)?,
            },
            ActionKind::Type => ActionArgs::Type {
                target: required(map, TARGET_KEYS, tool)?,
                text: map
                    .get("text")
                    .or_else(|| map.get("value"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| ActionError::InvalidArgs(format!("{tool} requires 'text'")))?,
                clear: bool_field(map, &["clear"]).unwrap_or(true),
            },
            ActionKind::Hover => ActionArgs::Hover {
                target: required(map, TARGET_KEYS, tool)?,
            },
            ActionKind::Select => ActionArgs::Select {
                target: required(map, TARGET_KEYS, tool)?,
                value: required(map, &["value", "option", "label"], tool)?,
            },
            ActionKind::Press => ActionArgs::Press {
                key: required(map, &["key", "keys"], tool)?,
            },
            ActionKind::Wait => {
                let duration_ms = u64_field(map, &["durationMs", "duration_ms", "ms", "duration"])
                    .or_else(|| u64_field(map, &["seconds", "secs"]).map(|s| s * 1000))
                    .ok_or_else(|| ActionError::InvalidArgs(format!("{tool} requires 'durationMs'")))?;
                ActionArgs::Wait { duration_ms }
            }
            ActionKind::Screenshot => ActionArgs::Screenshot {
                path: str_field(map, &["path", "file"]).map(str::to_string),
                full_page: bool_field(map, &["fullPage", "full_page"]),
            },
            ActionKind::WaitForSelector => ActionArgs::WaitForSelector {
                target: required(map, TARGET_KEYS, tool)?,
                timeout_ms: u64_field(map, &["timeoutMs", "timeout_ms", "timeout"]),
            },
            ActionKind::RunCode => ActionArgs::RunCode {
                code: required(map, &["code", "script", "source"], tool)?,
                store_as: str_field(map, &["storeAs", "store_as", "saveAs"]).map(str::to_string),
            },
        };
        Ok(parsed.normalized())
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            ActionArgs::Navigate { .. } => ActionKind::Navigate,
            ActionArgs::Click { .. } => ActionKind::Click,
            ActionArgs::Type { .. } => ActionKind::Type,
            ActionArgs::Hover { .. } => ActionKind::Hover,
            ActionArgs::Select { .. } => ActionKind::Select,
            ActionArgs::Press { .. } => ActionKind::Press,
            ActionArgs::Wait { .. } => ActionKind::Wait,
            ActionArgs::Screenshot { .. } => ActionKind::Screenshot,
            ActionArgs::WaitForSelector { .. } => ActionKind::WaitForSelector,
            ActionArgs::RunCode { .. } => ActionKind::RunCode,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            ActionArgs::Click { target }
            | ActionArgs::Type { target, .. }
            | ActionArgs::Hover { target }
            | ActionArgs::Select { target, .. }
            | ActionArgs::WaitForSelector { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Canonical form: navigation URLs are fully qualified.
    pub fn normalized(self) -> Self {
        match self {
            ActionArgs::Navigate { url, wait_until } => ActionArgs::Navigate {
                url: normalize_url(&url),
                wait_until,
            },
            other => other,
        }
    }

    /// JSON form without the `kind` tag, as exchanged with decision providers.
    pub fn to_value(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => {
                map.remove("kind");
                Value::Object(map)
            }
            Ok(other) => other,
            Err(_) => Value::Null,
        }
    }
}

/// Hierarchical scheme at the very start, e.g. `http://` or `chrome-extension://`.
static LEADING_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").expect("scheme regex"));

/// Schemes used without `//`. `host:port` inputs must not be mistaken for these.
const OPAQUE_SCHEMES: &[&str] = &["about:", "data:", "javascript:", "mailto:", "blob:"];

/// Prefix `https://` when the input has no scheme.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let lower = trimmed.to_ascii_lowercase();
    let has_scheme = LEADING_SCHEME.is_match(trimmed)
        || OPAQUE_SCHEMES.iter().any(|prefix| lower.starts_with(prefix));
    if has_scheme {
        trimmed.to_string()
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!("https://{trimmed}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Usable and the operation succeeded
    Matched,
    /// Not found or not visible within the visibility window
    Unusable,
    /// Usable, but the operation itself failed
    Failed,
}

/// One candidate tried during a resolution cascade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorAttempt {
    pub expression: String,
    pub strategy: StrategyKind,
    pub status: AttemptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SelectorAttempt {
    pub fn new(
        expression: impl Into<String>,
        strategy: StrategyKind,
        status: AttemptStatus,
        error: Option<&str>,
    ) -> Self {
        Self {
            expression: expression.into(),
            strategy,
            status,
            error: error.map(str::to_string),
        }
    }

    pub fn from_candidate(candidate: &CandidateStrategy, status: AttemptStatus, error: Option<&str>) -> Self {
        Self::new(candidate.expression.clone(), candidate.kind, status, error)
    }
}

/// Uniform result contract for every action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<Value>,
    pub duration_ms: u64,
    /// Set only when the effect could actually be checked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched: Option<CandidateStrategy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives_tried: Vec<SelectorAttempt>,
}

impl ActionResult {
    pub fn success(data: Option<Value>, duration_ms: u64) -> Self {
        Self {
            success: true,
            data,
            error: None,
            error_kind: None,
            error_details: None,
            duration_ms,
            verified: None,
            matched: None,
            alternatives_tried: Vec::new(),
        }
    }

    pub fn failure(err: &ActionError, duration_ms: u64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            error_kind: Some(err.kind().to_string()),
            error_details: err.details(),
            duration_ms,
            verified: None,
            matched: None,
            alternatives_tried: Vec::new(),
        }
    }
}

/// One browser action and, once executed, its result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: String,
    pub kind: ActionKind,
    pub args: ActionArgs,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Trail of the final attempt's cascade
    pub selector_attempts: Vec<SelectorAttempt>,
    result: Option<ActionResult>,
}

impl Action {
    /// Create a new action; arguments are normalized here.
    pub fn new(args: ActionArgs) -> Self {
        let args = args.normalized();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: args.kind(),
            args,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            selector_attempts: Vec::new(),
            result: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn result(&self) -> Option<&ActionResult> {
        self.result.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }

    /// Record the final result. Returns `false` (and keeps the old one) if already set.
    pub fn finish(&mut self, result: ActionResult) -> bool {
        if self.result.is_some() {
            return false;
        }
        self.finished_at = Some(Utc::now());
        self.result = Some(result);
        true
    }
}

/// Emitted after every completed action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationEvent {
    pub action_id: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub args: Value,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<SelectorAttempt>,
    pub timestamp: DateTime<Utc>,
}

/// Executor tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub navigation_timeout_ms: u64,
    pub interaction_timeout_ms: u64,
    pub visibility_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub screenshot_dir: String,
    pub full_page_screenshots: bool,
    pub default_wait_until: LoadCondition,
    pub wait_for_selector_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub verify_effects: bool,
    pub event_buffer: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: 30_000,
            interaction_timeout_ms: 5_000,
            visibility_timeout_ms: 2_000,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_ms: 500,
            screenshot_dir: "./screenshots".to_string(),
            full_page_screenshots: false,
            default_wait_until: LoadCondition::NetworkIdle,
            wait_for_selector_timeout_ms: 10_000,
            poll_interval_ms: 200,
            verify_effects: true,
            event_buffer: 128,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_and_qualified_urls_normalize_identically() {
        let bare = Action::new(ActionArgs::Navigate {
            url: "example.com".into(),
            wait_until: None,
        });
        let qualified = Action::new(ActionArgs::Navigate {
            url: "https://example.com".into(),
            wait_until: None,
        });
        assert_eq!(bare.args, qualified.args);
        assert_eq!(
            bare.args,
            ActionArgs::Navigate {
                url: "https://example.com".into(),
                wait_until: None
            }
        );
        assert_eq!(normalize_url("about:blank"), "about:blank");
        assert_eq!(normalize_url("http://intranet/x"), "http://intranet/x");
        assert_eq!(normalize_url("//cdn.example.com/a.js"), "https://cdn.example.com/a.js");
    }

    #[test]
    fn only_a_leading_scheme_counts() {
        assert_eq!(
            normalize_url("example.com/login?next=https://example.com/home"),
            "https://example.com/login?next=https://example.com/home"
        );
        assert_eq!(normalize_url("localhost:3000/app"), "https://localhost:3000/app");
        assert_eq!(normalize_url("file:///tmp/a.html"), "file:///tmp/a.html");
        assert_eq!(normalize_url("data:text/html,hi"), "data:text/html,hi");
        assert_eq!(
            normalize_url("chrome-extension://abc/popup.html"),
            "chrome-extension://abc/popup.html"
        );
    }

    #[test]
    fn from_tool_accepts_aliases() {
        let args = ActionArgs::from_tool("fill", &json!({ "selector": "#q", "value": "rust" }))
            .expect("fill");
        assert_eq!(
            args,
            ActionArgs::Type {
                target: "#q".into(),
                text: "rust".into(),
                clear: true
            }
        );

        let wait = ActionArgs::from_tool("wait", &json!({ "seconds": 2 })).expect("wait");
        assert_eq!(wait, ActionArgs::Wait { duration_ms: 2000 });

        let nav = ActionArgs::from_tool("navigate", &json!({ "url": "google.com" })).expect("nav");
        assert_eq!(nav.to_value(), json!({ "url": "https://google.com" }));

        let code = ActionArgs::from_tool("run_code", &json!({ "code": "1", "storeAs": "one" }))
            .expect("code");
        assert_eq!(code.kind(), ActionKind::RunCode);
    }

    #[test]
    fn from_tool_rejects_missing_fields() {
        let err = ActionArgs::from_tool("click", &json!({})).expect_err("missing target");
        assert_eq!(err.kind(), "invalid_args");
        assert!(ActionArgs::from_tool("teleport", &json!({})).is_err());
    }

    #[test]
    fn args_round_trip_through_serde_tag() {
        let parsed: ActionArgs =
            serde_json::from_value(json!({ "kind": "type", "target": "#q", "text": "x" }))
                .expect("parse");
        assert_eq!(
            parsed,
            ActionArgs::Type {
                target: "#q".into(),
                text: "x".into(),
                clear: true
            }
        );
        let wait: ActionArgs =
            serde_json::from_value(json!({ "kind": "wait", "ms": 250 })).expect("alias");
        assert_eq!(wait, ActionArgs::Wait { duration_ms: 250 });
    }

    #[test]
    fn result_is_set_once() {
        let mut action = Action::new(ActionArgs::Wait { duration_ms: 1 });
        assert!(action.finish(ActionResult::success(None, 1)));
        assert!(!action.finish(ActionResult::failure(&ActionError::NotConnected, 2)));
        assert!(action.result().expect("result").success);
    }
}
