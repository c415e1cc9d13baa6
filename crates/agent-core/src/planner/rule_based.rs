//! Deterministic instruction parsing.
//!
//! The table is plain data: an ordered list of rules, each a pattern plus a tool name
//! and an argument extractor. The first rule whose pattern matches a step wins. New
//! phrasings or languages are added as rows, not as control flow.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use perceiver_structural::Observation;
use regex::{Captures, Regex};
use serde_json::{json, Value};
use tracing::debug;

use super::DecisionProvider;
use crate::errors::AgentError;
use crate::model::{Decision, DecisionSource, GoalContext, HistoryEntry};

type ArgExtractor = fn(&Captures<'_>) -> Option<Value>;

/// One row of the table
pub struct Rule {
    pub name: &'static str,
    pub tool: &'static str,
    pattern: Regex,
    extract: ArgExtractor,
}

impl Rule {
    fn new(name: &'static str, tool: &'static str, pattern: &str, extract: ArgExtractor) -> Self {
        let pattern = Regex::new(pattern).expect("rule regex");
        Self {
            name,
            tool,
            pattern,
            extract,
        }
    }

    /// Arguments for `step` when this rule applies
    pub fn apply(&self, step: &str) -> Option<Value> {
        let captures = self.pattern.captures(step)?;
        (self.extract)(&captures)
    }
}

const QUOTES: &[char] = &['"', '\'', '“', '”', '‘', '’', '「', '」', '《', '》', '`'];
const TRAILING: &[char] = &['。', '.', '!', '！', '?', '？', ',', '，', ';', '；'];

fn clean(value: &str) -> String {
    value
        .trim()
        .trim_end_matches(TRAILING)
        .trim()
        .trim_matches(QUOTES)
        .trim()
        .to_string()
}

fn group(captures: &Captures<'_>, name: &str) -> Option<String> {
    captures
        .name(name)
        .map(|m| clean(m.as_str()))
        .filter(|value| !value.is_empty())
}

fn extract_url(captures: &Captures<'_>) -> Option<Value> {
    let url = group(captures, "url")?;
    Some(json!({ "url": url }))
}

fn extract_target(captures: &Captures<'_>) -> Option<Value> {
    let target = group(captures, "target")?;
    Some(json!({ "target": target }))
}

fn extract_typing(captures: &Captures<'_>) -> Option<Value> {
    let target = group(captures, "target")?;
    let text = group(captures, "text")?;
    Some(json!({ "target": target, "text": text }))
}

/// Normalize spoken key names (`回车`, `esc`, `enter key`) to key identifiers.
pub fn key_alias(raw: &str) -> String {
    let key = clean(raw);
    let lowered = key.to_lowercase();
    let lowered = lowered
        .trim_end_matches("键")
        .trim_end_matches(" key")
        .trim();
    let mapped = match lowered {
        "回车" | "enter" | "return" => "Enter",
        "退格" | "backspace" => "Backspace",
        "删除" | "delete" | "del" => "Delete",
        "空格" | "space" | "spacebar" => "Space",
        "制表" | "tab" => "Tab",
        "esc" | "escape" | "退出" => "Escape",
        "上" | "up" | "arrowup" => "ArrowUp",
        "下" | "down" | "arrowdown" => "ArrowDown",
        "左" | "left" | "arrowleft" => "ArrowLeft",
        "右" | "right" | "arrowright" => "ArrowRight",
        _ => return key,
    };
    mapped.to_string()
}

fn extract_key(captures: &Captures<'_>) -> Option<Value> {
    let key = group(captures, "key")?;
    Some(json!({ "key": key_alias(&key) }))
}

fn extract_wait(captures: &Captures<'_>) -> Option<Value> {
    let amount: f64 = captures.name("amount")?.as_str().parse().ok()?;
    let unit = captures
        .name("unit")
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_default();
    let millis = if unit.starts_with("ms") || unit.starts_with("milli") || unit == "毫秒" {
        amount
    } else if unit.starts_with("min") || unit.starts_with("分") {
        amount * 60_000.0
    } else {
        amount * 1_000.0
    };
    Some(json!({ "durationMs": millis.round() as u64 }))
}

fn extract_screenshot(captures: &Captures<'_>) -> Option<Value> {
    let phrase = captures.get(0)?.as_str().to_lowercase();
    let full_page = ["full", "全页", "整页"]
        .iter()
        .any(|marker| phrase.contains(marker));
    Some(json!({ "fullPage": full_page }))
}

static DEFAULT_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::new(
            "navigate",
            "navigate",
            r"(?i)^(?:请|帮我)?\s*(?:打开|访问|前往|进入|转到|跳转到|跳转|open|go\s+to|goto|navigate\s+to|visit|browse\s+to|load)\s*(?:网站|网页|页面|the\s+(?:page|site|website)|website)?\s*[:：]?\s*(?P<url>\S+)$",
            extract_url,
        ),
        Rule::new(
            "bare_url",
            "navigate",
            r"(?i)^(?P<url>(?:https?://)?(?:[a-z0-9-]+\.)+[a-z]{2,}(?::\d+)?(?:[/?#]\S*)?)$",
            extract_url,
        ),
        Rule::new(
            "type_into_zh",
            "type",
            r"^(?:请)?\s*在\s*(?P<target>.+?)\s*(?:中|里|内|框中|框里)?\s*(?:输入|键入|填写|填入)\s*(?P<text>.+)$",
            extract_typing,
        ),
        Rule::new(
            "type_to_zh",
            "type",
            r"^(?:请)?\s*(?:输入|键入|填写|填入)\s*(?P<text>.+?)\s*(?:到|在|于|进)\s*(?P<target>.+?)(?:中|里|内)?$",
            extract_typing,
        ),
        Rule::new(
            "type_into_en",
            "type",
            r"(?i)^(?:type|enter|input|fill\s+in|write)\s+(?P<text>.+?)\s+(?:in|into|on)\s+(?:the\s+)?(?P<target>.+?)(?:\s+(?:field|box|input))?$",
            extract_typing,
        ),
        Rule::new(
            "click",
            "click",
            r"(?i)^(?:请)?\s*(?:点击|单击|点一下|点选|click\s+on|click|tap\s+on|tap)\s*(?:the\s+)?(?P<target>.+?)(?:\s*(?:按钮|链接|button|link))?$",
            extract_target,
        ),
        Rule::new(
            "press",
            "press",
            r"(?i)^(?:请)?\s*(?:按下|按|敲击|敲|press|hit)\s*(?:the\s+)?(?P<key>[^\s]+?(?:\s+key)?)$",
            extract_key,
        ),
        Rule::new(
            "wait",
            "wait",
            r"(?i)^(?:请)?\s*(?:等待|等|wait(?:\s+for)?|sleep)\s*(?P<amount>\d+(?:\.\d+)?)\s*(?P<unit>毫秒|秒钟|秒|分钟|ms|milliseconds?|s|secs?|seconds?|mins?|minutes?)?$",
            extract_wait,
        ),
        Rule::new(
            "screenshot",
            "screenshot",
            r"(?i)^(?:请)?\s*(?:(?:全页|整页|full[\s-]?page)\s*)?(?:截图|截屏|截个图|截一下图|截一张图|take\s+(?:a\s+)?(?:full[\s-]?page\s+)?screenshot|screenshot|capture\s+(?:the\s+)?(?:page|screen))(?:\s*(?:全页|整页|of\s+the\s+(?:whole|full)\s+page))?$",
            extract_screenshot,
        ),
    ]
});

static STEP_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*[,，;；。]?\s*(?:然后|接着|之后再|之后|\band\s+then\b|\bthen\b|\bafter\s+that\b)\s*[,，]?\s*|\s*[;；]\s*")
        .expect("step separator regex")
});

/// Split a compound instruction ("打开 a.com 然后 点击 登录") into steps.
pub fn split_steps(instruction: &str) -> Vec<String> {
    STEP_SEPARATOR
        .split(instruction.trim())
        .map(clean)
        .filter(|step| !step.is_empty())
        .collect()
}

/// Ordered pattern table mapping instruction steps onto tools.
pub struct RuleTable {
    rules: &'static [Rule],
}

impl Default for RuleTable {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES.as_slice(),
        }
    }
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> &[Rule] {
        self.rules
    }

    /// First matching `(tool, args)` for one step
    pub fn match_step(&self, step: &str) -> Option<(&'static str, Value)> {
        let step = clean(step);
        self.rules.iter().find_map(|rule| {
            let args = rule.apply(&step)?;
            debug!(target: "decision-loop", rule = rule.name, tool = rule.tool, "rule matched");
            Some((rule.tool, args))
        })
    }

    /// Decide from the instruction alone: step `n` is issued once `n` actions succeeded.
    pub fn decide_instruction(
        &self,
        instruction: &str,
        history: &[HistoryEntry],
    ) -> Result<Decision, AgentError> {
        let steps = split_steps(instruction);
        if steps.is_empty() {
            return Err(AgentError::cannot_proceed("the instruction is empty"));
        }
        let done = history.iter().filter(|entry| entry.succeeded()).count();
        let Some(step) = steps.get(done) else {
            return Ok(Decision::complete(
                DecisionSource::Rules,
                format!("Completed {} step(s) of \"{}\"", steps.len(), instruction.trim()),
            ));
        };
        let (tool, args) = self.match_step(step).ok_or_else(|| {
            AgentError::cannot_proceed(format!("no rule understands \"{step}\""))
        })?;
        Ok(Decision::action(
            DecisionSource::Rules,
            tool,
            args,
            format!("step {}/{}: {step}", done + 1, steps.len()),
        ))
    }
}

#[async_trait]
impl DecisionProvider for RuleTable {
    fn name(&self) -> &str {
        "rules"
    }

    async fn decide(
        &self,
        instruction: &str,
        _observation: &Observation,
        history: &[HistoryEntry],
        _goal: &GoalContext,
    ) -> Result<Decision, AgentError> {
        self.decide_instruction(instruction, history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn matched(step: &str) -> Option<(&'static str, Value)> {
        RuleTable::new().match_step(step)
    }

    #[test]
    fn every_pattern_compiles() {
        assert_eq!(RuleTable::new().rules().len(), 9);
        assert_eq!(split_steps("wait 1s"), vec!["wait 1s".to_string()]);
    }

    #[test]
    fn chinese_open_yields_navigate() {
        let decision = RuleTable::new()
            .decide_instruction("打开 google.com", &[])
            .expect("decision");
        assert_eq!(decision.tool.as_deref(), Some("navigate"));
        assert_eq!(decision.args, json!({ "url": "google.com" }));
        assert!(!decision.is_complete);
    }

    #[test]
    fn navigation_phrasings() {
        assert_eq!(
            matched("open https://example.com/a?b=1"),
            Some(("navigate", json!({ "url": "https://example.com/a?b=1" })))
        );
        assert_eq!(matched("Go to rust-lang.org."), Some(("navigate", json!({ "url": "rust-lang.org" }))));
        assert_eq!(matched("example.com"), Some(("navigate", json!({ "url": "example.com" }))));
        assert_eq!(matched("访问网站 bing.com"), Some(("navigate", json!({ "url": "bing.com" }))));
    }

    #[test]
    fn click_strips_quotes_and_suffix() {
        assert_eq!(matched("点击“登录”按钮"), Some(("click", json!({ "target": "登录" }))));
        assert_eq!(matched("click the Sign in button"), Some(("click", json!({ "target": "Sign in" }))));
        assert_eq!(matched("click #submit"), Some(("click", json!({ "target": "#submit" }))));
    }

    #[test]
    fn typing_in_both_languages() {
        assert_eq!(
            matched("在搜索框中输入 rust async"),
            Some(("type", json!({ "target": "搜索", "text": "rust async" })))
        );
        assert_eq!(
            matched("type \"hello world\" into the search field"),
            Some(("type", json!({ "target": "search", "text": "hello world" })))
        );
    }

    #[test]
    fn keys_waits_and_screenshots() {
        assert_eq!(matched("按回车"), Some(("press", json!({ "key": "Enter" }))));
        assert_eq!(matched("press enter key"), Some(("press", json!({ "key": "Enter" }))));
        assert_eq!(matched("等待 3 秒"), Some(("wait", json!({ "durationMs": 3000 }))));
        assert_eq!(matched("wait 250ms"), Some(("wait", json!({ "durationMs": 250 }))));
        assert_eq!(matched("截图"), Some(("screenshot", json!({ "fullPage": false }))));
        assert_eq!(
            matched("take a full page screenshot"),
            Some(("screenshot", json!({ "fullPage": true })))
        );
    }

    #[test]
    fn compound_instruction_splits_into_steps() {
        assert_eq!(
            split_steps("打开 example.com 然后 点击 登录"),
            vec!["打开 example.com".to_string(), "点击 登录".to_string()]
        );
        assert_eq!(
            split_steps("open example.com, then click Sign in; wait 2s"),
            vec![
                "open example.com".to_string(),
                "click Sign in".to_string(),
                "wait 2s".to_string()
            ]
        );
    }

    #[test]
    fn unknown_instruction_cannot_proceed() {
        let err = RuleTable::new()
            .decide_instruction("summarize the meaning of life", &[])
            .expect_err("no rule");
        assert_eq!(err.kind(), ErrorKind::CannotProceed);
    }
}
