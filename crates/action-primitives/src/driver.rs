//! Page driver seam between the executor and the browser connection

use std::sync::Arc;
use std::time::Duration;

use action_locator::{element_script, probe_script, CandidateStrategy};
use async_trait::async_trait;
use cdp_adapter::{AdapterError, AdapterErrorKind, BrowserConnection, LoadCondition};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Result of probing a candidate's element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementProbe {
    pub found: bool,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

impl ElementProbe {
    pub fn usable(&self) -> bool {
        self.found && self.visible
    }

    /// Short reason when the element cannot be used
    pub fn reason(&self) -> &'static str {
        if !self.found {
            "no matching element"
        } else if !self.visible {
            "element not visible"
        } else {
            "usable"
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectedOption {
    pub value: String,
    pub label: String,
}

/// Output of a `runCode` evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeOutput {
    pub value: Value,
    pub logs: Vec<String>,
}

/// Everything the executor needs from a page. Implemented over the live connection and by
/// test fakes.
#[async_trait]
pub trait PageDriver: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn probe(&self, candidate: &CandidateStrategy) -> Result<ElementProbe, AdapterError>;

    async fn click(&self, candidate: &CandidateStrategy) -> Result<(), AdapterError>;

    async fn hover(&self, candidate: &CandidateStrategy) -> Result<(), AdapterError>;

    /// Replace the value (`clear`) or append keystrokes at the end.
    async fn fill(&self, candidate: &CandidateStrategy, text: &str, clear: bool) -> Result<(), AdapterError>;

    async fn select(&self, candidate: &CandidateStrategy, value: &str) -> Result<SelectedOption, AdapterError>;

    async fn field_value(&self, candidate: &CandidateStrategy) -> Result<Option<String>, AdapterError>;

    async fn navigate(&self, url: &str, wait_until: LoadCondition, timeout: Duration) -> Result<(), AdapterError>;

    async fn press(&self, key: &str) -> Result<(), AdapterError>;

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, AdapterError>;

    async fn run_code(&self, code: &str, vars: &Value) -> Result<CodeOutput, AdapterError>;

    async fn current_url(&self) -> Result<String, AdapterError>;
}

const SCROLL_AND_MEASURE: &str = r#"el.scrollIntoView({ block: 'center', inline: 'center' });
const rect = el.getBoundingClientRect();
return { found: true, x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 };"#;

const FIELD_VALUE: &str = r#"return { found: true, value: el.isContentEditable ? el.innerText : (el.value === undefined ? null : String(el.value)) };"#;

const FOCUS_END: &str = r#"el.scrollIntoView({ block: 'center' });
el.focus();
if (typeof el.setSelectionRange === 'function' && typeof el.value === 'string') {
  try { el.setSelectionRange(el.value.length, el.value.length); } catch (e) {}
} else if (el.isContentEditable) {
  const range = document.createRange();
  range.selectNodeContents(el);
  range.collapse(false);
  const selection = window.getSelection();
  selection.removeAllRanges();
  selection.addRange(range);
}
return { found: true };"#;

fn replace_value_body(text: &str) -> String {
    format!(
        r#"const text = {text};
el.scrollIntoView({{ block: 'center' }});
el.focus();
if (el.isContentEditable) {{
  el.textContent = text;
}} else {{
  const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
  const descriptor = Object.getOwnPropertyDescriptor(proto, 'value');
  if (descriptor && descriptor.set && (el instanceof HTMLInputElement || el instanceof HTMLTextAreaElement)) {{
    descriptor.set.call(el, text);
  }} else {{
    el.value = text;
  }}
}}
el.dispatchEvent(new Event('input', {{ bubbles: true }}));
el.dispatchEvent(new Event('change', {{ bubbles: true }}));
return {{ found: true }};"#,
        text = json!(text),
    )
}

fn select_body(value: &str) -> String {
    format!(
        r#"const wanted = {value};
if (el.tagName !== 'SELECT') return {{ found: true, selected: false, reason: 'element is not a <select>' }};
const norm = (s) => String(s || '').trim().toLowerCase();
const options = Array.from(el.options);
const option = options.find((o) => o.value === wanted)
  || options.find((o) => norm(o.text) === norm(wanted))
  || options.find((o) => norm(o.text).includes(norm(wanted)));
if (!option) return {{ found: true, selected: false, reason: 'no option matches ' + wanted }};
el.value = option.value;
option.selected = true;
el.dispatchEvent(new Event('input', {{ bubbles: true }}));
el.dispatchEvent(new Event('change', {{ bubbles: true }}));
return {{ found: true, selected: true, value: el.value, label: option.text }};"#,
        value = json!(value),
    )
}

const RUN_CODE_HEAD: &str = r#"(async () => {
  const __logs = [];
  const __log = console.log;
  console.log = (...args) => {
    __logs.push(args.map((a) => {
      if (typeof a === 'string') return a;
      try { return JSON.stringify(a); } catch (e) { return String(a); }
    }).join(' '));
    __log.apply(console, args);
  };
  const vars = "#;

const RUN_CODE_BODY: &str = r#";
  try {
    const value = await (async () => {
"#;

const RUN_CODE_TAIL: &str = r#"
    })();
    return { ok: true, value: value === undefined ? null : value, logs: __logs };
  } catch (e) {
    const stack = String((e && e.stack) || '');
    const frame = stack.split('\n').find((line) => /:\d+:\d+/.test(line)) || '';
    const pos = /:(\d+):(\d+)/.exec(frame);
    return {
      ok: false,
      message: String((e && e.message) || e),
      stack: stack,
      line: pos ? Number(pos[1]) : null,
      column: pos ? Number(pos[2]) : null,
      logs: __logs,
    };
  } finally {
    console.log = __log;
  }
})()"#;

static RETURN_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\breturn\b").expect("return keyword regex"));

/// Wrap user code so its console output and failure location are captured.
///
/// Single-line code without `return` is treated as an expression and returned.
pub fn run_code_script(code: &str, vars: &Value) -> String {
    let trimmed = code.trim();
    let body = if !trimmed.contains('\n') && !RETURN_KEYWORD.is_match(trimmed) && !trimmed.contains(';') {
        format!("return ({trimmed});")
    } else {
        trimmed.to_string()
    };
    let mut script = String::with_capacity(RUN_CODE_HEAD.len() + body.len() + RUN_CODE_TAIL.len() + 64);
    script.push_str(RUN_CODE_HEAD);
    script.push_str(&vars.to_string());
    script.push_str(RUN_CODE_BODY);
    script.push_str(&body);
    script.push_str(RUN_CODE_TAIL);
    script
}

fn not_found(candidate: &CandidateStrategy) -> AdapterError {
    AdapterError::new(AdapterErrorKind::TargetNotFound)
        .with_hint(format!("no element for {}", candidate.expression))
}

fn point_of(value: &Value) -> Option<(f64, f64)> {
    Some((value.get("x")?.as_f64()?, value.get("y")?.as_f64()?))
}

/// [`PageDriver`] over the live DevTools connection
pub struct CdpPageDriver {
    conn: Arc<BrowserConnection>,
}

impl CdpPageDriver {
    pub fn new(conn: Arc<BrowserConnection>) -> Self {
        Self { conn }
    }

    async fn with_element(&self, candidate: &CandidateStrategy, body: &str) -> Result<Value, AdapterError> {
        let value = self.conn.evaluate(&element_script(candidate, body)).await?;
        if value.get("found").and_then(Value::as_bool) != Some(true) {
            return Err(not_found(candidate));
        }
        Ok(value)
    }

    async fn center_of(&self, candidate: &CandidateStrategy) -> Result<(f64, f64), AdapterError> {
        let value = self.with_element(candidate, SCROLL_AND_MEASURE).await?;
        point_of(&value).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Internal).with_hint("element has no geometry")
        })
    }
}

#[async_trait]
impl PageDriver for CdpPageDriver {
    fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    async fn probe(&self, candidate: &CandidateStrategy) -> Result<ElementProbe, AdapterError> {
        let value = self.conn.evaluate(&probe_script(candidate)).await?;
        serde_json::from_value(value).map_err(|err| {
            AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("bad probe payload: {err}"))
        })
    }

    async fn click(&self, candidate: &CandidateStrategy) -> Result<(), AdapterError> {
        let (x, y) = self.center_of(candidate).await?;
        self.conn.dispatch_mouse_event("mouseMoved", x, y, 0).await?;
        self.conn.dispatch_mouse_event("mousePressed", x, y, 1).await?;
        self.conn.dispatch_mouse_event("mouseReleased", x, y, 1).await
    }

    async fn hover(&self, candidate: &CandidateStrategy) -> Result<(), AdapterError> {
        let (x, y) = self.center_of(candidate).await?;
        self.conn.dispatch_mouse_event("mouseMoved", x, y, 0).await
    }

    async fn fill(&self, candidate: &CandidateStrategy, text: &str, clear: bool) -> Result<(), AdapterError> {
        if clear {
            self.with_element(candidate, &replace_value_body(text)).await?;
            return Ok(());
        }
        self.with_element(candidate, FOCUS_END).await?;
        self.conn.type_characters(text).await
    }

    async fn select(&self, candidate: &CandidateStrategy, value: &str) -> Result<SelectedOption, AdapterError> {
        let result = self.with_element(candidate, &select_body(value)).await?;
        if result.get("selected").and_then(Value::as_bool) != Some(true) {
            let reason = result
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("selection failed");
            return Err(AdapterError::new(AdapterErrorKind::Internal).with_hint(reason));
        }
        let text = |key: &str| {
            result
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Ok(SelectedOption {
            value: text("value"),
            label: text("label"),
        })
    }

    async fn field_value(&self, candidate: &CandidateStrategy) -> Result<Option<String>, AdapterError> {
        let value = self.with_element(candidate, FIELD_VALUE).await?;
        Ok(value.get("value").and_then(Value::as_str).map(str::to_string))
    }

    async fn navigate(&self, url: &str, wait_until: LoadCondition, timeout: Duration) -> Result<(), AdapterError> {
        self.conn.navigate(url).await?;
        self.conn.wait_for_load(wait_until, timeout).await
    }

    async fn press(&self, key: &str) -> Result<(), AdapterError> {
        self.conn.press_key(key).await
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, AdapterError> {
        self.conn.capture_screenshot(full_page).await
    }

    async fn run_code(&self, code: &str, vars: &Value) -> Result<CodeOutput, AdapterError> {
        let value = self.conn.evaluate(&run_code_script(code, vars)).await?;
        let logs: Vec<String> = value
            .get("logs")
            .and_then(Value::as_array)
            .map(|logs| {
                logs.iter()
                    .filter_map(|line| line.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        if value.get("ok").and_then(Value::as_bool) == Some(true) {
            return Ok(CodeOutput {
                value: value.get("value").cloned().unwrap_or(Value::Null),
                logs,
            });
        }

        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("code raised an exception")
            .to_string();
        Err(AdapterError::new(AdapterErrorKind::ScriptException)
            .with_hint(message.clone())
            .with_data(json!({
                "message": message,
                "stack": value.get("stack"),
                "line": value.get("line"),
                "column": value.get("column"),
                "logs": logs,
            })))
    }

    async fn current_url(&self) -> Result<String, AdapterError> {
        let value = self.conn.evaluate("location.href").await?;
        value.as_str().map(str::to_string).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Internal).with_hint("location.href is not a string")
        })
    }
}
