//! Marker catalogues for loading indicators and modal overlays, plus the page scripts
//! that scan for them.

use serde_json::json;

/// Substrings matched against element class names.
pub const LOADING_CLASS_PATTERNS: &[&str] = &["loading", "spinner", "loader", "skeleton", "progress"];

/// Well-known spinner classes from common UI kits.
pub const SPINNER_SELECTORS: &[&str] = &[
    ".spinner",
    ".loading",
    ".loader",
    ".lds-ring",
    ".sk-circle",
    ".fa-spin",
    ".MuiCircularProgress-root",
    ".ant-spin-spinning",
    ".el-loading-mask",
];

/// Short "loading" phrases in several languages, matched case-insensitively.
pub const LOADING_PHRASES: &[&str] = &[
    "loading",
    "please wait",
    "加载中",
    "正在加载",
    "請稍候",
    "cargando",
    "chargement",
    "wird geladen",
    "読み込み中",
];

pub const MODAL_SELECTORS: &[&str] = &[
    "[role=dialog]",
    "[role=alertdialog]",
    "[aria-modal=true]",
    "dialog[open]",
];

/// Class substrings of fixed-position overlays.
pub const MODAL_CLASS_PATTERNS: &[&str] = &["modal", "overlay", "popup", "lightbox", "dialog"];

const VISIBLE_FN: &str = r#"const visible = (el) => {
  const rect = el.getBoundingClientRect();
  const style = window.getComputedStyle(el);
  return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none';
};"#;

pub const IDENTITY_SCRIPT: &str = "({ url: location.href, title: document.title })";

pub const READY_STATE_SCRIPT: &str = "document.readyState";

pub const STRUCTURE_SIGNAL_SCRIPT: &str = r#"(() => {
  const root = document.documentElement;
  return {
    nodeCount: document.getElementsByTagName('*').length,
    htmlLength: root ? root.outerHTML.length : 0,
    textLength: document.body ? (document.body.innerText || '').length : 0,
  };
})()"#;

pub const VISIBLE_COUNT_SCRIPT: &str = r#"(() => {
  let count = 0;
  for (const el of document.body ? document.body.getElementsByTagName('*') : []) {
    const rect = el.getBoundingClientRect();
    if (rect.width > 0 && rect.height > 0) count += 1;
  }
  return count;
})()"#;

pub fn loading_indicator_script() -> String {
    format!(
        r#"(() => {{
  {VISIBLE_FN}
  const classPatterns = {classes};
  const spinners = {spinners};
  const phrases = {phrases};
  if (document.querySelector('[aria-busy=true]')) return true;
  for (const sel of spinners) {{
    for (const el of document.querySelectorAll(sel)) {{
      if (visible(el)) return true;
    }}
  }}
  for (const el of document.querySelectorAll('[class]')) {{
    const cls = String(el.className || '').toLowerCase();
    if (classPatterns.some((p) => cls.includes(p)) && visible(el)) return true;
  }}
  const body = document.body ? (document.body.innerText || '') : '';
  if (body.length < 200) {{
    const text = body.toLowerCase();
    if (phrases.some((p) => text.includes(p))) return true;
  }}
  return false;
}})()"#,
        classes = json!(LOADING_CLASS_PATTERNS),
        spinners = json!(SPINNER_SELECTORS),
        phrases = json!(LOADING_PHRASES),
    )
}

pub fn modal_overlay_script() -> String {
    format!(
        r#"(() => {{
  {VISIBLE_FN}
  const selectors = {selectors};
  const classPatterns = {classes};
  for (const sel of selectors) {{
    for (const el of document.querySelectorAll(sel)) {{
      if (visible(el)) return true;
    }}
  }}
  for (const el of document.querySelectorAll('[class]')) {{
    const cls = String(el.className || '').toLowerCase();
    if (!classPatterns.some((p) => cls.includes(p))) continue;
    const style = window.getComputedStyle(el);
    if ((style.position === 'fixed' || style.position === 'absolute') && visible(el)) return true;
  }}
  return false;
}})()"#,
        selectors = json!(MODAL_SELECTORS),
        classes = json!(MODAL_CLASS_PATTERNS),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_script_embeds_catalogue() {
        let script = loading_indicator_script();
        assert!(script.contains("aria-busy"));
        assert!(script.contains(".lds-ring"));
        assert!(script.contains("加载中"));
        assert!(script.contains("wird geladen"));
    }

    #[test]
    fn modal_script_embeds_catalogue() {
        let script = modal_overlay_script();
        assert!(script.contains("[aria-modal=true]"));
        assert!(script.contains("lightbox"));
    }
}
