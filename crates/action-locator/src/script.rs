//! Page-side scripts that locate a candidate's element
//!
//! Every script is a self-contained expression suitable for `Runtime.evaluate` with
//! `returnByValue`. Literals are embedded through `serde_json` so arbitrary target text
//! cannot break out of the string.

use crate::types::{CandidateStrategy, StrategyKind};
use serde_json::Value;

/// Helpers shared by every finder: visibility and whitespace-insensitive text.
const PRELUDE: &str = r#"
const __tpVisible = (el) => {
  if (!el || !el.getBoundingClientRect) return false;
  const rect = el.getBoundingClientRect();
  const style = window.getComputedStyle(el);
  return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none' && style.opacity !== '0';
};
const __tpNorm = (s) => String(s || '').replace(/\s+/g, ' ').trim().toLowerCase();
const __tpInnermost = (pool) => pool.find((el) => !pool.some((other) => other !== el && el.contains(other))) || null;
"#;

fn literal(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

/// Source of a zero-argument JS function returning the candidate's element or `null`.
pub fn finder_source(candidate: &CandidateStrategy) -> String {
    let needle = literal(&candidate.needle);
    match candidate.kind {
        StrategyKind::Css => format!(
            r#"() => {{
  let nodes;
  try {{ nodes = Array.from(document.querySelectorAll({needle})); }} catch (e) {{ return null; }}
  return nodes.find(__tpVisible) || nodes[0] || null;
}}"#
        ),
        StrategyKind::Text => format!(
            r#"() => {{
  const needle = __tpNorm({needle});
  const nodes = Array.from(document.querySelectorAll('button, a, [role], input[type=button], input[type=submit], label, summary, option, li, td, th, span, div, p, h1, h2, h3, h4, h5, h6'));
  const textOf = (el) => __tpNorm(el.innerText || el.value || el.getAttribute('aria-label'));
  const exact = nodes.filter((el) => __tpVisible(el) && textOf(el) === needle);
  if (exact.length) return __tpInnermost(exact);
  return __tpInnermost(nodes.filter((el) => __tpVisible(el) && textOf(el).includes(needle)));
}}"#
        ),
        StrategyKind::TestId => format!(
            r#"() => {{
  const quoted = JSON.stringify({needle});
  const selector = ['data-testid', 'data-test-id', 'data-test', 'data-qa']
    .map((attr) => '[' + attr + '=' + quoted + ']')
    .join(', ');
  const nodes = Array.from(document.querySelectorAll(selector));
  return nodes.find(__tpVisible) || nodes[0] || null;
}}"#
        ),
        StrategyKind::Role => format!(
            r#"() => {{
  const needle = __tpNorm({needle});
  const nameOf = (el) => {{
    const labelledBy = el.getAttribute('aria-labelledby');
    if (labelledBy) {{
      const ref = document.getElementById(labelledBy);
      if (ref) return __tpNorm(ref.innerText);
    }}
    return __tpNorm(el.getAttribute('aria-label') || el.innerText || el.value || el.getAttribute('title') || el.getAttribute('alt'));
  }};
  const nodes = Array.from(document.querySelectorAll('button, a[href], input, select, textarea, summary, [role], [tabindex]')).filter(__tpVisible);
  return nodes.find((el) => nameOf(el) === needle) || nodes.find((el) => nameOf(el).includes(needle)) || null;
}}"#
        ),
        StrategyKind::Placeholder => format!(
            r#"() => {{
  const needle = __tpNorm({needle});
  const nodes = Array.from(document.querySelectorAll('[placeholder]')).filter(__tpVisible);
  const placeholderOf = (el) => __tpNorm(el.getAttribute('placeholder'));
  return nodes.find((el) => placeholderOf(el) === needle) || nodes.find((el) => placeholderOf(el).includes(needle)) || null;
}}"#
        ),
        StrategyKind::Label => format!(
            r#"() => {{
  const needle = __tpNorm({needle});
  const labels = Array.from(document.querySelectorAll('label'));
  const hit = labels.find((l) => __tpNorm(l.innerText) === needle) || labels.find((l) => __tpNorm(l.innerText).includes(needle));
  if (hit) {{
    const control = hit.control || (hit.htmlFor ? document.getElementById(hit.htmlFor) : null) || hit.querySelector('input, select, textarea');
    if (control) return control;
  }}
  const aria = Array.from(document.querySelectorAll('[aria-label]'));
  return aria.find((el) => __tpNorm(el.getAttribute('aria-label')) === needle) || null;
}}"#
        ),
    }
}

/// Run `body` against the candidate's element, bound as `el`.
///
/// Evaluates to `{ found: false }` when nothing matches; otherwise to whatever `body`
/// returns (it should return an object including `found: true`).
pub fn element_script(candidate: &CandidateStrategy, body: &str) -> String {
    format!(
        "(() => {{\n{PRELUDE}\nconst el = ({finder})();\nif (!el) return {{ found: false }};\n{body}\n}})()",
        finder = finder_source(candidate),
    )
}

/// Visibility probe returning `{ found, visible, x, y, width, height, tag }`.
pub fn probe_script(candidate: &CandidateStrategy) -> String {
    element_script(
        candidate,
        r#"const rect = el.getBoundingClientRect();
return {
  found: true,
  visible: __tpVisible(el),
  x: rect.left + rect.width / 2,
  y: rect.top + rect.height / 2,
  width: rect.width,
  height: rect.height,
  tag: el.tagName.toLowerCase(),
};"#,
    )
}

/// Probe that also reports whether the element is disabled.
pub fn locate_expression(candidate: &CandidateStrategy) -> String {
    element_script(
        candidate,
        r#"return {
  found: true,
  visible: __tpVisible(el),
  disabled: Boolean(el.disabled) || el.getAttribute('aria-disabled') === 'true',
  tag: el.tagName.toLowerCase(),
};"#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needle_is_embedded_as_json_literal() {
        let candidate = CandidateStrategy::new(StrategyKind::Text, "it's \"quoted\"");
        let script = finder_source(&candidate);
        assert!(script.contains(r#""it's \"quoted\"""#));
    }

    #[test]
    fn element_script_binds_el_and_guards_missing() {
        let candidate = CandidateStrategy::new(StrategyKind::Css, "#go");
        let script = element_script(&candidate, "return { found: true };");
        assert!(script.starts_with("(() => {"));
        assert!(script.contains("const el = (() => {"));
        assert!(script.contains("if (!el) return { found: false };"));
        assert!(script.contains("__tpVisible"));
        assert!(script.ends_with("})()"));
    }

    #[test]
    fn every_strategy_has_a_finder() {
        for kind in StrategyKind::fallback_chain() {
            let script = probe_script(&CandidateStrategy::new(kind, "Search"));
            assert!(script.contains("\"Search\""), "{kind}");
            assert!(script.contains("visible"), "{kind}");
        }
    }
}
