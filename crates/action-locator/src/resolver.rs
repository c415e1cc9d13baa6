//! Target description to candidate strategies

use crate::types::{CandidateStrategy, StrategyKind};
use tracing::debug;

/// HTML element names accepted as a bare type selector. Any tag followed by an
/// id, class, attribute or pseudo part is accepted regardless of this list.
const KNOWN_TAGS: &[&str] = &[
    "a", "abbr", "address", "area", "article", "aside", "audio", "b", "bdi", "bdo",
    "blockquote", "body", "br", "button", "canvas", "caption", "cite", "code", "col",
    "colgroup", "data", "datalist", "dd", "del", "details", "dfn", "dialog", "div", "dl", "dt",
    "em", "embed", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4",
    "h5", "h6", "head", "header", "hgroup", "hr", "html", "i", "iframe", "img", "input", "ins",
    "kbd", "label", "legend", "li", "link", "main", "map", "mark", "menu", "meta", "meter",
    "nav", "noscript", "object", "ol", "optgroup", "option", "output", "p", "picture", "pre",
    "progress", "q", "rp", "rt", "ruby", "s", "samp", "script", "search", "section", "select",
    "slot", "small", "source", "span", "strong", "style", "sub", "summary", "sup", "svg",
    "table", "tbody", "td", "template", "textarea", "tfoot", "th", "thead", "time", "title",
    "tr", "track", "u", "ul", "var", "video", "wbr",
];

/// Strategies appended after the optional CSS candidate, in order.
const TEXTUAL_CHAIN: [StrategyKind; 5] = [
    StrategyKind::Text,
    StrategyKind::TestId,
    StrategyKind::Role,
    StrategyKind::Placeholder,
    StrategyKind::Label,
];

/// Produce the ordered candidate list for a loose target description.
///
/// Pure and deterministic: CSS-looking targets get a `css` candidate first, then every
/// target gets text, testid, role, placeholder and label candidates in that order.
/// Surrounding quotes are stripped for the textual strategies.
pub fn resolve(target: &str) -> Vec<CandidateStrategy> {
    let trimmed = target.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut candidates = Vec::with_capacity(TEXTUAL_CHAIN.len() + 1);
    if looks_like_css(trimmed) {
        candidates.push(CandidateStrategy::new(StrategyKind::Css, trimmed));
    }

    let needle = strip_quotes(trimmed);
    if needle.is_empty() {
        return Vec::new();
    }
    candidates.extend(
        TEXTUAL_CHAIN
            .iter()
            .map(|kind| CandidateStrategy::new(*kind, needle)),
    );

    debug!(
        target: "selector-resolver",
        target_description = trimmed,
        css = candidates.first().map(|c| c.kind == StrategyKind::Css).unwrap_or(false),
        count = candidates.len(),
        "resolved candidates"
    );
    candidates
}

/// Heuristic check for targets that should be tried as CSS selectors.
///
/// Accepts id/class/attribute/pseudo selectors, the universal selector, lowercase type
/// selectors (known HTML tags or hyphenated custom elements when bare), combined with descendant/child/sibling combinators or selector lists.
/// Prose such as `Submit` or `Email address` is rejected.
pub fn looks_like_css(target: &str) -> bool {
    let trimmed = target.trim();
    if trimmed.is_empty() || is_quoted(trimmed) {
        return false;
    }
    let Some(segments) = split_compounds(trimmed) else {
        return false;
    };
    !segments.is_empty() && segments.iter().all(|segment| compound_is_css(segment))
}

/// Split on whitespace and combinators outside brackets, parens and quotes.
fn split_compounds(selector: &str) -> Option<Vec<String>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;

    for ch in selector.chars() {
        if let Some(open) = quote {
            current.push(ch);
            if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' if depth > 0 => {
                quote = Some(ch);
                current.push(ch);
            }
            '[' | '(' => {
                depth += 1;
                current.push(ch);
            }
            ']' | ')' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
                current.push(ch);
            }
            c if depth == 0 && (c.is_whitespace() || matches!(c, '>' | '+' | '~' | ',')) => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if depth != 0 || quote.is_some() {
        return None;
    }
    if !current.is_empty() {
        segments.push(current);
    }
    Some(segments)
}

fn compound_is_css(compound: &str) -> bool {
    let Some(first) = compound.chars().next() else {
        return false;
    };
    match first {
        '#' | '.' | '[' | ':' | '*' => tail_is_css(compound),
        c if c.is_ascii_lowercase() => {
            let tag_end = compound
                .find(|c: char| matches!(c, '.' | '#' | '[' | ':'))
                .unwrap_or(compound.len());
            let (tag, tail) = compound.split_at(tag_end);
            if !tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return false;
            }
            if tail.is_empty() {
                KNOWN_TAGS.contains(&tag) || is_custom_element(tag)
            } else {
                tail_is_css(tail)
            }
        }
        _ => false,
    }
}

/// Validate the simple selectors following an optional tag.
fn tail_is_css(tail: &str) -> bool {
    let chars: Vec<char> = tail.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if i == 0 => i += 1,
            '#' | '.' => {
                let Some(next) = chars.get(i + 1) else {
                    return false;
                };
                if !(next.is_alphabetic() || *next == '_' || *next == '-') {
                    return false;
                }
                i += 1;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
            }
            '[' => {
                let Some(close) = chars[i..].iter().position(|c| *c == ']') else {
                    return false;
                };
                if close < 2 {
                    return false;
                }
                i += close + 1;
            }
            ':' => {
                i += 1;
                if chars.get(i) == Some(&':') {
                    i += 1;
                }
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                if i == start {
                    return false;
                }
                if chars.get(i) == Some(&'(') {
                    let mut depth = 0;
                    while i < chars.len() {
                        match chars[i] {
                            '(' => depth += 1,
                            ')' => {
                                depth -= 1;
                                if depth == 0 {
                                    i += 1;
                                    break;
                                }
                            }
                            _ => {}
                        }
                        i += 1;
                    }
                }
            }
            _ => return false,
        }
    }
    true
}

/// Custom element names always contain a hyphen, e.g. `my-widget`.
fn is_custom_element(tag: &str) -> bool {
    tag.contains('-') && !tag.ends_with('-')
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

const QUOTE_PAIRS: &[(char, char)] = &[('"', '"'), ('\'', '\''), ('“', '”'), ('「', '」'), ('`', '`')];

fn is_quoted(value: &str) -> bool {
    let mut chars = value.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) => QUOTE_PAIRS
            .iter()
            .any(|(open, close)| first == *open && last == *close),
        _ => false,
    }
}

/// Remove one pair of surrounding quotes, if present.
pub fn strip_quotes(value: &str) -> &str {
    if !is_quoted(value) {
        return value;
    }
    let mut chars = value.char_indices();
    let start = chars.next().map(|(_, c)| c.len_utf8()).unwrap_or(0);
    let end = chars.next_back().map(|(idx, _)| idx).unwrap_or(value.len());
    value[start..end].trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(target: &str) -> Vec<StrategyKind> {
        resolve(target).into_iter().map(|c| c.kind).collect()
    }

    #[test]
    fn css_targets_try_css_first() {
        for target in [
            "#login-btn",
            ".btn.primary",
            "button.submit",
            "div > button[type=\"submit\"]",
            "[data-testid=\"save\"]",
            "input[name=q]",
            "form input:not([disabled])",
            "ul li:nth-child(2) a",
            "a, button",
        ] {
            let candidates = resolve(target);
            assert_eq!(candidates[0].kind, StrategyKind::Css, "{target}");
            assert_eq!(candidates[0].expression, target);
            assert_eq!(candidates.len(), 6, "{target}");
        }
    }

    #[test]
    fn prose_targets_skip_css() {
        for target in ["Submit", "Email address", "Sign in", "p.s.", "#", "登录", "Go-to cart"] {
            assert!(!looks_like_css(target), "{target}");
            assert_eq!(
                kinds(target),
                vec![
                    StrategyKind::Text,
                    StrategyKind::TestId,
                    StrategyKind::Role,
                    StrategyKind::Placeholder,
                    StrategyKind::Label,
                ],
                "{target}"
            );
        }
    }

    #[test]
    fn fixed_order_is_deterministic() {
        assert_eq!(resolve("Email address"), resolve("Email address"));
        let expressions: Vec<String> = resolve("Submit").into_iter().map(|c| c.expression).collect();
        assert_eq!(
            expressions,
            vec![
                r#"text="Submit""#,
                r#"[data-testid="Submit"]"#,
                r#"role=*[name="Submit"]"#,
                r#"[placeholder="Submit"]"#,
                r#"label="Submit""#,
            ]
        );
    }

    #[test]
    fn quoted_text_is_unwrapped_for_textual_strategies() {
        let candidates = resolve("\"Log in\"");
        assert_eq!(candidates[0].kind, StrategyKind::Text);
        assert!(candidates.iter().all(|c| c.needle == "Log in"));
        assert_eq!(strip_quotes("「搜索」"), "搜索");
        assert_eq!(strip_quotes("plain"), "plain");
    }

    #[test]
    fn any_tag_with_a_qualifier_is_css() {
        for target in [
            "i.fa-search",
            "mat-select#country",
            "small.hint",
            "b",
            "hr",
            "my-widget[open]",
            "my-widget",
            "app-root > nav-bar .item",
            "x-card:hover",
            "example.com",
        ] {
            assert_eq!(resolve(target)[0].kind, StrategyKind::Css, "{target}");
        }
        assert!(!looks_like_css("widget"));
        assert!(!looks_like_css("trailing-"));
    }

    #[test]
    fn blank_target_yields_nothing() {
        assert!(resolve("   ").is_empty());
        assert!(resolve("\"\"").is_empty());
        assert!(resolve("「 」").is_empty());
    }

    #[test]
    fn unbalanced_brackets_are_not_css() {
        assert!(!looks_like_css("input[name=q"));
        assert!(!looks_like_css("div]"));
    }
}
