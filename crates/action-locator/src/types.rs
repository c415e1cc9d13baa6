//! Core types for the selector resolver

use serde::{Deserialize, Serialize};
use std::fmt;

/// Locator strategy enumeration
///
/// Strategies are always tried in the order of [`StrategyKind::fallback_chain`]; the
/// `Css` strategy is only produced for targets that look like CSS selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Literal CSS selector
    Css,

    /// Visible text content (exact match preferred over substring)
    Text,

    /// `data-testid` style attributes
    #[serde(rename = "testid")]
    TestId,

    /// Accessible role with a matching accessible name
    Role,

    /// Input placeholder text
    Placeholder,

    /// Associated `<label>` or `aria-label`
    Label,
}

impl StrategyKind {
    /// Get strategy name as string
    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::Css => "css",
            StrategyKind::Text => "text",
            StrategyKind::TestId => "testid",
            StrategyKind::Role => "role",
            StrategyKind::Placeholder => "placeholder",
            StrategyKind::Label => "label",
        }
    }

    /// All strategies in fallback order
    pub fn fallback_chain() -> [StrategyKind; 6] {
        [
            StrategyKind::Css,
            StrategyKind::Text,
            StrategyKind::TestId,
            StrategyKind::Role,
            StrategyKind::Placeholder,
            StrategyKind::Label,
        ]
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One concrete way of locating an element, derived from a target description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateStrategy {
    /// Human-readable locator expression, e.g. `text="Submit"` or `#login`
    pub expression: String,

    /// Strategy used to interpret `needle`
    pub kind: StrategyKind,

    /// Normalized value the strategy matches against
    pub needle: String,
}

impl CandidateStrategy {
    /// Create a new candidate
    pub fn new(kind: StrategyKind, needle: impl Into<String>) -> Self {
        let needle = needle.into();
        let expression = match kind {
            StrategyKind::Css => needle.clone(),
            StrategyKind::Text => format!("text={}", quote(&needle)),
            StrategyKind::TestId => format!("[data-testid={}]", quote(&needle)),
            StrategyKind::Role => format!("role=*[name={}]", quote(&needle)),
            StrategyKind::Placeholder => format!("[placeholder={}]", quote(&needle)),
            StrategyKind::Label => format!("label={}", quote(&needle)),
        };
        Self {
            expression,
            kind,
            needle,
        }
    }
}

impl fmt::Display for CandidateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.expression, self.kind)
    }
}

fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expressions_quote_the_needle() {
        let candidate = CandidateStrategy::new(StrategyKind::TestId, "login \"btn\"");
        assert_eq!(candidate.expression, r#"[data-testid="login \"btn\""]"#);
        assert_eq!(candidate.to_string(), r#"[data-testid="login \"btn\""] (testid)"#);
    }

    #[test]
    fn kinds_serialize_lowercase() {
        let json = serde_json::to_string(&StrategyKind::TestId).expect("serialize");
        assert_eq!(json, "\"testid\"");
        let kind: StrategyKind = serde_json::from_str("\"placeholder\"").expect("parse");
        assert_eq!(kind, StrategyKind::Placeholder);
    }
}
