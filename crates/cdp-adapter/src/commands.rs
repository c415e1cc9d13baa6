//! Command parameter types exposed by the connection manager.

use serde::{Deserialize, Serialize};

/// Load condition a navigation waits for before it is considered settled.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadCondition {
    /// `document.readyState` reached `interactive`.
    DomContentLoaded,
    /// `document.readyState` reached `complete`.
    Load,
    /// Load complete and no new resource entries for [`NETWORK_IDLE_WINDOW_MS`].
    #[default]
    NetworkIdle,
}

pub const NETWORK_IDLE_WINDOW_MS: u64 = 500;

impl LoadCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadCondition::DomContentLoaded => "dom_content_loaded",
            LoadCondition::Load => "load",
            LoadCondition::NetworkIdle => "network_idle",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "domcontentloaded" | "dom_content_loaded" | "dom_ready" | "domready" => {
                Some(LoadCondition::DomContentLoaded)
            }
            "load" | "complete" => Some(LoadCondition::Load),
            "networkidle" | "network_idle" | "idle" | "networkidle0" | "networkidle2" => {
                Some(LoadCondition::NetworkIdle)
            }
            _ => None,
        }
    }

    /// Whether the given `document.readyState` satisfies the readiness part of this condition.
    pub fn ready_state_satisfied(&self, ready_state: &str) -> bool {
        match self {
            LoadCondition::DomContentLoaded => matches!(ready_state, "interactive" | "complete"),
            LoadCondition::Load | LoadCondition::NetworkIdle => ready_state == "complete",
        }
    }
}

/// Key description used for `Input.dispatchKeyEvent`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyDefinition {
    pub key: String,
    pub code: String,
    pub key_code: u32,
    pub text: Option<String>,
}

/// Map a loose key name (`"Enter"`, `"esc"`, `"a"`) to its DevTools definition.
pub fn key_definition(raw: &str) -> Option<KeyDefinition> {
    let named = |key: &str, code: &str, key_code: u32, text: Option<&str>| KeyDefinition {
        key: key.to_string(),
        code: code.to_string(),
        key_code,
        text: text.map(str::to_string),
    };

    let trimmed = raw.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let def = match lowered.as_str() {
        "enter" | "return" => named("Enter", "Enter", 13, Some("\r")),
        "tab" => named("Tab", "Tab", 9, None),
        "escape" | "esc" => named("Escape", "Escape", 27, None),
        "backspace" => named("Backspace", "Backspace", 8, None),
        "delete" | "del" => named("Delete", "Delete", 46, None),
        "space" | " " => named(" ", "Space", 32, Some(" ")),
        "arrowup" | "up" => named("ArrowUp", "ArrowUp", 38, None),
        "arrowdown" | "down" => named("ArrowDown", "ArrowDown", 40, None),
        "arrowleft" | "left" => named("ArrowLeft", "ArrowLeft", 37, None),
        "arrowright" | "right" => named("ArrowRight", "ArrowRight", 39, None),
        "home" => named("Home", "Home", 36, None),
        "end" => named("End", "End", 35, None),
        "pageup" => named("PageUp", "PageUp", 33, None),
        "pagedown" => named("PageDown", "PageDown", 34, None),
        _ => {
            let mut chars = trimmed.chars();
            let ch = chars.next()?;
            if chars.next().is_some() {
                return None;
            }
            let upper = ch.to_ascii_uppercase();
            let code = if ch.is_ascii_alphabetic() {
                format!("Key{upper}")
            } else if ch.is_ascii_digit() {
                format!("Digit{ch}")
            } else {
                String::new()
            };
            let key_code = if ch.is_ascii_alphanumeric() {
                upper as u32
            } else {
                0
            };
            KeyDefinition {
                key: ch.to_string(),
                code,
                key_code,
                text: Some(ch.to_string()),
            }
        }
    };
    Some(def)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_load_condition_aliases() {
        assert_eq!(
            LoadCondition::parse("networkidle0"),
            Some(LoadCondition::NetworkIdle)
        );
        assert_eq!(
            LoadCondition::parse("domcontentloaded"),
            Some(LoadCondition::DomContentLoaded)
        );
        assert_eq!(LoadCondition::parse("whenever"), None);
        assert_eq!(LoadCondition::default(), LoadCondition::NetworkIdle);
    }

    #[test]
    fn ready_state_rules() {
        assert!(LoadCondition::DomContentLoaded.ready_state_satisfied("interactive"));
        assert!(!LoadCondition::Load.ready_state_satisfied("interactive"));
        assert!(LoadCondition::NetworkIdle.ready_state_satisfied("complete"));
    }

    #[test]
    fn maps_named_and_single_keys() {
        let enter = key_definition("enter").expect("enter");
        assert_eq!(enter.key, "Enter");
        assert_eq!(enter.key_code, 13);

        let letter = key_definition("a").expect("letter");
        assert_eq!(letter.code, "KeyA");
        assert_eq!(letter.text.as_deref(), Some("a"));

        assert!(key_definition("NotAKey").is_none());
    }
}
