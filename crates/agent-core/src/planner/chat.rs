//! Conversational short-circuit: greetings, acknowledgements and farewells are answered
//! directly instead of being treated as browser tasks.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Greeting,
    Acknowledgement,
    Farewell,
}

struct ChatPattern {
    kind: ChatKind,
    pattern: Regex,
}

static CHAT_PATTERNS: Lazy<Vec<ChatPattern>> = Lazy::new(|| {
    let row = |kind, pattern: &str| ChatPattern {
        kind,
        pattern: Regex::new(pattern).expect("chat regex"),
    };
    vec![
        row(
            ChatKind::Greeting,
            r"(?i)^(?:你好|您好|嗨|哈喽|早上好|下午好|晚上好|早安|hi|hello|hey|hiya|howdy|yo|good\s+(?:morning|afternoon|evening))(?:\s*(?:呀|啊|哇|there))?$",
        ),
        row(
            ChatKind::Acknowledgement,
            r"(?i)^(?:谢谢|谢谢你|多谢|感谢|好的|好|收到|明白|知道了|行|ok|okay|k|thanks|thank\s+you|thx|cool|great|got\s+it|nice)(?:\s*(?:了|啦|呀|啊|so\s+much|a\s+lot))?$",
        ),
        row(
            ChatKind::Farewell,
            r"(?i)^(?:再见|拜拜|回头见|晚安|bye|goodbye|bye\s+bye|see\s+you|see\s+ya|good\s+night|later)(?:\s*(?:了|啦|呀))?$",
        ),
    ]
});

const PUNCTUATION: &[char] = &[
    '!', '！', '.', '。', '?', '？', '~', '～', ',', '，', ' ', '…', ':', ')', '(',
];

fn normalize(instruction: &str) -> String {
    instruction
        .trim()
        .trim_matches(PUNCTUATION)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_cjk(text: &str) -> bool {
    text.chars()
        .any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
}

/// Classify a conversational instruction, if it is one.
pub fn classify(instruction: &str) -> Option<ChatKind> {
    let normalized = normalize(instruction);
    if normalized.is_empty() {
        return None;
    }
    CHAT_PATTERNS
        .iter()
        .find(|row| row.pattern.is_match(&normalized))
        .map(|row| row.kind)
}

/// Canned reply for conversational input, in the instruction's language.
pub fn chat_reply(instruction: &str) -> Option<String> {
    let kind = classify(instruction)?;
    let chinese = is_cjk(instruction);
    let reply = match (kind, chinese) {
        (ChatKind::Greeting, true) => "你好！我可以帮你操作浏览器，比如“打开 example.com”或“点击 登录”。",
        (ChatKind::Greeting, false) => {
            "Hello! I can drive the browser for you, for example \"open example.com\" or \"click Sign in\"."
        }
        (ChatKind::Acknowledgement, true) => "好的，还有什么需要我在浏览器里做的吗？",
        (ChatKind::Acknowledgement, false) => "You're welcome. Anything else to do in the browser?",
        (ChatKind::Farewell, true) => "再见！",
        (ChatKind::Farewell, false) => "Goodbye!",
    };
    Some(reply.to_string())
}
