use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPhase {
    #[default]
    Loading,
    Interactive,
    Complete,
}

impl LoadPhase {
    /// Map `document.readyState`; anything unknown is treated as still loading.
    pub fn from_ready_state(state: &str) -> Self {
        match state.trim() {
            "complete" => LoadPhase::Complete,
            "interactive" => LoadPhase::Interactive,
            _ => LoadPhase::Loading,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoadPhase::Loading => "loading",
            LoadPhase::Interactive => "interactive",
            LoadPhase::Complete => "complete",
        }
    }
}

/// Point-in-time page snapshot.
///
/// `content_hash` is a change-sensitive heuristic over a few structural counters. Two
/// different pages may share a hash; it must never be used as an identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub url: String,
    pub title: String,
    pub load_phase: LoadPhase,
    pub has_loading_indicator: bool,
    pub has_modal_overlay: bool,
    pub content_hash: String,
    pub visible_element_count: u64,
    pub text_length: u64,
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    /// Same page state, ignoring when it was captured.
    pub fn same_state(&self, other: &Observation) -> bool {
        self.url == other.url
            && self.title == other.title
            && self.load_phase == other.load_phase
            && self.has_loading_indicator == other.has_loading_indicator
            && self.has_modal_overlay == other.has_modal_overlay
            && self.content_hash == other.content_hash
            && self.visible_element_count == other.visible_element_count
            && self.text_length == other.text_length
    }
}

/// Raw counters feeding the content hash.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureSignal {
    pub node_count: u64,
    pub html_length: u64,
    pub text_length: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateChange {
    Url { from: String, to: String },
    Title { from: String, to: String },
    Content { from: String, to: String },
    LoadPhase { from: LoadPhase, to: LoadPhase },
    ModalOverlay { present: bool },
    VisibleElements { from: u64, to: u64, delta: i64 },
}

impl StateChange {
    pub fn label(&self) -> &'static str {
        match self {
            StateChange::Url { .. } => "url",
            StateChange::Title { .. } => "title",
            StateChange::Content { .. } => "content",
            StateChange::LoadPhase { .. } => "load_phase",
            StateChange::ModalOverlay { .. } => "modal_overlay",
            StateChange::VisibleElements { .. } => "visible_elements",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub changed: bool,
    pub changes: Vec<StateChange>,
}

impl ChangeSet {
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn has_url_change(&self) -> bool {
        self.changes
            .iter()
            .any(|change| matches!(change, StateChange::Url { .. }))
    }
}

/// Outcome of checking one action's claimed effect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub verified: bool,
    /// Signal strength in `[0, 1]`; zero means the check could not be made.
    pub confidence: f64,
    pub details: String,
}

impl Verification {
    pub fn new(verified: bool, confidence: f64, details: impl Into<String>) -> Self {
        Self {
            verified,
            confidence: confidence.clamp(0.0, 1.0),
            details: details.into(),
        }
    }

    pub fn inconclusive(details: impl Into<String>) -> Self {
        Self::new(false, 0.0, details)
    }

    pub fn is_conclusive(&self) -> bool {
        self.confidence > 0.0
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    pub change_poll_interval_ms: u64,
    pub loaded_poll_interval_ms: u64,
    pub visible_delta_threshold: u64,
    pub min_loaded_elements: u64,
    pub min_loaded_text: u64,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            change_poll_interval_ms: 200,
            loaded_poll_interval_ms: 500,
            visible_delta_threshold: 5,
            min_loaded_elements: 3,
            min_loaded_text: 20,
        }
    }
}
