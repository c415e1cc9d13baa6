//! Registry of browser pages (targets) known to a live connection.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageEntry {
    pub target_id: String,
    pub cdp_session: Option<String>,
    pub browser_context_id: Option<String>,
    pub url: String,
    pub title: String,
}

impl PageEntry {
    pub fn from_target_info(info: &serde_json::Value) -> Option<Self> {
        if info.get("type").and_then(|v| v.as_str()) != Some("page") {
            return None;
        }
        let target_id = info.get("targetId").and_then(|v| v.as_str())?.to_string();
        let text = |key: &str| {
            info.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Some(Self {
            target_id,
            cdp_session: None,
            browser_context_id: info
                .get("browserContextId")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            url: text("url"),
            title: text("title"),
        })
    }
}

/// Concurrent registry for pages keyed by DevTools target id.
#[derive(Default)]
pub struct PageRegistry {
    pages: DashMap<String, PageEntry>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a page, keeping any session already attached to it.
    pub fn upsert(&self, entry: PageEntry) {
        match self.pages.get_mut(&entry.target_id) {
            Some(mut existing) => {
                existing.url = entry.url;
                existing.title = entry.title;
                if entry.cdp_session.is_some() {
                    existing.cdp_session = entry.cdp_session;
                }
                if entry.browser_context_id.is_some() {
                    existing.browser_context_id = entry.browser_context_id;
                }
            }
            None => {
                self.pages.insert(entry.target_id.clone(), entry);
            }
        }
    }

    pub fn contains(&self, target_id: &str) -> bool {
        self.pages.contains_key(target_id)
    }

    pub fn remove(&self, target_id: &str) -> Option<PageEntry> {
        self.pages.remove(target_id).map(|(_, entry)| entry)
    }

    pub fn get(&self, target_id: &str) -> Option<PageEntry> {
        self.pages.get(target_id).map(|entry| entry.value().clone())
    }

    pub fn list(&self) -> Vec<PageEntry> {
        let mut pages: Vec<PageEntry> = self
            .pages
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        pages.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        pages
    }

    pub fn set_session(&self, target_id: &str, session: String) {
        if let Some(mut entry) = self.pages.get_mut(target_id) {
            entry.cdp_session = Some(session);
        }
    }

    pub fn set_url(&self, target_id: &str, url: String) {
        if let Some(mut entry) = self.pages.get_mut(target_id) {
            entry.url = url;
        }
    }

    pub fn target_for_session(&self, session: &str) -> Option<String> {
        self.pages
            .iter()
            .find(|entry| entry.cdp_session.as_deref() == Some(session))
            .map(|entry| entry.key().clone())
    }

    pub fn clear(&self) {
        self.pages.clear();
    }
}
