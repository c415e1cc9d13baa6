//! Checks that an action had its claimed effect.
//!
//! Confidence values are tunable defaults chosen by hand, not measured. Callers should
//! treat them as a ranking signal.

use crate::model::Verification;

pub const EXACT_MATCH_CONFIDENCE: f64 = 0.95;
pub const NORMALIZED_MATCH_CONFIDENCE: f64 = 0.8;
pub const PARTIAL_MATCH_CONFIDENCE: f64 = 0.5;
pub const URL_CONTAINS_CONFIDENCE: f64 = 0.95;
pub const URL_HOST_CONFIDENCE: f64 = 0.7;
pub const URL_MISMATCH_CONFIDENCE: f64 = 0.85;
pub const CLICK_NAVIGATED_CONFIDENCE: f64 = 0.9;
pub const CLICK_STAYED_CONFIDENCE: f64 = 0.7;

fn collapse(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Field value must equal the text the field should now hold.
pub fn verify_typed_text(expected: &str, actual: Option<&str>) -> Verification {
    let Some(actual) = actual else {
        return Verification::inconclusive("field value unavailable");
    };
    if actual == expected {
        return Verification::new(true, EXACT_MATCH_CONFIDENCE, "field value matches typed text");
    }
    if collapse(actual) == collapse(expected) {
        return Verification::new(
            true,
            NORMALIZED_MATCH_CONFIDENCE,
            "field value matches typed text after whitespace normalization",
        );
    }
    if actual.contains(expected) {
        return Verification::new(
            false,
            PARTIAL_MATCH_CONFIDENCE,
            format!("field holds extra text: {actual:?}"),
        );
    }
    Verification::new(
        false,
        EXACT_MATCH_CONFIDENCE,
        format!("field value {actual:?} differs from {expected:?}"),
    )
}

/// Dropdown value, or the selected option's label, must equal `expected`.
pub fn verify_selected_value(
    expected: &str,
    actual_value: Option<&str>,
    actual_label: Option<&str>,
) -> Verification {
    if actual_value.is_none() && actual_label.is_none() {
        return Verification::inconclusive("selection unavailable");
    }
    if actual_value == Some(expected) {
        return Verification::new(true, EXACT_MATCH_CONFIDENCE, "selected value matches");
    }
    let wanted = expected.trim().to_lowercase();
    if actual_label.map(|label| label.trim().to_lowercase()) == Some(wanted) {
        return Verification::new(
            true,
            NORMALIZED_MATCH_CONFIDENCE,
            "selected option label matches",
        );
    }
    Verification::new(
        false,
        EXACT_MATCH_CONFIDENCE,
        format!(
            "selected {:?} ({:?}), expected {expected:?}",
            actual_value.unwrap_or_default(),
            actual_label.unwrap_or_default()
        ),
    )
}

fn strip_scheme(url: &str) -> &str {
    url.split_once("://").map(|(_, rest)| rest).unwrap_or(url)
}

fn host_of(url: &str) -> &str {
    let rest = strip_scheme(url);
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let host = &rest[..end];
    host.strip_prefix("www.").unwrap_or(host)
}

/// Current URL should contain the navigation target.
pub fn verify_navigation(expected: &str, current_url: Option<&str>) -> Verification {
    let Some(current) = current_url else {
        return Verification::inconclusive("current URL unavailable");
    };
    let target = strip_scheme(expected.trim()).trim_end_matches('/').to_lowercase();
    let current_lower = current.to_lowercase();
    if !target.is_empty() && current_lower.contains(&target) {
        return Verification::new(
            true,
            URL_CONTAINS_CONFIDENCE,
            format!("current URL {current} contains {target}"),
        );
    }
    let expected_host = host_of(&target).to_string();
    if !expected_host.is_empty() && host_of(&current_lower) == expected_host {
        return Verification::new(
            true,
            URL_HOST_CONFIDENCE,
            format!("landed on {expected_host} at a different path"),
        );
    }
    Verification::new(
        false,
        URL_MISMATCH_CONFIDENCE,
        format!("current URL {current} does not match {expected}"),
    )
}

/// Compare URLs around a click that was expected to navigate.
pub fn verify_click_navigation(before_url: &str, after_url: Option<&str>) -> Verification {
    let Some(after) = after_url else {
        return Verification::inconclusive("post-click URL unavailable");
    };
    if after != before_url {
        Verification::new(
            true,
            CLICK_NAVIGATED_CONFIDENCE,
            format!("navigated from {before_url} to {after}"),
        )
    } else {
        Verification::new(false, CLICK_STAYED_CONFIDENCE, "URL unchanged after click")
    }
}
