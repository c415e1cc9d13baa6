use crate::model::{ChangeSet, Observation, StateChange};

pub const DEFAULT_VISIBLE_DELTA_THRESHOLD: u64 = 5;

pub fn detect_change(previous: &Observation, current: &Observation) -> ChangeSet {
    detect_change_with_threshold(previous, current, DEFAULT_VISIBLE_DELTA_THRESHOLD)
}

/// Field-by-field comparison. Visible element counts only register once the delta
/// exceeds `visible_threshold`.
pub fn detect_change_with_threshold(
    previous: &Observation,
    current: &Observation,
    visible_threshold: u64,
) -> ChangeSet {
    let mut changes = Vec::new();

    if previous.url != current.url {
        changes.push(StateChange::Url {
            from: previous.url.clone(),
            to: current.url.clone(),
        });
    }
    if previous.title != current.title {
        changes.push(StateChange::Title {
            from: previous.title.clone(),
            to: current.title.clone(),
        });
    }
    if previous.content_hash != current.content_hash {
        changes.push(StateChange::Content {
            from: previous.content_hash.clone(),
            to: current.content_hash.clone(),
        });
    }
    if previous.load_phase != current.load_phase {
        changes.push(StateChange::LoadPhase {
            from: previous.load_phase,
            to: current.load_phase,
        });
    }
    if previous.has_modal_overlay != current.has_modal_overlay {
        changes.push(StateChange::ModalOverlay {
            present: current.has_modal_overlay,
        });
    }
    let delta = current.visible_element_count as i64 - previous.visible_element_count as i64;
    if delta.unsigned_abs() > visible_threshold {
        changes.push(StateChange::VisibleElements {
            from: previous.visible_element_count,
            to: current.visible_element_count,
            delta,
        });
    }

    ChangeSet {
        changed: !changes.is_empty(),
        changes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LoadPhase;
    use chrono::Utc;

    fn observation() -> Observation {
        Observation {
            url: "https://example.com/".into(),
            title: "Example".into(),
            load_phase: LoadPhase::Complete,
            has_loading_indicator: false,
            has_modal_overlay: false,
            content_hash: "00000000deadbeef".into(),
            visible_element_count: 40,
            text_length: 300,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn identical_observations_are_unchanged() {
        let a = observation();
        let mut b = a.clone();
        b.timestamp = a.timestamp + chrono::Duration::seconds(3);
        let diff = detect_change(&a, &b);
        assert!(!diff.changed);
        assert!(diff.changes.is_empty());
    }

    #[test]
    fn url_only_difference_reports_url() {
        let a = observation();
        let mut b = a.clone();
        b.url = "https://example.com/next".into();
        let diff = detect_change(&a, &b);
        assert!(diff.changed);
        assert_eq!(diff.changes.len(), 1);
        assert!(diff.has_url_change());
        assert_eq!(diff.changes[0].label(), "url");
    }

    #[test]
    fn small_visible_deltas_are_noise() {
        let a = observation();
        let mut b = a.clone();
        b.visible_element_count = 45;
        assert!(!detect_change(&a, &b).changed);

        b.visible_element_count = 34;
        let diff = detect_change(&a, &b);
        assert_eq!(
            diff.changes,
            vec![StateChange::VisibleElements {
                from: 40,
                to: 34,
                delta: -6
            }]
        );
    }

    #[test]
    fn modal_and_phase_changes_are_typed() {
        let a = observation();
        let mut b = a.clone();
        b.has_modal_overlay = true;
        b.load_phase = LoadPhase::Interactive;
        let labels: Vec<&str> = detect_change(&a, &b)
            .changes
            .iter()
            .map(StateChange::label)
            .collect();
        assert_eq!(labels, vec!["load_phase", "modal_overlay"]);
    }
}
