//! Transition detection helpers — grouping, ordering, and the time-gap
//! filter over adjacent event pairs.

use chrono::Duration;
use learn_core::types::LearnerEvent;
use std::collections::HashMap;

/// Verdict on the gap between two adjacent events for the same learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairDecision {
    Retain,
    /// Closer than the minimum gap: almost certainly duplicate logging.
    TooClose,
    /// Beyond the maximum gap: crosses a session boundary, not causally
    /// linked.
    TooFar,
}

pub fn classify_gap(gap: Duration, min_gap: Duration, max_gap: Duration) -> PairDecision {
    if gap < min_gap {
        PairDecision::TooClose
    } else if gap > max_gap {
        PairDecision::TooFar
    } else {
        PairDecision::Retain
    }
}

/// Group a batch by (learner, context) and order each group by timestamp.
/// Groups come back sorted by key so batch processing order is
/// deterministic.
pub fn group_by_learner(
    events: Vec<LearnerEvent>,
) -> Vec<((String, String), Vec<LearnerEvent>)> {
    let mut groups: HashMap<(String, String), Vec<LearnerEvent>> = HashMap::new();
    for event in events {
        groups
            .entry((event.learner_id.clone(), event.context_id.clone()))
            .or_default()
            .push(event);
    }

    let mut grouped: Vec<_> = groups.into_iter().collect();
    for (_, group) in grouped.iter_mut() {
        group.sort_by_key(|event| event.timestamp);
    }
    grouped.sort_by(|a, b| a.0.cmp(&b.0));
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use learn_core::action::Action;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn event(learner: &str, second: u32) -> LearnerEvent {
        LearnerEvent {
            event_id: Uuid::new_v4(),
            learner_id: learner.to_string(),
            context_id: "course-101".to_string(),
            action: Action::default_action(),
            module_index: 0,
            progress: 0.1,
            score: None,
            success: None,
            segment: 0,
            skill_scores: HashMap::new(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
                + Duration::seconds(second as i64),
        }
    }

    #[test]
    fn thirty_minutes_within_hour_window_is_retained() {
        let decision = classify_gap(
            Duration::minutes(30),
            Duration::seconds(60),
            Duration::seconds(3600),
        );
        assert_eq!(decision, PairDecision::Retain);
    }

    #[test]
    fn two_seconds_is_duplicate_noise() {
        let decision = classify_gap(
            Duration::seconds(2),
            Duration::seconds(60),
            Duration::seconds(3600),
        );
        assert_eq!(decision, PairDecision::TooClose);
    }

    #[test]
    fn beyond_the_window_is_a_session_boundary() {
        let decision = classify_gap(
            Duration::hours(2),
            Duration::seconds(60),
            Duration::seconds(3600),
        );
        assert_eq!(decision, PairDecision::TooFar);
    }

    #[test]
    fn grouping_sorts_within_and_across_groups() {
        let batch = vec![event("l-2", 50), event("l-1", 30), event("l-1", 10)];
        let grouped = group_by_learner(batch);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0 .0, "l-1");
        assert_eq!(grouped[0].1.len(), 2);
        assert!(grouped[0].1[0].timestamp < grouped[0].1[1].timestamp);
        assert_eq!(grouped[1].0 .0, "l-2");
    }
}
