//! Window aggregation and discretization.
//!
//! Determinism is a correctness property here, not a nicety: the update
//! pipeline's transition detection is only meaningful if identical event
//! windows always produce identical state tuples. Everything below is a
//! pure function of the window contents.

use chrono::Duration;
use learn_core::types::{EngagementLevel, LearnerEvent, LearnerState, LearningPhase};
use learn_policy::Discretizer;

/// Mean event gap (seconds) below which the cadence reads as high
/// engagement.
const HIGH_ENGAGEMENT_GAP_SECS: i64 = 600;
/// Mean event gap (seconds) below which the cadence reads as moderate.
const MODERATE_ENGAGEMENT_GAP_SECS: i64 = 2700;

/// Pre-discretization feature vector for one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateFeatures {
    pub segment: u16,
    pub module_index: u16,
    pub progress: f64,
    pub rolling_score: f64,
    pub phase: LearningPhase,
    pub engagement: EngagementLevel,
}

pub struct StateBuilder {
    discretizer: Discretizer,
}

impl StateBuilder {
    pub fn new(discretizer: Discretizer) -> Self {
        Self { discretizer }
    }

    /// Rolling score average over the window's graded events; 0 when the
    /// window carries no grades yet.
    pub fn rolling_score(window: &[LearnerEvent]) -> f64 {
        let scores: Vec<f64> = window.iter().filter_map(|event| event.score).collect();
        if scores.is_empty() {
            return 0.0;
        }
        scores.iter().sum::<f64>() / scores.len() as f64
    }

    fn engagement(window: &[LearnerEvent]) -> EngagementLevel {
        if window.len() < 2 {
            return EngagementLevel::Moderate;
        }
        let total_gap: Duration = window
            .windows(2)
            .map(|pair| pair[1].timestamp - pair[0].timestamp)
            .fold(Duration::zero(), |acc, gap| acc + gap);
        let mean_gap_secs = total_gap.num_seconds() / (window.len() as i64 - 1);

        if mean_gap_secs <= HIGH_ENGAGEMENT_GAP_SECS {
            EngagementLevel::High
        } else if mean_gap_secs <= MODERATE_ENGAGEMENT_GAP_SECS {
            EngagementLevel::Moderate
        } else {
            EngagementLevel::Low
        }
    }

    /// Aggregate a window (oldest first) into the feature vector. Empty
    /// windows have no state.
    pub fn features(&self, window: &[LearnerEvent]) -> Option<StateFeatures> {
        let latest = window.last()?;
        let progress = latest.progress.clamp(0.0, 1.0);
        Some(StateFeatures {
            segment: latest.segment,
            module_index: latest.module_index,
            progress,
            rolling_score: Self::rolling_score(window),
            phase: LearningPhase::from_progress(progress),
            engagement: Self::engagement(window),
        })
    }

    /// Build the discretized state tuple for a window.
    pub fn build(&self, window: &[LearnerEvent]) -> Option<LearnerState> {
        let features = self.features(window)?;
        Some(LearnerState {
            segment: features.segment,
            module_index: features.module_index,
            progress_bin: self.discretizer.bin_index(features.progress),
            score_bin: self.discretizer.bin_index(features.rolling_score),
            phase: features.phase,
            engagement: features.engagement,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use learn_core::action::Action;
    use learn_core::config::DiscretizerConfig;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn event(minute: u32, progress: f64, score: Option<f64>) -> LearnerEvent {
        LearnerEvent {
            event_id: Uuid::nil(),
            learner_id: "l-1".to_string(),
            context_id: "course-101".to_string(),
            action: Action::default_action(),
            module_index: 3,
            progress,
            score,
            success: score.map(|s| s >= 0.5),
            segment: 1,
            skill_scores: HashMap::new(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 9, minute, 0).unwrap(),
        }
    }

    fn builder() -> StateBuilder {
        StateBuilder::new(Discretizer::from_config(&DiscretizerConfig::default()).unwrap())
    }

    #[test]
    fn empty_window_has_no_state() {
        assert!(builder().build(&[]).is_none());
    }

    #[test]
    fn identical_windows_build_identical_states() {
        let builder = builder();
        let window = vec![
            event(0, 0.2, Some(0.6)),
            event(5, 0.3, None),
            event(12, 0.4, Some(0.8)),
        ];
        let first = builder.build(&window).unwrap();
        let second = builder.build(&window.clone()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn state_reflects_latest_event_and_rolling_score() {
        let builder = builder();
        let window = vec![event(0, 0.2, Some(0.4)), event(8, 0.6, Some(0.8))];
        let state = builder.build(&window).unwrap();
        assert_eq!(state.segment, 1);
        assert_eq!(state.module_index, 3);
        // progress 0.6 -> quartile edge 0.5 -> index 2.
        assert_eq!(state.progress_bin, 2);
        // rolling score (0.4 + 0.8) / 2 = 0.6 -> index 2.
        assert_eq!(state.score_bin, 2);
        assert_eq!(state.phase, LearningPhase::Middle);
    }

    #[test]
    fn engagement_buckets_follow_event_cadence() {
        let builder = builder();

        let tight = vec![event(0, 0.1, None), event(4, 0.1, None), event(9, 0.1, None)];
        assert_eq!(
            builder.features(&tight).unwrap().engagement,
            EngagementLevel::High
        );

        let spread = vec![event(0, 0.1, None), event(40, 0.1, None)];
        assert_eq!(
            builder.features(&spread).unwrap().engagement,
            EngagementLevel::Moderate
        );

        let single = vec![event(0, 0.1, None)];
        assert_eq!(
            builder.features(&single).unwrap().engagement,
            EngagementLevel::Moderate
        );
    }

    #[test]
    fn ungraded_windows_score_zero() {
        let builder = builder();
        let window = vec![event(0, 0.9, None)];
        let state = builder.build(&window).unwrap();
        assert_eq!(state.score_bin, 0);
        assert_eq!(state.phase, LearningPhase::Late);
    }
}
