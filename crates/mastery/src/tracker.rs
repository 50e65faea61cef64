//! Mastery tracker — exponential proficiency updates with a bounded delta
//! history per learner.
//!
//! Profiles are created on first contact and never deleted; the current
//! value is mutable, the history append-only (bounded to the configured
//! limit). Unknown skills read as the configured default proficiency
//! rather than erroring, and unknown learners are initialized implicitly.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use learn_core::config::{AssessmentConfig, MasteryConfig};
use learn_core::types::ClusterTier;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// One recorded mastery movement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasteryDelta {
    pub skill: String,
    pub old: f64,
    pub new: f64,
    pub delta: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MasteryProfile {
    pub skills: HashMap<String, f64>,
    pub history: VecDeque<MasteryDelta>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Read-only view served at the API boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterySnapshot {
    pub learner_id: String,
    pub skills: HashMap<String, f64>,
    pub predicted_outcome: f64,
    pub weak_skills: Vec<WeakSkill>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeakSkill {
    pub skill: String,
    pub mastery: f64,
    pub exam_weight: f64,
}

pub struct MasteryTracker {
    profiles: DashMap<String, MasteryProfile>,
    config: MasteryConfig,
    assessment: AssessmentConfig,
}

impl MasteryTracker {
    pub fn new(config: MasteryConfig, assessment: AssessmentConfig) -> Self {
        Self {
            profiles: DashMap::new(),
            config,
            assessment,
        }
    }

    /// Create an empty profile for a learner if none exists.
    pub fn initialize(&self, learner_id: &str) {
        self.profiles
            .entry(learner_id.to_string())
            .or_insert_with(MasteryProfile::default);
    }

    /// Current proficiency for a skill; unseen skills read as the default.
    pub fn mastery(&self, learner_id: &str, skill: &str) -> f64 {
        self.profiles
            .get(learner_id)
            .and_then(|profile| profile.skills.get(skill).copied())
            .unwrap_or(self.config.default_mastery)
    }

    fn alpha_for(&self, tier: ClusterTier) -> f64 {
        match tier {
            ClusterTier::Struggling => self.config.alpha_struggling,
            ClusterTier::Developing => self.config.alpha_developing,
            ClusterTier::Advanced => self.config.alpha_advanced,
        }
    }

    /// Apply one observed score: `new = old + alpha(tier) * (observed - old)`.
    /// Returns the signed delta for reward shaping.
    pub fn update(
        &self,
        learner_id: &str,
        skill: &str,
        observed_score: f64,
        tier: ClusterTier,
    ) -> f64 {
        let alpha = self.alpha_for(tier);
        let observed = observed_score.clamp(0.0, 1.0);
        let now = Utc::now();
        let default_mastery = self.config.default_mastery;
        let history_limit = self.config.history_limit;

        let mut profile = self
            .profiles
            .entry(learner_id.to_string())
            .or_insert_with(MasteryProfile::default);

        let old = profile
            .skills
            .get(skill)
            .copied()
            .unwrap_or(default_mastery);
        let new = (old + alpha * (observed - old)).clamp(0.0, 1.0);
        let delta = new - old;

        profile.skills.insert(skill.to_string(), new);
        profile.history.push_back(MasteryDelta {
            skill: skill.to_string(),
            old,
            new,
            delta,
            timestamp: now,
        });
        while profile.history.len() > history_limit {
            profile.history.pop_front();
        }
        profile.updated_at = Some(now);

        debug!(learner_id, skill, old, new, "Mastery updated");
        delta
    }

    /// Skills below the threshold, ordered by ascending mastery then
    /// descending exam weight, so remediation targets the weakest
    /// highest-stakes skills first.
    pub fn weak_skills(&self, learner_id: &str, threshold: f64) -> Vec<WeakSkill> {
        let profile = match self.profiles.get(learner_id) {
            Some(profile) => profile,
            None => return Vec::new(),
        };

        let mut weak: Vec<WeakSkill> = profile
            .skills
            .iter()
            .filter(|(_, mastery)| **mastery < threshold)
            .map(|(skill, mastery)| WeakSkill {
                skill: skill.clone(),
                mastery: *mastery,
                exam_weight: self
                    .assessment
                    .skill_weights
                    .get(skill)
                    .copied()
                    .unwrap_or(0.0),
            })
            .collect();

        weak.sort_by(|a, b| {
            a.mastery
                .partial_cmp(&b.mastery)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.exam_weight
                        .partial_cmp(&a.exam_weight)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });
        weak
    }

    /// Predicted marks on the held-out assessment:
    /// `sum(mastery[s] * weight[s]) * total_marks`. Evaluation and
    /// explanation only; never fed back into the value table.
    pub fn predict_outcome(&self, learner_id: &str) -> f64 {
        let weighted: f64 = self
            .assessment
            .skill_weights
            .iter()
            .map(|(skill, weight)| self.mastery(learner_id, skill) * weight)
            .sum();
        weighted * self.assessment.total_marks
    }

    pub fn snapshot(&self, learner_id: &str) -> Option<MasterySnapshot> {
        let profile = self.profiles.get(learner_id)?;
        Some(MasterySnapshot {
            learner_id: learner_id.to_string(),
            skills: profile.skills.clone(),
            predicted_outcome: self.predict_outcome(learner_id),
            weak_skills: self.weak_skills(learner_id, self.config.weak_threshold),
            updated_at: profile.updated_at,
        })
    }

    pub fn weak_threshold(&self) -> f64 {
        self.config.weak_threshold
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> MasteryTracker {
        MasteryTracker::new(MasteryConfig::default(), AssessmentConfig::default())
    }

    fn tracker_with_weights(weights: &[(&str, f64)], total_marks: f64) -> MasteryTracker {
        let assessment = AssessmentConfig {
            skill_weights: weights
                .iter()
                .map(|(skill, weight)| (skill.to_string(), *weight))
                .collect(),
            total_marks,
        };
        MasteryTracker::new(MasteryConfig::default(), assessment)
    }

    #[test]
    fn unseen_skills_read_as_default() {
        let tracker = tracker();
        assert_eq!(tracker.mastery("l-1", "LO1"), 0.4);
        tracker.initialize("l-1");
        assert_eq!(tracker.mastery("l-1", "LO1"), 0.4);
    }

    #[test]
    fn update_with_observed_equal_to_old_yields_zero_delta() {
        let tracker = tracker();
        let delta = tracker.update("l-1", "LO1", 0.4, ClusterTier::Developing);
        assert_eq!(delta, 0.0);
        assert_eq!(tracker.mastery("l-1", "LO1"), 0.4);
    }

    #[test]
    fn struggling_tier_adapts_faster() {
        let tracker = tracker();
        let fast = tracker.update("slow-start", "LO1", 1.0, ClusterTier::Struggling);
        let steady = tracker.update("steady", "LO1", 1.0, ClusterTier::Advanced);
        assert!(fast > steady);
        // alpha 0.35 from 0.4 toward 1.0.
        assert!((fast - 0.21).abs() < 1e-9);
    }

    #[test]
    fn predicts_outcome_from_weighted_mastery() {
        let tracker = tracker_with_weights(&[("LO1", 1.0)], 20.0);
        tracker.initialize("l-1");
        // Default mastery 0.4 x weight 1.0 x 20 marks.
        assert!((tracker.predict_outcome("l-1") - 8.0).abs() < 1e-9);
    }

    #[test]
    fn weak_skills_order_by_mastery_then_exam_weight() {
        let tracker = tracker_with_weights(&[("LO1", 0.2), ("LO2", 0.5), ("LO3", 0.3)], 100.0);
        // Drive LO1 and LO2 to the same low mastery, LO3 higher.
        for _ in 0..20 {
            tracker.update("l-1", "LO1", 0.1, ClusterTier::Developing);
            tracker.update("l-1", "LO2", 0.1, ClusterTier::Developing);
            tracker.update("l-1", "LO3", 0.45, ClusterTier::Developing);
        }
        let weak = tracker.weak_skills("l-1", 0.5);
        assert_eq!(weak.len(), 3);
        // LO1 and LO2 converge to ~0.1; the heavier-weighted LO2 wins the tie.
        assert_eq!(weak[0].skill, "LO2");
        assert_eq!(weak[1].skill, "LO1");
        assert_eq!(weak[2].skill, "LO3");
    }

    #[test]
    fn history_is_bounded() {
        let config = MasteryConfig {
            history_limit: 5,
            ..MasteryConfig::default()
        };
        let tracker = MasteryTracker::new(config, AssessmentConfig::default());
        for i in 0..12 {
            tracker.update("l-1", "LO1", (i as f64 / 12.0).min(1.0), ClusterTier::Developing);
        }
        let profile = tracker.profiles.get("l-1").unwrap();
        assert_eq!(profile.history.len(), 5);
    }
}
