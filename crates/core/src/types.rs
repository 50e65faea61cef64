use crate::action::Action;
use crate::config::TierConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Maximum string field length accepted at the ingestion boundary.
pub const MAX_FIELD_LEN: usize = 256;

/// Learner ability tier derived from the externally trained cluster
/// assignment. Tiers modulate learning rates and reward shaping: weaker
/// tiers adapt faster and earn larger mastery bonuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterTier {
    Struggling,
    Developing,
    Advanced,
}

impl ClusterTier {
    pub fn from_segment(segment: u16, config: &TierConfig) -> Self {
        if config.struggling_segments.contains(&segment) {
            ClusterTier::Struggling
        } else if config.advanced_segments.contains(&segment) {
            ClusterTier::Advanced
        } else {
            ClusterTier::Developing
        }
    }

    /// Difficulty sweet spot for the tier, matched against
    /// `ActionKind::difficulty` by the reward model.
    pub fn target_difficulty(&self) -> f64 {
        match self {
            ClusterTier::Struggling => 0.3,
            ClusterTier::Developing => 0.5,
            ClusterTier::Advanced => 0.75,
        }
    }
}

/// Coarse position within the course, derived from fractional progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningPhase {
    Early,
    Middle,
    Late,
}

impl LearningPhase {
    pub fn from_progress(progress: f64) -> Self {
        if progress < 1.0 / 3.0 {
            LearningPhase::Early
        } else if progress < 2.0 / 3.0 {
            LearningPhase::Middle
        } else {
            LearningPhase::Late
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LearningPhase::Early => "early",
            LearningPhase::Middle => "middle",
            LearningPhase::Late => "late",
        }
    }
}

/// Session cadence bucket, derived from the spacing of recent events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementLevel {
    Low,
    Moderate,
    High,
}

impl EngagementLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngagementLevel::Low => "low",
            EngagementLevel::Moderate => "moderate",
            EngagementLevel::High => "high",
        }
    }
}

/// Discretized learner state: every component is drawn from a fixed finite
/// alphabet so the value table stays coverable. Equality and hashing make
/// this the state half of every value-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LearnerState {
    pub segment: u16,
    pub module_index: u16,
    pub progress_bin: u16,
    pub score_bin: u16,
    pub phase: LearningPhase,
    pub engagement: EngagementLevel,
}

impl std::fmt::Display for LearnerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}",
            self.segment,
            self.module_index,
            self.progress_bin,
            self.score_bin,
            self.phase.as_str(),
            self.engagement.as_str()
        )
    }
}

/// Raw event record as received at the ingestion boundary. Source events
/// are loosely typed, so required fields are optional here and checked by
/// [`EventRecord::validate`] before anything downstream sees them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub learner_id: Option<String>,
    pub context_id: Option<String>,
    pub action_label: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub module_index: Option<u16>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub segment: Option<u16>,
    /// Per-skill observed scores in [0, 1] attached to graded outcomes.
    #[serde(default)]
    pub skill_scores: HashMap<String, f64>,
}

impl EventRecord {
    /// Validate the record into a typed event. Malformed records are
    /// skipped by the pipeline, never fatal to a batch.
    pub fn validate(&self) -> Result<LearnerEvent, &'static str> {
        let learner_id = self
            .learner_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or("event 'learner_id' is required")?;
        if learner_id.len() > MAX_FIELD_LEN {
            return Err("event 'learner_id' exceeds maximum length");
        }
        let context_id = self
            .context_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or("event 'context_id' is required")?;
        if context_id.len() > MAX_FIELD_LEN {
            return Err("event 'context_id' exceeds maximum length");
        }
        let action_label = self
            .action_label
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or("event 'action_label' is required")?;
        let action = Action::parse(action_label).ok_or("event 'action_label' is not a known action")?;
        let timestamp = self.timestamp.ok_or("event 'timestamp' is required")?;

        if let Some(score) = self.score {
            if !score.is_finite() {
                return Err("event 'score' must be finite");
            }
        }
        if let Some(progress) = self.progress {
            if !progress.is_finite() {
                return Err("event 'progress' must be finite");
            }
        }

        Ok(LearnerEvent {
            event_id: Uuid::new_v4(),
            learner_id: learner_id.to_string(),
            context_id: context_id.to_string(),
            action,
            module_index: self.module_index.unwrap_or(0),
            progress: self.progress.unwrap_or(0.0).clamp(0.0, 1.0),
            score: self.score.map(|s| s.clamp(0.0, 1.0)),
            success: self.success,
            segment: self.segment.unwrap_or(0),
            skill_scores: self
                .skill_scores
                .iter()
                .map(|(skill, score)| (skill.clone(), score.clamp(0.0, 1.0)))
                .collect(),
            timestamp,
        })
    }
}

/// A validated learner interaction event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerEvent {
    pub event_id: Uuid,
    pub learner_id: String,
    pub context_id: String,
    pub action: Action,
    pub module_index: u16,
    pub progress: f64,
    pub score: Option<f64>,
    pub success: Option<bool>,
    pub segment: u16,
    pub skill_scores: HashMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

/// One observed (state, action, reward, next state) tuple. Ephemeral:
/// built by the pipeline, consumed by the agent, optionally emitted on the
/// audit sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub learner_id: String,
    pub context_id: String,
    pub state: LearnerState,
    pub action: Action,
    pub reward: f64,
    pub next_state: LearnerState,
    pub timestamp: DateTime<Utc>,
}

/// Named reward components before and after clamping, produced by the
/// reward model so the pipeline can audit and rationales can cite the
/// dominant signal.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RewardComponents {
    pub base_completion: f64,
    pub score_improvement: f64,
    pub mastery_gain: f64,
    pub engagement: f64,
    pub difficulty_penalty: f64,
    /// Clamped sum of the components, the value the agent trains on.
    pub total: f64,
}

impl RewardComponents {
    /// Name of the largest-magnitude component, used in rationale text.
    pub fn dominant(&self) -> &'static str {
        let components = [
            ("completion", self.base_completion),
            ("score_improvement", self.score_improvement),
            ("mastery_gain", self.mastery_gain),
            ("engagement", self.engagement),
            ("difficulty_mismatch", self.difficulty_penalty),
        ];
        components
            .iter()
            .max_by(|a, b| {
                a.1.abs()
                    .partial_cmp(&b.1.abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(name, _)| *name)
            .unwrap_or("completion")
    }
}

/// Audit record emitted for every applied transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionAudit {
    pub transition: Transition,
    pub components: RewardComponents,
    pub updated_value: f64,
}

/// One ranked recommendation served to the LMS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: Action,
    pub action_label: String,
    /// Concrete content item the action resolves to, relative to the
    /// learner's current module.
    pub content_ref: String,
    pub estimated_value: f64,
    pub target_skills: Vec<String>,
    pub rationale: String,
    pub estimated_minutes: u32,
}

/// Top-k recommendation set for a (learner, context) pair. Overwritten on
/// every successful update; read by the serving boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub learner_id: String,
    pub context_id: String,
    pub items: Vec<Recommendation>,
    pub generated_at: DateTime<Utc>,
}

/// Current per-learner state record as persisted to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRecord {
    pub learner_id: String,
    pub context_id: String,
    pub state: LearnerState,
    pub updated_at: DateTime<Utc>,
}

/// One checkpointed value-table entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub state: LearnerState,
    pub action_index: u8,
    pub value: f64,
}

/// Serialized value table plus the configuration fingerprint it was
/// trained under. A checkpoint whose fingerprint differs from the active
/// configuration must be rejected at startup, never silently reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableCheckpoint {
    pub fingerprint: String,
    pub episode: u64,
    pub entries: Vec<CheckpointEntry>,
    pub saved_at: DateTime<Utc>,
}

/// Immediate acknowledgement returned by the ingestion boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReceipt {
    pub batch_id: Uuid,
    pub accepted_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(learner: Option<&str>, label: Option<&str>) -> EventRecord {
        EventRecord {
            learner_id: learner.map(String::from),
            context_id: Some("course-101".to_string()),
            action_label: label.map(String::from),
            timestamp: Some(Utc::now()),
            module_index: Some(2),
            progress: Some(0.5),
            score: Some(0.8),
            success: Some(true),
            segment: Some(1),
            skill_scores: HashMap::new(),
        }
    }

    #[test]
    fn validate_requires_learner_id() {
        assert!(record(None, Some("view_content")).validate().is_err());
        assert!(record(Some(""), Some("view_content")).validate().is_err());
        assert!(record(Some("l-1"), Some("view_content")).validate().is_ok());
    }

    #[test]
    fn validate_rejects_unknown_actions_and_clamps_score() {
        assert!(record(Some("l-1"), Some("teleport")).validate().is_err());

        let mut raw = record(Some("l-1"), Some("quiz_attempt"));
        raw.score = Some(3.5);
        let event = raw.validate().unwrap();
        assert_eq!(event.score, Some(1.0));
    }

    #[test]
    fn tier_mapping_follows_config() {
        let config = TierConfig::default();
        assert_eq!(
            ClusterTier::from_segment(0, &config),
            ClusterTier::Struggling
        );
        assert_eq!(
            ClusterTier::from_segment(1, &config),
            ClusterTier::Developing
        );
        assert_eq!(ClusterTier::from_segment(2, &config), ClusterTier::Advanced);
    }

    #[test]
    fn dominant_component_is_largest_magnitude() {
        let components = RewardComponents {
            base_completion: 1.0,
            score_improvement: 0.2,
            mastery_gain: -3.0,
            engagement: 0.5,
            difficulty_penalty: -0.1,
            total: -1.4,
        };
        assert_eq!(components.dominant(), "mastery_gain");
    }
}
