//! Additive reward composition.
//!
//! A raw score under-determines good teaching: it rewards short-term
//! performance but not skill growth. The model therefore carries an
//! explicit mastery-improvement bonus next to the score term, plus
//! engagement and difficulty shaping. Every component is clamped before
//! summing so no single term can dominate, and the sum is clamped to the
//! configured [floor, ceiling] to bound the update magnitude the agent
//! ever sees.

use learn_core::action::Action;
use learn_core::config::RewardConfig;
use learn_core::types::{ClusterTier, LearnerState, RewardComponents};

/// Everything the model consults for one transition.
#[derive(Debug, Clone, Copy)]
pub struct RewardInputs {
    pub state: LearnerState,
    pub action: Action,
    /// Score observed on the outcome event, if the event was graded.
    pub observed_score: Option<f64>,
    /// The learner's own rolling score average before this outcome.
    pub rolling_average: f64,
    /// Summed mastery deltas produced by this outcome's skill scores.
    pub mastery_delta: f64,
    pub tier: ClusterTier,
    /// True when the same (state, action) pair occurred consecutively.
    pub repeated: bool,
}

pub struct RewardModel {
    config: RewardConfig,
}

impl RewardModel {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    fn tier_boost(&self, tier: ClusterTier) -> f64 {
        match tier {
            ClusterTier::Struggling => self.config.tier_boost_struggling,
            ClusterTier::Developing => self.config.tier_boost_developing,
            ClusterTier::Advanced => self.config.tier_boost_advanced,
        }
    }

    fn mastery_multiplier(&self, tier: ClusterTier) -> f64 {
        match tier {
            ClusterTier::Struggling => self.config.mastery_multiplier_struggling,
            ClusterTier::Developing => self.config.mastery_multiplier_developing,
            ClusterTier::Advanced => self.config.mastery_multiplier_advanced,
        }
    }

    fn clamp_component(&self, value: f64) -> f64 {
        value.clamp(-self.config.component_clamp, self.config.component_clamp)
    }

    /// Score a transition. The total is the clamped component sum.
    pub fn reward(&self, inputs: &RewardInputs) -> RewardComponents {
        let base_completion =
            self.clamp_component(self.config.base_completion * self.tier_boost(inputs.tier));

        let score_improvement = self.clamp_component(
            inputs
                .observed_score
                .map(|score| (score - inputs.rolling_average) * self.config.score_weight)
                .unwrap_or(0.0),
        );

        let mastery_gain = self
            .clamp_component(inputs.mastery_delta * self.mastery_multiplier(inputs.tier));

        let engagement = self.clamp_component(if inputs.repeated {
            -self.config.repetition_penalty
        } else {
            self.config.continuity_bonus
        });

        let mismatch =
            (inputs.action.kind.difficulty() - inputs.tier.target_difficulty()).abs();
        let difficulty_penalty = self.clamp_component(-mismatch * self.config.difficulty_weight);

        let sum =
            base_completion + score_improvement + mastery_gain + engagement + difficulty_penalty;

        RewardComponents {
            base_completion,
            score_improvement,
            mastery_gain,
            engagement,
            difficulty_penalty,
            total: sum.clamp(self.config.floor, self.config.ceiling),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use learn_core::action::{ActionKind, TimeFocus};
    use learn_core::types::{EngagementLevel, LearningPhase};

    fn state() -> LearnerState {
        LearnerState {
            segment: 1,
            module_index: 0,
            progress_bin: 1,
            score_bin: 1,
            phase: LearningPhase::Middle,
            engagement: EngagementLevel::Moderate,
        }
    }

    fn inputs() -> RewardInputs {
        RewardInputs {
            state: state(),
            action: Action::new(ActionKind::PracticeExercise, TimeFocus::Present),
            observed_score: Some(0.7),
            rolling_average: 0.6,
            mastery_delta: 0.05,
            tier: ClusterTier::Developing,
            repeated: false,
        }
    }

    #[test]
    fn components_sum_into_total() {
        let model = RewardModel::new(RewardConfig::default());
        let components = model.reward(&inputs());
        let sum = components.base_completion
            + components.score_improvement
            + components.mastery_gain
            + components.engagement
            + components.difficulty_penalty;
        assert!((components.total - sum).abs() < 1e-9);
    }

    #[test]
    fn overflowing_sum_is_truncated_to_the_ceiling() {
        let config = RewardConfig {
            component_clamp: 100.0,
            ..RewardConfig::default()
        };
        let model = RewardModel::new(config);
        let mut rich = inputs();
        rich.mastery_delta = 5.0;
        let components = model.reward(&rich);
        assert_eq!(components.total, 15.0);
    }

    #[test]
    fn floor_bounds_the_downside() {
        let config = RewardConfig {
            component_clamp: 100.0,
            ..RewardConfig::default()
        };
        let model = RewardModel::new(config);
        let mut poor = inputs();
        poor.mastery_delta = -5.0;
        poor.repeated = true;
        let components = model.reward(&poor);
        assert_eq!(components.total, -5.0);
    }

    #[test]
    fn component_clamp_caps_each_term() {
        let model = RewardModel::new(RewardConfig::default());
        let mut rich = inputs();
        rich.mastery_delta = 5.0;
        let components = model.reward(&rich);
        // 5.0 x multiplier 10.0 would be 50 unclamped.
        assert_eq!(components.mastery_gain, 4.0);
    }

    #[test]
    fn repetition_flips_the_engagement_sign() {
        let model = RewardModel::new(RewardConfig::default());
        let fresh = model.reward(&inputs());
        assert!(fresh.engagement > 0.0);

        let mut again = inputs();
        again.repeated = true;
        let repeated = model.reward(&again);
        assert!(repeated.engagement < 0.0);
        assert!(repeated.total < fresh.total);
    }

    #[test]
    fn difficulty_mismatch_penalizes_off_tier_actions() {
        let model = RewardModel::new(RewardConfig::default());
        let mut hard_for_struggler = inputs();
        hard_for_struggler.tier = ClusterTier::Struggling;
        hard_for_struggler.action = Action::new(ActionKind::AttemptQuiz, TimeFocus::Present);
        let mismatched = model.reward(&hard_for_struggler);

        let mut matched = inputs();
        matched.tier = ClusterTier::Struggling;
        matched.action = Action::new(ActionKind::ReviewMaterial, TimeFocus::Present);
        let aligned = model.reward(&matched);

        assert!(mismatched.difficulty_penalty < aligned.difficulty_penalty);
    }

    #[test]
    fn ungraded_outcomes_carry_no_score_term() {
        let model = RewardModel::new(RewardConfig::default());
        let mut ungraded = inputs();
        ungraded.observed_score = None;
        let components = model.reward(&ungraded);
        assert_eq!(components.score_improvement, 0.0);
    }
}
