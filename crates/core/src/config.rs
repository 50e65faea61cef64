use serde::Deserialize;
use std::collections::HashMap;

use crate::error::{LearnError, LearnResult};

/// Root application configuration. Loaded from environment variables
/// with the prefix `LEARN_EXPRESS__` and TOML config files. Every numeric
/// here materially changes trained-table semantics, so the tree is
/// validated at load time and the discretization-relevant parts are folded
/// into the checkpoint fingerprint.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub discretizer: DiscretizerConfig,
    #[serde(default)]
    pub tiers: TierConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub mastery: MasteryConfig,
    #[serde(default)]
    pub assessment: AssessmentConfig,
    #[serde(default)]
    pub reward: RewardConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_node_id() -> String {
    format!("learn-{}", std::process::id())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            discretizer: DiscretizerConfig::default(),
            tiers: TierConfig::default(),
            policy: PolicyConfig::default(),
            mastery: MasteryConfig::default(),
            assessment: AssessmentConfig::default(),
            reward: RewardConfig::default(),
            pipeline: PipelineConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8086
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9096
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

// ─── Discretizer ────────────────────────────────────────────────────────

/// Binning scheme for the fractional state components. The scheme and its
/// edges are part of the table fingerprint: changing either invalidates
/// every previously trained checkpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscretizerConfig {
    /// `quantile` (coarse, small alphabet) or `fixed_decimal` (fine,
    /// large alphabet).
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Decimal places kept by the fixed-decimal scheme.
    #[serde(default = "default_precision")]
    pub precision: u8,
    /// Ascending bin edges in [0, 1] for the quantile scheme.
    #[serde(default = "default_edges")]
    pub edges: Vec<f64>,
}

fn default_scheme() -> String {
    "quantile".to_string()
}
fn default_precision() -> u8 {
    1
}
fn default_edges() -> Vec<f64> {
    vec![0.0, 0.25, 0.5, 0.75]
}

impl Default for DiscretizerConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            precision: default_precision(),
            edges: default_edges(),
        }
    }
}

// ─── Cluster tiers ──────────────────────────────────────────────────────

/// Maps externally trained cluster segment ids onto ability tiers.
/// Segments listed in neither set read as Developing.
#[derive(Debug, Clone, Deserialize)]
pub struct TierConfig {
    #[serde(default = "default_struggling_segments")]
    pub struggling_segments: Vec<u16>,
    #[serde(default = "default_advanced_segments")]
    pub advanced_segments: Vec<u16>,
}

fn default_struggling_segments() -> Vec<u16> {
    vec![0]
}
fn default_advanced_segments() -> Vec<u16> {
    vec![2]
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            struggling_segments: default_struggling_segments(),
            advanced_segments: default_advanced_segments(),
        }
    }
}

// ─── Policy agent ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// Base TD learning rate.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Per-tier multipliers on the base learning rate.
    #[serde(default = "default_alpha_scale_struggling")]
    pub alpha_scale_struggling: f64,
    #[serde(default = "default_alpha_scale_developing")]
    pub alpha_scale_developing: f64,
    #[serde(default = "default_alpha_scale_advanced")]
    pub alpha_scale_advanced: f64,
    /// Discount factor gamma.
    #[serde(default = "default_discount")]
    pub discount: f64,
    /// Exploration schedule: epsilon decays per episode, floored at min.
    #[serde(default = "default_epsilon_start")]
    pub epsilon_start: f64,
    #[serde(default = "default_epsilon_min")]
    pub epsilon_min: f64,
    #[serde(default = "default_epsilon_decay")]
    pub epsilon_decay: f64,
    /// Recommendations served per (learner, context).
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_learning_rate() -> f64 {
    0.1
}
fn default_alpha_scale_struggling() -> f64 {
    1.5
}
fn default_alpha_scale_developing() -> f64 {
    1.0
}
fn default_alpha_scale_advanced() -> f64 {
    0.7
}
fn default_discount() -> f64 {
    0.95
}
fn default_epsilon_start() -> f64 {
    0.3
}
fn default_epsilon_min() -> f64 {
    0.05
}
fn default_epsilon_decay() -> f64 {
    0.995
}
fn default_top_k() -> usize {
    3
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            alpha_scale_struggling: default_alpha_scale_struggling(),
            alpha_scale_developing: default_alpha_scale_developing(),
            alpha_scale_advanced: default_alpha_scale_advanced(),
            discount: default_discount(),
            epsilon_start: default_epsilon_start(),
            epsilon_min: default_epsilon_min(),
            epsilon_decay: default_epsilon_decay(),
            top_k: default_top_k(),
        }
    }
}

// ─── Mastery tracker ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct MasteryConfig {
    /// Proficiency assumed for any skill never observed for a learner.
    #[serde(default = "default_mastery_value")]
    pub default_mastery: f64,
    /// Retained per-learner mastery delta history entries.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Per-tier exponential smoothing rates; weaker tiers adapt faster.
    #[serde(default = "default_mastery_alpha_struggling")]
    pub alpha_struggling: f64,
    #[serde(default = "default_mastery_alpha_developing")]
    pub alpha_developing: f64,
    #[serde(default = "default_mastery_alpha_advanced")]
    pub alpha_advanced: f64,
    /// Skills below this mastery count as weak for remediation targeting.
    #[serde(default = "default_weak_threshold")]
    pub weak_threshold: f64,
}

fn default_mastery_value() -> f64 {
    0.4
}
fn default_history_limit() -> usize {
    256
}
fn default_mastery_alpha_struggling() -> f64 {
    0.35
}
fn default_mastery_alpha_developing() -> f64 {
    0.25
}
fn default_mastery_alpha_advanced() -> f64 {
    0.15
}
fn default_weak_threshold() -> f64 {
    0.5
}

impl Default for MasteryConfig {
    fn default() -> Self {
        Self {
            default_mastery: default_mastery_value(),
            history_limit: default_history_limit(),
            alpha_struggling: default_mastery_alpha_struggling(),
            alpha_developing: default_mastery_alpha_developing(),
            alpha_advanced: default_mastery_alpha_advanced(),
            weak_threshold: default_weak_threshold(),
        }
    }
}

// ─── Assessment weights ─────────────────────────────────────────────────

/// Held-out assessment used by the outcome predictor: per-skill exam
/// weights and the total marks the weighted mastery sum scales to.
#[derive(Debug, Clone, Deserialize)]
pub struct AssessmentConfig {
    #[serde(default)]
    pub skill_weights: HashMap<String, f64>,
    #[serde(default = "default_total_marks")]
    pub total_marks: f64,
}

fn default_total_marks() -> f64 {
    100.0
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            skill_weights: HashMap::new(),
            total_marks: default_total_marks(),
        }
    }
}

// ─── Reward model ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RewardConfig {
    /// Base reward for completing any action, scaled by tier boost.
    #[serde(default = "default_base_completion")]
    pub base_completion: f64,
    #[serde(default = "default_tier_boost_struggling")]
    pub tier_boost_struggling: f64,
    #[serde(default = "default_tier_boost_developing")]
    pub tier_boost_developing: f64,
    #[serde(default = "default_tier_boost_advanced")]
    pub tier_boost_advanced: f64,
    /// Weight on the observed-score delta vs. the learner's rolling average.
    #[serde(default = "default_score_weight")]
    pub score_weight: f64,
    /// Per-mastery-point bonus, by tier. The explicit skill-growth signal.
    #[serde(default = "default_mastery_multiplier_struggling")]
    pub mastery_multiplier_struggling: f64,
    #[serde(default = "default_mastery_multiplier_developing")]
    pub mastery_multiplier_developing: f64,
    #[serde(default = "default_mastery_multiplier_advanced")]
    pub mastery_multiplier_advanced: f64,
    /// Session-continuity bonus for a non-repeated action.
    #[serde(default = "default_continuity_bonus")]
    pub continuity_bonus: f64,
    /// Penalty for repeating the same (state, action) pair consecutively.
    #[serde(default = "default_repetition_penalty")]
    pub repetition_penalty: f64,
    /// Weight on |action difficulty - tier target difficulty|.
    #[serde(default = "default_difficulty_weight")]
    pub difficulty_weight: f64,
    /// Per-component clamp so no single term dominates the sum.
    #[serde(default = "default_component_clamp")]
    pub component_clamp: f64,
    /// Clamp bounds on the final summed reward.
    #[serde(default = "default_reward_floor")]
    pub floor: f64,
    #[serde(default = "default_reward_ceiling")]
    pub ceiling: f64,
}

fn default_base_completion() -> f64 {
    2.0
}
fn default_tier_boost_struggling() -> f64 {
    1.2
}
fn default_tier_boost_developing() -> f64 {
    1.0
}
fn default_tier_boost_advanced() -> f64 {
    0.8
}
fn default_score_weight() -> f64 {
    5.0
}
fn default_mastery_multiplier_struggling() -> f64 {
    12.0
}
fn default_mastery_multiplier_developing() -> f64 {
    10.0
}
fn default_mastery_multiplier_advanced() -> f64 {
    8.0
}
fn default_continuity_bonus() -> f64 {
    0.5
}
fn default_repetition_penalty() -> f64 {
    1.0
}
fn default_difficulty_weight() -> f64 {
    2.0
}
fn default_component_clamp() -> f64 {
    4.0
}
fn default_reward_floor() -> f64 {
    -5.0
}
fn default_reward_ceiling() -> f64 {
    15.0
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            base_completion: default_base_completion(),
            tier_boost_struggling: default_tier_boost_struggling(),
            tier_boost_developing: default_tier_boost_developing(),
            tier_boost_advanced: default_tier_boost_advanced(),
            score_weight: default_score_weight(),
            mastery_multiplier_struggling: default_mastery_multiplier_struggling(),
            mastery_multiplier_developing: default_mastery_multiplier_developing(),
            mastery_multiplier_advanced: default_mastery_multiplier_advanced(),
            continuity_bonus: default_continuity_bonus(),
            repetition_penalty: default_repetition_penalty(),
            difficulty_weight: default_difficulty_weight(),
            component_clamp: default_component_clamp(),
            floor: default_reward_floor(),
            ceiling: default_reward_ceiling(),
        }
    }
}

// ─── Update pipeline ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Adjacent-event pairs closer than this are duplicate logging noise.
    #[serde(default = "default_min_gap_secs")]
    pub min_gap_secs: u64,
    /// Pairs farther apart than this cross a session boundary.
    #[serde(default = "default_max_gap_secs")]
    pub max_gap_secs: u64,
    /// Recent events retained per (learner, context) for state building.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Bounded depth of the background update queue.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Cadence of value-table checkpoints; 0 disables the timer.
    #[serde(default = "default_checkpoint_interval_secs")]
    pub checkpoint_interval_secs: u64,
}

fn default_min_gap_secs() -> u64 {
    60
}
fn default_max_gap_secs() -> u64 {
    3600
}
fn default_window_size() -> usize {
    20
}
fn default_queue_depth() -> usize {
    1024
}
fn default_retry_attempts() -> usize {
    3
}
fn default_retry_backoff_ms() -> u64 {
    250
}
fn default_checkpoint_interval_secs() -> u64 {
    300
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_gap_secs: default_min_gap_secs(),
            max_gap_secs: default_max_gap_secs(),
            window_size: default_window_size(),
            queue_depth: default_queue_depth(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            checkpoint_interval_secs: default_checkpoint_interval_secs(),
        }
    }
}

// ─── Store ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// `memory` for development and tests, `redis` in production.
    #[serde(default = "default_store_backend")]
    pub backend: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_store_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_store_backend() -> String {
    "memory".to_string()
}
fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_store_ttl_secs() -> u64 {
    86_400
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            redis_url: default_redis_url(),
            ttl_secs: default_store_ttl_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and optional config file.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("LEARN_EXPRESS")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate the numeric surface. Invalid configuration is fatal at
    /// startup: these values define trained-table semantics.
    pub fn validate(&self) -> LearnResult<()> {
        let invalid = |message: String| Err(LearnError::Config(message));

        match self.discretizer.scheme.as_str() {
            "quantile" => {
                if self.discretizer.edges.is_empty() {
                    return invalid("discretizer.edges must not be empty".to_string());
                }
                if !self.discretizer.edges.windows(2).all(|w| w[0] < w[1]) {
                    return invalid("discretizer.edges must be strictly ascending".to_string());
                }
                if self
                    .discretizer
                    .edges
                    .iter()
                    .any(|e| !(0.0..=1.0).contains(e))
                {
                    return invalid("discretizer.edges must lie in [0, 1]".to_string());
                }
            }
            "fixed_decimal" => {
                if self.discretizer.precision > 4 {
                    return invalid(format!(
                        "discretizer.precision {} exceeds 4; the state space would be untrainable",
                        self.discretizer.precision
                    ));
                }
            }
            other => {
                return invalid(format!("unknown discretizer scheme '{other}'"));
            }
        }

        if !(0.0..=1.0).contains(&self.policy.learning_rate) || self.policy.learning_rate == 0.0 {
            return invalid("policy.learning_rate must be in (0, 1]".to_string());
        }
        if !(0.0..1.0).contains(&self.policy.discount) {
            return invalid("policy.discount must be in [0, 1)".to_string());
        }
        for (name, eps) in [
            ("epsilon_start", self.policy.epsilon_start),
            ("epsilon_min", self.policy.epsilon_min),
        ] {
            if !(0.0..=1.0).contains(&eps) {
                return invalid(format!("policy.{name} must be in [0, 1]"));
            }
        }
        if self.policy.epsilon_min > self.policy.epsilon_start {
            return invalid("policy.epsilon_min must not exceed epsilon_start".to_string());
        }
        if !(0.0..=1.0).contains(&self.policy.epsilon_decay) || self.policy.epsilon_decay == 0.0 {
            return invalid("policy.epsilon_decay must be in (0, 1]".to_string());
        }
        if self.policy.top_k == 0 {
            return invalid("policy.top_k must be at least 1".to_string());
        }

        if !(0.0..=1.0).contains(&self.mastery.default_mastery) {
            return invalid("mastery.default_mastery must be in [0, 1]".to_string());
        }
        for (name, alpha) in [
            ("alpha_struggling", self.mastery.alpha_struggling),
            ("alpha_developing", self.mastery.alpha_developing),
            ("alpha_advanced", self.mastery.alpha_advanced),
        ] {
            if !(0.0..=1.0).contains(&alpha) || alpha == 0.0 {
                return invalid(format!("mastery.{name} must be in (0, 1]"));
            }
        }

        if self.assessment.total_marks <= 0.0 {
            return invalid("assessment.total_marks must be positive".to_string());
        }
        if self.assessment.skill_weights.values().any(|w| *w < 0.0) {
            return invalid("assessment.skill_weights must be non-negative".to_string());
        }

        if self.reward.floor >= self.reward.ceiling {
            return invalid("reward.floor must be below reward.ceiling".to_string());
        }
        if self.reward.component_clamp <= 0.0 {
            return invalid("reward.component_clamp must be positive".to_string());
        }

        if self.pipeline.min_gap_secs >= self.pipeline.max_gap_secs {
            return invalid("pipeline.min_gap_secs must be below max_gap_secs".to_string());
        }
        if self.pipeline.window_size < 2 {
            return invalid("pipeline.window_size must be at least 2".to_string());
        }
        if self.pipeline.queue_depth == 0 {
            return invalid("pipeline.queue_depth must be at least 1".to_string());
        }

        match self.store.backend.as_str() {
            "memory" | "redis" => {}
            other => return invalid(format!("unknown store backend '{other}'")),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn unsorted_edges_are_rejected() {
        let mut config = AppConfig::default();
        config.discretizer.edges = vec![0.0, 0.5, 0.25];
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_gap_window_is_rejected() {
        let mut config = AppConfig::default();
        config.pipeline.min_gap_secs = 7200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let mut config = AppConfig::default();
        config.discretizer.scheme = "fourier".to_string();
        assert!(config.validate().is_err());
    }
}
