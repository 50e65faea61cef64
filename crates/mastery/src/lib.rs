//! Per-learner, per-skill proficiency tracking and the weighted outcome
//! predictor used for recommendation rationale and evaluation.

pub mod tracker;

pub use tracker::{MasteryDelta, MasteryProfile, MasterySnapshot, MasteryTracker, WeakSkill};
