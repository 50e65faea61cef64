//! Reward model — turns an observed transition into the scalar training
//! signal, composed from independently weighted and clamped components.

pub mod model;

pub use model::{RewardInputs, RewardModel};
