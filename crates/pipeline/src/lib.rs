//! Online update pipeline — async ingestion, per-learner transition
//! detection, reward scoring, value-table updates, and persistence of
//! state and recommendations.

pub mod checkpoint;
pub mod engine;
pub mod recommend;
pub mod transitions;

pub use engine::UpdateEngine;
