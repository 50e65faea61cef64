//! State builder — aggregates a learner's recent event window into the
//! pre-discretization feature vector and the discretized state tuple.

pub mod builder;

pub use builder::{StateBuilder, StateFeatures};
