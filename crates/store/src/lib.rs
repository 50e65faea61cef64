//! Persistence contract for the policy engine.
//!
//! Three logical collections keyed by (learner_id, context_id) — current
//! state, append-only state history, current recommendations — plus one
//! checkpoint slot for the value table. The technology behind the
//! contract is a deployment choice: an in-process map for development and
//! tests, Redis in production.

pub mod memory;
pub mod redis_store;

use learn_core::config::StoreConfig;
use learn_core::error::{LearnError, LearnResult};
use learn_core::types::{RecommendationSet, StateRecord, TableCheckpoint};

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Backend-dispatching store handle shared across the pipeline and API.
pub enum Store {
    Memory(MemoryStore),
    Redis(RedisStore),
}

impl Store {
    pub async fn from_config(config: &StoreConfig) -> LearnResult<Self> {
        match config.backend.as_str() {
            "memory" => Ok(Store::Memory(MemoryStore::new())),
            "redis" => Ok(Store::Redis(RedisStore::connect(config).await?)),
            other => Err(LearnError::Config(format!(
                "unknown store backend '{other}'"
            ))),
        }
    }

    pub async fn put_state(&self, record: &StateRecord) -> LearnResult<()> {
        match self {
            Store::Memory(store) => store.put_state(record),
            Store::Redis(store) => store.put_state(record).await,
        }
    }

    pub async fn get_state(
        &self,
        learner_id: &str,
        context_id: &str,
    ) -> LearnResult<Option<StateRecord>> {
        match self {
            Store::Memory(store) => store.get_state(learner_id, context_id),
            Store::Redis(store) => store.get_state(learner_id, context_id).await,
        }
    }

    pub async fn append_history(&self, record: &StateRecord) -> LearnResult<()> {
        match self {
            Store::Memory(store) => store.append_history(record),
            Store::Redis(store) => store.append_history(record).await,
        }
    }

    pub async fn history(
        &self,
        learner_id: &str,
        context_id: &str,
    ) -> LearnResult<Vec<StateRecord>> {
        match self {
            Store::Memory(store) => store.history(learner_id, context_id),
            Store::Redis(store) => store.history(learner_id, context_id).await,
        }
    }

    pub async fn put_recommendations(&self, set: &RecommendationSet) -> LearnResult<()> {
        match self {
            Store::Memory(store) => store.put_recommendations(set),
            Store::Redis(store) => store.put_recommendations(set).await,
        }
    }

    pub async fn get_recommendations(
        &self,
        learner_id: &str,
        context_id: &str,
    ) -> LearnResult<Option<RecommendationSet>> {
        match self {
            Store::Memory(store) => store.get_recommendations(learner_id, context_id),
            Store::Redis(store) => store.get_recommendations(learner_id, context_id).await,
        }
    }

    pub async fn save_checkpoint(&self, checkpoint: &TableCheckpoint) -> LearnResult<()> {
        match self {
            Store::Memory(store) => store.save_checkpoint(checkpoint),
            Store::Redis(store) => store.save_checkpoint(checkpoint).await,
        }
    }

    pub async fn load_checkpoint(&self) -> LearnResult<Option<TableCheckpoint>> {
        match self {
            Store::Memory(store) => store.load_checkpoint(),
            Store::Redis(store) => store.load_checkpoint().await,
        }
    }
}
