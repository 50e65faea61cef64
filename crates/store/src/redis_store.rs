//! Redis-backed store. Current state and recommendations are plain keys
//! with a TTL; the state history is an RPUSH list so it stays append-only.

use learn_core::config::StoreConfig;
use learn_core::error::{LearnError, LearnResult};
use learn_core::types::{RecommendationSet, StateRecord, TableCheckpoint};
use redis::AsyncCommands;
use tracing::info;

const CHECKPOINT_KEY: &str = "policy:checkpoint";

pub struct RedisStore {
    client: redis::Client,
    ttl_secs: u64,
}

impl RedisStore {
    /// Connect and verify connectivity with a PING.
    pub async fn connect(config: &StoreConfig) -> LearnResult<Self> {
        info!(url = %config.redis_url, "Connecting to Redis");
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| LearnError::Store(e.to_string()))?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| LearnError::Store(e.to_string()))?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| LearnError::Store(e.to_string()))?;
        info!(response = %pong, "Redis connection established");

        Ok(Self {
            client,
            ttl_secs: config.ttl_secs,
        })
    }

    async fn connection(&self) -> LearnResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| LearnError::Store(e.to_string()))
    }

    fn state_key(learner_id: &str, context_id: &str) -> String {
        format!("learner_state:{learner_id}:{context_id}")
    }

    fn history_key(learner_id: &str, context_id: &str) -> String {
        format!("state_history:{learner_id}:{context_id}")
    }

    fn recommendations_key(learner_id: &str, context_id: &str) -> String {
        format!("recommendations:{learner_id}:{context_id}")
    }

    pub async fn put_state(&self, record: &StateRecord) -> LearnResult<()> {
        let json = serde_json::to_string(record)?;
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(
            Self::state_key(&record.learner_id, &record.context_id),
            json,
            self.ttl_secs,
        )
        .await
        .map_err(|e| LearnError::Store(e.to_string()))?;
        metrics::counter!("store.state_writes").increment(1);
        Ok(())
    }

    pub async fn get_state(
        &self,
        learner_id: &str,
        context_id: &str,
    ) -> LearnResult<Option<StateRecord>> {
        let mut conn = self.connection().await?;
        let data: Option<String> = conn
            .get(Self::state_key(learner_id, context_id))
            .await
            .map_err(|e| LearnError::Store(e.to_string()))?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn append_history(&self, record: &StateRecord) -> LearnResult<()> {
        let json = serde_json::to_string(record)?;
        let mut conn = self.connection().await?;
        conn.rpush::<_, _, ()>(
            Self::history_key(&record.learner_id, &record.context_id),
            json,
        )
        .await
        .map_err(|e| LearnError::Store(e.to_string()))?;
        Ok(())
    }

    pub async fn history(
        &self,
        learner_id: &str,
        context_id: &str,
    ) -> LearnResult<Vec<StateRecord>> {
        let mut conn = self.connection().await?;
        let entries: Vec<String> = conn
            .lrange(Self::history_key(learner_id, context_id), 0, -1)
            .await
            .map_err(|e| LearnError::Store(e.to_string()))?;
        entries
            .iter()
            .map(|json| serde_json::from_str(json).map_err(LearnError::from))
            .collect()
    }

    pub async fn put_recommendations(&self, set: &RecommendationSet) -> LearnResult<()> {
        let json = serde_json::to_string(set)?;
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(
            Self::recommendations_key(&set.learner_id, &set.context_id),
            json,
            self.ttl_secs,
        )
        .await
        .map_err(|e| LearnError::Store(e.to_string()))?;
        metrics::counter!("store.recommendation_writes").increment(1);
        Ok(())
    }

    pub async fn get_recommendations(
        &self,
        learner_id: &str,
        context_id: &str,
    ) -> LearnResult<Option<RecommendationSet>> {
        let mut conn = self.connection().await?;
        let data: Option<String> = conn
            .get(Self::recommendations_key(learner_id, context_id))
            .await
            .map_err(|e| LearnError::Store(e.to_string()))?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// The checkpoint never expires; it is the warm-start state of the
    /// whole engine.
    pub async fn save_checkpoint(&self, checkpoint: &TableCheckpoint) -> LearnResult<()> {
        let json = serde_json::to_string(checkpoint)?;
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(CHECKPOINT_KEY, json)
            .await
            .map_err(|e| LearnError::Store(e.to_string()))?;
        Ok(())
    }

    pub async fn load_checkpoint(&self) -> LearnResult<Option<TableCheckpoint>> {
        let mut conn = self.connection().await?;
        let data: Option<String> = conn
            .get(CHECKPOINT_KEY)
            .await
            .map_err(|e| LearnError::Store(e.to_string()))?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
