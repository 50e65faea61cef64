//! The background update engine.
//!
//! Ingestion validates and acknowledges synchronously, then queues the
//! batch for a background worker: the event source is never blocked on
//! model-update latency. Batches are processed one at a time; within a
//! batch, learner groups run concurrently, and a per-learner async lock
//! serializes same-learner work against anything still in flight. The
//! value table accepts concurrent per-key updates from different
//! learners.

use chrono::{Duration, Utc};
use dashmap::DashMap;
use learn_core::config::{AppConfig, PipelineConfig, TierConfig};
use learn_core::error::{LearnError, LearnResult};
use learn_core::event_bus::EventSink;
use learn_core::fingerprint::scheme_fingerprint;
use learn_core::types::{
    BatchReceipt, ClusterTier, EventRecord, LearnerEvent, LearnerState, RecommendationSet,
    StateRecord, Transition, TransitionAudit,
};
use learn_mastery::MasteryTracker;
use learn_policy::agent::SelectedAction;
use learn_policy::{Discretizer, PolicyAgent};
use learn_reward::{RewardInputs, RewardModel};
use learn_state::StateBuilder;
use learn_store::Store;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::recommend;
use crate::transitions::{self, PairDecision};
use crate::checkpoint;

/// A persist job that exhausts its in-place retries is re-queued this
/// many times before it is dropped.
const MAX_REQUEUES: usize = 3;

enum QueuedWork {
    Batch {
        batch_id: Uuid,
        events: Vec<LearnerEvent>,
    },
    Persist {
        record: StateRecord,
        recommendations: RecommendationSet,
        requeue_attempt: usize,
    },
}

pub struct UpdateEngine {
    agent: Arc<PolicyAgent>,
    mastery: Arc<MasteryTracker>,
    reward: RewardModel,
    builder: StateBuilder,
    store: Arc<Store>,
    config: PipelineConfig,
    tiers: TierConfig,
    top_k: usize,
    fingerprint: String,
    /// Recent events per (learner, context), the state-building window.
    windows: DashMap<(String, String), Vec<LearnerEvent>>,
    /// Last applied (state, action) per (learner, context), for the
    /// repetition penalty.
    last_pair: DashMap<(String, String), (LearnerState, u8)>,
    /// Learner-scoped locks: single writer per learner.
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    sink: Arc<dyn EventSink>,
    tx: mpsc::Sender<QueuedWork>,
    degraded: AtomicBool,
}

impl UpdateEngine {
    /// Build the engine and spawn its background worker and checkpoint
    /// timer on the current tokio runtime.
    pub fn start(
        config: &AppConfig,
        agent: Arc<PolicyAgent>,
        mastery: Arc<MasteryTracker>,
        store: Arc<Store>,
        sink: Arc<dyn EventSink>,
    ) -> LearnResult<Arc<Self>> {
        let discretizer = Discretizer::from_config(&config.discretizer)?;
        let fingerprint = scheme_fingerprint(&config.discretizer);
        let (tx, rx) = mpsc::channel(config.pipeline.queue_depth);

        let engine = Arc::new(Self {
            agent,
            mastery,
            reward: RewardModel::new(config.reward.clone()),
            builder: StateBuilder::new(discretizer),
            store,
            config: config.pipeline.clone(),
            tiers: config.tiers.clone(),
            top_k: config.policy.top_k,
            fingerprint,
            windows: DashMap::new(),
            last_pair: DashMap::new(),
            locks: DashMap::new(),
            sink,
            tx,
            degraded: AtomicBool::new(false),
        });

        tokio::spawn(Self::worker(engine.clone(), rx));
        if engine.config.checkpoint_interval_secs > 0 {
            tokio::spawn(Self::checkpoint_loop(engine.clone()));
        }

        info!(fingerprint = %engine.fingerprint, "Update engine started");
        Ok(engine)
    }

    pub fn agent(&self) -> &Arc<PolicyAgent> {
        &self.agent
    }

    pub fn mastery(&self) -> &Arc<MasteryTracker> {
        &self.mastery
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// True while persistence is failing; surfaced by the readiness probe.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Validate a raw batch and queue it for background processing.
    /// Malformed events are skipped and logged, never fatal; a full queue
    /// surfaces as backpressure to the caller.
    pub fn ingest(&self, records: &[EventRecord]) -> LearnResult<BatchReceipt> {
        let batch_id = Uuid::new_v4();
        let mut events = Vec::with_capacity(records.len());
        for record in records {
            match record.validate() {
                Ok(event) => events.push(event),
                Err(reason) => {
                    warn!(batch_id = %batch_id, reason, "Skipping malformed event");
                    metrics::counter!("ingest.malformed").increment(1);
                }
            }
        }

        let accepted_count = events.len();
        if accepted_count > 0 {
            self.tx
                .try_send(QueuedWork::Batch { batch_id, events })
                .map_err(|e| match e {
                    TrySendError::Full(_) => LearnError::Backpressure,
                    TrySendError::Closed(_) => {
                        LearnError::Internal(anyhow::anyhow!("update worker has stopped"))
                    }
                })?;
        }

        metrics::counter!("ingest.accepted").increment(accepted_count as u64);
        metrics::counter!("ingest.batches").increment(1);
        Ok(BatchReceipt {
            batch_id,
            accepted_count,
        })
    }

    /// Serve recommendations for a (learner, context) pair: the persisted
    /// set when present, recomputed from the current state otherwise, and
    /// a cold-start default when the learner has no state at all.
    pub async fn recommendations(
        &self,
        learner_id: &str,
        context_id: &str,
    ) -> LearnResult<RecommendationSet> {
        if let Some(set) = self.store.get_recommendations(learner_id, context_id).await? {
            return Ok(set);
        }
        if let Some(record) = self.store.get_state(learner_id, context_id).await? {
            return Ok(recommend::build_recommendations(
                &self.agent,
                &self.mastery,
                learner_id,
                context_id,
                record.state,
                self.top_k,
            ));
        }
        Ok(recommend::cold_start(learner_id, context_id, self.top_k))
    }

    /// Epsilon-greedy selection against the learner's current state.
    /// None when the learner has no state yet.
    pub async fn select_next_action(
        &self,
        learner_id: &str,
        context_id: &str,
    ) -> LearnResult<Option<SelectedAction>> {
        let record = self.store.get_state(learner_id, context_id).await?;
        Ok(record.map(|r| self.agent.select(r.state)))
    }

    pub async fn checkpoint_now(&self) -> LearnResult<()> {
        checkpoint::save(&self.agent, &self.store, &self.fingerprint).await
    }

    async fn worker(engine: Arc<Self>, mut rx: mpsc::Receiver<QueuedWork>) {
        while let Some(work) = rx.recv().await {
            match work {
                QueuedWork::Batch { batch_id, events } => {
                    Self::process_batch(engine.clone(), batch_id, events).await;
                }
                QueuedWork::Persist {
                    record,
                    recommendations,
                    requeue_attempt,
                } => {
                    engine.persist(record, recommendations, requeue_attempt).await;
                }
            }
        }
    }

    async fn checkpoint_loop(engine: Arc<Self>) {
        let period = std::time::Duration::from_secs(engine.config.checkpoint_interval_secs);
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            let _ = checkpoint::save(&engine.agent, &engine.store, &engine.fingerprint).await;
        }
    }

    async fn process_batch(engine: Arc<Self>, batch_id: Uuid, events: Vec<LearnerEvent>) {
        let groups = transitions::group_by_learner(events);
        let mut handles = Vec::with_capacity(groups.len());
        for ((learner_id, context_id), group) in groups {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.process_learner(learner_id, context_id, group).await;
            }));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                error!(batch_id = %batch_id, error = %e, "Learner task panicked");
            }
        }

        // Episodes advance per batch, never within one, so epsilon is
        // constant across a batch's updates.
        engine.agent.end_episode();
        debug!(
            batch_id = %batch_id,
            episode = engine.agent.episode(),
            epsilon = engine.agent.current_epsilon(),
            "Batch processed"
        );
    }

    async fn process_learner(
        &self,
        learner_id: String,
        context_id: String,
        events: Vec<LearnerEvent>,
    ) {
        let lock = self
            .locks
            .entry(learner_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        self.mastery.initialize(&learner_id);
        let key = (learner_id.clone(), context_id.clone());
        let mut window = self
            .windows
            .get(&key)
            .map(|w| w.clone())
            .unwrap_or_default();

        let min_gap = Duration::seconds(self.config.min_gap_secs as i64);
        let max_gap = Duration::seconds(self.config.max_gap_secs as i64);
        let mut final_state = None;

        for event in events {
            let tier = ClusterTier::from_segment(event.segment, &self.tiers);

            // Mastery first: the deltas from this outcome feed the
            // reward's mastery term.
            let mut mastery_delta = 0.0;
            for (skill, observed) in &event.skill_scores {
                mastery_delta += self.mastery.update(&learner_id, skill, *observed, tier);
            }

            let rolling_average = StateBuilder::rolling_score(&window);
            let state_before = self.builder.build(&window);
            let prev_timestamp = window.last().map(|e| e.timestamp);

            window.push(event.clone());
            while window.len() > self.config.window_size {
                window.remove(0);
            }
            let Some(state_after) = self.builder.build(&window) else {
                continue;
            };
            final_state = Some(state_after);

            let (Some(state_before), Some(prev_timestamp)) = (state_before, prev_timestamp)
            else {
                // First contact: there is a state now, but no transition.
                continue;
            };

            match transitions::classify_gap(event.timestamp - prev_timestamp, min_gap, max_gap) {
                PairDecision::TooClose => {
                    debug!(learner_id = %learner_id, "Dropped pair: duplicate-logging gap");
                    metrics::counter!("pipeline.pairs_dropped_close").increment(1);
                    continue;
                }
                PairDecision::TooFar => {
                    debug!(learner_id = %learner_id, "Dropped pair: session boundary");
                    metrics::counter!("pipeline.pairs_dropped_far").increment(1);
                    continue;
                }
                PairDecision::Retain => {}
            }

            let repeated = self
                .last_pair
                .get(&key)
                .map(|pair| *pair == (state_before, event.action.index()))
                .unwrap_or(false);

            let components = self.reward.reward(&RewardInputs {
                state: state_before,
                action: event.action,
                observed_score: event.score,
                rolling_average,
                mastery_delta,
                tier,
                repeated,
            });

            let transition = Transition {
                learner_id: learner_id.clone(),
                context_id: context_id.clone(),
                state: state_before,
                action: event.action,
                reward: components.total,
                next_state: state_after,
                timestamp: event.timestamp,
            };
            let updated_value = self.agent.update(&transition, tier);
            self.last_pair
                .insert(key.clone(), (state_before, event.action.index()));
            self.sink.emit(TransitionAudit {
                transition,
                components,
                updated_value,
            });
            metrics::counter!("pipeline.transitions_applied").increment(1);
        }

        self.windows.insert(key, window);

        if let Some(state) = final_state {
            let record = StateRecord {
                learner_id: learner_id.clone(),
                context_id: context_id.clone(),
                state,
                updated_at: Utc::now(),
            };
            let recommendations = recommend::build_recommendations(
                &self.agent,
                &self.mastery,
                &learner_id,
                &context_id,
                state,
                self.top_k,
            );
            self.persist(record, recommendations, 0).await;
        }
    }

    /// Persist state + history + recommendations with in-place retries.
    /// After exhausting retries the job is re-queued and the engine is
    /// marked degraded until a write succeeds again.
    async fn persist(
        &self,
        record: StateRecord,
        recommendations: RecommendationSet,
        requeue_attempt: usize,
    ) {
        let mut attempt = 0;
        loop {
            match self.try_persist(&record, &recommendations).await {
                Ok(()) => {
                    self.degraded.store(false, Ordering::SeqCst);
                    return;
                }
                Err(e) if attempt < self.config.retry_attempts => {
                    attempt += 1;
                    metrics::counter!("pipeline.persist_failures").increment(1);
                    warn!(
                        learner_id = %record.learner_id,
                        error = %e,
                        attempt,
                        "Persistence failed; retrying"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(
                        self.config.retry_backoff_ms * attempt as u64,
                    ))
                    .await;
                }
                Err(e) => {
                    metrics::counter!("pipeline.persist_failures").increment(1);
                    self.degraded.store(true, Ordering::SeqCst);
                    if requeue_attempt < MAX_REQUEUES {
                        warn!(
                            learner_id = %record.learner_id,
                            error = %e,
                            requeue_attempt,
                            "Persistence exhausted retries; re-queueing"
                        );
                        metrics::counter!("pipeline.requeues").increment(1);
                        let _ = self.tx.try_send(QueuedWork::Persist {
                            record,
                            recommendations,
                            requeue_attempt: requeue_attempt + 1,
                        });
                    } else {
                        error!(
                            learner_id = %record.learner_id,
                            error = %e,
                            "Dropping persist job after repeated failures"
                        );
                    }
                    return;
                }
            }
        }
    }

    async fn try_persist(
        &self,
        record: &StateRecord,
        recommendations: &RecommendationSet,
    ) -> LearnResult<()> {
        self.store.put_state(record).await?;
        self.store.append_history(record).await?;
        self.store.put_recommendations(recommendations).await?;
        Ok(())
    }
}
