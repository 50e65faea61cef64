//! In-process store backed by DashMap, for development and tests.

use dashmap::DashMap;
use learn_core::error::{LearnError, LearnResult};
use learn_core::types::{RecommendationSet, StateRecord, TableCheckpoint};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct MemoryStore {
    states: DashMap<(String, String), StateRecord>,
    history: DashMap<(String, String), Vec<StateRecord>>,
    recommendations: DashMap<(String, String), RecommendationSet>,
    checkpoint: RwLock<Option<TableCheckpoint>>,
    /// Fault injection for pipeline retry tests: the next N writes fail.
    fail_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
            history: DashMap::new(),
            recommendations: DashMap::new(),
            checkpoint: RwLock::new(None),
            fail_writes: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` write operations fail with a store error.
    pub fn inject_write_failures(&self, count: usize) {
        self.fail_writes.store(count, Ordering::SeqCst);
    }

    fn check_write(&self) -> LearnResult<()> {
        let remaining = self.fail_writes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_writes.store(remaining - 1, Ordering::SeqCst);
            return Err(LearnError::Store("injected write failure".to_string()));
        }
        Ok(())
    }

    fn key(learner_id: &str, context_id: &str) -> (String, String) {
        (learner_id.to_string(), context_id.to_string())
    }

    pub fn put_state(&self, record: &StateRecord) -> LearnResult<()> {
        self.check_write()?;
        self.states.insert(
            Self::key(&record.learner_id, &record.context_id),
            record.clone(),
        );
        Ok(())
    }

    pub fn get_state(
        &self,
        learner_id: &str,
        context_id: &str,
    ) -> LearnResult<Option<StateRecord>> {
        Ok(self
            .states
            .get(&Self::key(learner_id, context_id))
            .map(|record| record.clone()))
    }

    pub fn append_history(&self, record: &StateRecord) -> LearnResult<()> {
        self.check_write()?;
        self.history
            .entry(Self::key(&record.learner_id, &record.context_id))
            .or_default()
            .push(record.clone());
        Ok(())
    }

    pub fn history(&self, learner_id: &str, context_id: &str) -> LearnResult<Vec<StateRecord>> {
        Ok(self
            .history
            .get(&Self::key(learner_id, context_id))
            .map(|records| records.clone())
            .unwrap_or_default())
    }

    pub fn put_recommendations(&self, set: &RecommendationSet) -> LearnResult<()> {
        self.check_write()?;
        self.recommendations
            .insert(Self::key(&set.learner_id, &set.context_id), set.clone());
        Ok(())
    }

    pub fn get_recommendations(
        &self,
        learner_id: &str,
        context_id: &str,
    ) -> LearnResult<Option<RecommendationSet>> {
        Ok(self
            .recommendations
            .get(&Self::key(learner_id, context_id))
            .map(|set| set.clone()))
    }

    pub fn save_checkpoint(&self, checkpoint: &TableCheckpoint) -> LearnResult<()> {
        self.check_write()?;
        *self.checkpoint.write() = Some(checkpoint.clone());
        Ok(())
    }

    pub fn load_checkpoint(&self) -> LearnResult<Option<TableCheckpoint>> {
        Ok(self.checkpoint.read().clone())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use learn_core::types::{EngagementLevel, LearnerState, LearningPhase};

    fn record(learner: &str) -> StateRecord {
        StateRecord {
            learner_id: learner.to_string(),
            context_id: "course-101".to_string(),
            state: LearnerState {
                segment: 0,
                module_index: 1,
                progress_bin: 2,
                score_bin: 1,
                phase: LearningPhase::Middle,
                engagement: EngagementLevel::High,
            },
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn state_round_trips_and_history_appends() {
        let store = MemoryStore::new();
        store.put_state(&record("l-1")).unwrap();
        store.append_history(&record("l-1")).unwrap();
        store.append_history(&record("l-1")).unwrap();

        assert!(store.get_state("l-1", "course-101").unwrap().is_some());
        assert!(store.get_state("l-2", "course-101").unwrap().is_none());
        assert_eq!(store.history("l-1", "course-101").unwrap().len(), 2);
    }

    #[test]
    fn injected_failures_surface_as_store_errors() {
        let store = MemoryStore::new();
        store.inject_write_failures(1);
        assert!(store.put_state(&record("l-1")).is_err());
        assert!(store.put_state(&record("l-1")).is_ok());
    }
}
