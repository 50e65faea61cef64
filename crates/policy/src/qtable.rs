//! Sparse concurrent value table — the single evolving knowledge base
//! shared across learners.
//!
//! Keys are (state, action index); entries exist only for visited pairs,
//! never pre-allocated over the full state space. Per-key updates run
//! under the map's shard lock, so concurrent writers on different keys
//! cannot corrupt each other.

use chrono::Utc;
use dashmap::DashMap;
use learn_core::action::Action;
use learn_core::error::{LearnError, LearnResult};
use learn_core::types::{CheckpointEntry, LearnerState, TableCheckpoint};
use std::collections::HashSet;

pub struct ValueTable {
    entries: DashMap<(LearnerState, u8), f64>,
}

impl ValueTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Estimate for a (state, action) pair; unseen pairs read as 0.
    pub fn get(&self, state: LearnerState, action_index: u8) -> f64 {
        self.entries
            .get(&(state, action_index))
            .map(|v| *v)
            .unwrap_or(0.0)
    }

    /// Atomically transform the value for one key under its shard lock.
    /// Returns the new value. The closure must not touch the table.
    pub fn apply(&self, state: LearnerState, action_index: u8, f: impl FnOnce(f64) -> f64) -> f64 {
        let mut entry = self.entries.entry((state, action_index)).or_insert(0.0);
        *entry = f(*entry);
        *entry
    }

    /// Bootstrap maximum over the full action set; unseen pairs read as 0,
    /// so a state with no entries yields 0 rather than an error.
    pub fn max_value(&self, state: LearnerState) -> f64 {
        (0..Action::COUNT as u8)
            .map(|action_index| self.get(state, action_index))
            .fold(0.0f64, f64::max)
    }

    /// Greedy action over *existing* entries for a state, ties broken by
    /// the lowest action index. None when the state has never been seen.
    pub fn best_action(&self, state: LearnerState) -> Option<(Action, f64)> {
        let mut best: Option<(u8, f64)> = None;
        for action_index in 0..Action::COUNT as u8 {
            if let Some(value) = self.entries.get(&(state, action_index)).map(|v| *v) {
                let better = match best {
                    Some((_, best_value)) => value > best_value,
                    None => true,
                };
                if better {
                    best = Some((action_index, value));
                }
            }
        }
        best.and_then(|(index, value)| Action::from_index(index).map(|action| (action, value)))
    }

    /// Existing per-action estimates for a state, in index order.
    pub fn estimates(&self, state: LearnerState) -> Vec<(Action, f64)> {
        (0..Action::COUNT as u8)
            .filter_map(|action_index| {
                let value = self.entries.get(&(state, action_index)).map(|v| *v)?;
                Action::from_index(action_index).map(|action| (action, value))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct states with at least one entry.
    pub fn coverage(&self) -> usize {
        let mut states = HashSet::new();
        for entry in self.entries.iter() {
            states.insert(entry.key().0);
        }
        states.len()
    }

    /// Serialize every entry for checkpointing.
    pub fn snapshot(&self, fingerprint: String, episode: u64) -> TableCheckpoint {
        let entries = self
            .entries
            .iter()
            .map(|entry| CheckpointEntry {
                state: entry.key().0,
                action_index: entry.key().1,
                value: *entry.value(),
            })
            .collect();
        TableCheckpoint {
            fingerprint,
            episode,
            entries,
            saved_at: Utc::now(),
        }
    }

    /// Replace the table contents from a checkpoint. The caller is
    /// responsible for fingerprint verification; this only rejects
    /// structurally invalid entries.
    pub fn restore(&self, checkpoint: &TableCheckpoint) -> LearnResult<()> {
        for entry in &checkpoint.entries {
            if entry.action_index as usize >= Action::COUNT {
                return Err(LearnError::Validation(format!(
                    "checkpoint entry has action index {} outside the catalog",
                    entry.action_index
                )));
            }
        }
        self.entries.clear();
        for entry in &checkpoint.entries {
            self.entries
                .insert((entry.state, entry.action_index), entry.value);
        }
        Ok(())
    }
}

impl Default for ValueTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use learn_core::types::{EngagementLevel, LearningPhase};

    fn state(progress_bin: u16) -> LearnerState {
        LearnerState {
            segment: 1,
            module_index: 2,
            progress_bin,
            score_bin: 1,
            phase: LearningPhase::Middle,
            engagement: EngagementLevel::Moderate,
        }
    }

    #[test]
    fn unseen_pairs_read_as_zero() {
        let table = ValueTable::new();
        assert_eq!(table.get(state(0), 3), 0.0);
        assert_eq!(table.max_value(state(0)), 0.0);
        assert!(table.best_action(state(0)).is_none());
    }

    #[test]
    fn apply_updates_in_place() {
        let table = ValueTable::new();
        let value = table.apply(state(0), 2, |q| q + 1.5);
        assert_eq!(value, 1.5);
        let value = table.apply(state(0), 2, |q| q + 0.5);
        assert_eq!(value, 2.0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn best_action_breaks_ties_on_lowest_index() {
        let table = ValueTable::new();
        table.apply(state(0), 7, |_| 1.0);
        table.apply(state(0), 3, |_| 1.0);
        let (action, value) = table.best_action(state(0)).unwrap();
        assert_eq!(action.index(), 3);
        assert_eq!(value, 1.0);
    }

    #[test]
    fn coverage_counts_distinct_states() {
        let table = ValueTable::new();
        table.apply(state(0), 0, |_| 1.0);
        table.apply(state(0), 1, |_| 1.0);
        table.apply(state(1), 0, |_| 1.0);
        assert_eq!(table.coverage(), 2);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn snapshot_restore_round_trips() {
        let table = ValueTable::new();
        table.apply(state(0), 4, |_| 2.5);
        table.apply(state(1), 0, |_| -1.0);

        let checkpoint = table.snapshot("fp".to_string(), 9);
        assert_eq!(checkpoint.episode, 9);

        let restored = ValueTable::new();
        restored.restore(&checkpoint).unwrap();
        assert_eq!(restored.get(state(0), 4), 2.5);
        assert_eq!(restored.get(state(1), 0), -1.0);
        assert_eq!(restored.len(), 2);
    }

    #[test]
    fn restore_rejects_out_of_catalog_actions() {
        let table = ValueTable::new();
        let mut checkpoint = table.snapshot("fp".to_string(), 0);
        checkpoint.entries.push(CheckpointEntry {
            state: state(0),
            action_index: 99,
            value: 1.0,
        });
        assert!(ValueTable::new().restore(&checkpoint).is_err());
    }
}
