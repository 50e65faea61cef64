//! Value-table checkpointing with fingerprint verification.
//!
//! The fingerprint stored inside a checkpoint names the discretization
//! scheme and catalog shape the table was trained under. Restoring under
//! a different configuration would silently corrupt every lookup, so a
//! mismatch is fatal at startup rather than recoverable.

use learn_core::error::{LearnError, LearnResult};
use learn_policy::PolicyAgent;
use learn_store::Store;
use tracing::{info, warn};

/// Restore the agent from the store's checkpoint slot, if one exists.
/// Returns the number of restored entries.
pub async fn restore_or_init(
    agent: &PolicyAgent,
    store: &Store,
    active_fingerprint: &str,
) -> LearnResult<usize> {
    match store.load_checkpoint().await? {
        Some(checkpoint) => {
            if checkpoint.fingerprint != active_fingerprint {
                return Err(LearnError::FingerprintMismatch {
                    stored: checkpoint.fingerprint,
                    active: active_fingerprint.to_string(),
                });
            }
            agent.restore(&checkpoint)?;
            info!(
                entries = checkpoint.entries.len(),
                episode = checkpoint.episode,
                "Restored value table from checkpoint"
            );
            Ok(checkpoint.entries.len())
        }
        None => {
            info!("No checkpoint found; starting with an empty value table");
            Ok(0)
        }
    }
}

/// Persist the current table. Failures are logged and surfaced, not
/// fatal: the next cadence tick retries.
pub async fn save(agent: &PolicyAgent, store: &Store, fingerprint: &str) -> LearnResult<()> {
    let checkpoint = agent.snapshot(fingerprint.to_string());
    let entries = checkpoint.entries.len();
    match store.save_checkpoint(&checkpoint).await {
        Ok(()) => {
            info!(entries, episode = checkpoint.episode, "Checkpointed value table");
            metrics::counter!("pipeline.checkpoints").increment(1);
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Value-table checkpoint failed");
            metrics::counter!("pipeline.checkpoint_failures").increment(1);
            Err(e)
        }
    }
}
