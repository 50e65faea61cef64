//! Configuration fingerprint stored alongside every value-table checkpoint.
//!
//! Value-table keys are scheme-dependent: a table trained under one
//! discretization cannot be read under another without silent corruption.
//! The fingerprint canonicalizes everything that shapes table keys (and
//! the reward variant that shapes table values) so a mismatch is detected
//! explicitly at startup.

use crate::action::Action;
use crate::config::DiscretizerConfig;
use sha2::{Digest, Sha256};

/// Tag for the active reward composition. Bumped when the reward model
/// changes shape, so an old table cannot silently absorb a new value scale.
pub const REWARD_VARIANT: &str = "mastery_aware_v1";

/// Compute the fingerprint of the active configuration.
pub fn scheme_fingerprint(discretizer: &DiscretizerConfig) -> String {
    let mut canonical = format!(
        "v1|scheme={}|precision={}|actions={}|variant={}",
        discretizer.scheme,
        discretizer.precision,
        Action::COUNT,
        REWARD_VARIANT
    );
    for edge in &discretizer.edges {
        canonical.push_str(&format!("|{edge:.6}"));
    }
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_equal_configs() {
        let a = DiscretizerConfig::default();
        let b = DiscretizerConfig::default();
        assert_eq!(scheme_fingerprint(&a), scheme_fingerprint(&b));
    }

    #[test]
    fn fingerprint_changes_with_scheme_and_edges() {
        let base = DiscretizerConfig::default();
        let mut finer = DiscretizerConfig::default();
        finer.edges = vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];
        assert_ne!(scheme_fingerprint(&base), scheme_fingerprint(&finer));

        let mut decimal = DiscretizerConfig::default();
        decimal.scheme = "fixed_decimal".to_string();
        assert_ne!(scheme_fingerprint(&base), scheme_fingerprint(&decimal));
    }
}
