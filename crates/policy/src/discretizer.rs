//! Feature discretization — quantizes the fractional state components into
//! a finite alphabet.
//!
//! Alphabet size raised to the state dimensionality is the total state
//! space, so the scheme directly trades representational fidelity against
//! table coverage: with K training events, expected coverage is
//! visited/possible states. Quartile edges keep the default space in the
//! low thousands; fixed-decimal binning is available where fidelity
//! matters more than coverage.

use learn_core::config::DiscretizerConfig;
use learn_core::error::{LearnError, LearnResult};

#[derive(Debug, Clone)]
enum BinScheme {
    /// Round to a fixed number of decimal places. Fine-grained; alphabet
    /// size is 10^precision + 1.
    FixedDecimal { precision: u8 },
    /// Map to the greatest edge <= value. Coarse; alphabet size is the
    /// edge count.
    Quantile { edges: Vec<f64> },
}

#[derive(Debug, Clone)]
pub struct Discretizer {
    scheme: BinScheme,
}

impl Discretizer {
    pub fn from_config(config: &DiscretizerConfig) -> LearnResult<Self> {
        let scheme = match config.scheme.as_str() {
            "fixed_decimal" => {
                if config.precision > 4 {
                    return Err(LearnError::Config(format!(
                        "fixed_decimal precision {} exceeds 4",
                        config.precision
                    )));
                }
                BinScheme::FixedDecimal {
                    precision: config.precision,
                }
            }
            "quantile" => {
                if config.edges.is_empty() {
                    return Err(LearnError::Config(
                        "quantile scheme requires at least one edge".to_string(),
                    ));
                }
                if !config.edges.windows(2).all(|w| w[0] < w[1]) {
                    return Err(LearnError::Config(
                        "quantile edges must be strictly ascending".to_string(),
                    ));
                }
                BinScheme::Quantile {
                    edges: config.edges.clone(),
                }
            }
            other => {
                return Err(LearnError::Config(format!(
                    "unknown discretizer scheme '{other}'"
                )));
            }
        };
        Ok(Self { scheme })
    }

    /// Bin a value, returning the bin edge. Values outside the scheme's
    /// range clamp to the nearest edge. Idempotent: an edge bins to itself.
    pub fn bin(&self, value: f64) -> f64 {
        match &self.scheme {
            BinScheme::FixedDecimal { precision } => {
                let factor = 10f64.powi(*precision as i32);
                (value.clamp(0.0, 1.0) * factor).round() / factor
            }
            BinScheme::Quantile { edges } => {
                let clamped = value.max(edges[0]);
                edges
                    .iter()
                    .rev()
                    .find(|edge| **edge <= clamped)
                    .copied()
                    .unwrap_or(edges[0])
            }
        }
    }

    /// Discrete label for a value, the form stored inside state tuples.
    pub fn bin_index(&self, value: f64) -> u16 {
        match &self.scheme {
            BinScheme::FixedDecimal { precision } => {
                let factor = 10f64.powi(*precision as i32);
                (value.clamp(0.0, 1.0) * factor).round() as u16
            }
            BinScheme::Quantile { edges } => {
                let clamped = value.max(edges[0]);
                edges
                    .iter()
                    .rposition(|edge| *edge <= clamped)
                    .unwrap_or(0) as u16
            }
        }
    }

    /// Size of the finite alphabet a single component is drawn from.
    pub fn alphabet_size(&self) -> usize {
        match &self.scheme {
            BinScheme::FixedDecimal { precision } => 10usize.pow(*precision as u32) + 1,
            BinScheme::Quantile { edges } => edges.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quantile() -> Discretizer {
        Discretizer::from_config(&DiscretizerConfig::default()).unwrap()
    }

    fn fixed_decimal() -> Discretizer {
        let config = DiscretizerConfig {
            scheme: "fixed_decimal".to_string(),
            precision: 1,
            edges: Vec::new(),
        };
        Discretizer::from_config(&config).unwrap()
    }

    #[test]
    fn quantile_maps_to_greatest_edge_below() {
        let d = quantile();
        assert_eq!(d.bin(0.3), 0.25);
        assert_eq!(d.bin(0.25), 0.25);
        assert_eq!(d.bin(0.99), 0.75);
        assert_eq!(d.bin_index(0.3), 1);
        assert_eq!(d.alphabet_size(), 4);
    }

    #[test]
    fn binning_is_idempotent() {
        for d in [quantile(), fixed_decimal()] {
            for raw in [0.0, 0.13, 0.25, 0.49, 0.5, 0.77, 1.0] {
                let once = d.bin(raw);
                assert_eq!(d.bin(once), once, "bin({raw}) not idempotent");
            }
        }
    }

    #[test]
    fn out_of_range_values_clamp_to_nearest_edge() {
        let d = quantile();
        assert_eq!(d.bin(-0.5), 0.0);
        assert_eq!(d.bin(7.0), 0.75);

        let f = fixed_decimal();
        assert_eq!(f.bin(-0.5), 0.0);
        assert_eq!(f.bin(7.0), 1.0);
    }

    #[test]
    fn fixed_decimal_rounds_and_counts_alphabet() {
        let d = fixed_decimal();
        assert_eq!(d.bin(0.44), 0.4);
        assert_eq!(d.bin(0.45), 0.5);
        assert_eq!(d.bin_index(0.45), 5);
        assert_eq!(d.alphabet_size(), 11);
    }

    #[test]
    fn invalid_schemes_are_rejected() {
        let bad = DiscretizerConfig {
            scheme: "quantile".to_string(),
            precision: 1,
            edges: vec![0.5, 0.25],
        };
        assert!(Discretizer::from_config(&bad).is_err());

        let unknown = DiscretizerConfig {
            scheme: "spline".to_string(),
            precision: 1,
            edges: Vec::new(),
        };
        assert!(Discretizer::from_config(&unknown).is_err());
    }
}
