//! The tuning surface from `spec.md` §3/§6, realised as a single
//! immutable value rather than the module-level globals `spec.md` §9
//! flags as an anti-pattern.

use crate::error::{AybError, Result};
use ayb_matrix::Matrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `cluster_{n}\t{bases}\t{quals}` one line per cluster.
    Tsv,
    /// FASTA-like sequence-only emission (qualities dropped).
    Fasta,
}

/// Process-wide tuning, constructed once and passed by reference into
/// the driver. Never read from global or thread-local state.
#[derive(Debug, Clone)]
pub struct Config {
    pub mu: f64,
    pub n_iter: usize,
    pub output_format: OutputFormat,
    pub seed_crosstalk: Option<Matrix>,
    pub seed_noise: Option<Matrix>,
    pub seed_phasing: Option<Matrix>,
    /// `ncluster * ncycle` ceiling before a sub-tile is abandoned with
    /// `OutOfMemory`.
    pub max_cells: usize,
}

impl Config {
    pub fn new(mu: f64, n_iter: usize) -> Result<Self> {
        let cfg = Config {
            mu,
            n_iter,
            output_format: OutputFormat::Tsv,
            seed_crosstalk: None,
            seed_noise: None,
            seed_phasing: None,
            max_cells: 50_000_000,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.mu > 0.0) {
            return Err(AybError::InvalidConfig("mu must be > 0"));
        }
        if self.n_iter < 1 {
            return Err(AybError::InvalidConfig("n_iter must be >= 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_nonpositive_mu() {
        assert_eq!(Config::new(0.0, 3).unwrap_err(), AybError::InvalidConfig("mu must be > 0"));
    }

    #[test]
    fn rejects_zero_iterations() {
        assert_eq!(
            Config::new(1e-5, 0).unwrap_err(),
            AybError::InvalidConfig("n_iter must be >= 1")
        );
    }

    #[test]
    fn accepts_sane_defaults() {
        assert!(Config::new(1e-5, 3).is_ok());
    }
}
