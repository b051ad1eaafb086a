//! Domain types and the four small per-cluster/per-cycle model pieces
//! that operate directly on processed intensities: the intensity
//! processor (C2), brightness estimator (C3), base caller (C4) and
//! covariance estimator (C6). These are grouped in one crate because
//! every one of them speaks the same `Nuc`/processed-intensity
//! vocabulary and none of them needs the others' internals hidden.

mod brightness;
mod caller;
mod covariance;
mod process;

pub use brightness::{estimate_lambda_ols, estimate_lambda_wls};
pub use caller::{call_base, call_base_simple, quality_from_prob, BaseCall};
pub use covariance::{estimate_covariance, CovarianceResult};
pub use process::{process, process_into};

pub use ayb_matrix::{Matrix, MatrixError};

/// Number of nucleotide channels.
pub const NBASE: usize = 4;

pub const MIN_QUALITY: u8 = 0;
pub const MAX_QUALITY: u8 = 62;

/// A called nucleotide, or `Ambig` when no single channel dominates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nuc {
    A,
    C,
    G,
    T,
    Ambig,
}

impl Nuc {
    /// The four real bases in their canonical channel order.
    pub const BASES: [Nuc; NBASE] = [Nuc::A, Nuc::C, Nuc::G, Nuc::T];

    /// Channel index `0..NBASE`, or `None` for `Ambig`.
    pub fn channel(self) -> Option<usize> {
        match self {
            Nuc::A => Some(0),
            Nuc::C => Some(1),
            Nuc::G => Some(2),
            Nuc::T => Some(3),
            Nuc::Ambig => None,
        }
    }

    pub fn from_channel(c: usize) -> Nuc {
        Nuc::BASES[c]
    }

    pub fn as_char(self) -> char {
        match self {
            Nuc::A => 'A',
            Nuc::C => 'C',
            Nuc::G => 'G',
            Nuc::T => 'T',
            Nuc::Ambig => 'N',
        }
    }
}

impl std::fmt::Display for Nuc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Clamps a raw quality value into `[MIN_QUALITY, MAX_QUALITY]`.
pub fn clamp_quality(q: i64) -> u8 {
    q.clamp(MIN_QUALITY as i64, MAX_QUALITY as i64) as u8
}
