//! Top-level error enum (`spec.md` §6 exit semantics / §7 error kinds),
//! aggregating the lower crates' error types with `#[from]` so `?`
//! composes across crate boundaries.

use ayb_matrix::MatrixError;
use ayb_tile::{BlockSpecError, TileError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AybError {
    /// The MPN estimator could not make progress on a sub-tile (both
    /// halves of some inner iteration were too ill-conditioned).
    #[error("MPN estimator did not converge for this sub-tile")]
    EstimateNonconvergent,
    /// The supplied tile has fewer cycles than the block-spec requires.
    #[error("tile has fewer cycles than the block-spec requires")]
    InsufficientCycles,
    /// Block-spec parse or semantic failure.
    #[error("bad block-spec: {0}")]
    BadBlockspec(#[from] BlockSpecError),
    /// Block-spec/tile cycle-count mismatch surfaced by the tile
    /// splitter.
    #[error("tile split failed: {0}")]
    TileSplit(#[from] TileError),
    /// A matrix operation hit a structural or numerical problem
    /// (`INVALID_DIM`, `SINGULAR`, `NEAR_SINGULAR`).
    #[error("matrix error: {0}")]
    Matrix(#[from] MatrixError),
    /// An externally supplied seed matrix's shape disagrees with the
    /// sub-tile's `(ncluster, ncycle)`.
    #[error("seed matrix dimensions do not match the sub-tile")]
    MatrixDimMismatch,
    /// `ncluster * ncycle` for this sub-tile exceeds `Config::max_cells`.
    #[error("sub-tile exceeds the configured cell ceiling")]
    OutOfMemory,
    /// `Config` constructed with `mu <= 0` or `n_iter == 0`.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = std::result::Result<T, AybError>;
