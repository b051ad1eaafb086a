//! Per-sub-tile AYB model state (`spec.md` §3).

use ayb_matrix::Matrix;
use ayb_model::{Nuc, NBASE};
use ayb_tile::Tile;

/// The built-in 4x4 crosstalk prior: a near-diagonal matrix encoding
/// standard Illumina channel bleed (A/C and G/T bleed into each other
/// more than the other cross-pairs), used whenever no external `M₀`
/// seed is supplied. Row/column order is `A, C, G, T`.
pub fn crosstalk_prior() -> Matrix {
    Matrix::from_array(
        NBASE,
        NBASE,
        &[
            1.00, 0.10, 0.02, 0.00, //
            0.08, 1.00, 0.05, 0.01, //
            0.01, 0.06, 1.00, 0.09, //
            0.00, 0.02, 0.07, 1.00, //
        ],
    )
    .expect("fixed 4x4 literal")
}

/// Owned model state for one sub-tile.
#[derive(Debug)]
pub struct AybState {
    pub ncluster: usize,
    pub ncycle: usize,
    pub m: Matrix,
    pub p: Matrix,
    pub n: Matrix,
    pub lambda: Vec<f64>,
    pub weight: Vec<f64>,
    pub cycle_var: Vec<f64>,
    pub tile: Tile,
    pub bases: Vec<Vec<Nuc>>,
    pub quals: Vec<Vec<u8>>,
}

impl AybState {
    pub fn new(tile: Tile, m: Matrix, p: Matrix, n: Matrix) -> Self {
        let ncluster = tile.ncluster();
        let ncycle = tile.ncycle().unwrap_or(0);
        AybState {
            ncluster,
            ncycle,
            m,
            p,
            n,
            lambda: vec![0.0; ncluster],
            weight: vec![1.0; ncluster],
            cycle_var: vec![0.0; ncycle],
            tile,
            bases: vec![vec![Nuc::Ambig; ncycle]; ncluster],
            quals: vec![vec![0u8; ncycle]; ncluster],
        }
    }
}
