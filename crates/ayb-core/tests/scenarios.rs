//! End-to-end driver scenarios (property #7 and scenarios S1, S3, S4,
//! S5, S6 from `spec.md` §8; S2 lives in `ayb-estimate`'s own test
//! suite since it only exercises the MPN estimator, not the full
//! driver).

use ayb_core::{run, run_subtile, Config, SubtileOutcome};
use ayb_matrix::Matrix;
use ayb_model::Nuc;
use ayb_tile::{Cluster, Tile};

fn single_cluster_tile(signals: Matrix) -> Tile {
    Tile {
        lane: 1,
        tile_id: 1,
        clusters: vec![Cluster { x: 0, y: 0, signals }],
    }
}

/// S1: a noiseless diagonal intensity matrix should recover A,C,G,T
/// with high confidence under identity M, P and zero N.
#[test]
fn s1_noiseless_diagonal_recovers_acgt() {
    let signals = Matrix::from_array(
        4,
        4,
        &[
            10.0, 0.0, 0.0, 0.0, //
            0.0, 10.0, 0.0, 0.0, //
            0.0, 0.0, 10.0, 0.0, //
            0.0, 0.0, 0.0, 10.0, //
        ],
    )
    .unwrap();
    let tile = single_cluster_tile(signals);
    let mut config = Config::new(1e-5, 3).unwrap();
    config.seed_crosstalk = Some(Matrix::identity(4));
    config.seed_phasing = Some(Matrix::identity(4));
    config.seed_noise = Some(Matrix::new(4, 4));

    let state = run_subtile(tile, &config).unwrap();
    let calls = &state.bases[0];
    assert_eq!(calls, &vec![Nuc::A, Nuc::C, Nuc::G, Nuc::T]);
    for &q in &state.quals[0] {
        assert!(q >= 30, "quality too low: {q}");
    }
}

/// S3: block-spec "2R,3I,3R" on an 8-cycle tile yields sub-tiles of 2
/// and 3 cycles, in that order, each with the right per-cluster call
/// length.
#[test]
fn s3_blockspec_splits_into_two_and_three_cycle_subtiles() {
    let mut signals = Matrix::new(4, 8);
    for k in 0..8 {
        signals.set(k % 4, k, 5.0);
    }
    let tile = single_cluster_tile(signals);
    let config = Config::new(1e-5, 1).unwrap();

    let outcomes = run(&tile, "2R,3I,3R", &config).unwrap();
    assert_eq!(outcomes.len(), 2);
    let lens: Vec<usize> = outcomes
        .iter()
        .map(|o| match o {
            SubtileOutcome::Done(s) => s.ncycle,
            SubtileOutcome::Failed(_) => panic!("unexpected failure"),
        })
        .collect();
    assert_eq!(lens, vec![2, 3]);
    match &outcomes[0] {
        SubtileOutcome::Done(s) => assert_eq!(s.bases[0].len(), 2),
        _ => unreachable!(),
    }
    match &outcomes[1] {
        SubtileOutcome::Done(s) => assert_eq!(s.bases[0].len(), 3),
        _ => unreachable!(),
    }
}

/// S4: an all-zero seed phasing matrix is singular, so every alternating
/// half-step is ill-conditioned from the start and the sub-tile reports
/// `EstimateNonconvergent` without aborting the whole run.
#[test]
fn s4_singular_seed_phasing_is_isolated_nonconvergence() {
    let mut signals = Matrix::new(4, 3);
    for k in 0..3 {
        signals.set(k, k, 5.0);
    }
    let tile = single_cluster_tile(signals);
    let mut config = Config::new(1e-5, 2).unwrap();
    config.seed_phasing = Some(Matrix::new(3, 3)); // all zeros: singular

    let outcomes = run(&tile, "3R", &config).unwrap();
    assert_eq!(outcomes.len(), 1);
    match &outcomes[0] {
        SubtileOutcome::Failed(ayb_core::AybError::EstimateNonconvergent) => {}
        SubtileOutcome::Failed(other) => panic!("wrong failure kind: {other:?}"),
        SubtileOutcome::Done(_) => panic!("expected nonconvergence from a singular seed"),
    }
}

/// S5: a block-spec that requires more cycles than the tile has fails
/// before any sub-tile is attempted.
#[test]
fn s5_blockspec_wider_than_tile_is_insufficient_cycles() {
    let signals = Matrix::new(4, 3);
    let tile = single_cluster_tile(signals);
    let config = Config::new(1e-5, 1).unwrap();

    let err = run(&tile, "4R", &config).unwrap_err();
    assert_eq!(err, ayb_core::AybError::InsufficientCycles);
}

/// S6: an externally supplied crosstalk seed of the wrong shape is
/// rejected before any iteration begins.
#[test]
fn s6_wrong_shaped_seed_crosstalk_is_dim_mismatch() {
    let signals = Matrix::new(4, 3);
    let tile = single_cluster_tile(signals);
    let mut config = Config::new(1e-5, 1).unwrap();
    config.seed_crosstalk = Some(Matrix::new(3, 3));

    let err = run(&tile, "3R", &config).unwrap_err();
    assert_eq!(err, ayb_core::AybError::MatrixDimMismatch);
}

/// Property #7: running the driver twice on the same inputs with the
/// same tuning yields byte-identical (bases, quals) since the core is
/// a pure function of (Tile, tuning, optional seeds).
#[test]
fn property_7_driver_is_idempotent_across_runs() {
    let mut signals = Matrix::new(4, 5);
    for k in 0..5 {
        signals.set((k + 1) % 4, k, 7.0 + k as f64);
    }
    let config = Config::new(1e-5, 3).unwrap();

    let run_once = |tile: Tile| -> (Vec<Nuc>, Vec<u8>) {
        let state = run_subtile(tile, &config).unwrap();
        (state.bases[0].clone(), state.quals[0].clone())
    };

    let a = run_once(single_cluster_tile(signals.clone()));
    let b = run_once(single_cluster_tile(signals));
    assert_eq!(a, b);
}
