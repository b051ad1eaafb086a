//! C7: splits a raw cluster/cycle matrix into sub-tiles according to a
//! block-spec.

use crate::blockspec::{DataBlock, DataBlockType};
use crate::{Cluster, Tile};
use ayb_matrix::Matrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TileError {
    /// The block-spec's total cycle count disagrees with the raw
    /// tile's.
    #[error("block-spec cycle count does not match the tile")]
    CycleMismatch,
}

/// Splits `raw` into a sequence of sub-tiles per `blocks`. Each
/// resulting sub-tile's clusters retain their `(lane, tile, x, y)`
/// identity; only the cycle columns are partitioned.
///
/// `READ` starts a new sub-tile (unless the current one is still
/// empty, i.e. two `READ`s with nothing between them keep extending
/// the same sub-tile). `CONCAT` appends to the current sub-tile.
/// `IGNORE` drops its columns. The total of every block's `num` must
/// equal the raw tile's cycle count.
pub fn split_tile(raw: &Tile, blocks: &[DataBlock]) -> Result<Vec<Tile>, TileError> {
    let total: u64 = blocks.iter().map(|b| b.num as u64).sum();
    let k_total = raw.ncycle().unwrap_or(0) as u64;
    if total != k_total {
        return Err(TileError::CycleMismatch);
    }

    // Per-cluster running column ranges for each sub-tile being built.
    // sub_tiles[i] holds a Vec<(start, end_exclusive)> of column
    // ranges already assigned to it.
    let mut sub_ranges: Vec<Vec<(usize, usize)>> = Vec::new();
    let mut col_cursor = 0usize;

    for block in blocks {
        let num = block.num as usize;
        match block.block_type {
            DataBlockType::Ignore => {
                col_cursor += num;
            }
            DataBlockType::Read => {
                if sub_ranges.last().map_or(true, |r| !r.is_empty()) {
                    sub_ranges.push(Vec::new());
                }
                sub_ranges
                    .last_mut()
                    .unwrap()
                    .push((col_cursor, col_cursor + num));
                col_cursor += num;
            }
            DataBlockType::Concat => {
                // Guaranteed non-empty by the parser's grammar check,
                // but an empty sub_ranges would mean a spec built by
                // hand outside the parser; guard defensively.
                let current = sub_ranges
                    .last_mut()
                    .expect("CONCAT with no current sub-tile: should be rejected by the parser");
                current.push((col_cursor, col_cursor + num));
                col_cursor += num;
            }
        }
    }

    let mut out = Vec::with_capacity(sub_ranges.len());
    for ranges in &sub_ranges {
        let clusters = raw
            .clusters
            .iter()
            .map(|c| {
                let mut signals = Matrix::new(0, 0);
                for &(start, end) in ranges {
                    Matrix::append_columns(&mut signals, &c.signals, start, end - 1)
                        .expect("ranges are derived from the tile's own column count");
                }
                Cluster {
                    x: c.x,
                    y: c.y,
                    signals,
                }
            })
            .collect();
        out.push(Tile {
            lane: raw.lane,
            tile_id: raw.tile_id,
            clusters,
        });
    }

    Ok(out)
}
