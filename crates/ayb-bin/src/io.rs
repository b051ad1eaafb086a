//! Minimal text I/O for intensities, seed matrices and calls.
//!
//! There is no binary Illumina format support here (`spec.md`
//! Non-goals); these readers/writers exist only so the CLI has
//! something concrete to drive the core with from a file.

use ayb_matrix::Matrix;
use ayb_model::Nuc;
use ayb_tile::{Cluster, Tile};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum IoFormatError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{path}:{line}: {msg}")]
    Parse { path: String, line: usize, msg: String },
    #[error("{0}")]
    Matrix(#[from] ayb_matrix::MatrixError),
    #[error("tile has no clusters")]
    EmptyTile,
}

fn parse_floats(path: &str, line_no: usize, line: &str) -> Result<Vec<f64>, IoFormatError> {
    line.split_whitespace()
        .map(|tok| {
            tok.parse::<f64>().map_err(|e| IoFormatError::Parse {
                path: path.to_string(),
                line: line_no,
                msg: format!("bad float {tok:?}: {e}"),
            })
        })
        .collect()
}

/// Reads a row-major whitespace-separated matrix: one line per row,
/// every row the same number of columns.
pub fn read_matrix(path: impl AsRef<Path>) -> Result<Matrix, IoFormatError> {
    let path_str = path.as_ref().display().to_string();
    let file = File::open(&path)?;
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push(parse_floats(&path_str, i + 1, &line)?);
    }
    let nrows = rows.len();
    let ncols = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|r| r.len() != ncols) {
        return Err(IoFormatError::Parse {
            path: path_str,
            line: 0,
            msg: "inconsistent row lengths".to_string(),
        });
    }
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Ok(Matrix::from_array(nrows, ncols, &flat)?)
}

/// Reads an intensity file into a single-lane, single-tile [`Tile`].
/// Each line is `x y i_{0,0} i_{0,1} ... i_{0,K-1} i_{1,0} ... i_{3,K-1}`:
/// the cluster coordinates followed by its `NBASE x K` intensity
/// matrix flattened in row-major (channel-major) order.
pub fn read_tile(path: impl AsRef<Path>, lane: u32, tile_id: u32) -> Result<Tile, IoFormatError> {
    use ayb_model::NBASE;

    let path_str = path.as_ref().display().to_string();
    let file = File::open(&path)?;
    let mut clusters = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields = parse_floats(&path_str, i + 1, &line)?;
        if fields.len() < 2 || (fields.len() - 2) % NBASE != 0 {
            return Err(IoFormatError::Parse {
                path: path_str.clone(),
                line: i + 1,
                msg: format!("expected `x y` plus a multiple of {NBASE} intensities, got {} fields", fields.len()),
            });
        }
        let x = fields[0] as u32;
        let y = fields[1] as u32;
        let ncycle = (fields.len() - 2) / NBASE;
        let signals = Matrix::from_array(NBASE, ncycle, &fields[2..])?;
        clusters.push(Cluster { x, y, signals });
    }
    if clusters.is_empty() {
        return Err(IoFormatError::EmptyTile);
    }
    Ok(Tile { lane, tile_id, clusters })
}

/// Emits one line per cluster: `cluster_{n}\t{bases}\t{quals}` for TSV,
/// or a two-line FASTA record (qualities dropped) for FASTA.
pub fn write_calls(
    out: &mut impl Write,
    bases: &[Vec<Nuc>],
    quals: &[Vec<u8>],
    format: ayb_core::OutputFormat,
) -> io::Result<()> {
    for (i, (calls, q)) in bases.iter().zip(quals.iter()).enumerate() {
        let seq: String = calls.iter().map(|c| Nuc::as_char(*c)).collect();
        match format {
            ayb_core::OutputFormat::Tsv => {
                let qstr: String = q.iter().map(|&v| ((v + 33).min(126) as char)).collect();
                writeln!(out, "cluster_{}\t{seq}\t{qstr}", i + 1)?;
            }
            ayb_core::OutputFormat::Fasta => {
                writeln!(out, ">cluster_{}", i + 1)?;
                writeln!(out, "{seq}")?;
            }
        }
    }
    Ok(())
}
