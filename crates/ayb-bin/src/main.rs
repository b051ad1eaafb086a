mod io;

use ayb_core::{run, AybError, Config, OutputFormat, SubtileOutcome};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(ValueEnum, Debug, Clone, Copy)]
enum OutputFormatArg {
    Tsv,
    Fasta,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(f: OutputFormatArg) -> OutputFormat {
        match f {
            OutputFormatArg::Tsv => OutputFormat::Tsv,
            OutputFormatArg::Fasta => OutputFormat::Fasta,
        }
    }
}

/// AYB: statistical base calling from per-cycle Illumina intensities.
#[derive(Parser)]
#[clap(author, about)]
struct Cli {
    /// Intensity file: one cluster per line, `x y` followed by its
    /// flattened `NBASE x K` signal matrix.
    #[arg(short, long)]
    input: PathBuf,

    /// Where to write calls. Defaults to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Block-spec describing how to split the tile into sub-tiles,
    /// e.g. `"2R,3I,3R"`. Defaults to one read covering every cycle in
    /// the loaded tile.
    #[arg(long)]
    blockspec: Option<String>,

    /// Posterior-probability tolerance for the base caller.
    #[arg(long, default_value_t = 1e-5)]
    mu: f64,

    /// Number of estimate/re-call rounds per sub-tile.
    #[arg(long, default_value_t = 4)]
    n_iter: usize,

    /// Call output format.
    #[arg(long, value_enum, default_value = "tsv")]
    output_format: OutputFormatArg,

    /// Optional seed crosstalk matrix (`NBASE x NBASE`, row-major text).
    #[arg(long)]
    crosstalk: Option<PathBuf>,

    /// Optional seed noise matrix (`NBASE x K`, row-major text).
    #[arg(long)]
    noise: Option<PathBuf>,

    /// Optional seed phasing matrix (`K x K`, row-major text).
    #[arg(long)]
    phasing: Option<PathBuf>,

    /// `ncluster * ncycle` ceiling before a sub-tile is abandoned.
    #[arg(long)]
    max_cells: Option<usize>,

    /// Flowcell lane number to attach to the loaded tile.
    #[arg(long, default_value_t = 1)]
    lane: u32,

    /// Tile id to attach to the loaded tile.
    #[arg(long, default_value_t = 1)]
    tile_id: u32,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Format(#[from] io::IoFormatError),
    #[error(transparent)]
    Ayb(#[from] AybError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ayb: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_cli(cli: Cli) -> Result<(), CliError> {
    let tile = io::read_tile(&cli.input, cli.lane, cli.tile_id)?;

    let mut config = Config::new(cli.mu, cli.n_iter)?;
    config.output_format = cli.output_format.into();
    if let Some(max_cells) = cli.max_cells {
        config.max_cells = max_cells;
    }
    if let Some(path) = &cli.crosstalk {
        config.seed_crosstalk = Some(io::read_matrix(path)?);
    }
    if let Some(path) = &cli.noise {
        config.seed_noise = Some(io::read_matrix(path)?);
    }
    if let Some(path) = &cli.phasing {
        config.seed_phasing = Some(io::read_matrix(path)?);
    }

    let blockspec = match &cli.blockspec {
        Some(spec) => spec.clone(),
        None => format!("{}R", tile.ncycle().unwrap_or(0)),
    };
    let outcomes = run(&tile, &blockspec, &config)?;

    let mut sink: Box<dyn std::io::Write> = match &cli.output {
        Some(path) => Box::new(std::fs::File::create(path)?),
        None => Box::new(std::io::stdout()),
    };

    for outcome in &outcomes {
        match outcome {
            SubtileOutcome::Done(state) => {
                io::write_calls(&mut sink, &state.bases, &state.quals, config.output_format)?;
            }
            SubtileOutcome::Failed(err) => {
                tracing::warn!(%err, "sub-tile skipped in output");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn cli_is_well_formed() {
        <super::Cli as clap::CommandFactory>::command().debug_assert();
    }
}
