//! AYB model state, tuning configuration, the top-level error type and
//! the C8 driver loop tying the lower crates together into one
//! sub-tile-at-a-time base-calling pass.

mod config;
mod driver;
mod error;
mod state;

pub use config::{Config, OutputFormat};
pub use driver::{run, run_subtile, SubtileOutcome};
pub use error::{AybError, Result};
pub use state::{crosstalk_prior, AybState};

pub use ayb_tile::{parse_blockspec, split_tile, BlockSpecError, Cluster, DataBlock, DataBlockType, Tile, TileError};
