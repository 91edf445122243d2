//! Error taxonomy for the simulation core (spec §7).
//!
//! Everything here is fatal: there is no steady-state recoverable error
//! channel. Configuration and topology failures are meant to be caught
//! before the first cycle and reported on rank 0 before the world aborts.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid world shape: global_w={global_w} global_h={global_h} (both must be > 0)")]
    InvalidShape { global_w: usize, global_h: usize },

    #[error("zero process count")]
    ZeroProcessCount,

    #[error("failed to construct Cartesian topology for {size} ranks shaped {px}x{py}")]
    TopologyInit { size: i32, px: i32, py: i32 },

    #[error("season_length must be > 0")]
    InvalidSeasonLength,

    #[error("reproduction requires both reproduce_threshold and reproduce_cost to be set")]
    IncompleteReproductionConfig,

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SimResult<T> = Result<T, SimError>;
