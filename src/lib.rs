//! Distributed hybrid-parallel agent-based grid simulator core.
//!
//! This crate is the per-cycle distributed simulation engine: deterministic
//! placement, the eight-direction stencil halo exchange, parallel agent
//! decision under a thread team, two-phase agent migration, season-driven
//! resource regeneration, and global metrics reduction. CLI parsing, an
//! interactive renderer, and CSV logging are explicitly out of scope —
//! callers bring their own and link against the types exported here.

pub mod agent;
pub mod config;
pub mod driver;
pub mod error;
pub mod grid;
pub mod halo;
pub mod metrics;
pub mod migration;
pub mod mpi_topology;
pub mod partition;
pub mod rng;
pub mod season;
pub mod topology;
pub mod workload;

pub use agent::{Agent, AgentWire};
pub use config::SimConfig;
pub use driver::{Driver, FrameSink, GatheredFrame, RunState};
pub use error::{SimError, SimResult};
pub use grid::{Cell, CellType, CellWire, SubGrid};
pub use metrics::{CyclePerf, SimMetrics};
pub use mpi_topology::MpiTopology;
pub use partition::Partition;
pub use season::Season;
pub use topology::{SerialTopology, Topology};

/// Installs a `tracing` subscriber from `RUST_LOG` (or `level` as a
/// fallback), matching the teacher's `setup_logging` convention. Safe to
/// call more than once — later calls are ignored.
pub fn init_tracing(level: Option<&str>) {
    let filter = level.unwrap_or("info");
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_new(filter).unwrap_or_default())
        .try_init();
}
