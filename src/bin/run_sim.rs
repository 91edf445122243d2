//! Headless demo entry point.
//!
//! Wires a default `SimConfig` through `Driver` under a real MPI universe.
//! Argument parsing, an interactive renderer, and CSV/metrics export are
//! out of scope (spec §1's Non-goals) — this binary exists to prove the
//! engine runs end to end under `mpiexec`, nothing more.

use anyhow::Context;

use ippd_sim::{init_tracing, Driver, MpiTopology, SimConfig, Topology};

fn main() -> anyhow::Result<()> {
    init_tracing(None);

    let config = SimConfig::default();
    let topology = MpiTopology::init(config.global_w, config.global_h)
        .context("failed to initialize MPI topology")?;
    let rank = topology.rank();

    let mut driver = Driver::new(config, topology).context("failed to initialize driver")?;
    let metrics = driver.run(false, None);

    if rank == 0 {
        tracing::info!(
            total_resource = metrics.total_resource,
            alive_agents = metrics.alive_agents,
            avg_energy = metrics.avg_energy,
            "simulation complete"
        );
    }

    Ok(())
}
