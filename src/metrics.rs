//! Local aggregation and global reduction of simulation metrics (spec §4.9)
//! and per-cycle phase timing (spec §6's "CyclePerf wire convention").

use crate::agent::Agent;
use crate::grid::SubGrid;
use crate::topology::Topology;

/// Aggregate simulation metrics, published identically on every rank after
/// `all_reduce`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SimMetrics {
    pub total_resource: f64,
    pub avg_energy: f64,
    pub max_energy: f64,
    pub min_energy: f64,
    pub alive_agents: u64,
}

impl SimMetrics {
    /// Local pass: sum resource over owned cells; sum/min/max/count of
    /// energy over alive agents.
    pub fn compute_local(sg: &SubGrid, agents: &[Agent]) -> Self {
        let total_resource = sg.total_resource();

        let mut sum_energy = 0.0;
        let mut max_e = f64::MIN;
        let mut min_e = f64::MAX;
        let mut alive = 0u64;

        for a in agents {
            if !a.alive {
                continue;
            }
            sum_energy += a.energy;
            max_e = max_e.max(a.energy);
            min_e = min_e.min(a.energy);
            alive += 1;
        }

        SimMetrics {
            total_resource,
            // Stashes the local energy sum; `all_reduce` turns this into
            // the true global average once alive counts are known.
            avg_energy: sum_energy,
            max_energy: if alive > 0 { max_e } else { 0.0 },
            min_energy: if alive > 0 { min_e } else { 0.0 },
            alive_agents: alive,
        }
    }

    /// Reduces this rank's local metrics with every other rank's (spec
    /// §4.9): SUM for resource/alive-count/energy-sum, MAX for max energy,
    /// MIN over ranks with at least one alive agent for min energy (others
    /// contribute `+inf`), then derives the true global average.
    pub fn all_reduce(&self, topology: &impl Topology) -> SimMetrics {
        let total_resource = topology.all_reduce_sum_f64(self.total_resource);
        let alive_agents = topology.all_reduce_sum_u64(self.alive_agents);
        let energy_sum = topology.all_reduce_sum_f64(self.avg_energy);
        let max_energy = topology.all_reduce_max_f64(self.max_energy);

        let local_min_sentinel = if self.alive_agents > 0 { self.min_energy } else { f64::INFINITY };
        let min_energy_reduced = topology.all_reduce_min_f64(local_min_sentinel);

        let avg_energy = if alive_agents > 0 {
            energy_sum / alive_agents as f64
        } else {
            0.0
        };
        let min_energy = if alive_agents > 0 { min_energy_reduced } else { 0.0 };

        SimMetrics {
            total_resource,
            avg_energy,
            max_energy,
            min_energy,
            alive_agents,
        }
    }
}

/// Per-cycle phase wallclock, max-reduced across ranks to rank 0 (spec §6).
/// Field order matches the original's "contiguous doubles" convention: the
/// `#[repr(C)]` layout here is load-bearing for a single reduce call over
/// all timing fields at once, so new fields must be added at the end, not
/// interleaved with metadata.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[repr(C)]
pub struct CyclePerf {
    pub cycle: f64,
    pub season: f64,
    pub halo: f64,
    pub workload: f64,
    pub agent: f64,
    pub grid: f64,
    pub migrate: f64,
    pub metrics: f64,
    pub render: f64,
}

impl CyclePerf {
    pub fn as_slice(&self) -> [f64; 9] {
        [
            self.cycle,
            self.season,
            self.halo,
            self.workload,
            self.agent,
            self.grid,
            self.migrate,
            self.metrics,
            self.render,
        ]
    }

    pub fn from_slice(v: [f64; 9]) -> Self {
        CyclePerf {
            cycle: v[0],
            season: v[1],
            halo: v[2],
            workload: v[3],
            agent: v[4],
            grid: v[5],
            migrate: v[6],
            metrics: v[7],
            render: v[8],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellType;
    use crate::topology::SerialTopology;

    fn grid_with_resource(total: f64) -> SubGrid {
        let mut g = SubGrid::create(2, 1, 0, 0);
        *g.get_mut(1, 1) = crate::grid::Cell {
            cell_type: CellType::Gathering,
            resource: total,
            max_resource: 1.0,
            accessible: true,
        };
        g
    }

    #[test]
    fn local_metrics_ignore_dead_agents() {
        let g = grid_with_resource(0.4);
        let agents = vec![
            Agent { id: 0, gx: 0, gy: 0, energy: 1.0, alive: true },
            Agent { id: 1, gx: 0, gy: 0, energy: 99.0, alive: false },
        ];
        let m = SimMetrics::compute_local(&g, &agents);
        assert_eq!(m.alive_agents, 1);
        assert_eq!(m.max_energy, 1.0);
        assert_eq!(m.min_energy, 1.0);
    }

    #[test]
    fn no_alive_agents_yields_zero_avg_and_min() {
        let g = grid_with_resource(0.0);
        let m = SimMetrics::compute_local(&g, &[]).all_reduce(&SerialTopology);
        assert_eq!(m.alive_agents, 0);
        assert_eq!(m.avg_energy, 0.0);
        assert_eq!(m.min_energy, 0.0);
    }

    #[test]
    fn serial_all_reduce_is_identity() {
        let g = grid_with_resource(0.4);
        let agents = vec![Agent { id: 0, gx: 0, gy: 0, energy: 2.0, alive: true }];
        let local = SimMetrics::compute_local(&g, &agents);
        let global = local.all_reduce(&SerialTopology);
        assert_eq!(global.total_resource, 0.4);
        assert_eq!(global.alive_agents, 1);
        assert_eq!(global.avg_energy, 2.0);
    }

    #[test]
    fn cycle_perf_roundtrips_through_contiguous_slice() {
        let perf = CyclePerf {
            cycle: 1.0,
            season: 2.0,
            halo: 3.0,
            workload: 4.0,
            agent: 5.0,
            grid: 6.0,
            migrate: 7.0,
            metrics: 8.0,
            render: 9.0,
        };
        assert_eq!(CyclePerf::from_slice(perf.as_slice()), perf);
    }
}
