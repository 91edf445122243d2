//! The per-cycle driver loop (spec §4.10).
//!
//! `Driver` sequences the ten phases spec §4.10 lists, owns the run's
//! mutable state (cycle index, quit flag, reproduction id counter), and
//! accumulates per-cycle phase timing into a `CyclePerf` that the caller
//! max-reduces to rank 0 (spec §6).

use std::time::Instant;

use tracing::{debug, info};

use crate::agent::{agents_init, agents_process, agents_reproduce, Agent, AgentWire};
use crate::config::SimConfig;
use crate::error::SimResult;
use crate::grid::{CellWire, SubGrid};
use crate::halo;
use crate::metrics::{CyclePerf, SimMetrics};
use crate::migration::migrate;
use crate::partition::Partition;
use crate::season::Season;
use crate::topology::{Direction, Topology};

/// Mutable run state that isn't part of the immutable `SimConfig` (spec §9
/// "Global state" — passed explicitly, never a hidden global).
pub struct RunState {
    pub cycle: u64,
    pub quit: bool,
}

impl RunState {
    pub fn new() -> Self {
        RunState { cycle: 0, quit: false }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// A rank-0-only snapshot assembled by `Driver::gather_to_root`, handed to
/// an external renderer/CSV-logger (both explicitly out of scope here —
/// this is the "collector interface" spec §1 mentions).
pub struct GatheredFrame {
    pub global_w: usize,
    pub global_h: usize,
    pub cells: Vec<CellWire>,
    pub agents: Vec<AgentWire>,
}

/// Callback invoked with each gathered frame on rank 0 only. No concrete
/// implementation ships in this crate (rendering/logging are out of scope
/// per spec §1); callers bring their own.
pub trait FrameSink {
    fn on_frame(&mut self, frame: &GatheredFrame);
}

/// How many reproduction ids each rank may allocate before colliding with
/// the next rank's range (spec §9's "safe variant": disjoint per-rank id
/// ranges `[rank*K, (rank+1)*K)`).
const REPRODUCE_ID_RANGE: u32 = 1 << 24;

pub struct Driver<T: Topology> {
    pub config: SimConfig,
    pub partition: Partition<T>,
    pub sg: SubGrid,
    pub agents: Vec<Agent>,
    pub state: RunState,
    next_reproduce_id: u32,
}

impl<T: Topology> Driver<T> {
    /// Builds a driver from a validated config and an already-constructed
    /// topology, seeding the sub-grid and placing agents deterministically.
    pub fn new(config: SimConfig, topology: T) -> SimResult<Self> {
        config.validate()?;
        let partition = Partition::new(topology);
        let (local_w, local_h, offset_x, offset_y) =
            partition.subgrid_dims(config.global_w, config.global_h);
        let mut sg = SubGrid::create(local_w, local_h, offset_x, offset_y);
        sg.init(config.seed);

        let agents = agents_init(
            config.num_agents,
            &sg,
            config.global_w,
            config.global_h,
            config.initial_energy,
            config.seed,
        );

        let rank = partition.rank() as u32;
        let next_reproduce_id =
            (config.num_agents as u32).max(1) + rank * REPRODUCE_ID_RANGE;

        info!(
            rank = partition.rank(),
            local_w, local_h, offset_x, offset_y, agents = agents.len(),
            "driver initialized"
        );

        Ok(Driver {
            config,
            partition,
            sg,
            agents,
            state: RunState::new(),
            next_reproduce_id,
        })
    }

    pub fn request_quit(&mut self) {
        self.state.quit = true;
    }

    fn neighbor_ranks(&self) -> [i32; crate::topology::NUM_DIRECTIONS] {
        let mut out = [0i32; crate::topology::NUM_DIRECTIONS];
        for (i, dir) in Direction::ALL.into_iter().enumerate() {
            out[i] = self.partition.neighbor(dir);
        }
        out
    }

    /// Runs exactly the ten steps of spec §4.10 once, returning this rank's
    /// local phase timing.
    pub fn run_cycle(&mut self) -> CyclePerf {
        let t_cycle = Instant::now();
        let mut perf = CyclePerf::default();

        // 1. Broadcast the season (authoritative at rank 0).
        let t = Instant::now();
        let mut season_u8 = if self.partition.rank() == 0 {
            Season::for_cycle(self.state.cycle, self.config.season_length).as_u8()
        } else {
            0
        };
        self.partition.topology.broadcast_season(&mut season_u8);
        let season = Season::from_u8(season_u8);
        perf.season = t.elapsed().as_secs_f64();
        debug!(cycle = self.state.cycle, season = season.as_str(), "season broadcast");

        // 2. Recompute accessibility on every owned cell.
        self.sg.recompute_accessibility(season);

        // 3. Halo exchange.
        let t = Instant::now();
        let neighbors = self.neighbor_ranks();
        halo::exchange(&mut self.sg, &self.partition.topology, &neighbors);
        perf.halo = t.elapsed().as_secs_f64();

        // 4 & 5. Workload + agent decide (single dynamic-chunked pass).
        let t = Instant::now();
        agents_process(
            &mut self.agents,
            &self.sg,
            self.config.max_workload,
            self.config.seed ^ self.state.cycle,
            self.config.energy_gain,
            self.config.energy_loss,
        );
        perf.workload = 0.0; // folded into `agent` below; workload has no separate wall-clock seam
        perf.agent = t.elapsed().as_secs_f64();

        // 6. Reproduction (optional phase, serial).
        if let (Some(threshold), Some(cost)) =
            (self.config.reproduce_threshold, self.config.reproduce_cost)
        {
            agents_reproduce(&mut self.agents, threshold, cost, &mut self.next_reproduce_id);
        }

        // 7. Grid regeneration.
        let t = Instant::now();
        self.sg.update(season);
        perf.grid = t.elapsed().as_secs_f64();

        // 8. Migration.
        let t = Instant::now();
        migrate(
            &mut self.agents,
            &self.partition,
            &self.sg,
            self.config.global_w,
            self.config.global_h,
        );
        perf.migrate = t.elapsed().as_secs_f64();

        // 9. Metrics all-reduce.
        let t = Instant::now();
        let _global_metrics: SimMetrics =
            SimMetrics::compute_local(&self.sg, &self.agents).all_reduce(&self.partition.topology);
        perf.metrics = t.elapsed().as_secs_f64();

        perf.cycle = t_cycle.elapsed().as_secs_f64();
        self.state.cycle += 1;
        perf
    }

    /// Gathers the full global grid and every alive agent to rank 0 (spec
    /// §6's gather-to-root interface). All ranks must call this — non-root
    /// ranks get `None` but still participate in the underlying gather/
    /// gatherv collectives.
    pub fn gather_to_root(&self) -> Option<GatheredFrame> {
        let local_cells: Vec<CellWire> = self
            .sg
            .iter_owned()
            .map(|(_, _, c)| (*c).into())
            .collect();
        let local_agents: Vec<AgentWire> = self
            .agents
            .iter()
            .filter(|a| a.alive)
            .map(|a| (*a).into())
            .collect();

        let cells = self.partition.topology.gather_cells(&local_cells);
        let agents = self.partition.topology.gather_agents(&local_agents);

        match (cells, agents) {
            (Some(cells), Some(agents)) => Some(GatheredFrame {
                global_w: self.config.global_w,
                global_h: self.config.global_h,
                cells,
                agents,
            }),
            _ => None,
        }
    }

    /// Runs `config.total_cycles` cycles (or until `state.quit`).
    ///
    /// `render` must be the same value on every rank (spec §4.10 step 10:
    /// "all non-root ranks still participate in every collective") — when
    /// true, `gather_to_root` is called every cycle on every rank, and
    /// `sink` (meaningful only where `gather_to_root` returns `Some`, i.e.
    /// rank 0) is invoked with the frame. `sink` is otherwise unused — the
    /// engine is fully usable headless with `render = false`.
    pub fn run(&mut self, render: bool, mut sink: Option<&mut dyn FrameSink>) -> SimMetrics {
        while self.state.cycle < self.config.total_cycles && !self.state.quit {
            let mut perf = self.run_cycle();

            if render {
                let t = Instant::now();
                let frame = self.gather_to_root();
                perf.render = t.elapsed().as_secs_f64();
                if let (Some(frame), Some(sink)) = (frame, sink.as_deref_mut()) {
                    sink.on_frame(&frame);
                }
            }

            let reduced = self.partition.topology.all_reduce_max_cycle_perf(perf);
            if self.partition.rank() == 0 {
                debug!(cycle = self.state.cycle, cycle_time = reduced.cycle, "cycle complete");
            }
        }

        SimMetrics::compute_local(&self.sg, &self.agents).all_reduce(&self.partition.topology)
    }
}
