//! Agents: deterministic placement, decision, and (optional) reproduction
//! (spec §4.6).

use mpi::traits::Equivalence;
use rayon::prelude::*;

use crate::grid::SubGrid;
use crate::rng::{thread_seed, Xorshift64};
use crate::workload::workload_compute;

/// Canonical 9-candidate scan order: 8 Moore neighbours then "stay".
/// `(dx, dy)` pairs exactly as spec §4.6.2 lists them — reordering breaks
/// determinism of the tie-break reservoir sample.
const DX: [i64; 9] = [0, 0, 1, -1, 1, -1, 1, -1, 0];
const DY: [i64; 9] = [-1, 1, 0, 0, -1, -1, 1, 1, 0];

#[derive(Clone, Copy, Debug)]
pub struct Agent {
    pub id: u32,
    pub gx: i64,
    pub gy: i64,
    pub energy: f64,
    pub alive: bool,
}

/// Fixed-layout wire image of an `Agent`, matching the `{int id; int gx;
/// int gy; double energy; int alive}` struct from spec §4.8.
#[derive(Clone, Copy, Debug, Default, Equivalence)]
#[repr(C)]
pub struct AgentWire {
    pub id: u32,
    pub gx: i32,
    pub gy: i32,
    pub energy: f64,
    pub alive: u32,
}

impl From<Agent> for AgentWire {
    fn from(a: Agent) -> Self {
        AgentWire {
            id: a.id,
            gx: a.gx as i32,
            gy: a.gy as i32,
            energy: a.energy,
            alive: a.alive as u32,
        }
    }
}

impl From<AgentWire> for Agent {
    fn from(w: AgentWire) -> Self {
        Agent {
            id: w.id,
            gx: w.gx as i64,
            gy: w.gy as i64,
            energy: w.energy,
            alive: w.alive != 0,
        }
    }
}

/// Deterministically seeds and places `num_total` agents, keeping only the
/// ones this rank owns. A single global RNG stream decides every agent's
/// position, so the union over all ranks is exactly the serial result for
/// any process count (spec §4.6.1).
pub fn agents_init(
    num_total: usize,
    sg: &SubGrid,
    global_w: usize,
    global_h: usize,
    initial_energy: f64,
    seed: u64,
) -> Vec<Agent> {
    let mut grng = Xorshift64::new(seed ^ 0xA6E47);
    let mut out = Vec::new();
    for i in 0..num_total {
        let gx = grng.next_bounded(global_w) as i64;
        let gy = grng.next_bounded(global_h) as i64;
        if sg.in_owned_rectangle(gx, gy) {
            out.push(Agent {
                id: i as u32,
                gx,
                gy,
                energy: initial_energy,
                alive: true,
            });
        }
    }
    out
}

/// Single-agent decision step (spec §4.6.2). No-op on a dead agent.
pub fn agent_decide(a: &mut Agent, sg: &SubGrid, rng: &mut Xorshift64, energy_gain: f64, energy_loss: f64) {
    if !a.alive {
        return;
    }

    let lc = a.gx - sg.offset_x + 1;
    let lr = a.gy - sg.offset_y + 1;

    let mut best_resource = -1.0f64;
    let mut best_dir = 8usize; // default: stay
    let mut tie_count = 0u32;

    for d in 0..9 {
        let nc = lc + DX[d];
        let nr = lr + DY[d];
        if nc < 0 || nr < 0 || nc as usize >= sg.halo_w || nr as usize >= sg.halo_h {
            continue;
        }
        let cell = sg.get(nr as usize, nc as usize);
        if !cell.accessible {
            continue;
        }
        if cell.resource > best_resource {
            best_resource = cell.resource;
            best_dir = d;
            tie_count = 1;
        } else if cell.resource == best_resource {
            tie_count += 1;
            // Reservoir sampling: the k-th tied candidate wins with prob 1/k.
            if rng.next_bounded(tie_count as usize) == 0 {
                best_dir = d;
            }
        }
    }

    a.gx += DX[best_dir];
    a.gy += DY[best_dir];

    let new_lc = a.gx - sg.offset_x + 1;
    let new_lr = a.gy - sg.offset_y + 1;

    let fed = new_lc >= 0
        && new_lr >= 0
        && (new_lc as usize) < sg.halo_w
        && (new_lr as usize) < sg.halo_h
        && {
            let cell = sg.get(new_lr as usize, new_lc as usize);
            cell.accessible && cell.resource > 0.0
        };

    if fed {
        // SAFETY: agents_process may run many of these concurrently against
        // the same cell; this is the accepted race of spec §5/§9 option (c).
        let cell = unsafe { sg.get_mut_racy(new_lr as usize, new_lc as usize) };
        let consumed = energy_gain.min(cell.resource);
        cell.resource -= consumed;
        a.energy += consumed;
    } else {
        a.energy -= energy_loss;
    }

    if a.energy <= 0.0 {
        a.alive = false;
    }
}

/// Per-worker-thread RNG pool, indexed by `rayon::current_thread_index()`.
/// A rayon worker thread runs one task at a time (work-stealing hands it
/// tasks sequentially, never concurrently with itself), so each slot is
/// touched by exactly one thread for the whole pass — the same reasoning
/// `SubGrid::get_mut_racy` documents for racy cell writes. This lets one
/// RNG stream persist and advance across every chunk a thread steals,
/// rather than being reset at the start of each chunk.
struct ThreadRngPool {
    slots: Vec<std::cell::UnsafeCell<Xorshift64>>,
}

unsafe impl Sync for ThreadRngPool {}

impl ThreadRngPool {
    fn new(seed: u64, num_threads: usize) -> Self {
        ThreadRngPool {
            slots: (0..num_threads.max(1))
                .map(|tid| std::cell::UnsafeCell::new(Xorshift64::new(thread_seed(seed, tid))))
                .collect(),
        }
    }

    /// # Safety
    /// `tid` must uniquely identify the calling worker thread for the
    /// duration of the parallel pass (true of `rayon::current_thread_index()`
    /// within the pool that's driving the current `par_chunks_mut`).
    unsafe fn get(&self, tid: usize) -> &mut Xorshift64 {
        let idx = tid.min(self.slots.len() - 1);
        &mut *self.slots[idx].get()
    }
}

/// Dynamic-chunked (chunk ≈ 32) parallel pass over all agents: workload at
/// the agent's current cell, then `agent_decide`. Each rayon worker thread
/// derives its own RNG once from `seed` (spec §4.6.3) via `ThreadRngPool`
/// and reuses the same advancing stream across every chunk it steals.
///
/// `agent_decide` mutates cell resource through `SubGrid::get_mut_racy`, so
/// two agents targeting the same cell from different chunks may race. This
/// matches the source's relaxed-atomicity policy (spec §5, §9 option (c)) —
/// bounded over-consumption is corrected by the post-regen clamp in
/// `SubGrid::update`.
pub fn agents_process(
    agents: &mut [Agent],
    sg: &SubGrid,
    max_workload: usize,
    seed: u64,
    energy_gain: f64,
    energy_loss: f64,
) {
    let pool = ThreadRngPool::new(seed, rayon::current_num_threads());
    agents.par_chunks_mut(32).for_each(|chunk| {
        let tid = rayon::current_thread_index().unwrap_or(0);
        // SAFETY: this closure runs on one worker thread at a time, and
        // `tid` is that thread's stable index within the driving pool.
        let rng = unsafe { pool.get(tid) };
        for a in chunk.iter_mut() {
            if !a.alive {
                continue;
            }
            let lc = a.gx - sg.offset_x + 1;
            let lr = a.gy - sg.offset_y + 1;
            if lc >= 1 && (lc as usize) <= sg.local_w && lr >= 1 && (lr as usize) <= sg.local_h {
                let resource = sg.get(lr as usize, lc as usize).resource;
                let _ = workload_compute(resource, max_workload);
            }
            agent_decide(a, sg, rng, energy_gain, energy_loss);
        }
    });
}

/// Reproduction phase (spec §4.6.4, gated by `SimConfig::reproduction_enabled`).
/// Serial: mutates array length and the id counter, so it runs after the
/// parallel decide phase rather than inside it. `next_id` is the caller's
/// monotonically increasing counter (see `crate::driver` for the disjoint
/// per-rank id range adopted per spec §9's open question).
pub fn agents_reproduce(
    agents: &mut Vec<Agent>,
    threshold: f64,
    cost: f64,
    next_id: &mut u32,
) {
    let parents: Vec<usize> = agents
        .iter()
        .enumerate()
        .filter(|(_, a)| a.alive && a.energy >= threshold)
        .map(|(i, _)| i)
        .collect();

    for i in parents {
        let (gx, gy) = (agents[i].gx, agents[i].gy);
        agents[i].energy -= cost;
        let child = Agent {
            id: *next_id,
            gx,
            gy,
            energy: cost,
            alive: true,
        };
        *next_id += 1;
        agents.push(child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Cell, CellType};
    use crate::partition::Partition;
    use crate::topology::FakeTopology;

    fn make_grid() -> SubGrid {
        let mut g = SubGrid::create(3, 3, 0, 0);
        for lr in 0..g.halo_h {
            for lc in 0..g.halo_w {
                *g.get_mut(lr, lc) = Cell {
                    cell_type: CellType::Gathering,
                    resource: 0.0,
                    max_resource: 0.8,
                    accessible: true,
                };
            }
        }
        g
    }

    #[test]
    fn placement_keeps_only_owned_agents() {
        let sg = SubGrid::create(4, 4, 0, 0);
        let agents = agents_init(1000, &sg, 8, 8, 0.8, 42);
        for a in &agents {
            assert!(sg.in_owned_rectangle(a.gx, a.gy));
        }
    }

    #[test]
    fn placement_is_decomposition_independent_union() {
        // Two disjoint sub-grids covering the whole 4x4 world must produce,
        // together, exactly the serial (single sub-grid) result.
        let whole = SubGrid::create(4, 4, 0, 0);
        let serial = agents_init(200, &whole, 4, 4, 0.8, 7);

        let left = SubGrid::create(2, 4, 0, 0);
        let right = SubGrid::create(2, 4, 2, 0);
        let mut split = agents_init(200, &left, 4, 4, 0.8, 7);
        split.extend(agents_init(200, &right, 4, 4, 0.8, 7));

        let mut a: Vec<(u32, i64, i64)> = serial.iter().map(|a| (a.id, a.gx, a.gy)).collect();
        let mut b: Vec<(u32, i64, i64)> = split.iter().map(|a| (a.id, a.gx, a.gy)).collect();
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn placement_union_matches_serial_across_a_real_four_rank_decomposition() {
        // A real 2x2 Cartesian shape over an uneven 9x9 world (last-band
        // remainder on both axes): the union over all four ranks' disjoint
        // ownership predicates must equal the single-subgrid serial result,
        // for any process count (spec §4.6.1 / §8).
        let (gw, gh, seed) = (9usize, 9usize, 99u64);
        let whole = SubGrid::create(gw, gh, 0, 0);
        let serial = agents_init(500, &whole, gw, gh, 0.8, seed);

        let mut distributed = Vec::new();
        for rank in 0..4 {
            let p = Partition::new(FakeTopology { rank, py: 2, px: 2 });
            let (lw, lh, ox, oy) = p.subgrid_dims(gw, gh);
            let sg = SubGrid::create(lw, lh, ox, oy);
            distributed.extend(agents_init(500, &sg, gw, gh, 0.8, seed));
        }

        let mut a: Vec<(u32, i64, i64)> = serial.iter().map(|a| (a.id, a.gx, a.gy)).collect();
        let mut b: Vec<(u32, i64, i64)> = distributed.iter().map(|a| (a.id, a.gx, a.gy)).collect();
        a.sort();
        b.sort();
        assert_eq!(a, b);
        assert_eq!(distributed.len(), serial.len());
    }

    #[test]
    fn agent_dies_at_zero_energy() {
        let mut sg = make_grid();
        for lr in 0..sg.halo_h {
            for lc in 0..sg.halo_w {
                sg.get_mut(lr, lc).accessible = false;
            }
        }
        let mut a = Agent { id: 0, gx: 1, gy: 1, energy: 0.1, alive: true };
        let mut rng = Xorshift64::new(1);
        agent_decide(&mut a, &sg, &mut rng, 0.3, 0.4);
        assert!(!a.alive);
        assert!(a.energy <= 0.0);
    }

    #[test]
    fn agent_moves_to_best_accessible_resource() {
        let mut sg = make_grid();
        // Interior cell (2,2) is the richest; everything else starved.
        for lr in 0..sg.halo_h {
            for lc in 0..sg.halo_w {
                sg.get_mut(lr, lc).resource = 0.0;
            }
        }
        sg.get_mut(2, 2).resource = 0.5;

        let mut a = Agent { id: 0, gx: 0, gy: 0, energy: 1.0, alive: true }; // halo (1,1)
        let mut rng = Xorshift64::new(3);
        agent_decide(&mut a, &sg, &mut rng, 0.3, 0.4);
        assert_eq!((a.gx, a.gy), (1, 1));
        assert!(a.energy > 1.0); // fed
    }

    #[test]
    fn thread_rng_pool_advances_across_repeated_gets_on_the_same_slot() {
        // A thread steals more than one chunk: the RNG it holds must keep
        // advancing, not restart the same stream every time `get` is called
        // for that slot.
        let pool = ThreadRngPool::new(1, 1);
        let first: Vec<u64> = {
            let rng = unsafe { pool.get(0) };
            (0..5).map(|_| rng.next_u64()).collect()
        };
        let second: Vec<u64> = {
            let rng = unsafe { pool.get(0) };
            (0..5).map(|_| rng.next_u64()).collect()
        };
        assert_ne!(first, second);
    }

    #[test]
    fn reproduction_spawns_child_and_charges_parent() {
        let mut agents = vec![Agent { id: 0, gx: 3, gy: 3, energy: 12.0, alive: true }];
        let mut next_id = 100u32;
        agents_reproduce(&mut agents, 10.0, 3.0, &mut next_id);
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].energy, 9.0);
        assert_eq!(agents[1].id, 100);
        assert_eq!(agents[1].energy, 3.0);
        assert_eq!(next_id, 101);
    }
}
