//! The communication seam between the engine and the process group.
//!
//! Everything the engine needs from "the other ranks" — who my neighbors
//! are, the eight-direction halo swap, the two-phase agent migration, and
//! the metrics/timing reductions — is expressed against the `Topology`
//! trait. `mpi_topology::MpiTopology` is the production implementation over
//! a real Cartesian communicator; `SerialTopology` is a size-1 stand-in used
//! by unit tests so the engine logic is checkable without an `mpiexec`
//! launch from `cargo test` (see SPEC_FULL.md §4.3).

use crate::grid::CellWire;
use crate::agent::AgentWire;
use crate::metrics::CyclePerf;

pub const NUM_DIRECTIONS: usize = 8;

/// Canonical neighbor order: N, S, E, W, NE, NW, SE, SW (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    N = 0,
    S = 1,
    E = 2,
    W = 3,
    Ne = 4,
    Nw = 5,
    Se = 6,
    Sw = 7,
}

impl Direction {
    pub const ALL: [Direction; NUM_DIRECTIONS] = [
        Direction::N,
        Direction::S,
        Direction::E,
        Direction::W,
        Direction::Ne,
        Direction::Nw,
        Direction::Se,
        Direction::Sw,
    ];

    /// Row/column offset of this direction relative to (row, col).
    pub fn row_col_delta(self) -> (i32, i32) {
        match self {
            Direction::N => (-1, 0),
            Direction::S => (1, 0),
            Direction::E => (0, 1),
            Direction::W => (0, -1),
            Direction::Ne => (-1, 1),
            Direction::Nw => (-1, -1),
            Direction::Se => (1, 1),
            Direction::Sw => (1, -1),
        }
    }

    /// The direction a message travels from, as seen by the receiver — used
    /// so a send "to the south" is matched by a receive "from the north"
    /// under a distinct, unambiguous tag per ordered pair (spec §4.7).
    pub fn opposite(self) -> Direction {
        match self {
            Direction::N => Direction::S,
            Direction::S => Direction::N,
            Direction::E => Direction::W,
            Direction::W => Direction::E,
            Direction::Ne => Direction::Sw,
            Direction::Nw => Direction::Se,
            Direction::Se => Direction::Nw,
            Direction::Sw => Direction::Ne,
        }
    }

    /// Base MPI tag for this direction; the reverse direction's matching
    /// receive uses `opposite().tag()`, so (send-tag, recv-tag) never collide.
    pub fn tag(self) -> i32 {
        100 + self as i32
    }
}

/// What a rank wants to send/receive in one halo round: one packed buffer
/// per of the eight directions, `None` where the neighbor is `NULL_PEER`.
pub struct HaloPlan {
    pub send: [Option<Vec<CellWire>>; NUM_DIRECTIONS],
    pub recv_len: [usize; NUM_DIRECTIONS],
}

/// The seam every collective/point-to-point operation the engine needs
/// goes through. Implementors own the process group's identity and are
/// responsible for symmetric participation in every collective — a rank
/// that fails to call one of these deadlocks the world (spec §7).
pub trait Topology: Send + Sync {
    fn rank(&self) -> i32;
    fn size(&self) -> i32;
    /// (row, col) of this rank in the py x px Cartesian grid.
    fn row_col(&self) -> (i32, i32);
    /// (rows, cols) = (py, px).
    fn dims(&self) -> (i32, i32);
    /// Translate an in-bounds (row, col) to a rank; bounds-checking is the
    /// caller's job — out-of-grid coordinates are NULL_PEER by construction,
    /// never passed in here.
    fn rank_at(&self, row: i32, col: i32) -> i32;

    fn barrier(&self);

    /// Authoritative on rank 0, broadcast to all ranks.
    fn broadcast_season(&self, season_u8: &mut u8);

    /// Post all eight non-blocking send/receive pairs, then a single
    /// wait-all; returns the eight received buffers in canonical order
    /// (empty `Vec` where the sender was `NULL_PEER`).
    fn exchange_halo(&self, plan: &HaloPlan) -> [Vec<CellWire>; NUM_DIRECTIONS];

    /// All-to-all of per-destination-rank outgoing agent counts.
    fn all_to_all_counts(&self, send_counts: &[i32]) -> Vec<i32>;

    /// All-to-all-v of the agent payload, using previously-exchanged counts.
    fn all_to_all_agents(
        &self,
        send: &[AgentWire],
        send_counts: &[i32],
        recv_counts: &[i32],
    ) -> Vec<AgentWire>;

    fn all_reduce_sum_f64(&self, v: f64) -> f64;
    fn all_reduce_sum_u64(&self, v: u64) -> u64;
    fn all_reduce_max_f64(&self, v: f64) -> f64;
    fn all_reduce_min_f64(&self, v: f64) -> f64;
    fn all_reduce_max_cycle_perf(&self, v: CyclePerf) -> CyclePerf;

    /// Gather variable-length cell rows from every rank to rank 0; `None`
    /// on non-root ranks (spec §6 gather-to-root).
    fn gather_cells(&self, local: &[CellWire]) -> Option<Vec<CellWire>>;
    fn gather_agents(&self, local: &[AgentWire]) -> Option<Vec<AgentWire>>;
}

/// Neighbor rank in `dir` for any `Topology`, or `NULL_PEER`-equivalent
/// `-1` if `dir` points off the `py x px` process grid. Shared by
/// `Partition::neighbor` and `MpiTopology::exchange_halo` so the two never
/// disagree about who the eight peers are.
pub fn neighbor_of<T: Topology + ?Sized>(t: &T, dir: Direction) -> i32 {
    let (row, col) = t.row_col();
    let (py, px) = t.dims();
    let (dr, dc) = dir.row_col_delta();
    let (nrow, ncol) = (row + dr, col + dc);
    if nrow < 0 || nrow >= py || ncol < 0 || ncol >= px {
        -1
    } else {
        t.rank_at(nrow, ncol)
    }
}

/// Size-1 Cartesian communicator stand-in: every neighbor is `NULL_PEER`,
/// every reduction is the identity, every gather just returns the local
/// data back. Lets module-level unit tests exercise the halo/migration/
/// metrics call paths without a live MPI universe.
pub struct SerialTopology;

impl Topology for SerialTopology {
    fn rank(&self) -> i32 {
        0
    }

    fn size(&self) -> i32 {
        1
    }

    fn row_col(&self) -> (i32, i32) {
        (0, 0)
    }

    fn dims(&self) -> (i32, i32) {
        (1, 1)
    }

    fn rank_at(&self, row: i32, col: i32) -> i32 {
        debug_assert_eq!((row, col), (0, 0));
        0
    }

    fn barrier(&self) {}

    fn broadcast_season(&self, _season_u8: &mut u8) {}

    fn exchange_halo(&self, _plan: &HaloPlan) -> [Vec<CellWire>; NUM_DIRECTIONS] {
        Default::default()
    }

    fn all_to_all_counts(&self, send_counts: &[i32]) -> Vec<i32> {
        send_counts.to_vec()
    }

    fn all_to_all_agents(
        &self,
        send: &[AgentWire],
        _send_counts: &[i32],
        _recv_counts: &[i32],
    ) -> Vec<AgentWire> {
        send.to_vec()
    }

    fn all_reduce_sum_f64(&self, v: f64) -> f64 {
        v
    }

    fn all_reduce_sum_u64(&self, v: u64) -> u64 {
        v
    }

    fn all_reduce_max_f64(&self, v: f64) -> f64 {
        v
    }

    fn all_reduce_min_f64(&self, v: f64) -> f64 {
        v
    }

    fn all_reduce_max_cycle_perf(&self, v: CyclePerf) -> CyclePerf {
        v
    }

    fn gather_cells(&self, local: &[CellWire]) -> Option<Vec<CellWire>> {
        Some(local.to_vec())
    }

    fn gather_agents(&self, local: &[AgentWire]) -> Option<Vec<AgentWire>> {
        Some(local.to_vec())
    }
}

/// Configurable `py x px` test double with no real messaging: reductions
/// and gathers behave as if this were the only rank (identity/local-only),
/// but `row_col`/`dims`/`rank_at` reflect an arbitrary shape and rank. Lets
/// `Partition`/placement/cell-seeding tests enumerate what every rank in a
/// real decomposition would own side by side, in one process, without a
/// live `mpiexec` launch (spec §8's "for any process count" properties).
#[cfg(test)]
#[derive(Clone, Copy)]
pub struct FakeTopology {
    pub rank: i32,
    pub py: i32,
    pub px: i32,
}

#[cfg(test)]
impl Topology for FakeTopology {
    fn rank(&self) -> i32 {
        self.rank
    }

    fn size(&self) -> i32 {
        self.py * self.px
    }

    fn row_col(&self) -> (i32, i32) {
        (self.rank / self.px, self.rank % self.px)
    }

    fn dims(&self) -> (i32, i32) {
        (self.py, self.px)
    }

    fn rank_at(&self, row: i32, col: i32) -> i32 {
        row * self.px + col
    }

    fn barrier(&self) {}

    fn broadcast_season(&self, _season_u8: &mut u8) {}

    fn exchange_halo(&self, _plan: &HaloPlan) -> [Vec<CellWire>; NUM_DIRECTIONS] {
        Default::default()
    }

    fn all_to_all_counts(&self, send_counts: &[i32]) -> Vec<i32> {
        vec![0; send_counts.len()]
    }

    fn all_to_all_agents(
        &self,
        _send: &[AgentWire],
        _send_counts: &[i32],
        _recv_counts: &[i32],
    ) -> Vec<AgentWire> {
        Vec::new()
    }

    fn all_reduce_sum_f64(&self, v: f64) -> f64 {
        v
    }

    fn all_reduce_sum_u64(&self, v: u64) -> u64 {
        v
    }

    fn all_reduce_max_f64(&self, v: f64) -> f64 {
        v
    }

    fn all_reduce_min_f64(&self, v: f64) -> f64 {
        v
    }

    fn all_reduce_max_cycle_perf(&self, v: CyclePerf) -> CyclePerf {
        v
    }

    fn gather_cells(&self, local: &[CellWire]) -> Option<Vec<CellWire>> {
        if self.rank == 0 {
            Some(local.to_vec())
        } else {
            None
        }
    }

    fn gather_agents(&self, local: &[AgentWire]) -> Option<Vec<AgentWire>> {
        if self.rank == 0 {
            Some(local.to_vec())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions_are_self_inverse_pairs() {
        for d in Direction::ALL {
            assert_eq!(d.opposite().opposite() as i32, d as i32);
            assert_ne!(d.tag(), d.opposite().tag());
        }
    }

    #[test]
    fn serial_topology_has_no_neighbors() {
        let t = SerialTopology;
        assert_eq!(t.size(), 1);
        assert_eq!(t.row_col(), (0, 0));
    }
}
