//! 2-D Cartesian process partition (spec §4.3).
//!
//! `Partition<T>` wraps a `Topology` (§4.3 [EXPANDED]) with the shape/offset
//! arithmetic spec.md describes: factoring `size` into `px * py`, assigning
//! the larger factor to the wider dimension, and deriving each rank's
//! sub-grid extent and the eight neighbor ranks.

use crate::error::{SimError, SimResult};
use crate::topology::{neighbor_of, Direction, Topology};

/// Sentinel for "no neighbor" at the world boundary (spec glossary).
pub const NULL_PEER: i32 = -1;

/// Factors `size` into `(a, b)` with `a <= b`, `a * b == size`, minimizing
/// `b - a`. `size` must be > 0.
pub fn factor_balanced(size: i32) -> SimResult<(i32, i32)> {
    if size <= 0 {
        return Err(SimError::ZeroProcessCount);
    }
    let mut best = (1, size);
    let mut i = 1;
    while i * i <= size {
        if size % i == 0 {
            let a = i;
            let b = size / i;
            if (a - b).abs() < (best.0 - best.1).abs() {
                best = (a, b);
            }
        }
        i += 1;
    }
    Ok(best)
}

/// `(px, py)` — columns, rows — assigning the larger factor to whichever
/// global dimension is larger, so sub-grids stay roughly square.
pub fn process_shape(size: i32, global_w: usize, global_h: usize) -> SimResult<(i32, i32)> {
    let (a, b) = factor_balanced(size)?;
    Ok(if global_w >= global_h { (b, a) } else { (a, b) })
}

/// Owns a `Topology` handle and the derived shape/offset math. Generic over
/// `T: Topology` so the rest of the engine (halo, migration, metrics) is
/// written once against the trait and is unit-testable under
/// `topology::SerialTopology` while compiling to real `mpi` collectives in
/// production (SPEC_FULL.md §4.3 [EXPANDED]).
pub struct Partition<T: Topology> {
    pub topology: T,
    pub px: i32,
    pub py: i32,
}

impl<T: Topology> Partition<T> {
    /// Wraps an already-constructed topology. The topology's `dims()` is
    /// assumed to already reflect `process_shape`; production code builds
    /// the `Topology` implementation with that shape before calling this.
    pub fn new(topology: T) -> Self {
        let (py, px) = topology.dims();
        Partition { topology, px, py }
    }

    pub fn rank(&self) -> i32 {
        self.topology.rank()
    }

    pub fn size(&self) -> i32 {
        self.topology.size()
    }

    /// Neighbor rank in `dir`, or `NULL_PEER` if off the process grid.
    pub fn neighbor(&self, dir: Direction) -> i32 {
        neighbor_of(&self.topology, dir)
    }

    /// Local sub-grid extent and global offset for this rank (spec §4.3).
    /// The last column/row absorbs the division remainder.
    pub fn subgrid_dims(&self, global_w: usize, global_h: usize) -> (usize, usize, i64, i64) {
        let (row, col) = self.topology.row_col();
        let base_w = global_w / self.px as usize;
        let rem_w = global_w % self.px as usize;
        let base_h = global_h / self.py as usize;
        let rem_h = global_h % self.py as usize;

        let local_w = if col == self.px - 1 { base_w + rem_w } else { base_w };
        let local_h = if row == self.py - 1 { base_h + rem_h } else { base_h };
        let offset_x = col as i64 * base_w as i64;
        let offset_y = row as i64 * base_h as i64;
        (local_w, local_h, offset_x, offset_y)
    }

    /// Rank owning global coordinates `(gx, gy)`, per spec §4.3's
    /// last-band-clamped division. May return this rank even for
    /// coordinates that are technically outside the owned rectangle at the
    /// last-band seam — spec §9 documents this as an inherited ambiguity
    /// preserved rather than silently tightened.
    pub fn rank_for_global(&self, gx: i64, gy: i64, global_w: usize, global_h: usize) -> i32 {
        let base_w = global_w / self.px as usize;
        let base_h = global_h / self.py as usize;

        let mut col = if base_w > 0 { (gx as usize) / base_w } else { 0 };
        let mut row = if base_h > 0 { (gy as usize) / base_h } else { 0 };
        if col >= self.px as usize {
            col = self.px as usize - 1;
        }
        if row >= self.py as usize {
            row = self.py as usize - 1;
        }
        self.topology.rank_at(row as i32, col as i32)
    }
}
