//! Halo-padded sub-grid owned by one process (spec §3, §4.4).

use mpi::traits::Equivalence;
use rayon::prelude::*;

use crate::rng::{cell_seed, Xorshift64};
use crate::season::{accessible, regen_rate, Season};

/// Canonical order matches `rng % 5` in spec §4.4 — reordering this enum
/// would change every seeded cell type and break cross-decomposition
/// determinism.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CellType {
    Village = 0,
    Fishing = 1,
    Gathering = 2,
    Farming = 3,
    Forbidden = 4,
}

impl CellType {
    pub const COUNT: usize = 5;

    pub fn from_u8(v: u8) -> Self {
        match v % Self::COUNT as u8 {
            0 => CellType::Village,
            1 => CellType::Fishing,
            2 => CellType::Gathering,
            3 => CellType::Farming,
            _ => CellType::Forbidden,
        }
    }

    pub fn max_resource(self) -> f64 {
        match self {
            CellType::Village => 0.5,
            CellType::Fishing => 1.0,
            CellType::Gathering => 0.8,
            CellType::Farming => 0.9,
            CellType::Forbidden => 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Cell {
    pub cell_type: CellType,
    pub resource: f64,
    pub max_resource: f64,
    pub accessible: bool,
}

impl Cell {
    fn forbidden() -> Self {
        Cell {
            cell_type: CellType::Forbidden,
            resource: 0.0,
            max_resource: 0.0,
            accessible: false,
        }
    }
}

impl Default for Cell {
    fn default() -> Self {
        Cell::forbidden()
    }
}

/// Fixed-layout wire image of a `Cell`, matching the `{int type; double
/// resource; double max_resource; int accessible}` struct from spec §4.7.
/// rsmpi's `Equivalence` derive builds the portable MPI datatype from these
/// field offsets rather than shipping a raw byte image of `Cell`.
#[derive(Clone, Copy, Debug, Default, Equivalence)]
#[repr(C)]
pub struct CellWire {
    pub cell_type: u32,
    pub resource: f64,
    pub max_resource: f64,
    pub accessible: u32,
}

impl From<Cell> for CellWire {
    fn from(c: Cell) -> Self {
        CellWire {
            cell_type: c.cell_type as u32,
            resource: c.resource,
            max_resource: c.max_resource,
            accessible: c.accessible as u32,
        }
    }
}

impl From<CellWire> for Cell {
    fn from(w: CellWire) -> Self {
        Cell {
            cell_type: CellType::from_u8(w.cell_type as u8),
            resource: w.resource,
            max_resource: w.max_resource,
            accessible: w.accessible != 0,
        }
    }
}

/// Halo-padded 2-D buffer. Rows/cols `0` and `halo_{h,w}-1` are read-only
/// replicas of a neighbor's interior, written only by halo exchange.
/// Interior rows `1..=local_h`, cols `1..=local_w` are exclusively owned.
pub struct SubGrid {
    pub local_w: usize,
    pub local_h: usize,
    pub halo_w: usize,
    pub halo_h: usize,
    pub offset_x: i64,
    pub offset_y: i64,
    cells: Vec<Cell>,
}

impl SubGrid {
    pub fn create(local_w: usize, local_h: usize, offset_x: i64, offset_y: i64) -> Self {
        let halo_w = local_w + 2;
        let halo_h = local_h + 2;
        SubGrid {
            local_w,
            local_h,
            halo_w,
            halo_h,
            offset_x,
            offset_y,
            cells: vec![Cell::default(); halo_w * halo_h],
        }
    }

    #[inline]
    fn index(&self, lr: usize, lc: usize) -> usize {
        lr * self.halo_w + lc
    }

    #[inline]
    pub fn get(&self, lr: usize, lc: usize) -> &Cell {
        &self.cells[self.index(lr, lc)]
    }

    #[inline]
    pub fn get_mut(&mut self, lr: usize, lc: usize) -> &mut Cell {
        let idx = self.index(lr, lc);
        &mut self.cells[idx]
    }

    /// Mutable access through a shared reference, for the parallel agent
    /// decide phase where multiple threads may target the same cell
    /// concurrently (spec §5's accepted relaxed-atomicity race, option (c):
    /// accept the race and clamp at the next regen). Every field this
    /// touches (`resource: f64`) is a plain value with no invariant that a
    /// torn read/write could violate beyond the bounded over-consumption
    /// spec §5 already documents as acceptable.
    ///
    /// # Safety
    /// Callers must not rely on the returned reference being exclusive —
    /// it may be concurrently aliased by other threads calling this same
    /// method on a different (or the same) cell.
    #[allow(clippy::mut_from_ref)]
    #[inline]
    pub unsafe fn get_mut_racy(&self, lr: usize, lc: usize) -> &mut Cell {
        let idx = self.index(lr, lc);
        let ptr = self.cells.as_ptr().add(idx) as *mut Cell;
        &mut *ptr
    }

    /// Local halo coordinates of a global cell, or `None` if outside the
    /// halo-padded buffer entirely (more than one cell outside the owned
    /// rectangle).
    pub fn global_to_local(&self, gx: i64, gy: i64) -> Option<(usize, usize)> {
        let lc = gx - self.offset_x + 1;
        let lr = gy - self.offset_y + 1;
        if lr < 0 || lc < 0 || lr as usize >= self.halo_h || lc as usize >= self.halo_w {
            None
        } else {
            Some((lr as usize, lc as usize))
        }
    }

    pub fn in_owned_rectangle(&self, gx: i64, gy: i64) -> bool {
        gx >= self.offset_x
            && gx < self.offset_x + self.local_w as i64
            && gy >= self.offset_y
            && gy < self.offset_y + self.local_h as i64
    }

    /// Seeds every owned (interior) cell deterministically from
    /// `(base_seed, gx, gy)`. Identical for any decomposition (spec §4.4).
    pub fn init(&mut self, base_seed: u64) {
        let halo_w = self.halo_w;
        let offset_x = self.offset_x;
        let offset_y = self.offset_y;
        let local_w = self.local_w;
        let local_h = self.local_h;

        self.cells
            .par_chunks_mut(halo_w)
            .enumerate()
            .for_each(|(lr, row)| {
                if lr == 0 || lr > local_h {
                    return;
                }
                let gy = offset_y + (lr as i64 - 1);
                for lc in 1..=local_w {
                    let gx = offset_x + (lc as i64 - 1);
                    let seed = cell_seed(base_seed, gx, gy);
                    let mut rng = Xorshift64::new(seed);
                    let cell_type = CellType::from_u8((rng.next_bounded(CellType::COUNT)) as u8);
                    row[lc] = Cell {
                        cell_type,
                        max_resource: cell_type.max_resource(),
                        resource: 0.0,
                        accessible: true,
                    };
                }
            });
    }

    /// Recomputes accessibility on every owned cell for `season`, without
    /// touching `resource` (driver step 2, spec §4.10 — run right after the
    /// season broadcast and before the halo exchange, so halo replicas
    /// other ranks read this cycle already reflect the new season).
    pub fn recompute_accessibility(&mut self, season: Season) {
        let halo_w = self.halo_w;
        let local_w = self.local_w;
        let local_h = self.local_h;

        self.cells
            .par_chunks_mut(halo_w)
            .enumerate()
            .for_each(|(lr, row)| {
                if lr == 0 || lr > local_h {
                    return;
                }
                for lc in 1..=local_w {
                    let cell = &mut row[lc];
                    cell.accessible = accessible(cell.cell_type, season);
                }
            });
    }

    /// Regenerates owned cells toward `max_resource`, clamps into
    /// `[0, max_resource]`, and recomputes accessibility for `season`.
    /// Halo cells are untouched.
    pub fn update(&mut self, season: Season) {
        let halo_w = self.halo_w;
        let local_w = self.local_w;
        let local_h = self.local_h;

        self.cells
            .par_chunks_mut(halo_w)
            .enumerate()
            .for_each(|(lr, row)| {
                if lr == 0 || lr > local_h {
                    return;
                }
                for lc in 1..=local_w {
                    let cell = &mut row[lc];
                    let rate = regen_rate(cell.cell_type, season);
                    cell.resource += rate * (cell.max_resource - cell.resource);
                    cell.resource = cell.resource.clamp(0.0, cell.max_resource);
                    cell.accessible = accessible(cell.cell_type, season);
                }
            });
    }

    /// Iterate `(gx, gy, &Cell)` over the owned interior only.
    pub fn iter_owned(&self) -> impl Iterator<Item = (i64, i64, &Cell)> {
        let halo_w = self.halo_w;
        let offset_x = self.offset_x;
        let offset_y = self.offset_y;
        let local_w = self.local_w;
        let local_h = self.local_h;
        (1..=local_h).flat_map(move |lr| {
            (1..=local_w).map(move |lc| {
                let gx = offset_x + (lc as i64 - 1);
                let gy = offset_y + (lr as i64 - 1);
                (gx, gy, &self.cells[lr * halo_w + lc])
            })
        })
    }

    pub fn total_resource(&self) -> f64 {
        self.iter_owned().map(|(_, _, c)| c.resource).sum()
    }

    pub fn total_max_resource(&self) -> f64 {
        self.iter_owned().map(|(_, _, c)| c.max_resource).sum()
    }

    /// Pack a border row/column/corner into wire format for halo exchange.
    pub fn pack_row(&self, lr: usize) -> Vec<CellWire> {
        (1..=self.local_w)
            .map(|lc| (*self.get(lr, lc)).into())
            .collect()
    }

    pub fn pack_col(&self, lc: usize) -> Vec<CellWire> {
        (1..=self.local_h)
            .map(|lr| (*self.get(lr, lc)).into())
            .collect()
    }

    pub fn pack_corner(&self, lr: usize, lc: usize) -> CellWire {
        (*self.get(lr, lc)).into()
    }

    pub fn unpack_row(&mut self, lr: usize, data: &[CellWire]) {
        for (lc, w) in (1..=self.local_w).zip(data) {
            *self.get_mut(lr, lc) = (*w).into();
        }
    }

    pub fn unpack_col(&mut self, lc: usize, data: &[CellWire]) {
        for (lr, w) in (1..=self.local_h).zip(data) {
            *self.get_mut(lr, lc) = (*w).into();
        }
    }

    pub fn unpack_corner(&mut self, lr: usize, lc: usize, w: CellWire) {
        *self.get_mut(lr, lc) = w.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_deterministic_across_offsets() {
        // Same global cell seeded from two different sub-grids (as if owned
        // by two different decompositions) must agree.
        let mut a = SubGrid::create(4, 4, 0, 0);
        a.init(42);
        let mut b = SubGrid::create(2, 2, 2, 2);
        b.init(42);

        let (lr, lc) = a.global_to_local(2, 2).unwrap();
        let cell_a = a.get(lr, lc);
        let (lr2, lc2) = b.global_to_local(2, 2).unwrap();
        let cell_b = b.get(lr2, lc2);
        assert_eq!(cell_a.cell_type as u8, cell_b.cell_type as u8);
        assert_eq!(cell_a.max_resource, cell_b.max_resource);
    }

    #[test]
    fn init_matches_serial_for_every_cell_across_a_real_four_rank_decomposition() {
        use crate::partition::Partition;
        use crate::topology::FakeTopology;

        // A real 2x2 shape over an uneven 9x9 world: every owned cell on
        // every rank must match the equivalent cell in a single serial
        // sub-grid covering the whole world (spec §4.4, §8).
        let (gw, gh, seed) = (9usize, 9usize, 1234u64);
        let mut serial = SubGrid::create(gw, gh, 0, 0);
        serial.init(seed);

        for rank in 0..4 {
            let p = Partition::new(FakeTopology { rank, py: 2, px: 2 });
            let (lw, lh, ox, oy) = p.subgrid_dims(gw, gh);
            let mut sg = SubGrid::create(lw, lh, ox, oy);
            sg.init(seed);
            for (gx, gy, cell) in sg.iter_owned() {
                let (lr, lc) = serial.global_to_local(gx, gy).unwrap();
                let reference = serial.get(lr, lc);
                assert_eq!(cell.cell_type as u8, reference.cell_type as u8);
                assert_eq!(cell.max_resource, reference.max_resource);
            }
        }
    }

    #[test]
    fn update_clamps_into_range() {
        let mut g = SubGrid::create(2, 2, 0, 0);
        g.init(1);
        for _ in 0..10_000 {
            g.update(Season::Wet);
        }
        for (_, _, cell) in g.iter_owned() {
            assert!(cell.resource >= 0.0 && cell.resource <= cell.max_resource);
        }
    }

    #[test]
    fn forbidden_cells_never_regenerate_or_open() {
        let mut g = SubGrid::create(4, 4, 0, 0);
        g.init(7);
        for (lr, lc) in [(1, 1), (1, 2), (2, 1), (2, 2)] {
            *g.get_mut(lr, lc) = Cell {
                cell_type: CellType::Forbidden,
                resource: 0.0,
                max_resource: 0.0,
                accessible: false,
            };
        }
        g.update(Season::Dry);
        for (lr, lc) in [(1, 1), (1, 2), (2, 1), (2, 2)] {
            let c = g.get(lr, lc);
            assert_eq!(c.resource, 0.0);
            assert!(!c.accessible);
        }
    }

    #[test]
    fn owned_rectangle_predicate() {
        let g = SubGrid::create(4, 4, 10, 10);
        assert!(g.in_owned_rectangle(10, 10));
        assert!(g.in_owned_rectangle(13, 13));
        assert!(!g.in_owned_rectangle(14, 10));
        assert!(!g.in_owned_rectangle(9, 10));
    }
}
