//! Eight-direction halo exchange (spec §4.7).
//!
//! Builds a `HaloPlan` from the owned boundary of a `SubGrid`, hands it to
//! the `Topology` seam (which posts all eight non-blocking send/receive
//! pairs and waits once), then unpacks the replies into the halo rows,
//! columns, and corners.

use crate::grid::SubGrid;
use crate::topology::{Direction, HaloPlan, Topology, NUM_DIRECTIONS};

/// Packs this rank's owned boundary into the eight directional send
/// buffers. `neighbor_ranks` must be in the same canonical N,S,E,W,NE,NW,
/// SE,SW order as `Direction::ALL`; a `NULL_PEER` (`< 0`) entry means "no
/// send in this direction" (spec's NULL_PEER sends are no-ops).
pub fn build_plan(sg: &SubGrid, neighbor_ranks: &[i32; NUM_DIRECTIONS]) -> HaloPlan {
    let mut send: [Option<Vec<crate::grid::CellWire>>; NUM_DIRECTIONS] = Default::default();
    let mut recv_len = [0usize; NUM_DIRECTIONS];

    for (i, dir) in Direction::ALL.into_iter().enumerate() {
        if neighbor_ranks[i] < 0 {
            continue;
        }
        let packed = match dir {
            Direction::N => sg.pack_row(1),
            Direction::S => sg.pack_row(sg.local_h),
            Direction::E => sg.pack_col(sg.local_w),
            Direction::W => sg.pack_col(1),
            Direction::Ne => vec![sg.pack_corner(1, sg.local_w)],
            Direction::Nw => vec![sg.pack_corner(1, 1)],
            Direction::Se => vec![sg.pack_corner(sg.local_h, sg.local_w)],
            Direction::Sw => vec![sg.pack_corner(sg.local_h, 1)],
        };
        recv_len[i] = packed.len();
        send[i] = Some(packed);
    }

    HaloPlan { send, recv_len }
}

/// Unpacks the eight received buffers (one per `Direction::ALL` slot, empty
/// where the neighbor was `NULL_PEER`) into the matching halo row/column/
/// corner.
pub fn unpack_plan(sg: &mut SubGrid, received: &[Vec<crate::grid::CellWire>; NUM_DIRECTIONS]) {
    for (i, dir) in Direction::ALL.into_iter().enumerate() {
        let data = &received[i];
        if data.is_empty() {
            continue;
        }
        match dir {
            Direction::N => sg.unpack_row(0, data),
            Direction::S => sg.unpack_row(sg.local_h + 1, data),
            Direction::E => sg.unpack_col(sg.halo_w - 1, data),
            Direction::W => sg.unpack_col(0, data),
            Direction::Ne => sg.unpack_corner(0, sg.halo_w - 1, data[0]),
            Direction::Nw => sg.unpack_corner(0, 0, data[0]),
            Direction::Se => sg.unpack_corner(sg.halo_h - 1, sg.halo_w - 1, data[0]),
            Direction::Sw => sg.unpack_corner(sg.halo_h - 1, 0, data[0]),
        }
    }
}

/// Runs one full halo round: pack, exchange via the topology seam, unpack.
pub fn exchange(sg: &mut SubGrid, topology: &impl Topology, neighbor_ranks: &[i32; NUM_DIRECTIONS]) {
    let plan = build_plan(sg, neighbor_ranks);
    let received = topology.exchange_halo(&plan);
    unpack_plan(sg, &received);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Cell, CellType};
    use crate::topology::SerialTopology;

    fn filled_grid(local_w: usize, local_h: usize, offset_x: i64, offset_y: i64, value: f64) -> SubGrid {
        let mut g = SubGrid::create(local_w, local_h, offset_x, offset_y);
        for lr in 1..=local_h {
            for lc in 1..=local_w {
                *g.get_mut(lr, lc) = Cell {
                    cell_type: CellType::Gathering,
                    resource: value,
                    max_resource: 1.0,
                    accessible: true,
                };
            }
        }
        g
    }

    #[test]
    fn serial_topology_leaves_halo_untouched() {
        // No neighbors -> nothing received -> halo stays at its default.
        let mut sg = filled_grid(3, 3, 0, 0, 0.7);
        let t = SerialTopology;
        let neighbors = [-1i32; NUM_DIRECTIONS];
        exchange(&mut sg, &t, &neighbors);
        assert_eq!(sg.get(0, 1).resource, 0.0);
    }

    #[test]
    fn build_plan_packs_owned_boundary_not_interior() {
        let sg = filled_grid(3, 3, 0, 0, 0.5);
        let neighbors = [0i32; NUM_DIRECTIONS]; // pretend every direction has a peer
        let plan = build_plan(&sg, &neighbors);
        assert_eq!(plan.send[Direction::N as usize].as_ref().unwrap().len(), 3);
        assert_eq!(plan.send[Direction::E as usize].as_ref().unwrap().len(), 3);
        assert_eq!(plan.send[Direction::Ne as usize].as_ref().unwrap().len(), 1);
    }

    #[test]
    fn unpack_plan_writes_corners_and_edges() {
        let mut sg = SubGrid::create(2, 2, 0, 0);
        let mut received: [Vec<crate::grid::CellWire>; NUM_DIRECTIONS] = Default::default();
        let corner = crate::grid::CellWire {
            cell_type: CellType::Farming as u32,
            resource: 0.33,
            max_resource: 0.9,
            accessible: 1,
        };
        received[Direction::Nw as usize] = vec![corner];
        unpack_plan(&mut sg, &received);
        assert_eq!(sg.get(0, 0).resource, 0.33);
    }
}
