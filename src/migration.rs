//! Two-phase all-to-all agent migration (spec §4.8).
//!
//! Relocates every alive agent whose `(gx, gy)` has left the owner's
//! rectangle to its rightful rank, without losing or duplicating anyone.

use crate::agent::{Agent, AgentWire};
use crate::grid::SubGrid;
use crate::partition::Partition;
use crate::topology::Topology;

/// Runs one migration round in place. Returns the number of agents sent
/// out (for the migration-conservation property in spec §8).
pub fn migrate<T: Topology>(
    agents: &mut Vec<Agent>,
    partition: &Partition<T>,
    sg: &SubGrid,
    global_w: usize,
    global_h: usize,
) -> usize {
    let nprocs = partition.size() as usize;
    let my_rank = partition.rank();

    // Phase 1: classify. Alive agents outside the owned rectangle are
    // bucketed by destination rank; everyone else (dead, or the boundary-
    // clamp edge case of spec §9 resolving to `my_rank`) stays untouched.
    let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); nprocs];
    for (i, a) in agents.iter().enumerate() {
        if !a.alive || sg.in_owned_rectangle(a.gx, a.gy) {
            continue;
        }
        let dest = partition.rank_for_global(a.gx, a.gy, global_w, global_h);
        if dest == my_rank {
            // partition_rank_for_global can clamp onto this rank even for
            // coordinates outside the rectangle at the last-band seam —
            // preserved inherited behavior (spec §9), not a bug to fix.
            continue;
        }
        buckets[dest as usize].push(i);
    }

    let send_counts: Vec<i32> = buckets.iter().map(|b| b.len() as i32).collect();
    let recv_counts = partition.topology.all_to_all_counts(&send_counts);

    // Phase 2: pack outgoing agents in rank order, exchange the payload.
    let mut send_buf: Vec<AgentWire> = Vec::with_capacity(send_counts.iter().sum::<i32>() as usize);
    for bucket in &buckets {
        for &i in bucket {
            send_buf.push(agents[i].into());
        }
    }
    let recv_buf = partition
        .topology
        .all_to_all_agents(&send_buf, &send_counts, &recv_counts);

    let sent_count = send_buf.len();

    // Mark migrated slots dead, then stable-filter + append received.
    for bucket in &buckets {
        for &i in bucket {
            agents[i].alive = false;
        }
    }
    agents.retain(|a| a.alive);
    agents.extend(recv_buf.into_iter().map(Agent::from));

    sent_count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::SerialTopology;

    fn serial_partition(global_w: usize, global_h: usize) -> (Partition<SerialTopology>, SubGrid) {
        let partition = Partition::new(SerialTopology);
        let (lw, lh, ox, oy) = partition.subgrid_dims(global_w, global_h);
        (partition, SubGrid::create(lw, lh, ox, oy))
    }

    #[test]
    fn serial_migration_is_a_no_op_for_in_bounds_agents() {
        let (p, sg) = serial_partition(8, 8);
        let mut agents = vec![
            Agent { id: 0, gx: 3, gy: 3, energy: 1.0, alive: true },
            Agent { id: 1, gx: 7, gy: 7, energy: 1.0, alive: true },
        ];
        let moved = migrate(&mut agents, &p, &sg, 8, 8);
        assert_eq!(moved, 0);
        assert_eq!(agents.len(), 2);
    }

    #[test]
    fn dead_agents_are_dropped_not_migrated() {
        let (p, sg) = serial_partition(4, 4);
        let mut agents = vec![Agent { id: 0, gx: 0, gy: 0, energy: 0.0, alive: false }];
        let moved = migrate(&mut agents, &p, &sg, 4, 4);
        assert_eq!(moved, 0);
        assert!(agents.is_empty());
    }

    #[test]
    fn running_migration_twice_in_a_row_is_idempotent() {
        let (p, sg) = serial_partition(4, 4);
        let mut agents = vec![Agent { id: 0, gx: 1, gy: 1, energy: 1.0, alive: true }];
        migrate(&mut agents, &p, &sg, 4, 4);
        let second = migrate(&mut agents, &p, &sg, 4, 4);
        assert_eq!(second, 0);
        assert_eq!(agents.len(), 1);
    }

    #[test]
    fn conserves_total_alive_count_with_single_rank() {
        let (p, sg) = serial_partition(6, 6);
        let mut agents: Vec<Agent> = (0..20)
            .map(|i| Agent { id: i, gx: (i as i64) % 6, gy: (i as i64 * 3) % 6, energy: 1.0, alive: true })
            .collect();
        let before = agents.len();
        migrate(&mut agents, &p, &sg, 6, 6);
        assert_eq!(agents.len(), before);
    }
}
