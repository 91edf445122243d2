//! Synthetic per-cell workload (spec §4.5).
//!
//! Exists only to give agent processing a heterogeneous cost profile so the
//! dynamic-chunked scheduler in `agents_process` has something to balance.
//! The result itself is never consumed by the simulation; only the time it
//! takes to compute it is observable.

use std::hint::black_box;

/// Runs `floor(resource * max_iters)` additions into a sink the optimizer
/// cannot remove. Returns the sink so callers (and benchmarks) can also
/// black-box the call site itself.
pub fn workload_compute(resource: f64, max_iters: usize) -> f64 {
    let iters = (resource * max_iters as f64) as usize;
    let mut result = 0.0f64;
    for i in 0..iters {
        result += i as f64 * 0.0001;
    }
    black_box(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_resource_is_free() {
        assert_eq!(workload_compute(0.0, 1_000_000), 0.0);
    }

    #[test]
    fn scales_with_resource() {
        // Larger resource -> more iterations -> no smaller than a lesser one.
        let small = workload_compute(0.1, 1000);
        let large = workload_compute(0.9, 1000);
        assert!(large >= small);
    }
}
