//! Deterministic xorshift64 RNG (spec §4.1).
//!
//! A single nonzero `u64` is the entire state. Every derivation rule here
//! (cell seeding, per-thread seeding) is a pure function of its inputs so
//! that placement and cell initialization are bit-identical across any
//! process/thread count, given the same base seed.

/// One xorshift64 round. Zero state would stay zero forever, so callers
/// must never pass 0 in — `seed_nonzero` enforces this at the boundary.
#[inline(always)]
pub fn next(state: &mut u64) -> u64 {
    let mut x = *state;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    *state = x;
    x
}

/// Substitutes 1 for a 0 seed — xorshift64's only fixed point.
#[inline(always)]
pub fn seed_nonzero(seed: u64) -> u64 {
    if seed == 0 {
        1
    } else {
        seed
    }
}

/// Derives a deterministic per-cell seed from a base seed and global
/// coordinates, independent of decomposition. Identical (base, gx, gy)
/// always yields the identical seed.
pub fn cell_seed(base: u64, gx: i64, gy: i64) -> u64 {
    let mut s = base
        ^ (gx as u64).wrapping_mul(2_654_435_761)
        ^ (gy as u64).wrapping_mul(40_503);
    next(&mut s);
    seed_nonzero(s)
}

/// Derives a per-thread RNG seed from a shared base seed and thread id.
pub fn thread_seed(base: u64, tid: usize) -> u64 {
    let mixed = base ^ ((tid as u64 + 1).wrapping_mul(2_654_435_761));
    seed_nonzero(mixed)
}

/// Uniform sample in `[0, bound)` via modulo reduction on one xorshift round.
#[inline]
pub fn next_bounded(state: &mut u64, bound: usize) -> usize {
    debug_assert!(bound > 0);
    (next(state) % bound as u64) as usize
}

/// 53-bit mantissa variant of double generation (spec §9 open question,
/// resolved in favor of this form rather than the `1/2^64` scaling some
/// of the source's comments suggested).
#[inline]
pub fn next_f64(state: &mut u64) -> f64 {
    let bits = next(state) >> 11;
    (bits as f64) * 2f64.powi(-53)
}

/// Small wrapper so call sites can hold an RNG by value without juggling
/// a bare `u64` and remembering to call `next`/`seed_nonzero` themselves.
#[derive(Clone, Copy, Debug)]
pub struct Xorshift64 {
    state: u64,
}

impl Xorshift64 {
    pub fn new(seed: u64) -> Self {
        Xorshift64 {
            state: seed_nonzero(seed),
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        next(&mut self.state)
    }

    pub fn next_bounded(&mut self, bound: usize) -> usize {
        next_bounded(&mut self.state, bound)
    }

    pub fn next_f64(&mut self) -> f64 {
        next_f64(&mut self.state)
    }
}

/// Lets `Xorshift64` stand in wherever a caller wants the generic `rand`
/// seam (e.g. `rand::seq` helpers) instead of the bespoke methods above.
impl rand::RngCore for Xorshift64 {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        next(&mut self.state)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut chunks = dest.chunks_exact_mut(8);
        for chunk in &mut chunks {
            chunk.copy_from_slice(&self.next_u64().to_le_bytes());
        }
        let rem = chunks.into_remainder();
        if !rem.is_empty() {
            let bytes = self.next_u64().to_le_bytes();
            rem.copy_from_slice(&bytes[..rem.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_seed_substitutes_one() {
        assert_eq!(seed_nonzero(0), 1);
        assert_eq!(seed_nonzero(7), 7);
    }

    #[test]
    fn next_is_deterministic() {
        let mut a = Xorshift64::new(42);
        let mut b = Xorshift64::new(42);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn cell_seed_rounds_before_substituting_zero() {
        // base=0 at (gx,gy)=(0,0): the mix is exactly 0, so the round (and
        // only the round) runs on 0, which stays 0 — substitution then
        // yields 1, matching `rng_cell_seed`'s "mix, round, then h ? h : 1"
        // order rather than substituting before rounding.
        assert_eq!(cell_seed(0, 0, 0), 1);
    }

    #[test]
    fn cell_seed_is_pure_and_decomposition_independent() {
        // identical inputs -> identical output, regardless of call order
        let s1 = cell_seed(42, 3, 7);
        let s2 = cell_seed(42, 3, 7);
        assert_eq!(s1, s2);
        let s3 = cell_seed(42, 7, 3);
        assert_ne!(s1, s3);
    }

    #[test]
    fn thread_seeds_differ_per_thread() {
        let s0 = thread_seed(1, 0);
        let s1 = thread_seed(1, 1);
        assert_ne!(s0, s1);
    }

    #[test]
    fn next_f64_in_unit_range() {
        let mut rng = Xorshift64::new(1234);
        for _ in 0..1000 {
            let v = rng.next_f64();
            assert!(v >= 0.0 && v < 1.0);
        }
    }

    #[test]
    fn rng_core_fill_bytes_matches_next_u64_stream() {
        use rand::RngCore;
        let mut a = Xorshift64::new(7);
        let mut b = Xorshift64::new(7);
        let mut buf = [0u8; 20];
        a.fill_bytes(&mut buf);
        assert_eq!(&buf[0..8], &b.next_u64().to_le_bytes());
        assert_eq!(&buf[8..16], &b.next_u64().to_le_bytes());
    }
}
