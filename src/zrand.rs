//! `random` opcode support (§4.6 "Misc"): uniform `[1, range]` draws, plus a
//! seedable mode for reproducible test runs.

use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};

/// Predictable mode seeds a fixed PRNG for testing; uniform mode draws from
/// the OS entropy source for actual gameplay.
pub enum RandMode {
    Predictable,
    RandomUniform,
}

pub struct ZRand {
    rng: Box<dyn RngCore>,
    rand_mode: RandMode,
}

impl ZRand {
    pub fn new(rm: RandMode) -> ZRand {
        ZRand { rng: Box::new(rand::thread_rng()), rand_mode: rm }
    }

    pub fn new_uniform() -> ZRand {
        ZRand::new(RandMode::RandomUniform)
    }


    pub fn new_predictable(seed: u64) -> ZRand {
        ZRand {rng: Box::new(StdRng::seed_from_u64(seed)), rand_mode: RandMode::Predictable}
    }

    /// gen_unsigned_rand generates unsigned in range [0..32767]
    pub fn gen_unsigned_rand(&mut self) -> u16 {
        // NOTE: This could probably be (u16::MAX +1) / 2
        self.rng.gen_range(0..32768)
    }

    /// `random range` (§4.6): a uniform value in `[1, range]`.
    pub fn gen_range_inclusive(&mut self, range: u16) -> u16 {
        self.rng.gen_range(1..=range)
    }

    /// `random 0`/`random -N` reseed the generator instead of returning a value.
    pub fn reseed_random(&mut self) {
        self.rng = Box::new(rand::thread_rng());
        self.rand_mode = RandMode::RandomUniform;
    }

    pub fn reseed_predictable(&mut self, seed: u64) {
        self.rng = Box::new(StdRng::seed_from_u64(seed));
        self.rand_mode = RandMode::Predictable;
    }
}
