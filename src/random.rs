//! Seeded deterministic generator for input generators.
//!
//! This is the xoroshiro128+ generator of Blackman and Vigna with a fixed
//! seeding schedule, so a generator fixture reproduces the same test data
//! on every machine.

use std::num::ParseIntError;

use rand_core::{impls, Error, RngCore};

pub struct RandomGenerator {
    state: [u64; 2],
}

#[inline]
fn rotl(x: u64, k: u32) -> u64 {
    x.rotate_left(k)
}

impl RandomGenerator {
    pub fn new(seed: u64) -> Self {
        let mut rng = RandomGenerator {
            state: [
                seed.wrapping_mul(0xdead_beef),
                seed ^ 0xc0de_1234,
            ],
        };
        // Warm-up: the raw seed words are far from equidistributed.
        for _ in 0..100 {
            rng.next_u64();
        }
        rng
    }

    /// Seed from a base-16 string, with or without a `0x` prefix.
    pub fn from_hex(seed: &str) -> Result<Self, ParseIntError> {
        let digits = seed.strip_prefix("0x").unwrap_or(seed);
        Ok(Self::new(u64::from_str_radix(digits, 16)?))
    }

    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);
        s1 ^= s0;
        self.state[0] = rotl(s0, 55) ^ s1 ^ (s1 << 14);
        self.state[1] = rotl(s1, 36);
        result
    }

    /// The high bits of the 64-bit output; the low bits of xoroshiro128+
    /// are its weakest.
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 11) as u32
    }

    /// Uniform-ish value in `0..size`. The modulo bias is negligible for
    /// 32-bit `size` against a 64-bit source.
    pub fn next_range(&mut self, size: u32) -> u32 {
        (self.next_u64() % u64::from(size)) as u32
    }

    /// Uniform-ish value in `start..past_end`.
    pub fn next_between(&mut self, start: u32, past_end: u32) -> u32 {
        start + self.next_range(past_end - start)
    }
}

impl RngCore for RandomGenerator {
    fn next_u32(&mut self) -> u32 {
        RandomGenerator::next_u32(self)
    }

    fn next_u64(&mut self) -> u64 {
        RandomGenerator::next_u64(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
