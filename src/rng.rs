//! Deterministic random source for value generation
//!
//! All randomness used by the engine flows through [`RngSource`], a thin wrapper
//! around a ChaCha8 generator seeded from a single `u64`. The same seed always
//! yields the same sequence of draws on every platform, which is what makes a
//! reported seed sufficient to reproduce a failing run.

use byteorder::{BigEndian, ReadBytesExt};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seeded pseudo-random bit generator owned by exactly one property run.
#[derive(Debug, Clone)]
pub struct RngSource {
    /// Seed this source was created from
    seed: u64,

    /// Underlying ChaCha8 stream
    rng: ChaCha8Rng,
}

impl RngSource {
    /// Create a new source from the given seed
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// The seed this source was created from
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Draw the next raw 64 bits
    pub fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// Draw an integer uniformly from the inclusive range `[lo, hi]`.
    ///
    /// An empty or degenerate range returns `lo` without consuming randomness.
    pub fn uniform_int(&mut self, lo: i128, hi: i128) -> i128 {
        if lo >= hi {
            return lo;
        }
        self.rng.gen_range(lo..=hi)
    }

    /// Fair coin flip
    pub fn uniform_bool(&mut self) -> bool {
        self.next_u64() >> 63 == 1
    }

    /// Uniform fraction in `[0, 1)` built from the top 53 bits of one draw
    pub fn uniform_float(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Uniform index in `[0, len)`; `len` must be non-zero
    pub fn uniform_index(&mut self, len: usize) -> usize {
        debug_assert!(len > 0);
        self.uniform_int(0, len as i128 - 1) as usize
    }
}

/// Derive a stable seed from a test label.
///
/// The label is hashed with SHA-256 and the first eight bytes are read as a
/// big-endian integer, so a given test name always maps to the same seed.
pub fn seed_for_label(label: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(label.as_bytes());
    let digest = hasher.finalize();
    let mut prefix = &digest[..8];
    // Reading eight bytes out of a 32-byte digest cannot run short.
    prefix.read_u64::<BigEndian>().unwrap_or(0)
}

/// Calls to [`seed_from_clock`] made so far in this process
static CLOCK_SEEDS_ISSUED: AtomicU64 = AtomicU64::new(0);

/// Derive a seed from the system clock, used when no seed was supplied.
///
/// A process-local counter is folded in, so calls that land on the same
/// clock reading (or on a reading the wall clock repeats after stepping
/// backwards) still get different seeds.
pub fn seed_from_clock() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let nanos = elapsed.as_nanos();
    let clock = (nanos as u64) ^ ((nanos >> 64) as u64).rotate_left(32);
    let issued = CLOCK_SEEDS_ISSUED.fetch_add(1, Ordering::Relaxed);
    // Odd multiplier keeps distinct counters distinct after mixing
    clock ^ issued.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}
