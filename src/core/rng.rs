//! Deterministic Random Number Generator
//!
//! Uses Xorshift128+ for fast, high-quality, deterministic randomness.
//! Both battle peers seed from the same value at handshake time; given the
//! same seed, the sequence is identical on every platform, so independently
//! computed damage figures are bit-for-bit comparable.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Lower bound of the damage roll, scaled by 10000 (85%).
pub const ROLL_MIN: u32 = 8500;
/// Upper bound of the damage roll, scaled by 10000 (100%).
pub const ROLL_MAX: u32 = 10000;

/// Deterministic PRNG using Xorshift128+.
///
/// # Determinism Guarantee
///
/// Given the same seed, this RNG produces the exact same sequence of
/// random numbers on any platform.
///
/// # Example
///
/// ```
/// use duelgram::core::rng::DeterministicRng;
///
/// let mut rng = DeterministicRng::new(12345);
/// let value = rng.next_u64();
/// assert_eq!(value, 6233086606872742541); // Always the same!
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Ensure state is never all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random integer in range [0, max).
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        // Simple modulo - slight bias for very large max, but acceptable
        (self.next_u64() % max as u64) as u32
    }

    /// Draw the per-turn damage roll: a value in [8500, 10000] representing
    /// the classic 85%..100% multiplier scaled by 10000.
    ///
    /// Exactly one roll is drawn per turn on each side; the two sequences
    /// stay aligned as long as the seeds match.
    #[inline]
    pub fn damage_roll(&mut self) -> u32 {
        ROLL_MIN + self.next_int(ROLL_MAX - ROLL_MIN + 1)
    }

    /// Get current state (for checkpointing/debugging).
    pub fn state(&self) -> [u64; 2] {
        self.state
    }

    /// Restore from saved state.
    pub fn set_state(&mut self, state: [u64; 2]) {
        self.state = state;
    }
}

/// SplitMix64 for seed initialization.
/// Produces well-distributed values from sequential seeds.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive a session seed on the host at handshake time.
///
/// Hashes local entropy together with both player names under a domain
/// separator and truncates to 64 bits. The joiner never derives a seed;
/// it receives this value in the handshake response, so both sides seed
/// identically before the first damage computation.
pub fn derive_session_seed(entropy: u64, host_name: &str, joiner_name: &str) -> u64 {
    let mut hasher = Sha256::new();

    // Domain separator
    hasher.update(b"DUELGRAM_SEED_V1");
    hasher.update(entropy.to_le_bytes());
    hasher.update(host_name.as_bytes());
    hasher.update(joiner_name.as_bytes());

    let hash = hasher.finalize();

    // Take first 8 bytes as seed
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash[..8]);
    u64::from_le_bytes(bytes)
}

// =============================================================================
// TESTS
// =============================================================================
