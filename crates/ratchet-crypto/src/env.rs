//! Entropy abstraction for deterministic testing.
//!
//! Decouples protocol logic from the source of randomness. Production code
//! uses [`SystemEnv`] (OS entropy); tests and protocol steps that must derive
//! identical key material on both sides use [`SeededEnv`].

use std::sync::{Mutex, PoisonError};

use rand_chacha::{
    ChaCha20Rng,
    rand_core::{RngCore, SeedableRng},
};

/// Abstract source of randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Given the same seed, a deterministic implementation produces the same
///   sequence of bytes
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion)
pub trait Environment {
    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Returns a fresh array of random bytes.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }
}

impl<E: Environment + ?Sized> Environment for &E {
    fn random_bytes(&self, buffer: &mut [u8]) {
        (**self).random_bytes(buffer);
    }
}

/// Production environment backed by the OS RNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. Continuing without entropy would compromise
/// every key generated afterwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}

/// Deterministic environment driven by a ChaCha20 stream.
///
/// Two instances created from the same seed yield identical byte streams.
/// Besides tests, protocols use it to expand a shared secret seed into key
/// pairs both parties must agree on.
#[derive(Debug)]
pub struct SeededEnv {
    rng: Mutex<ChaCha20Rng>,
}

impl SeededEnv {
    /// Create an environment from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { rng: Mutex::new(ChaCha20Rng::from_seed(seed)) }
    }

    /// Create an environment from a small integer, for tests and simulations.
    pub fn from_u64(seed: u64) -> Self {
        Self { rng: Mutex::new(ChaCha20Rng::seed_from_u64(seed)) }
    }
}

impl Environment for SeededEnv {
    fn random_bytes(&self, buffer: &mut [u8]) {
        // A poisoned lock still holds a valid generator state.
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.fill_bytes(buffer);
    }
}
