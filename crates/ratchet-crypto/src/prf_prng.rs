//! Forward-secure PRF-PRNG chain
//!
//! A 128-bit state is expanded with HKDF-SHA256 into a successor state plus
//! caller-sized output. The caller replaces its state with the successor, so
//! holding the current state never reveals earlier outputs.
//!
//! # Security Properties
//!
//! - Forward Secrecy: the previous state is zeroized when superseded
//! - Determinism: same `(state, salt, len)` always yields the same result
//! - Salting: an optional salt mixes fresh entropy (e.g. a CKA key) into the
//!   chain, which is how ratchets heal after compromise

use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    env::Environment,
    error::CryptoError,
    secret::{Secret, SecretBytes},
};

/// Size of a chain state in bytes.
pub const STATE_SIZE: usize = 16;

/// Largest output a single update can produce (HKDF-SHA256 limit minus the state).
pub const MAX_OUTPUT: usize = 255 * 32 - STATE_SIZE;

const INFO: &[u8] = b"ratchet prf-prng v1";

/// One link of the PRF-PRNG chain.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct PrngState(Secret<STATE_SIZE>);

impl PrngState {
    /// Fresh random state.
    pub fn generate(env: &impl Environment) -> Self {
        let mut bytes = env.random_array::<STATE_SIZE>();
        let state = Self(Secret::from_bytes(bytes));
        bytes.zeroize();
        state
    }

    /// State from known bytes, for fixed vectors and shared-secret bootstrap.
    pub fn from_bytes(bytes: [u8; STATE_SIZE]) -> Self {
        Self(Secret::from_bytes(bytes))
    }

    /// Derive the successor state and `out_len` bytes of output.
    ///
    /// # Errors
    ///
    /// - `OutputTooLong` if `out_len` exceeds [`MAX_OUTPUT`]
    pub fn update(
        &self,
        out_len: usize,
        salt: Option<&[u8]>,
    ) -> Result<(PrngState, SecretBytes), CryptoError> {
        if out_len > MAX_OUTPUT {
            return Err(CryptoError::OutputTooLong { requested: out_len, max: MAX_OUTPUT });
        }

        let hkdf = Hkdf::<Sha256>::new(salt, self.0.as_bytes());
        let mut okm = vec![0u8; STATE_SIZE + out_len];
        hkdf.expand(INFO, &mut okm)
            .map_err(|_| CryptoError::OutputTooLong { requested: out_len, max: MAX_OUTPUT })?;

        let mut next = [0u8; STATE_SIZE];
        next.copy_from_slice(&okm[..STATE_SIZE]);
        let output = SecretBytes::new(okm[STATE_SIZE..].to_vec());

        okm.zeroize();
        let state = PrngState::from_bytes(next);
        next.zeroize();

        Ok((state, output))
    }

    /// Advance in place, returning a fixed-size output.
    ///
    /// Convenience over [`update`](Self::update) for the common case of
    /// deriving one key.
    pub fn advance<const N: usize>(&mut self, salt: Option<&[u8]>) -> Result<Secret<N>, CryptoError> {
        let (next, output) = self.update(N, salt)?;
        *self = next;
        Secret::from_slice(output.as_slice())
            .ok_or(CryptoError::OutputTooLong { requested: N, max: MAX_OUTPUT })
    }
}
