//! Transcript hashing and random-oracle derivation
//!
//! Every input part is length-prefixed before hashing so that distinct part
//! lists can never produce the same hash input.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256, Sha512};
use zeroize::Zeroize;

use crate::{
    error::CryptoError,
    secret::{Secret, SecretBytes},
};

type HmacSha256 = Hmac<Sha256>;

/// Size of a transcript digest.
pub const DIGEST_SIZE: usize = 32;

/// Running digest over exchanged protocol messages.
///
/// Transcripts are public values; they authenticate ordering, they do not
/// protect confidentiality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transcript(pub [u8; DIGEST_SIZE]);

impl Transcript {
    /// Transcript before any message.
    pub const EMPTY: Transcript = Transcript([0; DIGEST_SIZE]);

    /// Fold `parts` into the transcript.
    pub fn chain(&self, label: &[u8], parts: &[&[u8]]) -> Transcript {
        let mut hasher = Sha256::new();
        absorb(&mut hasher, label);
        hasher.update(self.0);
        for part in parts {
            absorb(&mut hasher, part);
        }
        Transcript(hasher.finalize().into())
    }

    /// Fold `parts` into the transcript under an HMAC key.
    ///
    /// Parties without the key cannot compute or predict the chain.
    pub fn chain_keyed(&self, key: &Secret<32>, parts: &[&[u8]]) -> Transcript {
        let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
            unreachable!("HMAC-SHA256 accepts any key size");
        };
        mac.update(&self.0);
        for part in parts {
            mac.update(&(part.len() as u64).to_be_bytes());
            mac.update(part);
        }
        Transcript(mac.finalize().into_bytes().into())
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }
}

fn absorb(hasher: &mut impl sha2::Digest, part: &[u8]) {
    hasher.update((part.len() as u64).to_be_bytes());
    hasher.update(part);
}

/// SHA-256 over length-prefixed parts.
pub fn hash(label: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    absorb(&mut hasher, label);
    for part in parts {
        absorb(&mut hasher, part);
    }
    hasher.finalize().into()
}

/// SHA-512 over length-prefixed parts, for reduction to group scalars.
pub fn hash_wide(label: &[u8], parts: &[&[u8]]) -> [u8; 64] {
    let mut hasher = Sha512::new();
    absorb(&mut hasher, label);
    for part in parts {
        absorb(&mut hasher, part);
    }
    hasher.finalize().into()
}

/// Largest random-oracle output (the HKDF-SHA256 limit).
pub const MAX_ORACLE_OUTPUT: usize = 255 * DIGEST_SIZE;

/// Random oracle: HKDF-SHA256 over length-prefixed input parts.
///
/// # Errors
///
/// - `OutputTooLong` if `out_len` exceeds [`MAX_ORACLE_OUTPUT`]
pub fn oracle(label: &[u8], parts: &[&[u8]], out_len: usize) -> Result<SecretBytes, CryptoError> {
    if out_len > MAX_ORACLE_OUTPUT {
        return Err(CryptoError::OutputTooLong { requested: out_len, max: MAX_ORACLE_OUTPUT });
    }

    let mut ikm = Vec::new();
    for part in parts {
        ikm.extend_from_slice(&(part.len() as u64).to_be_bytes());
        ikm.extend_from_slice(part);
    }

    let hkdf = Hkdf::<Sha256>::new(Some(label), &ikm);
    let mut okm = vec![0u8; out_len];
    let expanded = hkdf.expand(label, &mut okm);
    ikm.zeroize();
    expanded.map_err(|_| CryptoError::OutputTooLong { requested: out_len, max: MAX_ORACLE_OUTPUT })?;

    Ok(SecretBytes::new(okm))
}

/// Split oracle output into fixed-size secrets.
///
/// Returns `None` only if `bytes` is shorter than `N * count`.
pub fn split<const N: usize>(bytes: &SecretBytes, count: usize) -> Option<Vec<Secret<N>>> {
    let slice = bytes.as_slice();
    if slice.len() < N * count {
        return None;
    }
    slice.chunks_exact(N).take(count).map(Secret::from_slice).collect()
}
