//! Secretly key-updatable ElGamal over Ristretto
//!
//! Keys move forward by an additive update `delta`:
//!
//! ```text
//! dk' = dk + delta
//! ek' = ek + delta * G
//! ```
//!
//! Anyone holding `delta` can move both halves, but a party that only sees
//! the updated decryption key cannot recover the old one without `delta`.
//! Messages are hybrid-encrypted: a Diffie-Hellman share keys an AEAD.

use curve25519_dalek::{
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    aead::{Authenticated, XChaCha},
    env::Environment,
    error::CryptoError,
    hash::{hash, hash_wide},
    secret::Secret,
};

const POINT_SIZE: usize = 32;

/// Encryption key (compressed Ristretto point).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpdatableEk([u8; POINT_SIZE]);

/// Decryption key (canonical scalar).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct UpdatableDk(Secret<32>);

/// Additive key update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Delta(Secret<32>);

fn point(bytes: &[u8; POINT_SIZE]) -> Result<RistrettoPoint, CryptoError> {
    CompressedRistretto(*bytes).decompress().ok_or(CryptoError::Malformed { what: "ristretto point" })
}

fn scalar(bytes: &Secret<32>) -> Result<Scalar, CryptoError> {
    Option::from(Scalar::from_canonical_bytes(*bytes.as_bytes()))
        .ok_or(CryptoError::Malformed { what: "scalar" })
}

fn wide_scalar(label: &[u8], parts: &[&[u8]]) -> Scalar {
    let mut wide = hash_wide(label, parts);
    let s = Scalar::from_bytes_mod_order_wide(&wide);
    wide.zeroize();
    s
}

impl Delta {
    /// Derive an update from public or secret bytes.
    pub fn derive(input: &[u8]) -> Self {
        Self(Secret::from_bytes(wide_scalar(b"ratchet elgamal delta", &[input]).to_bytes()))
    }
}

impl UpdatableEk {
    /// Encoded point.
    pub fn as_bytes(&self) -> &[u8; POINT_SIZE] {
        &self.0
    }

    /// Apply `delta`.
    pub fn update(&self, delta: &Delta) -> Result<Self, CryptoError> {
        let moved = point(&self.0)? + RistrettoPoint::mul_base(&scalar(&delta.0)?);
        Ok(Self(moved.compress().to_bytes()))
    }
}

impl UpdatableDk {
    /// Fresh random key.
    pub fn generate(env: &impl Environment) -> Self {
        let mut wide = env.random_array::<64>();
        let s = Scalar::from_bytes_mod_order_wide(&wide);
        wide.zeroize();
        Self(Secret::from_bytes(s.to_bytes()))
    }

    /// Key derived deterministically from a seed.
    pub fn from_seed(seed: &[u8]) -> Self {
        Self(Secret::from_bytes(wide_scalar(b"ratchet elgamal seed", &[seed]).to_bytes()))
    }

    /// Matching encryption key.
    pub fn public(&self) -> Result<UpdatableEk, CryptoError> {
        Ok(UpdatableEk(RistrettoPoint::mul_base(&scalar(&self.0)?).compress().to_bytes()))
    }

    /// Apply `delta`.
    pub fn update(&self, delta: &Delta) -> Result<Self, CryptoError> {
        let moved = scalar(&self.0)? + scalar(&delta.0)?;
        Ok(Self(Secret::from_bytes(moved.to_bytes())))
    }
}

fn hybrid_key(share: &RistrettoPoint, shared: &RistrettoPoint) -> Secret<32> {
    Secret::from_bytes(hash(
        b"ratchet elgamal kem",
        &[share.compress().as_bytes(), shared.compress().as_bytes()],
    ))
}

/// Encrypt `msg` to `ek`: `R || AEAD(H(R, r*ek), msg, ad)`.
pub fn encrypt(
    env: &impl Environment,
    ek: &UpdatableEk,
    msg: &[u8],
    ad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let mut wide = env.random_array::<64>();
    let r = Scalar::from_bytes_mod_order_wide(&wide);
    wide.zeroize();

    let share = RistrettoPoint::mul_base(&r);
    let shared = point(&ek.0)? * r;
    let key = hybrid_key(&share, &shared);

    let mut ct = share.compress().to_bytes().to_vec();
    ct.extend_from_slice(&XChaCha::encrypt(&key, msg, ad));
    Ok(ct)
}

/// Decrypt `ct` with `dk`.
pub fn decrypt(dk: &UpdatableDk, ct: &[u8], ad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let Some((share_bytes, body)) = ct.split_first_chunk::<POINT_SIZE>() else {
        return Err(CryptoError::AuthenticationFailed);
    };
    let share = point(share_bytes).map_err(|_| CryptoError::AuthenticationFailed)?;
    let shared = share * scalar(&dk.0)?;

    XChaCha::decrypt(&hybrid_key(&share, &shared), body, ad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::SeededEnv;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let env = SeededEnv::from_u64(1);
        let dk = UpdatableDk::generate(&env);
        let ek = dk.public().unwrap();

        let ct = encrypt(&env, &ek, b"hi", b"ad").unwrap();
        assert_eq!(decrypt(&dk, &ct, b"ad").unwrap(), b"hi");
    }

    #[test]
    fn updates_commute_across_halves() {
        let env = SeededEnv::from_u64(2);
        let dk = UpdatableDk::generate(&env);
        let ek = dk.public().unwrap();
        let delta = Delta::derive(b"update");

        let dk2 = dk.update(&delta).unwrap();
        let ek2 = ek.update(&delta).unwrap();
        assert_eq!(dk2.public().unwrap(), ek2);

        let ct = encrypt(&env, &ek2, b"after update", b"").unwrap();
        assert_eq!(decrypt(&dk2, &ct, b"").unwrap(), b"after update");
        assert!(decrypt(&dk, &ct, b"").is_err());
    }

    #[test]
    fn seeded_keys_are_deterministic() {
        assert_eq!(
            UpdatableDk::from_seed(b"seed").public().unwrap(),
            UpdatableDk::from_seed(b"seed").public().unwrap()
        );
    }

    #[test]
    fn short_ciphertext_is_rejected() {
        let dk = UpdatableDk::from_seed(b"seed");
        assert_eq!(decrypt(&dk, &[1, 2, 3], b""), Err(CryptoError::AuthenticationFailed));
    }
}
