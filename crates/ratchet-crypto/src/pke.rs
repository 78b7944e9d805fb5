//! Public-key encryption over X25519
//!
//! ECIES: an ephemeral X25519 key agrees a secret with the recipient, HKDF
//! turns it into a single-use AEAD key, and the ephemeral public key is
//! prepended to the AEAD ciphertext.
//!
//! ```text
//! ciphertext = ephemeral_pk (32) || XChaCha20-Poly1305(k, msg, ad)
//! k          = HKDF(shared, info = ephemeral_pk || recipient_pk)
//! ```
//!
//! The same key types double as the Diffie-Hellman group for continuous key
//! agreement.

use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    aead::{AeadKey, Authenticated, KEY_SIZE, XChaCha},
    env::Environment,
    error::CryptoError,
    secret::Secret,
};

/// Size of an encoded X25519 point.
pub const POINT_SIZE: usize = 32;

const ECIES_INFO: &[u8] = b"ratchet ecies v1";

/// Public-key encryption collaborator contract.
pub trait Asymmetric {
    /// Encryption key.
    type PublicKey;
    /// Decryption key.
    type SecretKey;

    /// Deterministic key pair from a 32-byte seed.
    fn generate(seed: &Secret<32>) -> (Self::PublicKey, Self::SecretKey);

    /// Encrypt `msg` to `pk`, binding `ad`.
    fn encrypt(
        env: &impl Environment,
        pk: &Self::PublicKey,
        msg: &[u8],
        ad: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt `ct` with `sk` under `ad`.
    fn decrypt(sk: &Self::SecretKey, ct: &[u8], ad: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// X25519 public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncryptionKey(pub [u8; POINT_SIZE]);

impl EncryptionKey {
    /// Parse from a byte slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; POINT_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::Malformed { what: "x25519 point" })?;
        Ok(Self(array))
    }

    /// Encoded point.
    pub fn as_bytes(&self) -> &[u8; POINT_SIZE] {
        &self.0
    }
}

/// X25519 secret scalar.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop, PartialEq, Eq, Debug)]
pub struct DecryptionKey(Secret<32>);

impl DecryptionKey {
    /// Fresh random key.
    pub fn generate(env: &impl Environment) -> Self {
        let mut bytes = env.random_array::<32>();
        let key = Self(Secret::from_bytes(bytes));
        bytes.zeroize();
        key
    }

    /// Key from seed bytes.
    pub fn from_secret(seed: &Secret<32>) -> Self {
        Self(seed.clone())
    }

    fn scalar(&self) -> StaticSecret {
        StaticSecret::from(*self.0.as_bytes())
    }

    /// Matching public key.
    pub fn public(&self) -> EncryptionKey {
        EncryptionKey(PublicKey::from(&self.scalar()).to_bytes())
    }

    /// X25519 agreement with `peer`.
    ///
    /// # Errors
    ///
    /// - `NonContributory` if `peer` is a low-order point
    pub fn diffie_hellman(&self, peer: &EncryptionKey) -> Result<Secret<32>, CryptoError> {
        let shared = self.scalar().diffie_hellman(&PublicKey::from(peer.0));
        if !shared.was_contributory() {
            return Err(CryptoError::NonContributory);
        }
        Ok(Secret::from_bytes(shared.to_bytes()))
    }
}

/// ECIES over X25519 with XChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, Default)]
pub struct X25519Ecies;

fn ecies_key(shared: &Secret<32>, ephemeral: &EncryptionKey, recipient: &EncryptionKey) -> AeadKey {
    let hkdf = Hkdf::<Sha256>::new(Some(ECIES_INFO), shared.as_bytes());
    let mut info = [0u8; 2 * POINT_SIZE];
    info[..POINT_SIZE].copy_from_slice(&ephemeral.0);
    info[POINT_SIZE..].copy_from_slice(&recipient.0);

    let mut okm = [0u8; KEY_SIZE];
    let Ok(()) = hkdf.expand(&info, &mut okm) else {
        unreachable!("32 bytes is within the HKDF-SHA256 output limit");
    };
    let key = Secret::from_bytes(okm);
    okm.zeroize();
    key
}

impl Asymmetric for X25519Ecies {
    type PublicKey = EncryptionKey;
    type SecretKey = DecryptionKey;

    fn generate(seed: &Secret<32>) -> (EncryptionKey, DecryptionKey) {
        let sk = DecryptionKey::from_secret(seed);
        (sk.public(), sk)
    }

    fn encrypt(
        env: &impl Environment,
        pk: &EncryptionKey,
        msg: &[u8],
        ad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let ephemeral = DecryptionKey::generate(env);
        let ephemeral_pk = ephemeral.public();
        let shared = ephemeral.diffie_hellman(pk)?;
        let key = ecies_key(&shared, &ephemeral_pk, pk);

        let mut ct = Vec::with_capacity(POINT_SIZE + msg.len() + crate::aead::TAG_SIZE);
        ct.extend_from_slice(&ephemeral_pk.0);
        ct.extend_from_slice(&XChaCha::encrypt(&key, msg, ad));
        Ok(ct)
    }

    fn decrypt(sk: &DecryptionKey, ct: &[u8], ad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ct.len() < POINT_SIZE {
            return Err(CryptoError::AuthenticationFailed);
        }
        let (ephemeral_bytes, body) = ct.split_at(POINT_SIZE);
        let ephemeral_pk = EncryptionKey::from_slice(ephemeral_bytes)?;

        // Low-order ephemeral keys are reported like any other forgery.
        let shared =
            sk.diffie_hellman(&ephemeral_pk).map_err(|_| CryptoError::AuthenticationFailed)?;
        let key = ecies_key(&shared, &ephemeral_pk, &sk.public());

        XChaCha::decrypt(&key, body, ad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::SeededEnv;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let env = SeededEnv::from_u64(1);
        let (pk, sk) = X25519Ecies::generate(&Secret::from_bytes([4; 32]));

        let ct = X25519Ecies::encrypt(&env, &pk, b"payload", b"ad").unwrap();
        assert_eq!(X25519Ecies::decrypt(&sk, &ct, b"ad").unwrap(), b"payload");
    }

    #[test]
    fn generate_is_deterministic() {
        let (a, _) = X25519Ecies::generate(&Secret::from_bytes([4; 32]));
        let (b, _) = X25519Ecies::generate(&Secret::from_bytes([4; 32]));
        assert_eq!(a, b);
    }

    #[test]
    fn wrong_key_fails() {
        let env = SeededEnv::from_u64(2);
        let (pk, _) = X25519Ecies::generate(&Secret::from_bytes([4; 32]));
        let (_, other) = X25519Ecies::generate(&Secret::from_bytes([5; 32]));

        let ct = X25519Ecies::encrypt(&env, &pk, b"payload", b"").unwrap();
        assert_eq!(X25519Ecies::decrypt(&other, &ct, b""), Err(CryptoError::AuthenticationFailed));
    }

    #[test]
    fn wrong_ad_fails() {
        let env = SeededEnv::from_u64(3);
        let (pk, sk) = X25519Ecies::generate(&Secret::from_bytes([4; 32]));

        let ct = X25519Ecies::encrypt(&env, &pk, b"payload", b"one").unwrap();
        assert!(X25519Ecies::decrypt(&sk, &ct, b"two").is_err());
    }

    #[test]
    fn short_ciphertext_fails() {
        let (_, sk) = X25519Ecies::generate(&Secret::from_bytes([4; 32]));
        assert!(X25519Ecies::decrypt(&sk, &[0u8; 12], b"").is_err());
    }

    #[test]
    fn diffie_hellman_agrees() {
        let env = SeededEnv::from_u64(4);
        let a = DecryptionKey::generate(&env);
        let b = DecryptionKey::generate(&env);

        assert_eq!(a.diffie_hellman(&b.public()).unwrap(), b.diffie_hellman(&a.public()).unwrap());
    }

    #[test]
    fn low_order_point_is_rejected() {
        let env = SeededEnv::from_u64(5);
        let a = DecryptionKey::generate(&env);

        assert_eq!(
            a.diffie_hellman(&EncryptionKey([0; POINT_SIZE])),
            Err(CryptoError::NonContributory)
        );
    }
}
