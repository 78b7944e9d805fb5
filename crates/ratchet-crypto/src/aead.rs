//! Authenticated encryption with single-use keys
//!
//! Ratchets never reuse a message key, so the AEAD contract here is keyed
//! by the key alone: the cipher key and the 24-byte nonce are both expanded
//! from it with HKDF. Sealing two messages under one key is a caller bug.

use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{error::CryptoError, secret::Secret};

/// Size of an AEAD key.
pub const KEY_SIZE: usize = 32;

/// Poly1305 tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

const NONCE_SIZE: usize = 24;

const EXPAND_INFO: &[u8] = b"ratchet aead key+nonce v1";

/// Single-use AEAD key.
pub type AeadKey = Secret<KEY_SIZE>;

/// AEAD collaborator contract.
pub trait Authenticated {
    /// Encrypt and authenticate `msg`, binding `ad`.
    fn encrypt(key: &AeadKey, msg: &[u8], ad: &[u8]) -> Vec<u8>;

    /// Verify and decrypt `ct` under `ad`.
    ///
    /// # Errors
    ///
    /// - `AuthenticationFailed`: wrong key, wrong `ad`, or tampered bytes
    fn decrypt(key: &AeadKey, ct: &[u8], ad: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// XChaCha20-Poly1305 with key-derived nonces.
#[derive(Debug, Clone, Copy, Default)]
pub struct XChaCha;

impl XChaCha {
    fn expand(key: &AeadKey) -> (XChaCha20Poly1305, [u8; NONCE_SIZE]) {
        let hkdf = Hkdf::<Sha256>::new(None, key.as_bytes());
        let mut okm = [0u8; KEY_SIZE + NONCE_SIZE];
        let Ok(()) = hkdf.expand(EXPAND_INFO, &mut okm) else {
            unreachable!("56 bytes is within the HKDF-SHA256 output limit");
        };

        let cipher = XChaCha20Poly1305::new(Key::from_slice(&okm[..KEY_SIZE]));
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&okm[KEY_SIZE..]);
        okm.zeroize();

        (cipher, nonce)
    }
}

impl Authenticated for XChaCha {
    fn encrypt(key: &AeadKey, msg: &[u8], ad: &[u8]) -> Vec<u8> {
        let (cipher, nonce) = Self::expand(key);

        let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), Payload { msg, aad: ad })
        else {
            unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
        };

        ciphertext
    }

    fn decrypt(key: &AeadKey, ct: &[u8], ad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let (cipher, nonce) = Self::expand(key);

        cipher
            .decrypt(XNonce::from_slice(&nonce), Payload { msg: ct, aad: ad })
            .map_err(|_| CryptoError::AuthenticationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> AeadKey {
        Secret::from_bytes([byte; KEY_SIZE])
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let ct = XChaCha::encrypt(&key(1), b"Hello, World!", b"header");
        let pt = XChaCha::decrypt(&key(1), &ct, b"header").unwrap();
        assert_eq!(pt, b"Hello, World!");
    }

    #[test]
    fn ciphertext_is_larger_than_plaintext() {
        let ct = XChaCha::encrypt(&key(1), b"test message", b"");
        assert_eq!(ct.len(), b"test message".len() + TAG_SIZE);
    }

    #[test]
    fn encrypt_decrypt_empty_message() {
        let ct = XChaCha::encrypt(&key(0), b"", b"");
        assert_eq!(XChaCha::decrypt(&key(0), &ct, b"").unwrap(), b"");
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let ct = XChaCha::encrypt(&key(1), b"secret message", b"");
        assert_eq!(XChaCha::decrypt(&key(2), &ct, b""), Err(CryptoError::AuthenticationFailed));
    }

    #[test]
    fn wrong_associated_data_fails_decryption() {
        let ct = XChaCha::encrypt(&key(1), b"secret message", b"epoch 1");
        assert_eq!(
            XChaCha::decrypt(&key(1), &ct, b"epoch 2"),
            Err(CryptoError::AuthenticationFailed)
        );
    }

    #[test]
    fn tampered_ciphertext_fails_decryption() {
        let mut ct = XChaCha::encrypt(&key(1), b"original message", b"");
        ct[0] ^= 0xFF;
        assert!(XChaCha::decrypt(&key(1), &ct, b"").is_err());
    }

    #[test]
    fn truncated_ciphertext_fails_decryption() {
        let ct = XChaCha::encrypt(&key(1), b"original message", b"");
        assert!(XChaCha::decrypt(&key(1), &ct[..TAG_SIZE - 1], b"").is_err());
    }

    #[test]
    fn encryption_is_deterministic_per_key() {
        let a = XChaCha::encrypt(&key(5), b"m", b"ad");
        let b = XChaCha::encrypt(&key(5), b"m", b"ad");
        assert_eq!(a, b);
    }
}
