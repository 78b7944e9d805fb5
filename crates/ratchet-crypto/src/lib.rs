//! Ratchet Cryptographic Collaborators
//!
//! Primitives consumed by the ratchet state machines through narrow
//! contracts. Nothing here keeps protocol state: every function maps inputs
//! to outputs, and randomness comes from an explicit [`Environment`] so that
//! whole protocol runs can be replayed from a seed.
//!
//! # Contents
//!
//! ```text
//! env        Environment, SystemEnv, SeededEnv
//! secret     Secret<N>, SecretBytes   (zeroize, constant-time eq, no Debug leak)
//! prf_prng   PrngState                (HKDF-SHA256 forward-secure chain)
//! aead       Authenticated, XChaCha   (single-use keys)
//! pke        Asymmetric, X25519Ecies  (plus X25519 Diffie-Hellman)
//! signature  SignatureScheme, Ed25519
//! hibe       Boneh-Boyen-Goh HIBE over BLS12-381
//! elgamal    key-updatable ElGamal over Ristretto
//! hash       transcripts and random-oracle derivation
//! ```
//!
//! # Security
//!
//! Key Material:
//! - Every secret lives in a [`Secret`] or [`SecretBytes`] and is zeroized on
//!   drop
//! - Temporary buffers holding key bytes are zeroized before returning
//!
//! Failure Reporting:
//! - Decryption failures are reported as `AuthenticationFailed` regardless of
//!   which check rejected the input

#![forbid(unsafe_code)]

pub mod aead;
pub mod elgamal;
pub mod env;
pub mod error;
pub mod hash;
pub mod hibe;
pub mod pke;
pub mod prf_prng;
pub mod secret;
pub mod signature;

pub use aead::{AeadKey, Authenticated, XChaCha};
pub use env::{Environment, SeededEnv, SystemEnv};
pub use error::CryptoError;
pub use hash::Transcript;
pub use pke::{Asymmetric, DecryptionKey, EncryptionKey, X25519Ecies};
pub use prf_prng::PrngState;
pub use secret::{Secret, SecretBytes};
pub use signature::{Ed25519, SignKey, Signature, SignatureScheme, VerifyKey};
