//! Ed25519 signatures

use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{env::Environment, error::CryptoError, secret::Secret};

/// Signature collaborator contract.
pub trait SignatureScheme {
    /// Public verification key.
    type VerifyKey;
    /// Secret signing key.
    type SignKey;

    /// Fresh key pair.
    fn generate(env: &impl Environment) -> (Self::VerifyKey, Self::SignKey);

    /// Sign `msg`.
    fn sign(sk: &Self::SignKey, msg: &[u8]) -> Signature;

    /// Check `sig` over `msg`.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature` if the signature does not verify
    fn verify(vk: &Self::VerifyKey, msg: &[u8], sig: &Signature) -> Result<(), CryptoError>;
}

/// Encoded Ed25519 verification key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerifyKey(pub [u8; 32]);

/// Ed25519 signing key seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SignKey(Secret<32>);

impl SignKey {
    /// Matching verification key.
    pub fn verify_key(&self) -> VerifyKey {
        VerifyKey(SigningKey::from_bytes(self.0.as_bytes()).verifying_key().to_bytes())
    }
}

/// Encoded Ed25519 signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "serde_bytes")] pub [u8; 64]);

/// Ed25519 with strict verification.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519;

impl SignatureScheme for Ed25519 {
    type VerifyKey = VerifyKey;
    type SignKey = SignKey;

    fn generate(env: &impl Environment) -> (VerifyKey, SignKey) {
        let mut seed = env.random_array::<32>();
        let sk = SignKey(Secret::from_bytes(seed));
        seed.zeroize();
        (sk.verify_key(), sk)
    }

    fn sign(sk: &SignKey, msg: &[u8]) -> Signature {
        let signing = SigningKey::from_bytes(sk.0.as_bytes());
        Signature(signing.sign(msg).to_bytes())
    }

    fn verify(vk: &VerifyKey, msg: &[u8], sig: &Signature) -> Result<(), CryptoError> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(&vk.0)
            .map_err(|_| CryptoError::InvalidSignature)?;
        let signature = ed25519_dalek::Signature::from_bytes(&sig.0);
        key.verify_strict(msg, &signature).map_err(|_| CryptoError::InvalidSignature)
    }
}
