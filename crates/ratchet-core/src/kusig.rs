//! Key-updating signatures
//!
//! A chain of one-time Ed25519 keys. Each signature names the verification
//! key for the next one, and the verifier moves to it once the signature
//! checks out. A signing key is used once and then dropped.

use ratchet_crypto::{Ed25519, Environment, SignKey, Signature, SignatureScheme, VerifyKey};
use serde::{Deserialize, Serialize};

use crate::{codec::Header, error::RatchetError};

/// Signature plus the key that verifies the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KuSignature {
    /// Verification key for the signer's next signature
    pub next_verify_key: VerifyKey,
    /// Signature over `counter || next_verify_key || message`
    pub signature: Signature,
}

/// Signing side of the chain.
#[derive(Debug, Clone)]
pub struct KuSigner {
    counter: u64,
    key: SignKey,
}

/// Verifying side of the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KuVerifier {
    counter: u64,
    key: VerifyKey,
}

fn signed_bytes(counter: u64, next: &VerifyKey, msg: &[u8]) -> Vec<u8> {
    Header::new(b"ratchet kusig").u64(counter).bytes(&next.0).bytes(msg).finish()
}

/// Fresh signer and matching verifier.
pub fn generate(env: &impl Environment) -> (KuSigner, KuVerifier) {
    let (key, sign) = Ed25519::generate(env);
    (KuSigner { counter: 0, key: sign }, KuVerifier { counter: 0, key })
}

impl KuSigner {
    /// Signatures produced so far.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Sign `msg` and move to a fresh key.
    pub fn sign(&mut self, env: &impl Environment, msg: &[u8]) -> KuSignature {
        let (next_verify_key, next) = Ed25519::generate(env);
        let signature = Ed25519::sign(&self.key, &signed_bytes(self.counter, &next_verify_key, msg));

        self.key = next;
        self.counter += 1;
        KuSignature { next_verify_key, signature }
    }
}

impl KuVerifier {
    /// Signatures verified so far.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Verify the next signature in the chain and move to its key.
    ///
    /// # Errors
    ///
    /// - `Crypto(InvalidSignature)` if `sig` is not the next signature over
    ///   `msg`; the verifier is unchanged
    pub fn verify(&mut self, msg: &[u8], sig: &KuSignature) -> Result<(), RatchetError> {
        let bytes = signed_bytes(self.counter, &sig.next_verify_key, msg);
        Ed25519::verify(&self.key, &bytes, &sig.signature)?;

        self.key = sig.next_verify_key;
        self.counter += 1;
        Ok(())
    }
}
