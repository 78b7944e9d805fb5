//! Unidirectional ratchets used as BARK onion layers
//!
//! Two variants share one interface:
//!
//! - **Full** (uni-ARCAD): sign-then-encrypt with Ed25519 and X25519 ECIES.
//!   Every message ships a freshly generated receiver state and the sender
//!   moves to the matching fresh sender state, so compromising a receiver
//!   reveals nothing about the next message.
//! - **Lite**: a shared symmetric chain advanced once per message, with
//!   XChaCha20-Poly1305 for confidentiality.

use ratchet_crypto::{
    Asymmetric, Authenticated, DecryptionKey, Ed25519, EncryptionKey, Environment, Secret, SignKey,
    Signature, SignatureScheme, VerifyKey, X25519Ecies, XChaCha,
    hash::{oracle, split},
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{
    codec::{self, Header},
    config::UniVariant,
    error::RatchetError,
};

/// Sending half of a unidirectional ratchet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UniSender {
    /// Signcryption sender
    Full {
        /// Signs the next message
        sign_key: SignKey,
        /// Encrypts the next message
        encryption_key: EncryptionKey,
    },
    /// Symmetric chain sender
    Lite {
        /// Current chain key
        chain: Secret<32>,
    },
}

/// Receiving half of a unidirectional ratchet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UniReceiver {
    /// Signcryption receiver
    Full {
        /// Verifies the next message
        verify_key: VerifyKey,
        /// Decrypts the next message
        decryption_key: DecryptionKey,
    },
    /// Symmetric chain receiver
    Lite {
        /// Current chain key
        chain: Secret<32>,
    },
}

impl Zeroize for UniSender {
    fn zeroize(&mut self) {
        match self {
            UniSender::Full { sign_key, .. } => sign_key.zeroize(),
            UniSender::Lite { chain } => chain.zeroize(),
        }
    }
}

impl Zeroize for UniReceiver {
    fn zeroize(&mut self) {
        match self {
            UniReceiver::Full { decryption_key, .. } => decryption_key.zeroize(),
            UniReceiver::Lite { chain } => chain.zeroize(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct FullLayer {
    next: UniReceiver,
    #[serde(with = "serde_bytes")]
    body: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct Signed {
    #[serde(with = "serde_bytes")]
    message: Vec<u8>,
    signature: Signature,
}

fn signed_bytes(ad: &[u8], message: &[u8]) -> Vec<u8> {
    Header::new(b"ratchet uni").bytes(ad).bytes(message).finish()
}

/// Advance a lite chain: `(message key, next chain)`.
fn lite_step(chain: &Secret<32>, ad: &[u8]) -> Result<(Secret<32>, Secret<32>), RatchetError> {
    let stream = oracle(b"ratchet lite-uni", &[chain.as_bytes(), ad], 64)?;
    match split::<32>(&stream, 2).map(<[_; 2]>::try_from) {
        Some(Ok([key, next])) => Ok((key, next)),
        _ => Err(RatchetError::Malformed { what: "lite chain output" }),
    }
}

/// Fresh sender and receiver of the given variant.
pub fn generate(env: &impl Environment, variant: UniVariant) -> (UniSender, UniReceiver) {
    match variant {
        UniVariant::Full => {
            let (verify_key, sign_key) = Ed25519::generate(env);
            let decryption_key = DecryptionKey::generate(env);
            let encryption_key = decryption_key.public();
            (
                UniSender::Full { sign_key, encryption_key },
                UniReceiver::Full { verify_key, decryption_key },
            )
        },
        UniVariant::Lite => {
            let chain = Secret::from_bytes(env.random_array());
            (UniSender::Lite { chain: chain.clone() }, UniReceiver::Lite { chain })
        },
    }
}

impl UniSender {
    /// Encrypt `pt` and advance.
    pub fn send(
        &mut self,
        env: &impl Environment,
        ad: &[u8],
        pt: &[u8],
    ) -> Result<Vec<u8>, RatchetError> {
        match self {
            UniSender::Full { sign_key, encryption_key } => {
                let (next_sender, next) = generate(env, UniVariant::Full);
                let message = codec::encode(&FullLayer { next, body: pt.to_vec() })?;
                let signature = Ed25519::sign(sign_key, &signed_bytes(ad, &message));
                let sealed = codec::encode(&Signed { message, signature })?;
                let ct = X25519Ecies::encrypt(env, encryption_key, &sealed, ad)?;

                *self = next_sender;
                Ok(ct)
            },
            UniSender::Lite { chain } => {
                let (key, next) = lite_step(chain, ad)?;
                let ct = XChaCha::encrypt(&key, pt, ad);

                *chain = next;
                Ok(ct)
            },
        }
    }
}

impl UniReceiver {
    /// Decrypt `ct` and advance.
    ///
    /// # Errors
    ///
    /// - `Crypto` on a wrong key, `ad` or signature
    /// - `Malformed` if the decrypted layer does not decode
    pub fn receive(&mut self, ad: &[u8], ct: &[u8]) -> Result<Vec<u8>, RatchetError> {
        match self {
            UniReceiver::Full { verify_key, decryption_key } => {
                let sealed = X25519Ecies::decrypt(decryption_key, ct, ad)?;
                let Signed { message, signature } = codec::decode(&sealed)?;
                Ed25519::verify(verify_key, &signed_bytes(ad, &message), &signature)?;
                let FullLayer { next, body } = codec::decode(&message)?;
                if !matches!(next, UniReceiver::Full { .. }) {
                    return Err(RatchetError::Malformed { what: "uni receiver variant" });
                }

                *self = next;
                Ok(body)
            },
            UniReceiver::Lite { chain } => {
                let (key, next) = lite_step(chain, ad)?;
                let pt = XChaCha::decrypt(&key, ct, ad)?;

                *chain = next;
                Ok(pt)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use ratchet_crypto::SeededEnv;

    use super::*;

    fn roundtrip(variant: UniVariant) {
        let env = SeededEnv::from_u64(1);
        let (mut sender, mut receiver) = generate(&env, variant);

        for i in 0..4u8 {
            let ct = sender.send(&env, b"ad", &[i; 8]).unwrap();
            assert_eq!(receiver.receive(b"ad", &ct).unwrap(), vec![i; 8]);
        }
    }

    #[test]
    fn full_roundtrip() {
        roundtrip(UniVariant::Full);
    }

    #[test]
    fn lite_roundtrip() {
        roundtrip(UniVariant::Lite);
    }

    #[test]
    fn full_sender_rotates_keys() {
        let env = SeededEnv::from_u64(2);
        let (mut sender, _) = generate(&env, UniVariant::Full);
        let before = sender.clone();

        sender.send(&env, b"", b"m").unwrap();
        assert_ne!(sender, before);
    }

    #[test]
    fn replay_fails_after_advance() {
        for variant in [UniVariant::Full, UniVariant::Lite] {
            let env = SeededEnv::from_u64(3);
            let (mut sender, mut receiver) = generate(&env, variant);

            let ct = sender.send(&env, b"", b"once").unwrap();
            receiver.receive(b"", &ct).unwrap();
            assert!(receiver.receive(b"", &ct).is_err());
        }
    }

    #[test]
    fn failed_receive_does_not_advance() {
        for variant in [UniVariant::Full, UniVariant::Lite] {
            let env = SeededEnv::from_u64(4);
            let (mut sender, mut receiver) = generate(&env, variant);
            let before = receiver.clone();

            let ct = sender.send(&env, b"ad", b"m").unwrap();
            assert!(receiver.receive(b"wrong", &ct).is_err());
            assert_eq!(receiver, before);
            assert_eq!(receiver.receive(b"ad", &ct).unwrap(), b"m");
        }
    }
}
