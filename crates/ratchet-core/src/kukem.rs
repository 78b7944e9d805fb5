//! Key-updatable KEM over HIBE
//!
//! A public key is HIBE parameters plus an identity path; the secret key is
//! the HIBE key for that path. Updating with associated data appends the
//! hashed data to the path on both sides. Secret updates are one-way: the
//! child key cannot recover its parent, so an update erases the ability to
//! decapsulate anything encapsulated to the old key.
//!
//! Secret-side extraction is deterministic. The randomness comes from a
//! per-key chain that advances with every update, so two parties that
//! derive the same key pair from a shared seed stay in lock step.

use ratchet_crypto::{
    CryptoError, Environment, SeededEnv, Secret,
    hash::{oracle, split},
    hibe::{self, EntityKey, HibeCiphertext, HibeParams, Identity},
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::RatchetError;

const KEM_AD: &[u8] = b"ratchet kukem";

/// Encapsulated key.
pub type KemCiphertext = HibeCiphertext;

/// ku-KEM public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KuPublicKey {
    params: HibeParams,
    path: Vec<Identity>,
}

/// ku-KEM secret key.
#[derive(Debug, Clone, Zeroize)]
pub struct KuSecretKey {
    #[zeroize(skip)]
    params: HibeParams,
    key: EntityKey,
    chain: Secret<32>,
}

impl Zeroize for KuPublicKey {
    fn zeroize(&mut self) {
        // Public material; erasing only drops the path.
        self.path.clear();
    }
}

impl KuPublicKey {
    /// Number of updates applied.
    pub fn level(&self) -> usize {
        self.path.len()
    }

    /// Fixed encoding `params || path`, for binding into signatures.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.params.to_bytes();
        for id in &self.path {
            out.extend_from_slice(id.as_bytes());
        }
        out
    }

    /// Move the key forward under `ad`.
    ///
    /// # Errors
    ///
    /// - `KeyExhausted` once the path fills the hierarchy
    pub fn update(&mut self, ad: &[u8]) -> Result<(), RatchetError> {
        if self.path.len() >= self.params.depth() {
            return Err(RatchetError::KeyExhausted { depth: self.params.depth() });
        }
        self.path.push(Identity::hash(ad));
        Ok(())
    }
}

impl KuSecretKey {
    /// Number of updates applied.
    pub fn level(&self) -> usize {
        self.key.path().len()
    }

    /// Move the key forward under `ad`, erasing the parent.
    ///
    /// # Errors
    ///
    /// - `KeyExhausted` once the path fills the hierarchy
    pub fn update(&mut self, ad: &[u8]) -> Result<(), RatchetError> {
        let stream = oracle(b"ratchet kukem update", &[self.chain.as_bytes(), ad], 64)?;
        let Some(Ok([seed, chain])) = split::<32>(&stream, 2).map(<[_; 2]>::try_from) else {
            return Err(RatchetError::Malformed { what: "key update output" });
        };

        let key = hibe::extract(&self.params, &self.key, ad, &seed).map_err(|err| match err {
            CryptoError::DepthExhausted { depth } => RatchetError::KeyExhausted { depth },
            other => RatchetError::Crypto(other),
        })?;

        self.key = key;
        self.chain = chain;
        Ok(())
    }
}

/// Fresh key pair with `depth` update levels.
pub fn generate(env: &impl Environment, depth: usize) -> (KuPublicKey, KuSecretKey) {
    let (params, root) = hibe::setup(env, depth);
    let chain = Secret::from_bytes(env.random_array());
    let pk = KuPublicKey { params: params.clone(), path: Vec::new() };
    let sk = KuSecretKey { params, key: root, chain };
    (pk, sk)
}

/// Key pair derived deterministically from `seed`.
pub fn generate_from_seed(seed: &Secret<32>, depth: usize) -> (KuPublicKey, KuSecretKey) {
    generate(&SeededEnv::from_seed(*seed.as_bytes()), depth)
}

/// Fresh shared key and its encapsulation under `pk`.
pub fn encapsulate(
    env: &impl Environment,
    pk: &KuPublicKey,
) -> Result<(Secret<32>, KemCiphertext), RatchetError> {
    let key = Secret::from_bytes(env.random_array());
    let ct = hibe::encrypt(env, &pk.params, key.as_bytes(), KEM_AD, &pk.path)?;
    Ok((key, ct))
}

/// Recover the shared key from `ct`.
///
/// # Errors
///
/// - `Crypto(AuthenticationFailed)` if `ct` was not encapsulated to the
///   matching public key at the same level
pub fn decapsulate(sk: &KuSecretKey, ct: &KemCiphertext) -> Result<Secret<32>, RatchetError> {
    let bytes = hibe::decrypt(&sk.key, ct, KEM_AD)?;
    Secret::from_slice(&bytes).ok_or(RatchetError::Malformed { what: "encapsulated key" })
}
