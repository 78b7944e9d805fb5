//! Healable key-updating PKE
//!
//! Every ciphertext is encrypted twice: an inner layer under a secretly
//! key-updatable ElGamal key, and an outer layer under an ephemeral X25519
//! key. The plaintext carries a fresh update seed `z`; both sides apply the
//! derived update to the ElGamal key and rotate the ephemeral key from the
//! transcript and `z`.
//!
//! # Healing
//!
//! The receiver can mint a new ElGamal key pair at any time (`update_dk`),
//! opening a new heal period. The sender adopts it with `update_ek` and
//! replays every update it sent after the receiver's acknowledged count,
//! which the receiver applied to the new key as well. A compromised
//! receiver key stops being useful once the sender has healed.

use ratchet_crypto::{
    Asymmetric, DecryptionKey, EncryptionKey, Environment, Secret, Transcript, X25519Ecies,
    elgamal::{self, Delta, UpdatableDk, UpdatableEk},
    hash::hash,
};
use serde::{Deserialize, Serialize};

use crate::{
    arena::{KeyArena, SlotStatus},
    codec::{self, Header},
    error::RatchetError,
};

const LABEL: &[u8] = b"ratchet hkupke";

/// hkuPKE ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HkuCiphertext {
    /// Heal period of the key used
    pub period: u64,
    /// Sender's message index
    pub index: u64,
    /// Outer ciphertext
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
}

/// New key published by the receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealInfo {
    /// Heal period the key opens
    pub period: u64,
    /// Fresh updatable encryption key
    pub key: UpdatableEk,
    /// Messages the receiver had processed when it minted the key
    pub received: u64,
}

#[derive(Serialize, Deserialize)]
struct Inner {
    #[serde(with = "serde_bytes")]
    message: Vec<u8>,
    seed: Secret<32>,
}

/// Encrypting side.
#[derive(Debug, Clone)]
pub struct HkuSender {
    key: UpdatableEk,
    ephemeral: EncryptionKey,
    sent: u64,
    period: u64,
    updates: Vec<(u64, Delta)>,
    trace: Transcript,
    max_pending: usize,
}

/// Decrypting side.
#[derive(Debug, Clone)]
pub struct HkuReceiver {
    keys: KeyArena<UpdatableDk>,
    ephemeral: DecryptionKey,
    received: u64,
    period: u64,
    trace: Transcript,
    max_pending: usize,
}

fn layer_ad(ad: &[u8], period: u64, index: u64) -> Vec<u8> {
    Header::new(LABEL).bytes(ad).u64(period).u64(index).finish()
}

fn next_trace(trace: &Transcript, ad: &[u8], ct: &HkuCiphertext) -> Transcript {
    trace.chain(LABEL, &[ad, &ct.period.to_be_bytes(), &ct.index.to_be_bytes(), &ct.body])
}

fn next_ephemeral(trace: &Transcript, seed: &Secret<32>) -> DecryptionKey {
    DecryptionKey::from_secret(&Secret::from_bytes(hash(
        b"ratchet hkupke ephemeral",
        &[trace.as_bytes(), seed.as_bytes()],
    )))
}

/// Fresh sender and receiver.
pub fn generate(env: &impl Environment, max_pending: usize) -> Result<(HkuSender, HkuReceiver), RatchetError> {
    let key = UpdatableDk::generate(env);
    let ephemeral = DecryptionKey::generate(env);

    let sender = HkuSender {
        key: key.public()?,
        ephemeral: ephemeral.public(),
        sent: 0,
        period: 0,
        updates: Vec::new(),
        trace: Transcript::EMPTY,
        max_pending,
    };

    let mut keys = KeyArena::new();
    keys.insert(0, key)?;
    let receiver =
        HkuReceiver { keys, ephemeral, received: 0, period: 0, trace: Transcript::EMPTY, max_pending };
    Ok((sender, receiver))
}

impl HkuSender {
    /// Messages encrypted so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Heal period of the current key.
    pub fn period(&self) -> u64 {
        self.period
    }

    /// Updates retained for replay onto the next heal.
    pub fn pending_updates(&self) -> usize {
        self.updates.len()
    }

    /// Encrypt `msg` and advance both keys.
    ///
    /// # Errors
    ///
    /// - `TooManyPending` if `max_pending` updates await a heal
    pub fn encrypt(
        &mut self,
        env: &impl Environment,
        ad: &[u8],
        msg: &[u8],
    ) -> Result<HkuCiphertext, RatchetError> {
        if self.updates.len() >= self.max_pending {
            return Err(RatchetError::TooManyPending { limit: self.max_pending });
        }

        let index = self.sent + 1;
        let seed: Secret<32> = Secret::from_bytes(env.random_array());
        let delta = Delta::derive(seed.as_bytes());
        let header = layer_ad(ad, self.period, index);

        let inner = codec::encode(&Inner { message: msg.to_vec(), seed: seed.clone() })?;
        let inner = elgamal::encrypt(env, &self.key, &inner, &header)?;
        let body = X25519Ecies::encrypt(env, &self.ephemeral, &inner, &header)?;
        let ct = HkuCiphertext { period: self.period, index, body };

        let trace = next_trace(&self.trace, ad, &ct);
        let key = self.key.update(&delta)?;

        self.ephemeral = next_ephemeral(&trace, &seed).public();
        self.key = key;
        self.trace = trace;
        self.sent = index;
        self.updates.push((index, delta));
        Ok(ct)
    }

    /// Adopt a heal from the receiver, replaying later updates onto it.
    ///
    /// # Errors
    ///
    /// - `OutOfSync` if the heal is not newer than the current period or
    ///   acknowledges messages never sent
    pub fn update_ek(&mut self, heal: &HealInfo) -> Result<(), RatchetError> {
        if heal.period <= self.period {
            return Err(RatchetError::OutOfSync { reason: "stale heal period" });
        }
        if heal.received > self.sent {
            return Err(RatchetError::OutOfSync { reason: "heal acknowledges unsent messages" });
        }

        let mut key = heal.key;
        for (_, delta) in self.updates.iter().filter(|(index, _)| *index > heal.received) {
            key = key.update(delta)?;
        }

        self.key = key;
        self.period = heal.period;
        self.updates.retain(|(index, _)| *index > heal.received);

        tracing::debug!(period = heal.period, replayed = self.updates.len(), "hkupke sender healed");
        Ok(())
    }
}

impl HkuReceiver {
    /// Messages decrypted so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Heal periods whose keys are still held.
    pub fn live_periods(&self) -> Vec<u64> {
        self.keys.live_indices().collect()
    }

    /// Decrypt the next message and advance.
    ///
    /// # Errors
    ///
    /// - `OutOfOrder` unless `ct` is the next message
    /// - `EpochErased` if its heal period has been superseded
    pub fn decrypt(&mut self, ad: &[u8], ct: &HkuCiphertext) -> Result<Vec<u8>, RatchetError> {
        let expected = self.received + 1;
        if ct.index != expected {
            return Err(RatchetError::OutOfOrder { expected, received: ct.index });
        }
        let key = match self.keys.status(ct.period) {
            SlotStatus::Live => self.keys.get(ct.period),
            SlotStatus::Erased => return Err(RatchetError::EpochErased { epoch: ct.period }),
            SlotStatus::Vacant => None,
        }
        .ok_or(RatchetError::OutOfSync { reason: "unknown heal period" })?;

        let header = layer_ad(ad, ct.period, ct.index);
        let inner = X25519Ecies::decrypt(&self.ephemeral, &ct.body, &header)?;
        let inner = elgamal::decrypt(key, &inner, &header)?;
        let Inner { message, seed } = codec::decode(&inner)?;
        let delta = Delta::derive(seed.as_bytes());

        let mut keys = self.keys.clone();
        keys.erase_below(ct.period);
        for (_, key) in keys.iter_live_mut() {
            *key = key.update(&delta)?;
        }
        let trace = next_trace(&self.trace, ad, ct);

        self.ephemeral = next_ephemeral(&trace, &seed);
        self.keys = keys;
        self.trace = trace;
        self.received = ct.index;
        Ok(message)
    }

    /// Mint a fresh key, opening the next heal period.
    ///
    /// # Errors
    ///
    /// - `TooManyPending` if `max_pending` periods are already open
    pub fn update_dk(&mut self, env: &impl Environment) -> Result<HealInfo, RatchetError> {
        if self.keys.live_count() >= self.max_pending {
            return Err(RatchetError::TooManyPending { limit: self.max_pending });
        }

        let period = self.period + 1;
        let key = UpdatableDk::generate(env);
        let heal = HealInfo { period, key: key.public()?, received: self.received };

        self.keys.insert(period, key)?;
        self.period = period;
        Ok(heal)
    }
}
