//! BARK onion ratchet
//!
//! Each party holds a list of unidirectional sender layers towards the
//! partner and a list of receiver layers from the partner. A send creates a
//! new unidirectional pair, keeps the receiver half, and ships the sender
//! half to the partner inside the innermost onion layer. The onion is then
//! wrapped through every active sender layer, newest first, so the oldest
//! layer ends up outermost.
//!
//! ```text
//! onion = S_first( S_first+1( ... S_last( core ) ... ) )
//! core  = encode(shipped sender, plaintext)
//! ```
//!
//! After a send only the newest sender layer stays active; after a receive
//! only the newest peeled receiver layer does. The receiver therefore always
//! starts peeling at its first live layer.
//!
//! `Hsent` / `Hreceived` are HMAC chains over every ciphertext, keyed by a
//! shared hashing key. A message claims the sender's `Hsent`; the receiver
//! rejects it unless the claim matches its own `Hreceived`.

use ratchet_crypto::{Environment, Secret, Transcript};
use serde::{Deserialize, Serialize};

use crate::{
    arena::KeyArena,
    codec::{self, Header},
    config::{RatchetConfig, UniVariant},
    error::RatchetError,
    session::{Capabilities, Ratchet, Role},
    uni::{self, UniReceiver, UniSender},
};

/// BARK ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarkCiphertext {
    /// Number of onion layers
    pub layers: u64,
    /// Sender's `Hsent` before this message
    pub claimed_hsent: Transcript,
    /// Outermost onion layer
    #[serde(with = "serde_bytes")]
    pub onion: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct Core {
    sender: UniSender,
    #[serde(with = "serde_bytes")]
    plaintext: Vec<u8>,
}

/// One party's BARK state.
#[derive(Debug, Clone)]
pub struct Bark {
    role: Role,
    variant: UniVariant,
    hash_key: Secret<32>,
    senders: KeyArena<UniSender>,
    receivers: KeyArena<UniReceiver>,
    next_sender: u64,
    next_receiver: u64,
    h_sent: Transcript,
    h_received: Transcript,
    max_pending: usize,
}

fn layer_ad(ad: &[u8], position: u64, layers: u64, h_sent: &Transcript) -> Vec<u8> {
    Header::new(b"ratchet bark")
        .bytes(ad)
        .u64(position)
        .u64(layers)
        .bytes(h_sent.as_bytes())
        .finish()
}

fn next_hash(key: &Secret<32>, h: &Transcript, ad: &[u8], ct: &BarkCiphertext) -> Transcript {
    h.chain_keyed(key, &[ad, &ct.layers.to_be_bytes(), ct.claimed_hsent.as_bytes(), &ct.onion])
}

impl Bark {
    /// Create Alice's and Bob's initial states.
    pub fn init(env: &impl Environment, config: &RatchetConfig) -> Result<(Self, Self), RatchetError> {
        let variant = config.uni_variant;
        let hash_key = Secret::from_bytes(env.random_array());
        let (to_bob, from_alice) = uni::generate(env, variant);
        let (to_alice, from_bob) = uni::generate(env, variant);

        let party = |role, sender, receiver| {
            let mut senders = KeyArena::new();
            let mut receivers = KeyArena::new();
            senders.insert(0, sender)?;
            receivers.insert(0, receiver)?;
            Ok::<_, RatchetError>(Self {
                role,
                variant,
                hash_key: hash_key.clone(),
                senders,
                receivers,
                next_sender: 1,
                next_receiver: 1,
                h_sent: Transcript::EMPTY,
                h_received: Transcript::EMPTY,
                max_pending: config.max_pending,
            })
        };

        Ok((party(Role::Alice, to_bob, from_bob)?, party(Role::Bob, to_alice, from_alice)?))
    }

    /// Role of this party.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Number of active sender layers, i.e. the layer count of the next send.
    pub fn active_senders(&self) -> usize {
        self.senders.live_count()
    }

    /// Number of receiver layers held.
    pub fn active_receivers(&self) -> usize {
        self.receivers.live_count()
    }

    /// Wrap `pt` through every active sender layer.
    ///
    /// # Errors
    ///
    /// - `TooManyPending` if the layer count or the number of receivers
    ///   awaiting a reply has reached `max_pending`
    pub fn send(
        &mut self,
        env: &impl Environment,
        ad: &[u8],
        pt: &[u8],
    ) -> Result<BarkCiphertext, RatchetError> {
        let active: Vec<u64> = self.senders.live_indices().collect();
        if active.is_empty() {
            return Err(RatchetError::OutOfSync { reason: "no active sender layer" });
        }
        if active.len() > self.max_pending || self.receivers.live_count() >= self.max_pending {
            return Err(RatchetError::TooManyPending { limit: self.max_pending });
        }

        let layers = active.len() as u64;
        let (shipped, kept) = uni::generate(env, self.variant);
        let mut onion = codec::encode(&Core { sender: shipped, plaintext: pt.to_vec() })?;

        let mut senders = self.senders.clone();
        for (position, index) in active.iter().enumerate().rev() {
            let sender = senders
                .get_mut(*index)
                .ok_or(RatchetError::OutOfSync { reason: "sender layer missing" })?;
            onion = sender.send(env, &layer_ad(ad, position as u64, layers, &self.h_sent), &onion)?;
        }
        for &index in &active[..active.len() - 1] {
            senders.erase(index);
        }

        let ct = BarkCiphertext { layers, claimed_hsent: self.h_sent, onion };

        self.receivers.insert(self.next_receiver, kept)?;
        self.next_receiver += 1;
        self.senders = senders;
        self.h_sent = next_hash(&self.hash_key, &self.h_sent, ad, &ct);

        tracing::debug!(role = ?self.role, layers, "bark send");
        Ok(ct)
    }

    /// Peel a message from the partner.
    ///
    /// # Errors
    ///
    /// - `OutOfSync` if the claimed `Hsent` differs from `Hreceived` or the
    ///   layer count exceeds the receivers held
    /// - `Crypto` / `Malformed` if any layer fails to open
    pub fn receive(&mut self, ad: &[u8], ct: &BarkCiphertext) -> Result<Vec<u8>, RatchetError> {
        if ct.claimed_hsent != self.h_received {
            tracing::warn!(role = ?self.role, "bark hash chain mismatch");
            return Err(RatchetError::OutOfSync { reason: "hash chain mismatch" });
        }

        let active: Vec<u64> = self.receivers.live_indices().collect();
        let layers = usize::try_from(ct.layers)
            .ok()
            .filter(|&n| n > 0 && n <= active.len())
            .ok_or(RatchetError::OutOfSync { reason: "layer count exceeds receivers" })?;
        let peeled = &active[..layers];

        let mut receivers = self.receivers.clone();
        let mut onion = ct.onion.clone();
        for (position, index) in peeled.iter().enumerate() {
            let receiver = receivers
                .get_mut(*index)
                .ok_or(RatchetError::OutOfSync { reason: "receiver layer missing" })?;
            onion = receiver.receive(&layer_ad(ad, position as u64, ct.layers, &ct.claimed_hsent), &onion)?;
        }
        let Core { sender, plaintext } = codec::decode(&onion)?;
        for &index in &peeled[..layers - 1] {
            receivers.erase(index);
        }

        let mut senders = self.senders.clone();
        senders.insert(self.next_sender, sender)?;

        self.receivers = receivers;
        self.senders = senders;
        self.next_sender += 1;
        self.h_received = next_hash(&self.hash_key, &self.h_received, ad, ct);

        tracing::debug!(role = ?self.role, layers, "bark receive");
        Ok(plaintext)
    }
}

impl Ratchet for Bark {
    type Ciphertext = BarkCiphertext;

    const NAME: &'static str = "bark";
    const CAPABILITIES: Capabilities = Capabilities { out_of_order: false, crossing: true };

    fn init(env: &impl Environment, config: &RatchetConfig) -> Result<(Self, Self), RatchetError> {
        Bark::init(env, config)
    }

    fn send(
        &mut self,
        env: &impl Environment,
        ad: &[u8],
        pt: &[u8],
    ) -> Result<BarkCiphertext, RatchetError> {
        Bark::send(self, env, ad, pt)
    }

    fn receive(&mut self, ad: &[u8], ct: &BarkCiphertext) -> Result<Vec<u8>, RatchetError> {
        Bark::receive(self, ad, ct)
    }
}

#[cfg(test)]
mod tests {
    use ratchet_crypto::SeededEnv;

    use super::*;

    fn session(seed: u64, variant: UniVariant) -> (SeededEnv, Bark, Bark) {
        let env = SeededEnv::from_u64(seed);
        let config = RatchetConfig::default().with_uni_variant(variant);
        let (alice, bob) = Bark::init(&env, &config).unwrap();
        (env, alice, bob)
    }

    #[test]
    fn alternating_roundtrip() {
        for variant in [UniVariant::Full, UniVariant::Lite] {
            let (env, mut alice, mut bob) = session(1, variant);

            for i in 0..4u8 {
                let ct = alice.send(&env, b"ad", &[i]).unwrap();
                assert_eq!(ct.layers, if i == 0 { 1 } else { 2 });
                assert_eq!(bob.receive(b"ad", &ct).unwrap(), vec![i]);

                let ct = bob.send(&env, b"ad", &[i, i]).unwrap();
                assert_eq!(ct.layers, 2);
                assert_eq!(alice.receive(b"ad", &ct).unwrap(), vec![i, i]);
            }
        }
    }

    #[test]
    fn onion_depth_after_partner_burst() {
        let (env, mut alice, mut bob) = session(2, UniVariant::Full);

        for k in 0..3u8 {
            let ct = bob.send(&env, b"", &[k]).unwrap();
            assert_eq!(ct.layers, 1);
            alice.receive(b"", &ct).unwrap();
        }

        let reply = alice.send(&env, b"", b"reply").unwrap();
        assert_eq!(reply.layers, 4);
        assert_eq!(bob.active_receivers(), 4);

        assert_eq!(bob.receive(b"", &reply).unwrap(), b"reply");
        assert_eq!(bob.active_receivers(), 1);
        assert_eq!(alice.active_senders(), 1);
    }

    #[test]
    fn crossing_messages() {
        let (env, mut alice, mut bob) = session(3, UniVariant::Lite);

        let a = alice.send(&env, b"", b"a").unwrap();
        let b = bob.send(&env, b"", b"b").unwrap();

        assert_eq!(bob.receive(b"", &a).unwrap(), b"a");
        assert_eq!(alice.receive(b"", &b).unwrap(), b"b");

        let a2 = alice.send(&env, b"", b"a2").unwrap();
        assert_eq!(bob.receive(b"", &a2).unwrap(), b"a2");
    }

    #[test]
    fn reordered_message_is_out_of_sync() {
        let (env, mut alice, mut bob) = session(4, UniVariant::Full);

        let first = alice.send(&env, b"", b"1").unwrap();
        let second = alice.send(&env, b"", b"2").unwrap();

        assert_eq!(
            bob.receive(b"", &second),
            Err(RatchetError::OutOfSync { reason: "hash chain mismatch" })
        );
        assert_eq!(bob.receive(b"", &first).unwrap(), b"1");
        assert_eq!(bob.receive(b"", &second).unwrap(), b"2");
    }

    #[test]
    fn inflated_layer_count_is_rejected() {
        let (env, mut alice, mut bob) = session(5, UniVariant::Lite);

        let mut ct = alice.send(&env, b"", b"1").unwrap();
        ct.layers = 9;

        assert_eq!(
            bob.receive(b"", &ct),
            Err(RatchetError::OutOfSync { reason: "layer count exceeds receivers" })
        );
        assert_eq!(bob.active_senders(), 1);
    }

    #[test]
    fn tampered_onion_does_not_mutate() {
        let (env, mut alice, mut bob) = session(6, UniVariant::Full);

        let ct = alice.send(&env, b"", b"1").unwrap();
        let mut tampered = ct.clone();
        let last = tampered.onion.len() - 1;
        tampered.onion[last] ^= 1;

        assert!(bob.receive(b"", &tampered).is_err());
        assert_eq!(bob.receive(b"", &ct).unwrap(), b"1");
    }

    #[test]
    fn pending_receivers_are_bounded() {
        let env = SeededEnv::from_u64(7);
        let config = RatchetConfig { max_pending: 3, ..RatchetConfig::default() };
        let (mut alice, _) = Bark::init(&env, &config).unwrap();

        alice.send(&env, b"", b"1").unwrap();
        alice.send(&env, b"", b"2").unwrap();
        assert_eq!(alice.send(&env, b"", b"3"), Err(RatchetError::TooManyPending { limit: 3 }));
    }
}
