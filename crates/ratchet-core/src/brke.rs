//! Bidirectional ratcheted key exchange over ku-KEM
//!
//! Each party keeps two ledgers indexed by the owner's send count:
//!
//! - `own_keys`: ku-KEM secret keys for every key pair this party has
//!   published and the partner may still encapsulate to
//! - `partner_keys`: the partner's published public keys that this party
//!   may encapsulate to
//!
//! A send encapsulates to every live partner key, so messages crossing in
//! flight still decrypt. It then collapses the partner window to the newest
//! key and replaces that key with one derived from the random-oracle seed,
//! updated with the new transcript. The receiver performs the mirror update
//! on its secret side when it processes the message.
//!
//! ```text
//! RO(chain, k_E0..k_E1, transcript) -> session key || next chain || seed
//! ```
//!
//! Every message is signed with a one-time Ed25519 key and carries the
//! verification key for the next one. Delivery within a direction must be in
//! order.

use ratchet_crypto::{
    Authenticated, Ed25519, Environment, Secret, SignKey, Signature, SignatureScheme, Transcript,
    VerifyKey, XChaCha,
    hash::{oracle, split},
};
use serde::{Deserialize, Serialize};

use crate::{
    arena::KeyArena,
    codec::Header,
    config::RatchetConfig,
    error::RatchetError,
    kukem::{self, KemCiphertext, KuPublicKey, KuSecretKey},
    session::{Capabilities, Ratchet, Role},
};

const LABEL: &[u8] = b"ratchet brke";

/// Signed part of a BRKE message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrkeHeader {
    /// Latest partner key this message encapsulates to
    pub ack: u64,
    /// Sender's fresh ku-KEM public key
    pub new_public_key: KuPublicKey,
    /// Verification key for the sender's next message
    pub new_verify_key: VerifyKey,
    /// Sender's message index
    pub index: u64,
    /// One encapsulation per partner key in `[ack + 1 - n, ack]`
    pub encapsulations: Vec<KemCiphertext>,
}

/// BRKE ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrkeCiphertext {
    /// Signed header
    pub header: BrkeHeader,
    /// One-time signature over `ad` and the header
    pub signature: Signature,
    /// User plaintext under the session key
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

/// One party's BRKE state.
#[derive(Debug, Clone)]
pub struct Brke {
    role: Role,
    sent: u64,
    received: u64,
    own_keys: KeyArena<KuSecretKey>,
    partner_keys: KeyArena<KuPublicKey>,
    sign_key: SignKey,
    partner_verify_key: VerifyKey,
    send_chain: Secret<32>,
    receive_chain: Secret<32>,
    send_transcript: Transcript,
    receive_transcript: Transcript,
    config: RatchetConfig,
}

struct Derived {
    session: Secret<32>,
    chain: Secret<32>,
    seed: Secret<32>,
}

fn random_oracle(
    chain: &Secret<32>,
    keys: &[Secret<32>],
    transcript: &Transcript,
) -> Result<Derived, RatchetError> {
    let mut parts: Vec<&[u8]> = Vec::with_capacity(keys.len() + 2);
    parts.push(chain.as_bytes());
    parts.extend(keys.iter().map(|k| k.as_bytes().as_slice()));
    parts.push(transcript.as_bytes());

    let stream = oracle(LABEL, &parts, 96)?;
    match split::<32>(&stream, 3).map(<[_; 3]>::try_from) {
        Some(Ok([session, chain, seed])) => Ok(Derived { session, chain, seed }),
        _ => Err(RatchetError::Malformed { what: "random oracle output" }),
    }
}

fn signed_bytes(ad: &[u8], header: &BrkeHeader) -> Vec<u8> {
    let mut bytes = Header::new(LABEL)
        .bytes(ad)
        .u64(header.ack)
        .bytes(&header.new_public_key.to_bytes())
        .bytes(&header.new_verify_key.0)
        .u64(header.index)
        .u64(header.encapsulations.len() as u64);
    for ct in &header.encapsulations {
        bytes = bytes.bytes(&ct.to_bytes());
    }
    bytes.finish()
}

impl Brke {
    /// Create Alice's and Bob's initial states.
    pub fn init(env: &impl Environment, config: &RatchetConfig) -> Result<(Self, Self), RatchetError> {
        let (alice_pk, alice_sk) = kukem::generate(env, config.hibe_depth);
        let (bob_pk, bob_sk) = kukem::generate(env, config.hibe_depth);
        let (alice_vk, alice_sign) = Ed25519::generate(env);
        let (bob_vk, bob_sign) = Ed25519::generate(env);
        let to_bob = Secret::from_bytes(env.random_array());
        let to_alice = Secret::from_bytes(env.random_array());

        let party = |role, sk, partner_pk, sign_key, partner_verify_key, send_chain, receive_chain| {
            let mut own_keys = KeyArena::new();
            let mut partner_keys = KeyArena::new();
            own_keys.insert(0, sk)?;
            partner_keys.insert(0, partner_pk)?;
            Ok::<_, RatchetError>(Self {
                role,
                sent: 0,
                received: 0,
                own_keys,
                partner_keys,
                sign_key,
                partner_verify_key,
                send_chain,
                receive_chain,
                send_transcript: Transcript::EMPTY,
                receive_transcript: Transcript::EMPTY,
                config: config.clone(),
            })
        };

        let alice = party(
            Role::Alice,
            alice_sk,
            bob_pk,
            alice_sign,
            bob_vk,
            to_bob.clone(),
            to_alice.clone(),
        )?;
        let bob = party(Role::Bob, bob_sk, alice_pk, bob_sign, alice_vk, to_alice, to_bob)?;
        Ok((alice, bob))
    }

    /// Role of this party.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Messages sent so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Messages received so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Indices of own secret keys still held.
    pub fn own_key_indices(&self) -> Vec<u64> {
        self.own_keys.live_indices().collect()
    }

    /// Indices of partner public keys still held.
    pub fn partner_key_indices(&self) -> Vec<u64> {
        self.partner_keys.live_indices().collect()
    }

    /// Encrypt `pt` to every live partner key.
    ///
    /// # Errors
    ///
    /// - `TooManyPending` if the partner window or the set of unacknowledged
    ///   own keys has reached `max_pending`
    pub fn send(
        &mut self,
        env: &impl Environment,
        ad: &[u8],
        pt: &[u8],
    ) -> Result<BrkeCiphertext, RatchetError> {
        let limit = self.config.max_pending;
        let (Some(first), Some(ack)) = (self.partner_keys.first_live(), self.partner_keys.last_live())
        else {
            return Err(RatchetError::OutOfSync { reason: "no partner key" });
        };
        if ack - first >= limit as u64 || self.own_keys.live_count() >= limit {
            return Err(RatchetError::TooManyPending { limit });
        }

        let index = self.sent + 1;
        let (new_public_key, new_secret_key) = kukem::generate(env, self.config.hibe_depth);
        let (new_verify_key, new_sign_key) = Ed25519::generate(env);

        let mut keys = Vec::new();
        let mut encapsulations = Vec::new();
        for epoch in first..=ack {
            let pk = self
                .partner_keys
                .get(epoch)
                .ok_or(RatchetError::OutOfSync { reason: "partner key window has a gap" })?;
            let (key, ct) = kukem::encapsulate(env, pk)?;
            keys.push(key);
            encapsulations.push(ct);
        }

        let header = BrkeHeader { ack, new_public_key, new_verify_key, index, encapsulations };
        let signed = signed_bytes(ad, &header);
        let signature = Ed25519::sign(&self.sign_key, &signed);
        let transcript = self.send_transcript.chain(LABEL, &[&signed, &signature.0]);

        let derived = random_oracle(&self.send_chain, &keys, &transcript)?;
        let payload = XChaCha::encrypt(&derived.session, pt, transcript.as_bytes());

        let (mut next_partner_key, _) = kukem::generate_from_seed(&derived.seed, self.config.hibe_depth);
        next_partner_key.update(transcript.as_bytes())?;

        self.own_keys.insert(index, new_secret_key)?;
        self.partner_keys.erase_below(ack);
        self.partner_keys.insert(ack, next_partner_key)?;
        self.sign_key = new_sign_key;
        self.send_chain = derived.chain;
        self.send_transcript = transcript;
        self.sent = index;

        tracing::debug!(role = ?self.role, index, ack, window = ack - first + 1, "brke send");
        Ok(BrkeCiphertext { header, signature, payload })
    }

    /// Decrypt the partner's next message.
    ///
    /// # Errors
    ///
    /// - `OutOfOrder` unless the message is exactly the next one
    /// - `OutOfSync` if the acknowledgement or window does not match the
    ///   keys this party holds
    /// - `Crypto(InvalidSignature)` / `Crypto(AuthenticationFailed)` on
    ///   forgery
    pub fn receive(&mut self, ad: &[u8], ct: &BrkeCiphertext) -> Result<Vec<u8>, RatchetError> {
        let header = &ct.header;
        let expected = self.received + 1;
        if header.index != expected {
            tracing::warn!(role = ?self.role, expected, received = header.index, "brke message out of order");
            return Err(RatchetError::OutOfOrder { expected, received: header.index });
        }

        let signed = signed_bytes(ad, header);
        Ed25519::verify(&self.partner_verify_key, &signed, &ct.signature)?;

        if header.ack > self.sent {
            return Err(RatchetError::OutOfSync { reason: "acknowledges an unsent key" });
        }
        let count = header.encapsulations.len() as u64;
        let first = (header.ack + 1)
            .checked_sub(count)
            .filter(|_| count > 0)
            .ok_or(RatchetError::OutOfSync { reason: "encapsulation window" })?;
        if self.own_keys.first_live() != Some(first) {
            return Err(RatchetError::OutOfSync { reason: "encapsulation window" });
        }

        let mut keys = Vec::with_capacity(header.encapsulations.len());
        for (epoch, encapsulation) in (first..).zip(&header.encapsulations) {
            let sk = self
                .own_keys
                .get(epoch)
                .ok_or(RatchetError::OutOfSync { reason: "own key erased" })?;
            keys.push(kukem::decapsulate(sk, encapsulation)?);
        }

        let transcript = self.receive_transcript.chain(LABEL, &[&signed, &ct.signature.0]);
        let derived = random_oracle(&self.receive_chain, &keys, &transcript)?;
        let pt = XChaCha::decrypt(&derived.session, &ct.payload, transcript.as_bytes())?;

        let (_, mut healed) = kukem::generate_from_seed(&derived.seed, self.config.hibe_depth);
        healed.update(transcript.as_bytes())?;

        self.own_keys.erase_below(header.ack);
        self.own_keys.insert(header.ack, healed)?;
        self.partner_keys.insert(header.index, header.new_public_key.clone())?;
        self.partner_verify_key = header.new_verify_key;
        self.receive_chain = derived.chain;
        self.receive_transcript = transcript;
        self.received = header.index;

        tracing::debug!(role = ?self.role, index = header.index, ack = header.ack, "brke receive");
        Ok(pt)
    }
}

impl Ratchet for Brke {
    type Ciphertext = BrkeCiphertext;

    const NAME: &'static str = "brke";
    const CAPABILITIES: Capabilities = Capabilities { out_of_order: false, crossing: true };

    fn init(env: &impl Environment, config: &RatchetConfig) -> Result<(Self, Self), RatchetError> {
        Brke::init(env, config)
    }

    fn send(
        &mut self,
        env: &impl Environment,
        ad: &[u8],
        pt: &[u8],
    ) -> Result<BrkeCiphertext, RatchetError> {
        Brke::send(self, env, ad, pt)
    }

    fn receive(&mut self, ad: &[u8], ct: &BrkeCiphertext) -> Result<Vec<u8>, RatchetError> {
        Brke::receive(self, ad, ct)
    }
}

#[cfg(test)]
mod tests {
    use ratchet_crypto::SeededEnv;

    use super::*;

    fn session(seed: u64) -> (SeededEnv, Brke, Brke) {
        let env = SeededEnv::from_u64(seed);
        let (alice, bob) = Brke::init(&env, &RatchetConfig::default()).unwrap();
        (env, alice, bob)
    }

    #[test]
    fn alternating_roundtrip() {
        let (env, mut alice, mut bob) = session(1);

        for round in 0..3u8 {
            let ct = alice.send(&env, b"ad", &[round]).unwrap();
            assert_eq!(bob.receive(b"ad", &ct).unwrap(), vec![round]);
            let ct = bob.send(&env, b"ad", &[round, round]).unwrap();
            assert_eq!(alice.receive(b"ad", &ct).unwrap(), vec![round, round]);
        }
        assert_eq!(alice.partner_key_indices(), vec![2, 3]);
    }

    #[test]
    fn burst_then_receive() {
        let (env, mut alice, mut bob) = session(2);

        let cts: Vec<_> = (0..3u8).map(|i| alice.send(&env, b"", &[i]).unwrap()).collect();
        for (i, ct) in cts.iter().enumerate() {
            assert_eq!(bob.receive(b"", ct).unwrap(), vec![i as u8]);
        }

        let reply = bob.send(&env, b"", b"ok").unwrap();
        assert_eq!(reply.header.ack, 3);
        assert_eq!(reply.header.encapsulations.len(), 4);
        assert_eq!(alice.receive(b"", &reply).unwrap(), b"ok");
        assert_eq!(alice.own_key_indices(), vec![3]);
    }

    #[test]
    fn crossing_messages() {
        let (env, mut alice, mut bob) = session(3);

        let from_alice = alice.send(&env, b"", b"a1").unwrap();
        let from_bob = bob.send(&env, b"", b"b1").unwrap();
        let from_alice2 = alice.send(&env, b"", b"a2").unwrap();

        assert_eq!(bob.receive(b"", &from_alice).unwrap(), b"a1");
        assert_eq!(alice.receive(b"", &from_bob).unwrap(), b"b1");
        assert_eq!(bob.receive(b"", &from_alice2).unwrap(), b"a2");

        let ct = bob.send(&env, b"", b"b2").unwrap();
        assert_eq!(alice.receive(b"", &ct).unwrap(), b"b2");
        let ct = alice.send(&env, b"", b"a3").unwrap();
        assert_eq!(bob.receive(b"", &ct).unwrap(), b"a3");
    }

    #[test]
    fn out_of_order_is_rejected_without_mutation() {
        let (env, mut alice, mut bob) = session(4);

        let first = alice.send(&env, b"", b"1").unwrap();
        let second = alice.send(&env, b"", b"2").unwrap();

        assert_eq!(
            bob.receive(b"", &second),
            Err(RatchetError::OutOfOrder { expected: 1, received: 2 })
        );
        assert_eq!(bob.receive(b"", &first).unwrap(), b"1");
        assert_eq!(bob.receive(b"", &second).unwrap(), b"2");
    }

    #[test]
    fn replay_is_rejected() {
        let (env, mut alice, mut bob) = session(5);

        let ct = alice.send(&env, b"", b"1").unwrap();
        bob.receive(b"", &ct).unwrap();
        assert!(matches!(bob.receive(b"", &ct), Err(RatchetError::OutOfOrder { .. })));
    }

    #[test]
    fn forged_header_fails_signature() {
        let (env, mut alice, mut bob) = session(6);

        let mut ct = alice.send(&env, b"", b"1").unwrap();
        ct.header.ack = 0;
        ct.header.new_verify_key = VerifyKey([1; 32]);

        let err = bob.receive(b"", &ct).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(bob.received(), 0);
    }

    #[test]
    fn wrong_ad_is_rejected() {
        let (env, mut alice, mut bob) = session(7);

        let ct = alice.send(&env, b"ad", b"1").unwrap();
        assert!(bob.receive(b"other", &ct).is_err());
        assert_eq!(bob.receive(b"ad", &ct).unwrap(), b"1");
    }

    #[test]
    fn pending_bound() {
        let env = SeededEnv::from_u64(8);
        let config = RatchetConfig { max_pending: 2, ..RatchetConfig::default() };
        let (mut alice, _) = Brke::init(&env, &config).unwrap();

        alice.send(&env, b"", b"1").unwrap();
        assert_eq!(alice.send(&env, b"", b"2"), Err(RatchetError::TooManyPending { limit: 2 }));
        assert_eq!(alice.sent(), 1);
    }
}
