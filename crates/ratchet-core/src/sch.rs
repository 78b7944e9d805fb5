//! SCh: secure channel from ku-DSS and ku-PKE
//!
//! Signatures come from a kuSig chain; confidentiality from ku-KEM keys that
//! each party publishes one per message. A fresh key is updated with the
//! transcript of the message that published it, so both sides hold it bound
//! to the same history.
//!
//! Every message acknowledges the partner's latest message by index and by
//! transcript. The receiver compares that transcript with what it recorded
//! when sending, which detects any divergence between the two views of the
//! conversation before any key is touched.
//!
//! Decapsulating consumes the acknowledged key: both sides replace it with a
//! key pair derived from the oracle seed and bound to the new transcript, so
//! a later compromise cannot open earlier encapsulations.
//!
//! ```text
//! header     = index || ack || ack_transcript || encaps[E0..=ack] || new_pk
//! key | seed = RO(k_E0..k_ack, header)
//! sig        = kuSig(ad || header || payload)
//! ```

use std::collections::BTreeMap;

use ratchet_crypto::{
    Authenticated, Environment, Secret, Transcript, XChaCha,
    hash::{oracle, split},
};
use serde::{Deserialize, Serialize};

use crate::{
    arena::KeyArena,
    codec::Header,
    config::RatchetConfig,
    error::RatchetError,
    kukem::{self, KemCiphertext, KuPublicKey, KuSecretKey},
    kusig::{self, KuSignature, KuSigner, KuVerifier},
    session::{Capabilities, Ratchet, Role},
};

const LABEL: &[u8] = b"ratchet sch";

/// Authenticated header of an SCh message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchHeader {
    /// Sender's message index
    pub index: u64,
    /// Latest partner message the sender has received
    pub ack: u64,
    /// Sender's receive transcript at `ack`
    pub ack_transcript: Transcript,
    /// One encapsulation per partner key in `[ack + 1 - n, ack]`
    pub encapsulations: Vec<KemCiphertext>,
    /// Sender's fresh ku-PKE public key, before transcript binding
    pub new_public_key: KuPublicKey,
}

/// SCh ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchCiphertext {
    /// Authenticated header
    pub header: SchHeader,
    /// User plaintext under the derived key
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
    /// kuSig signature over `ad`, header and payload
    pub signature: KuSignature,
}

/// One party's SCh state.
#[derive(Debug, Clone)]
pub struct Sch {
    role: Role,
    sent: u64,
    received: u64,
    signer: KuSigner,
    verifier: KuVerifier,
    own_keys: KeyArena<KuSecretKey>,
    partner_keys: KeyArena<KuPublicKey>,
    sent_transcripts: BTreeMap<u64, Transcript>,
    send_transcript: Transcript,
    receive_transcript: Transcript,
    config: RatchetConfig,
}

fn header_bytes(header: &SchHeader) -> Vec<u8> {
    let mut bytes = Header::new(LABEL)
        .u64(header.index)
        .u64(header.ack)
        .bytes(header.ack_transcript.as_bytes())
        .u64(header.encapsulations.len() as u64);
    for ct in &header.encapsulations {
        bytes = bytes.bytes(&ct.to_bytes());
    }
    bytes.bytes(&header.new_public_key.to_bytes()).finish()
}

fn signed_bytes(ad: &[u8], header: &[u8], payload: &[u8]) -> Vec<u8> {
    Header::new(LABEL).bytes(ad).bytes(header).bytes(payload).finish()
}

/// Message key and the seed of the replacement for the acknowledged key.
fn derive(keys: &[Secret<32>], header: &[u8]) -> Result<(Secret<32>, Secret<32>), RatchetError> {
    let mut parts: Vec<&[u8]> = keys.iter().map(|k| k.as_bytes().as_slice()).collect();
    parts.push(header);
    match split::<32>(&oracle(LABEL, &parts, 64)?, 2).map(<[_; 2]>::try_from) {
        Some(Ok([key, seed])) => Ok((key, seed)),
        _ => Err(RatchetError::Malformed { what: "random oracle output" }),
    }
}

fn next_transcript(transcript: &Transcript, signed: &[u8], signature: &KuSignature) -> Transcript {
    transcript.chain(
        LABEL,
        &[signed, &signature.next_verify_key.0, &signature.signature.0],
    )
}

impl Sch {
    /// Create Alice's and Bob's initial states.
    pub fn init(env: &impl Environment, config: &RatchetConfig) -> Result<(Self, Self), RatchetError> {
        let (alice_pk, alice_sk) = kukem::generate(env, config.hibe_depth);
        let (bob_pk, bob_sk) = kukem::generate(env, config.hibe_depth);
        let (alice_signer, alice_verifier) = kusig::generate(env);
        let (bob_signer, bob_verifier) = kusig::generate(env);

        let party = |role, signer, verifier, sk, partner_pk| {
            let mut own_keys = KeyArena::new();
            let mut partner_keys = KeyArena::new();
            own_keys.insert(0, sk)?;
            partner_keys.insert(0, partner_pk)?;
            Ok::<_, RatchetError>(Self {
                role,
                sent: 0,
                received: 0,
                signer,
                verifier,
                own_keys,
                partner_keys,
                sent_transcripts: BTreeMap::from([(0, Transcript::EMPTY)]),
                send_transcript: Transcript::EMPTY,
                receive_transcript: Transcript::EMPTY,
                config: config.clone(),
            })
        };

        let alice = party(Role::Alice, alice_signer, bob_verifier, alice_sk, bob_pk)?;
        let bob = party(Role::Bob, bob_signer, alice_verifier, bob_sk, alice_pk)?;
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
    ) -> Result<SchCiphertext, RatchetError> {
        let limit = self.config.max_pending;
        let ack = self.received;
        let first = self
            .partner_keys
            .first_live()
            .ok_or(RatchetError::OutOfSync { reason: "no partner key" })?;
        if ack.saturating_sub(first) >= limit as u64 || self.own_keys.live_count() >= limit {
            return Err(RatchetError::TooManyPending { limit });
        }

        let index = self.sent + 1;
        let (new_public_key, mut new_secret_key) = kukem::generate(env, self.config.hibe_depth);

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

        let header = SchHeader {
            index,
            ack,
            ack_transcript: self.receive_transcript,
            encapsulations,
            new_public_key,
        };
        let header_bytes = header_bytes(&header);
        let (key, seed) = derive(&keys, &header_bytes)?;
        let payload = XChaCha::encrypt(&key, pt, &header_bytes);

        let signed = signed_bytes(ad, &header_bytes, &payload);
        new_secret_key.update(self.send_transcript.chain(LABEL, &[&signed]).as_bytes())?;
        let signature = self.signer.sign(env, &signed);
        let transcript = next_transcript(&self.send_transcript, &signed, &signature);

        let (mut next_partner_key, _) = kukem::generate_from_seed(&seed, self.config.hibe_depth);
        next_partner_key.update(transcript.as_bytes())?;

        self.own_keys.insert(index, new_secret_key)?;
        self.partner_keys.erase_below(ack);
        self.partner_keys.insert(ack, next_partner_key)?;
        self.sent_transcripts.insert(index, transcript);
        self.send_transcript = transcript;
        self.sent = index;

        tracing::debug!(role = ?self.role, index, ack, window = ack.saturating_sub(first) + 1, "sch send");
        Ok(SchCiphertext { header, payload, signature })
    }

    /// Verify and decrypt the partner's next message.
    ///
    /// # Errors
    ///
    /// - `OutOfOrder` unless the message is exactly the next one
    /// - `Crypto(InvalidSignature)` if the signature chain does not verify
    /// - `TranscriptMismatch` if the acknowledged transcript differs from
    ///   the one recorded when that message was sent
    /// - `OutOfSync` if the acknowledgement or window does not match the
    ///   keys this party holds
    pub fn receive(&mut self, ad: &[u8], ct: &SchCiphertext) -> Result<Vec<u8>, RatchetError> {
        let header = &ct.header;
        let expected = self.received + 1;
        if header.index != expected {
            tracing::warn!(role = ?self.role, expected, received = header.index, "sch message out of order");
            return Err(RatchetError::OutOfOrder { expected, received: header.index });
        }

        let header_bytes = header_bytes(header);
        let signed = signed_bytes(ad, &header_bytes, &ct.payload);
        let mut verifier = self.verifier.clone();
        verifier.verify(&signed, &ct.signature)?;

        if header.ack > self.sent {
            return Err(RatchetError::OutOfSync { reason: "acknowledges an unsent message" });
        }
        if self.sent_transcripts.get(&header.ack) != Some(&header.ack_transcript) {
            tracing::warn!(role = ?self.role, ack = header.ack, "sch transcript mismatch");
            return Err(RatchetError::TranscriptMismatch { ack: header.ack });
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
        let (key, seed) = derive(&keys, &header_bytes)?;
        let pt = XChaCha::decrypt(&key, &ct.payload, &header_bytes)?;

        let mut partner_key = header.new_public_key.clone();
        partner_key.update(self.receive_transcript.chain(LABEL, &[&signed]).as_bytes())?;

        let transcript = next_transcript(&self.receive_transcript, &signed, &ct.signature);
        let (_, mut healed) = kukem::generate_from_seed(&seed, self.config.hibe_depth);
        healed.update(transcript.as_bytes())?;

        self.verifier = verifier;
        self.own_keys.erase_below(header.ack);
        self.own_keys.insert(header.ack, healed)?;
        self.sent_transcripts.retain(|index, _| *index >= header.ack);
        self.partner_keys.insert(header.index, partner_key)?;
        self.receive_transcript = transcript;
        self.received = header.index;

        tracing::debug!(role = ?self.role, index = header.index, ack = header.ack, "sch receive");
        Ok(pt)
    }
}

impl Ratchet for Sch {
    type Ciphertext = SchCiphertext;

    const NAME: &'static str = "sch";
    const CAPABILITIES: Capabilities = Capabilities { out_of_order: false, crossing: true };

    fn init(env: &impl Environment, config: &RatchetConfig) -> Result<(Self, Self), RatchetError> {
        Sch::init(env, config)
    }

    fn send(
        &mut self,
        env: &impl Environment,
        ad: &[u8],
        pt: &[u8],
    ) -> Result<SchCiphertext, RatchetError> {
        Sch::send(self, env, ad, pt)
    }

    fn receive(&mut self, ad: &[u8], ct: &SchCiphertext) -> Result<Vec<u8>, RatchetError> {
        Sch::receive(self, ad, ct)
    }
}
