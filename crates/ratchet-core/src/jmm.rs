//! JMM secure-messaging channel
//!
//! Each direction is an hkuPKE instance authenticated by a kuSig chain.
//! Whenever a party has received something since its last heal, its next
//! message carries a fresh hkuPKE key for the reverse direction; the partner
//! adopts it with `update_ek`. Delivery within a direction is in order.

use ratchet_crypto::Environment;
use serde::{Deserialize, Serialize};

use crate::{
    codec::{self, Header},
    config::RatchetConfig,
    error::RatchetError,
    hkupke::{self, HealInfo, HkuCiphertext, HkuReceiver, HkuSender},
    kusig::{self, KuSignature, KuSigner, KuVerifier},
    session::{Capabilities, Ratchet, Role},
};

/// JMM ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JmmCiphertext {
    /// hkuPKE ciphertext carrying the plaintext and an optional heal
    pub inner: HkuCiphertext,
    /// kuSig signature over `ad` and `inner`
    pub signature: KuSignature,
}

#[derive(Serialize, Deserialize)]
struct Payload {
    #[serde(with = "serde_bytes")]
    plaintext: Vec<u8>,
    heal: Option<HealInfo>,
}

/// One party's JMM state.
#[derive(Debug, Clone)]
pub struct Jmm {
    role: Role,
    sender: HkuSender,
    receiver: HkuReceiver,
    signer: KuSigner,
    verifier: KuVerifier,
    healed_at: u64,
}

fn signed_bytes(ad: &[u8], ct: &HkuCiphertext) -> Vec<u8> {
    Header::new(b"ratchet jmm").bytes(ad).u64(ct.period).u64(ct.index).bytes(&ct.body).finish()
}

impl Jmm {
    /// Create Alice's and Bob's initial states.
    pub fn init(env: &impl Environment, config: &RatchetConfig) -> Result<(Self, Self), RatchetError> {
        let (to_bob, bob_receiver) = hkupke::generate(env, config.max_pending)?;
        let (to_alice, alice_receiver) = hkupke::generate(env, config.max_pending)?;
        let (alice_signer, alice_verifier) = kusig::generate(env);
        let (bob_signer, bob_verifier) = kusig::generate(env);

        let party = |role, sender, receiver, signer, verifier| Self {
            role,
            sender,
            receiver,
            signer,
            verifier,
            healed_at: 0,
        };
        Ok((
            party(Role::Alice, to_bob, alice_receiver, alice_signer, bob_verifier),
            party(Role::Bob, to_alice, bob_receiver, bob_signer, alice_verifier),
        ))
    }

    /// Role of this party.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Messages sent so far.
    pub fn sent(&self) -> u64 {
        self.sender.sent()
    }

    /// Messages received so far.
    pub fn received(&self) -> u64 {
        self.receiver.received()
    }

    /// Heal periods this party still holds receive keys for.
    pub fn live_heal_periods(&self) -> Vec<u64> {
        self.receiver.live_periods()
    }

    /// Encrypt and sign `pt`, piggybacking a heal when one is due.
    ///
    /// # Errors
    ///
    /// - `TooManyPending` if too many updates await the partner's heal
    pub fn send(
        &mut self,
        env: &impl Environment,
        ad: &[u8],
        pt: &[u8],
    ) -> Result<JmmCiphertext, RatchetError> {
        let mut receiver = self.receiver.clone();
        let heal = if receiver.received() > self.healed_at {
            Some(receiver.update_dk(env)?)
        } else {
            None
        };

        let payload = codec::encode(&Payload { plaintext: pt.to_vec(), heal: heal.clone() })?;
        let mut sender = self.sender.clone();
        let inner = sender.encrypt(env, ad, &payload)?;
        let signature = self.signer.sign(env, &signed_bytes(ad, &inner));

        if let Some(heal) = &heal {
            tracing::debug!(role = ?self.role, period = heal.period, "jmm heal attached");
            self.healed_at = heal.received;
        }
        self.receiver = receiver;
        self.sender = sender;
        Ok(JmmCiphertext { inner, signature })
    }

    /// Verify and decrypt the partner's next message, applying its heal.
    ///
    /// # Errors
    ///
    /// - `Crypto(InvalidSignature)` if the signature chain does not verify
    /// - `OutOfOrder` unless the message is exactly the next one
    /// - `OutOfSync` if the attached heal is stale
    pub fn receive(&mut self, ad: &[u8], ct: &JmmCiphertext) -> Result<Vec<u8>, RatchetError> {
        let expected = self.receiver.received() + 1;
        if ct.inner.index != expected {
            tracing::warn!(role = ?self.role, expected, received = ct.inner.index, "jmm message out of order");
            return Err(RatchetError::OutOfOrder { expected, received: ct.inner.index });
        }

        let mut verifier = self.verifier.clone();
        verifier.verify(&signed_bytes(ad, &ct.inner), &ct.signature)?;

        let mut receiver = self.receiver.clone();
        let Payload { plaintext, heal } = codec::decode(&receiver.decrypt(ad, &ct.inner)?)?;

        let mut sender = self.sender.clone();
        if let Some(heal) = &heal {
            sender.update_ek(heal)?;
        }

        self.verifier = verifier;
        self.receiver = receiver;
        self.sender = sender;
        Ok(plaintext)
    }
}

impl Ratchet for Jmm {
    type Ciphertext = JmmCiphertext;

    const NAME: &'static str = "jmm";
    const CAPABILITIES: Capabilities = Capabilities { out_of_order: false, crossing: true };

    fn init(env: &impl Environment, config: &RatchetConfig) -> Result<(Self, Self), RatchetError> {
        Jmm::init(env, config)
    }

    fn send(
        &mut self,
        env: &impl Environment,
        ad: &[u8],
        pt: &[u8],
    ) -> Result<JmmCiphertext, RatchetError> {
        Jmm::send(self, env, ad, pt)
    }

    fn receive(&mut self, ad: &[u8], ct: &JmmCiphertext) -> Result<Vec<u8>, RatchetError> {
        Jmm::receive(self, ad, ct)
    }
}
