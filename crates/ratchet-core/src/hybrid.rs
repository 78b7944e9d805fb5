//! Hybrid ARCAD
//!
//! BARK carries the expensive ratchet messages; FS-AEAD carries the cheap
//! ones. A ratchet send ships a fresh FS-AEAD seed inside a BARK message and
//! opens a new send epoch. Light sends reuse the current epoch's chain and
//! may arrive in any order within the epoch. The caller decides per message
//! whether to ratchet.

use ratchet_crypto::{Environment, PrngState};
use serde::{Deserialize, Serialize};

use crate::{
    arena::{KeyArena, SlotStatus},
    bark::{Bark, BarkCiphertext},
    codec::{self, Header},
    config::RatchetConfig,
    error::RatchetError,
    fs_aead::{self, FsCiphertext, FsReceiver, FsSender},
    session::{Capabilities, Ratchet, Role},
};

/// Hybrid ARCAD ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HybridCiphertext {
    /// Opens epoch `epoch`
    Ratchet {
        /// New send epoch
        epoch: u64,
        /// BARK message carrying the epoch seed and the plaintext
        bark: BarkCiphertext,
    },
    /// Light message within `epoch`
    Light {
        /// Send epoch
        epoch: u64,
        /// FS-AEAD ciphertext
        inner: FsCiphertext,
    },
}

#[derive(Serialize, Deserialize)]
struct RatchetPayload {
    seed: PrngState,
    #[serde(with = "serde_bytes")]
    plaintext: Vec<u8>,
}

/// One party's hybrid ARCAD state.
#[derive(Debug, Clone)]
pub struct Hybrid {
    role: Role,
    bark: Bark,
    send_epoch: u64,
    sender: Option<FsSender>,
    receive_epoch: u64,
    receivers: KeyArena<FsReceiver>,
    received_since_send: bool,
    config: RatchetConfig,
}

fn epoch_ad(ad: &[u8], epoch: u64) -> Vec<u8> {
    Header::new(b"ratchet hybrid").bytes(ad).u64(epoch).finish()
}

impl Hybrid {
    /// Create Alice's and Bob's initial states.
    pub fn init(env: &impl Environment, config: &RatchetConfig) -> Result<(Self, Self), RatchetError> {
        let (alice_bark, bob_bark) = Bark::init(env, config)?;
        let party = |role, bark| Self {
            role,
            bark,
            send_epoch: 0,
            sender: None,
            receive_epoch: 0,
            receivers: KeyArena::new(),
            received_since_send: false,
            config: config.clone(),
        };
        Ok((party(Role::Alice, alice_bark), party(Role::Bob, bob_bark)))
    }

    /// Role of this party.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current send epoch (0 before the first ratchet).
    pub fn send_epoch(&self) -> u64 {
        self.send_epoch
    }

    /// Partner epochs whose receivers are still held.
    pub fn live_receive_epochs(&self) -> Vec<u64> {
        self.receivers.live_indices().collect()
    }

    /// Encrypt `pt`, opening a new epoch when `ratchet` is set.
    ///
    /// # Errors
    ///
    /// - `WrongRole` for a light send before any ratchet send
    pub fn send(
        &mut self,
        env: &impl Environment,
        ad: &[u8],
        pt: &[u8],
        ratchet: bool,
    ) -> Result<HybridCiphertext, RatchetError> {
        if !ratchet {
            let Some(sender) = self.sender.as_mut() else {
                return Err(RatchetError::WrongRole { operation: "light send", role: "unkeyed" });
            };
            let inner = sender.send(&epoch_ad(ad, self.send_epoch), pt)?;
            self.received_since_send = false;
            return Ok(HybridCiphertext::Light { epoch: self.send_epoch, inner });
        }

        let epoch = self.send_epoch + 1;
        let seed = PrngState::generate(env);
        let payload = codec::encode(&RatchetPayload { seed: seed.clone(), plaintext: pt.to_vec() })?;

        let mut bark = self.bark.clone();
        let ct = bark.send(env, &epoch_ad(ad, epoch), &payload)?;
        let (sender, _) = fs_aead::generate(seed, &self.config);

        self.bark = bark;
        self.sender = Some(sender);
        self.send_epoch = epoch;
        self.received_since_send = false;

        tracing::debug!(role = ?self.role, epoch, "hybrid ratchet send");
        Ok(HybridCiphertext::Ratchet { epoch, bark: ct })
    }

    /// Decrypt a message from the partner.
    ///
    /// # Errors
    ///
    /// - `EpochOutOfSync` for a ratchet message that is not the next epoch,
    ///   or a light message for an epoch not yet opened
    /// - `EpochErased` for a light message of a pruned epoch
    pub fn receive(&mut self, ad: &[u8], ct: &HybridCiphertext) -> Result<Vec<u8>, RatchetError> {
        let pt = match ct {
            HybridCiphertext::Light { epoch, inner } => {
                let epoch = *epoch;
                match self.receivers.status(epoch) {
                    SlotStatus::Live => match self.receivers.get_mut(epoch) {
                        Some(receiver) => receiver.receive(&epoch_ad(ad, epoch), inner)?,
                        None => return Err(RatchetError::EpochErased { epoch }),
                    },
                    SlotStatus::Erased => return Err(RatchetError::EpochErased { epoch }),
                    SlotStatus::Vacant => {
                        return Err(RatchetError::EpochOutOfSync {
                            current: self.receive_epoch,
                            received: epoch,
                        });
                    },
                }
            },
            HybridCiphertext::Ratchet { epoch, bark } => {
                let epoch = *epoch;
                if epoch != self.receive_epoch + 1 {
                    return Err(RatchetError::EpochOutOfSync {
                        current: self.receive_epoch,
                        received: epoch,
                    });
                }

                let mut state = self.bark.clone();
                let payload = state.receive(&epoch_ad(ad, epoch), bark)?;
                let RatchetPayload { seed, plaintext } = codec::decode(&payload)?;
                let (_, receiver) = fs_aead::generate(seed, &self.config);

                self.bark = state;
                self.receivers.insert(epoch, receiver)?;
                self.receive_epoch = epoch;
                while self.receivers.live_count() > self.config.max_live_epochs {
                    let Some(oldest) = self.receivers.first_live() else { break };
                    self.receivers.erase(oldest);
                }

                tracing::debug!(role = ?self.role, epoch, "hybrid followed partner epoch");
                plaintext
            },
        };

        self.received_since_send = true;
        Ok(pt)
    }
}

impl Ratchet for Hybrid {
    type Ciphertext = HybridCiphertext;

    const NAME: &'static str = "hybrid-arcad";
    const CAPABILITIES: Capabilities = Capabilities { out_of_order: false, crossing: true };

    fn init(env: &impl Environment, config: &RatchetConfig) -> Result<(Self, Self), RatchetError> {
        Hybrid::init(env, config)
    }

    /// Ratchets on the first send and on every send that follows a receive.
    fn send(
        &mut self,
        env: &impl Environment,
        ad: &[u8],
        pt: &[u8],
    ) -> Result<HybridCiphertext, RatchetError> {
        let ratchet = self.sender.is_none() || self.received_since_send;
        Hybrid::send(self, env, ad, pt, ratchet)
    }

    fn receive(&mut self, ad: &[u8], ct: &HybridCiphertext) -> Result<Vec<u8>, RatchetError> {
        Hybrid::receive(self, ad, ct)
    }
}
