//! Double Ratchet
//!
//! Composes CKA, FS-AEAD and a PRF-PRNG root chain. Each direction switch
//! runs one CKA step and folds the agreed secret into the root chain, which
//! yields the FS-AEAD seed for the new epoch.
//!
//! # Epochs
//!
//! Alice sends on odd epochs and Bob on even ones. Epoch 0 is keyed
//! directly from the shared root so that Bob can send before hearing from
//! Alice. A party that sends while the local epoch belongs to its partner
//! opens the next epoch; a party that receives the partner's next epoch
//! follows it.
//!
//! ```text
//! epoch:   0      1      2      3
//! sender:  Bob    Alice  Bob    Alice
//! ```
//!
//! Messages within an epoch may arrive in any order. Messages from older
//! partner epochs remain decryptable until their receiver is pruned.

use ratchet_crypto::{Environment, PrngState, Secret};
use serde::{Deserialize, Serialize};

use crate::{
    arena::{KeyArena, SlotStatus},
    cka::{self, CkaMessage, CkaState},
    codec::Header,
    config::RatchetConfig,
    error::RatchetError,
    fs_aead::{self, FsCiphertext, FsReceiver, FsSender},
    session::{Capabilities, Ratchet, Role},
};

/// Double Ratchet ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrCiphertext {
    /// Sender's epoch
    pub epoch: u64,
    /// CKA share that opened the epoch (absent for epoch 0)
    pub cka_message: Option<CkaMessage>,
    /// FS-AEAD ciphertext under the epoch's chain
    pub inner: FsCiphertext,
}

/// One party's Double Ratchet state.
#[derive(Debug, Clone)]
pub struct DoubleRatchet {
    role: Role,
    epoch: u64,
    root: PrngState,
    cka: CkaState,
    cka_message: Option<CkaMessage>,
    sender: Option<FsSender>,
    receivers: KeyArena<FsReceiver>,
    config: RatchetConfig,
}

/// Step the root chain, returning the next root and an FS-AEAD seed.
fn ratchet_root(
    root: &PrngState,
    salt: Option<&Secret<32>>,
) -> Result<(PrngState, PrngState), RatchetError> {
    let mut next = root.clone();
    let seed: Secret<16> = next.advance(salt.map(|s| s.as_bytes().as_slice()))?;
    Ok((next, PrngState::from_bytes(*seed.as_bytes())))
}

/// Associated data handed to FS-AEAD: `len(ad) || ad || epoch || cka share`.
fn associated_data(ad: &[u8], epoch: u64, cka_message: Option<&CkaMessage>) -> Vec<u8> {
    let share = cka_message.map_or(&[][..], |m| m.as_bytes().as_slice());
    Header::default().bytes(ad).u64(epoch).bytes(share).finish()
}

impl DoubleRatchet {
    /// Create Alice's and Bob's initial states.
    pub fn init(env: &impl Environment, config: &RatchetConfig) -> Result<(Self, Self), RatchetError> {
        let (root, seed) = ratchet_root(&PrngState::generate(env), None)?;
        let (bob_sender, alice_receiver) = fs_aead::generate(seed, config);
        let (alice_cka, bob_cka) = cka::generate(env);

        let mut alice_receivers = KeyArena::new();
        alice_receivers.insert(0, alice_receiver)?;

        let alice = Self {
            role: Role::Alice,
            epoch: 0,
            root: root.clone(),
            cka: alice_cka,
            cka_message: None,
            sender: None,
            receivers: alice_receivers,
            config: config.clone(),
        };
        let bob = Self {
            role: Role::Bob,
            epoch: 0,
            root,
            cka: bob_cka,
            cka_message: None,
            sender: Some(bob_sender),
            receivers: KeyArena::new(),
            config: config.clone(),
        };
        Ok((alice, bob))
    }

    /// Role of this party.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Latest epoch this party has seen.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Partner epochs whose receivers are still held.
    pub fn live_receive_epochs(&self) -> Vec<u64> {
        self.receivers.live_indices().collect()
    }

    fn owns(&self, epoch: u64) -> bool {
        match self.role {
            Role::Alice => epoch % 2 == 1,
            Role::Bob => epoch % 2 == 0,
        }
    }

    /// Encrypt `pt`, opening a new epoch first if the partner spoke last.
    pub fn send(
        &mut self,
        env: &impl Environment,
        ad: &[u8],
        pt: &[u8],
    ) -> Result<DrCiphertext, RatchetError> {
        if self.owns(self.epoch)
            && let Some(sender) = self.sender.as_mut()
        {
            let header = associated_data(ad, self.epoch, self.cka_message.as_ref());
            let inner = sender.send(&header, pt)?;
            return Ok(DrCiphertext { epoch: self.epoch, cka_message: self.cka_message, inner });
        }

        let epoch = self.epoch + 1;
        let mut cka = self.cka.clone();
        let (message, shared) = cka.send(env)?;
        let (root, seed) = ratchet_root(&self.root, Some(&shared))?;
        let (mut sender, _) = fs_aead::generate(seed, &self.config);

        let header = associated_data(ad, epoch, Some(&message));
        let inner = sender.send(&header, pt)?;

        self.cka = cka;
        self.root = root;
        self.epoch = epoch;
        self.cka_message = Some(message);
        self.sender = Some(sender);

        tracing::debug!(role = ?self.role, epoch, "double ratchet opened send epoch");
        Ok(DrCiphertext { epoch, cka_message: Some(message), inner })
    }

    /// Decrypt a ciphertext from the partner.
    ///
    /// # Errors
    ///
    /// - `EpochOutOfSync`: wrong parity, or more than one epoch ahead
    /// - `EpochErased`: the epoch's receiver has been pruned
    /// - `Malformed`: an epoch switch without a CKA share
    /// - any FS-AEAD error from the inner ciphertext
    pub fn receive(&mut self, ad: &[u8], ct: &DrCiphertext) -> Result<Vec<u8>, RatchetError> {
        let out_of_sync = RatchetError::EpochOutOfSync { current: self.epoch, received: ct.epoch };
        if self.owns(ct.epoch) {
            tracing::warn!(role = ?self.role, epoch = ct.epoch, "double ratchet epoch has wrong parity");
            return Err(out_of_sync);
        }

        let header = associated_data(ad, ct.epoch, ct.cka_message.as_ref());

        if ct.epoch <= self.epoch {
            return match self.receivers.status(ct.epoch) {
                SlotStatus::Live => match self.receivers.get_mut(ct.epoch) {
                    Some(receiver) => receiver.receive(&header, &ct.inner),
                    None => Err(out_of_sync),
                },
                SlotStatus::Erased => Err(RatchetError::EpochErased { epoch: ct.epoch }),
                SlotStatus::Vacant => Err(out_of_sync),
            };
        }

        if ct.epoch != self.epoch + 1 {
            tracing::warn!(role = ?self.role, current = self.epoch, received = ct.epoch, "double ratchet epoch gap");
            return Err(out_of_sync);
        }

        let Some(message) = ct.cka_message.as_ref() else {
            return Err(RatchetError::Malformed { what: "missing cka share" });
        };
        let mut cka = self.cka.clone();
        let shared = cka.receive(message)?;
        let (root, seed) = ratchet_root(&self.root, Some(&shared))?;
        let (_, mut receiver) = fs_aead::generate(seed, &self.config);

        let pt = receiver.receive(&header, &ct.inner)?;

        self.cka = cka;
        self.root = root;
        self.epoch = ct.epoch;
        self.cka_message = None;
        self.sender = None;
        self.receivers.insert(ct.epoch, receiver)?;
        while self.receivers.live_count() > self.config.max_live_epochs {
            let Some(oldest) = self.receivers.first_live() else { break };
            self.receivers.erase(oldest);
            tracing::debug!(role = ?self.role, epoch = oldest, "double ratchet pruned receive epoch");
        }

        tracing::debug!(role = ?self.role, epoch = ct.epoch, "double ratchet followed partner epoch");
        Ok(pt)
    }
}

impl Ratchet for DoubleRatchet {
    type Ciphertext = DrCiphertext;

    const NAME: &'static str = "double-ratchet";
    const CAPABILITIES: Capabilities = Capabilities { out_of_order: true, crossing: true };

    fn init(env: &impl Environment, config: &RatchetConfig) -> Result<(Self, Self), RatchetError> {
        DoubleRatchet::init(env, config)
    }

    fn send(
        &mut self,
        env: &impl Environment,
        ad: &[u8],
        pt: &[u8],
    ) -> Result<DrCiphertext, RatchetError> {
        DoubleRatchet::send(self, env, ad, pt)
    }

    fn receive(&mut self, ad: &[u8], ct: &DrCiphertext) -> Result<Vec<u8>, RatchetError> {
        DoubleRatchet::receive(self, ad, ct)
    }
}
