//! Common two-party interface over every protocol.

use std::fmt;

use ratchet_crypto::Environment;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{config::RatchetConfig, error::RatchetError};

/// Which side of a session a state belongs to.
///
/// Protocols that alternate epochs use the role to decide parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Initiator
    Alice,
    /// Responder
    Bob,
}

impl Role {
    /// The other party.
    pub fn peer(self) -> Role {
        match self {
            Role::Alice => Role::Bob,
            Role::Bob => Role::Alice,
        }
    }
}

/// Delivery patterns a protocol tolerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Messages in one direction may be received in any order
    pub out_of_order: bool,
    /// Both parties may send before receiving each other's messages
    pub crossing: bool,
}

/// A two-party ratcheting protocol.
///
/// `send` and `receive` are transactional: on error the state is exactly as
/// it was before the call.
pub trait Ratchet: Sized {
    /// Envelope produced by `send`.
    type Ciphertext: Clone + fmt::Debug + Serialize + DeserializeOwned;

    /// Short protocol name for logs.
    const NAME: &'static str;

    /// Delivery patterns this protocol supports.
    const CAPABILITIES: Capabilities;

    /// Create the initial state pair `(alice, bob)`.
    fn init(env: &impl Environment, config: &RatchetConfig) -> Result<(Self, Self), RatchetError>;

    /// Encrypt `pt` bound to `ad`.
    fn send(
        &mut self,
        env: &impl Environment,
        ad: &[u8],
        pt: &[u8],
    ) -> Result<Self::Ciphertext, RatchetError>;

    /// Decrypt `ct` bound to `ad`.
    fn receive(&mut self, ad: &[u8], ct: &Self::Ciphertext) -> Result<Vec<u8>, RatchetError>;
}
