//! Continuous key agreement
//!
//! Ping-pong Diffie-Hellman over X25519. A send-capable state holds the
//! partner's last public share; a receive-capable state holds our own last
//! secret scalar. Every `send` and `receive` flips the role, so the two
//! parties must strictly alternate.

use ratchet_crypto::{DecryptionKey, EncryptionKey, Environment, Secret};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::RatchetError;

/// Public share carried in a ratchet message.
pub type CkaMessage = EncryptionKey;

/// CKA state of one party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CkaState {
    /// Holds the partner's public share; may send next
    Send {
        /// Partner's last share
        peer: EncryptionKey,
    },
    /// Holds our own secret scalar; may receive next
    Receive {
        /// Our last secret
        secret: DecryptionKey,
    },
}

impl Zeroize for CkaState {
    fn zeroize(&mut self) {
        if let CkaState::Receive { secret } = self {
            secret.zeroize();
        }
    }
}

/// Fresh key pair split into a send-capable and a receive-capable state.
pub fn generate(env: &impl Environment) -> (CkaState, CkaState) {
    let secret = DecryptionKey::generate(env);
    let peer = secret.public();
    (CkaState::Send { peer }, CkaState::Receive { secret })
}

impl CkaState {
    /// True if the next operation must be `send`.
    pub fn can_send(&self) -> bool {
        matches!(self, CkaState::Send { .. })
    }

    /// Sample a fresh share and agree with the partner's last one.
    ///
    /// # Errors
    ///
    /// - `WrongRole` if the state is receive-capable
    /// - `Crypto(NonContributory)` if the stored share is low order
    pub fn send(&mut self, env: &impl Environment) -> Result<(CkaMessage, Secret<32>), RatchetError> {
        let CkaState::Send { peer } = self else {
            return Err(RatchetError::WrongRole { operation: "cka send", role: "receiving" });
        };

        let secret = DecryptionKey::generate(env);
        let shared = secret.diffie_hellman(peer)?;
        let message = secret.public();

        *self = CkaState::Receive { secret };
        Ok((message, shared))
    }

    /// Agree with the partner's fresh share.
    ///
    /// # Errors
    ///
    /// - `WrongRole` if the state is send-capable
    /// - `Crypto(NonContributory)` if `message` is low order
    pub fn receive(&mut self, message: &CkaMessage) -> Result<Secret<32>, RatchetError> {
        let CkaState::Receive { secret } = self else {
            return Err(RatchetError::WrongRole { operation: "cka receive", role: "sending" });
        };

        let shared = secret.diffie_hellman(message)?;

        *self = CkaState::Send { peer: *message };
        Ok(shared)
    }
}
