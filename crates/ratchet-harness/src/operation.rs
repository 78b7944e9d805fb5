//! Operations for model-based testing.
//!
//! Operations represent every action a two-party session can see. They are
//! generated randomly (proptest, libFuzzer) and applied to a [`Pair`].
//!
//! [`Pair`]: crate::Pair

use arbitrary::Arbitrary;
use ratchet_core::{ErrorKind, Role};

/// Session participant, as generated by `arbitrary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum Party {
    /// Initiator
    Alice,
    /// Responder
    Bob,
}

impl Party {
    /// Role this party plays in the protocol.
    pub fn role(self) -> Role {
        match self {
            Party::Alice => Role::Alice,
            Party::Bob => Role::Bob,
        }
    }

    /// The other party.
    pub fn peer(self) -> Party {
        match self {
            Party::Alice => Party::Bob,
            Party::Bob => Party::Alice,
        }
    }
}

/// Operations that can be applied to a pair.
///
/// Operations are small and composable so proptest can explore interesting
/// interleavings of sends and deliveries.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Party encrypts a message and hands it to the network.
    Send {
        /// Sender.
        from: Party,
        /// Message content (kept small for efficiency).
        content: SmallMessage,
    },

    /// Deliver the next message queued for a party, as the delivery policy
    /// picks it.
    Deliver {
        /// Recipient.
        to: Party,
    },

    /// Deliver everything in flight, to Alice first and then to Bob.
    DeliverAll,

    /// Hand the last message a party accepted to it again.
    Replay {
        /// Recipient.
        to: Party,
    },

    /// Present the next queued message under altered associated data.
    ///
    /// The genuine message stays queued.
    Tamper {
        /// Recipient.
        to: Party,
    },
}

/// Small message content for testing.
///
/// The content is deterministic from the seed.
#[derive(Debug, Clone, Arbitrary)]
pub struct SmallMessage {
    /// Message seed.
    pub seed: u8,
    /// Message length hint (0-3 maps to empty/small/medium/large).
    pub size_class: u8,
}

impl SmallMessage {
    /// Expand to actual message bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = match self.size_class % 4 {
            0 => 0,
            1 => 8,
            2 => 64,
            _ => 256,
        };

        (0..len).map(|i| self.seed.wrapping_add(i as u8)).collect()
    }
}

/// Result of applying an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Message encrypted and queued under this id.
    Sent {
        /// Network id
        id: u64,
    },

    /// The sender refused to encrypt.
    Refused(ErrorKind),

    /// Message decrypted.
    Accepted {
        /// Network id
        id: u64,
    },

    /// The receiver rejected the message.
    Rejected {
        /// Network id
        id: u64,
        /// Error class
        kind: ErrorKind,
    },

    /// `DeliverAll` finished.
    Drained {
        /// Messages accepted
        accepted: usize,
        /// Messages rejected
        rejected: usize,
    },

    /// Nothing to do: empty queue, held back by the policy, or nothing to
    /// replay.
    Idle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_classes() {
        let lens: Vec<usize> = (0..4)
            .map(|size_class| SmallMessage { seed: 1, size_class }.to_bytes().len())
            .collect();
        assert_eq!(lens, vec![0, 8, 64, 256]);
    }

    #[test]
    fn content_is_deterministic() {
        let message = SmallMessage { seed: 250, size_class: 1 };
        assert_eq!(message.to_bytes(), vec![250, 251, 252, 253, 254, 255, 0, 1]);
    }

    #[test]
    fn party_roles() {
        assert_eq!(Party::Alice.role(), Role::Alice);
        assert_eq!(Party::Bob.peer(), Party::Alice);
    }
}
