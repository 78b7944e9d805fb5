//! Observable state snapshots for invariant checking.
//!
//! A snapshot is the pair's delivery log at one point in time: what was sent,
//! what each party was handed and how it answered. Invariants operate on
//! snapshots rather than live protocol state, which is opaque.

use std::collections::BTreeMap;

use ratchet_core::{ErrorKind, Role};

/// How a message reached the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    /// Delivered as sent
    Genuine,
    /// Delivered again after it was accepted
    Replay,
    /// Delivered under altered associated data
    Tampered,
}

/// Receiver's answer to a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Decrypted to these bytes
    Accepted(Vec<u8>),
    /// Rejected with this error class
    Rejected(ErrorKind),
}

impl Outcome {
    /// Whether the receiver decrypted the message.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted(_))
    }
}

/// One delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    /// Network id of the message
    pub id: u64,
    /// Recipient
    pub to: Role,
    /// Genuine, replayed or tampered
    pub kind: DeliveryKind,
    /// What the receiver returned
    pub outcome: Outcome,
}

/// Snapshot of a two-party session.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Protocol name
    pub protocol: &'static str,
    /// Plaintext of every sent message, by network id
    pub sent: BTreeMap<u64, Vec<u8>>,
    /// Every delivery attempt, in order
    pub deliveries: Vec<DeliveryRecord>,
    /// Ids still queued in the network
    pub in_flight: Vec<u64>,
}

impl SystemSnapshot {
    /// Create an empty snapshot (nothing sent).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Genuine deliveries only.
    pub fn genuine(&self) -> impl Iterator<Item = &DeliveryRecord> {
        self.deliveries.iter().filter(|d| d.kind == DeliveryKind::Genuine)
    }

    /// Number of accepted deliveries of any kind.
    pub fn accepted(&self) -> usize {
        self.deliveries.iter().filter(|d| d.outcome.is_accepted()).count()
    }
}
