//! Two parties driven through a simulated network.
//!
//! [`Pair`] owns both protocol states, a seeded environment and a
//! [`SimNetwork`]. It applies [`Operation`]s and logs every send and delivery
//! attempt so invariants can be checked against a [`SystemSnapshot`].

use std::collections::BTreeMap;

use ratchet_core::{Ratchet, RatchetConfig, Role};
use ratchet_crypto::SeededEnv;
use tracing::{debug, warn};

use crate::{
    error::HarnessError,
    invariants::{DeliveryKind, DeliveryRecord, Outcome, SystemSnapshot},
    network::{DeliveryPolicy, Envelope, SimNetwork},
    operation::{Operation, OperationResult},
};

/// Associated data bound to every message.
pub const SESSION_AD: &[u8] = b"ratchet-harness session";

/// Associated data presented with tampered deliveries.
pub const TAMPERED_AD: &[u8] = b"ratchet-harness tampered";

/// Alice and Bob running protocol `R`.
pub struct Pair<R: Ratchet> {
    alice: R,
    bob: R,
    env: SeededEnv,
    network: SimNetwork<R::Ciphertext>,
    last_to_alice: Option<Envelope<R::Ciphertext>>,
    last_to_bob: Option<Envelope<R::Ciphertext>>,
    sent: BTreeMap<u64, Vec<u8>>,
    deliveries: Vec<DeliveryRecord>,
}

impl<R: Ratchet> Pair<R> {
    /// Initialise both parties from `seed`.
    ///
    /// Fails with [`HarnessError::UnsupportedPolicy`] when `policy` reorders
    /// messages and the protocol needs them in order.
    pub fn new(
        seed: u64,
        config: &RatchetConfig,
        policy: DeliveryPolicy,
    ) -> Result<Self, HarnessError> {
        if policy.reorders() && !R::CAPABILITIES.out_of_order {
            return Err(HarnessError::UnsupportedPolicy { protocol: R::NAME, policy });
        }

        let env = SeededEnv::from_u64(seed);
        let (alice, bob) = R::init(&env, config)?;
        debug!(protocol = R::NAME, seed, ?policy, "pair initialised");

        Ok(Self {
            alice,
            bob,
            env,
            network: SimNetwork::new(policy),
            last_to_alice: None,
            last_to_bob: None,
            sent: BTreeMap::new(),
            deliveries: Vec::new(),
        })
    }

    /// Apply one operation.
    pub fn apply(&mut self, operation: &Operation) -> OperationResult {
        match operation {
            Operation::Send { from, content } => self.send(from.role(), content.to_bytes()),
            Operation::Deliver { to } => match self.network.pop(to.role()) {
                Some(envelope) => self.deliver(envelope),
                None => OperationResult::Idle,
            },
            Operation::DeliverAll => self.deliver_all(),
            Operation::Replay { to } => self.replay(to.role()),
            Operation::Tamper { to } => self.tamper(to.role()),
        }
    }

    /// Apply operations in order, collecting every result.
    pub fn apply_all<'a>(
        &mut self,
        operations: impl IntoIterator<Item = &'a Operation>,
    ) -> Vec<OperationResult> {
        operations.into_iter().map(|op| self.apply(op)).collect()
    }

    /// Delivery log and queue contents.
    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot {
            protocol: R::NAME,
            sent: self.sent.clone(),
            deliveries: self.deliveries.clone(),
            in_flight: self.network.queued_ids(),
        }
    }

    /// Messages sent so far.
    pub fn sent_count(&self) -> usize {
        self.sent.len()
    }

    /// Messages still queued.
    pub fn in_flight(&self) -> usize {
        self.network.in_flight()
    }

    /// Delivery policy in force.
    pub fn policy(&self) -> DeliveryPolicy {
        self.network.policy()
    }

    /// Protocol state of one party.
    pub fn party(&self, role: Role) -> &R {
        match role {
            Role::Alice => &self.alice,
            Role::Bob => &self.bob,
        }
    }

    fn party_mut(&mut self, role: Role) -> &mut R {
        match role {
            Role::Alice => &mut self.alice,
            Role::Bob => &mut self.bob,
        }
    }

    fn last_mut(&mut self, role: Role) -> &mut Option<Envelope<R::Ciphertext>> {
        match role {
            Role::Alice => &mut self.last_to_alice,
            Role::Bob => &mut self.last_to_bob,
        }
    }

    fn send(&mut self, from: Role, plaintext: Vec<u8>) -> OperationResult {
        let result = match from {
            Role::Alice => self.alice.send(&self.env, SESSION_AD, &plaintext),
            Role::Bob => self.bob.send(&self.env, SESSION_AD, &plaintext),
        };

        match result {
            Ok(ciphertext) => {
                let id = self.network.submit(from.peer(), ciphertext, plaintext.clone());
                self.sent.insert(id, plaintext);
                debug!(protocol = R::NAME, ?from, id, "sent");
                OperationResult::Sent { id }
            },
            Err(err) => {
                debug!(protocol = R::NAME, ?from, %err, "send refused");
                OperationResult::Refused(err.kind())
            },
        }
    }

    fn deliver(&mut self, envelope: Envelope<R::Ciphertext>) -> OperationResult {
        let (id, to) = (envelope.id, envelope.to);
        let outcome = self.attempt(to, SESSION_AD, &envelope.ciphertext);
        let result = self.record(id, to, DeliveryKind::Genuine, outcome);

        if matches!(result, OperationResult::Accepted { .. }) {
            *self.last_mut(to) = Some(envelope);
        } else {
            warn!(protocol = R::NAME, id, ?to, "genuine message rejected");
        }
        result
    }

    fn deliver_all(&mut self) -> OperationResult {
        let mut accepted = 0;
        let mut rejected = 0;

        for to in [Role::Alice, Role::Bob] {
            let envelopes = if self.network.policy() == DeliveryPolicy::Deferred {
                self.network.flush(to)
            } else {
                std::iter::from_fn(|| self.network.pop(to)).collect()
            };

            for envelope in envelopes {
                match self.deliver(envelope) {
                    OperationResult::Accepted { .. } => accepted += 1,
                    _ => rejected += 1,
                }
            }
        }

        OperationResult::Drained { accepted, rejected }
    }

    fn replay(&mut self, to: Role) -> OperationResult {
        let Some(envelope) = self.last_mut(to).clone() else {
            return OperationResult::Idle;
        };
        let outcome = self.attempt(to, SESSION_AD, &envelope.ciphertext);
        self.record(envelope.id, to, DeliveryKind::Replay, outcome)
    }

    fn tamper(&mut self, to: Role) -> OperationResult {
        let Some(envelope) = self.network.peek(to).cloned() else {
            return OperationResult::Idle;
        };
        let outcome = self.attempt(to, TAMPERED_AD, &envelope.ciphertext);
        self.record(envelope.id, to, DeliveryKind::Tampered, outcome)
    }

    fn attempt(&mut self, to: Role, ad: &[u8], ciphertext: &R::Ciphertext) -> Outcome {
        match self.party_mut(to).receive(ad, ciphertext) {
            Ok(plaintext) => Outcome::Accepted(plaintext),
            Err(err) => {
                debug!(protocol = R::NAME, ?to, %err, "receive rejected");
                Outcome::Rejected(err.kind())
            },
        }
    }

    fn record(&mut self, id: u64, to: Role, kind: DeliveryKind, outcome: Outcome) -> OperationResult {
        let result = match &outcome {
            Outcome::Accepted(_) => OperationResult::Accepted { id },
            Outcome::Rejected(err) => OperationResult::Rejected { id, kind: *err },
        };
        self.deliveries.push(DeliveryRecord { id, to, kind, outcome });
        result
    }
}

#[cfg(test)]
mod tests {
    use ratchet_core::{Brke, DoubleRatchet, ErrorKind, Jmm};

    use super::*;
    use crate::{
        invariants::InvariantRegistry,
        operation::{Party, SmallMessage},
    };

    fn send(from: Party, seed: u8) -> Operation {
        Operation::Send { from, content: SmallMessage { seed, size_class: 1 } }
    }

    #[test]
    fn reordering_policy_needs_capability() {
        let result = Pair::<Brke>::new(1, &RatchetConfig::default(), DeliveryPolicy::Reverse);
        assert!(matches!(result, Err(HarnessError::UnsupportedPolicy { protocol: "brke", .. })));

        assert!(
            Pair::<DoubleRatchet>::new(1, &RatchetConfig::default(), DeliveryPolicy::Reverse)
                .is_ok()
        );
    }

    #[test]
    fn reverse_delivery_under_double_ratchet() {
        let mut pair =
            Pair::<DoubleRatchet>::new(2, &RatchetConfig::default(), DeliveryPolicy::Reverse)
                .unwrap();
        for seed in 0..4 {
            assert!(matches!(pair.apply(&send(Party::Alice, seed)), OperationResult::Sent { .. }));
        }

        assert_eq!(pair.apply(&Operation::Deliver { to: Party::Bob }), OperationResult::Accepted {
            id: 3
        });
        assert_eq!(pair.apply(&Operation::DeliverAll), OperationResult::Drained {
            accepted: 3,
            rejected: 0
        });
        assert!(InvariantRegistry::standard().check_all(&pair.snapshot()).is_ok());
    }

    #[test]
    fn replay_and_tamper_are_rejected() {
        let mut pair =
            Pair::<Jmm>::new(3, &RatchetConfig::default(), DeliveryPolicy::InOrder).unwrap();
        pair.apply(&send(Party::Alice, 1));
        pair.apply(&send(Party::Alice, 2));

        assert_eq!(pair.apply(&Operation::Replay { to: Party::Bob }), OperationResult::Idle);
        assert_eq!(pair.apply(&Operation::Deliver { to: Party::Bob }), OperationResult::Accepted {
            id: 0
        });
        assert_eq!(pair.apply(&Operation::Replay { to: Party::Bob }), OperationResult::Rejected {
            id: 0,
            kind: ErrorKind::Desync
        });
        assert!(matches!(
            pair.apply(&Operation::Tamper { to: Party::Bob }),
            OperationResult::Rejected { id: 1, .. }
        ));
        assert_eq!(pair.apply(&Operation::Deliver { to: Party::Bob }), OperationResult::Accepted {
            id: 1
        });

        let snapshot = pair.snapshot();
        assert_eq!(snapshot.accepted(), 2);
        assert!(InvariantRegistry::standard().check_all(&snapshot).is_ok());
    }

    #[test]
    fn deferred_holds_until_deliver_all() {
        let mut pair =
            Pair::<Brke>::new(4, &RatchetConfig::default(), DeliveryPolicy::Deferred).unwrap();
        pair.apply(&send(Party::Alice, 1));
        pair.apply(&send(Party::Bob, 2));

        assert_eq!(pair.apply(&Operation::Deliver { to: Party::Bob }), OperationResult::Idle);
        assert_eq!(pair.apply(&Operation::Tamper { to: Party::Bob }), OperationResult::Idle);
        assert_eq!(pair.in_flight(), 2);

        assert_eq!(pair.apply(&Operation::DeliverAll), OperationResult::Drained {
            accepted: 2,
            rejected: 0
        });
        assert_eq!(pair.in_flight(), 0);
        assert!(InvariantRegistry::standard().check_all(&pair.snapshot()).is_ok());
    }
}
