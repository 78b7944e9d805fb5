//! Standard invariant checks.
//!
//! These capture what every protocol promises its callers, whatever the
//! schedule: messages decrypt to what was sent, once, and nothing forged or
//! replayed is ever accepted.

use std::collections::{BTreeMap, BTreeSet};

use super::{DeliveryKind, Invariant, InvariantResult, Outcome, SystemSnapshot, Violation};

/// Accepted plaintext equals the sent plaintext.
///
/// Every accepted delivery must carry an id that was sent, and decrypt to the
/// exact bytes encrypted under that id.
pub struct PlaintextIntegrity;

impl Invariant for PlaintextIntegrity {
    fn name(&self) -> &'static str {
        "plaintext_integrity"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for delivery in &state.deliveries {
            let Outcome::Accepted(plaintext) = &delivery.outcome else {
                continue;
            };
            match state.sent.get(&delivery.id) {
                Some(sent) if sent == plaintext => {},
                Some(sent) => {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "{} message {}: decrypted {} bytes, sent {} bytes",
                            state.protocol,
                            delivery.id,
                            plaintext.len(),
                            sent.len()
                        ),
                    });
                },
                None => {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "{} accepted message {} which was never sent",
                            state.protocol, delivery.id
                        ),
                    });
                },
            }
        }
        Ok(())
    }
}

/// A message is accepted at most once.
pub struct ExactlyOnce;

impl Invariant for ExactlyOnce {
    fn name(&self) -> &'static str {
        "exactly_once"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let mut seen = BTreeSet::new();
        for delivery in state.deliveries.iter().filter(|d| d.outcome.is_accepted()) {
            if !seen.insert(delivery.id) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{} accepted message {} twice ({:?})",
                        state.protocol, delivery.id, delivery.kind
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Replayed and tampered deliveries are rejected.
pub struct ForgeryRejected;

impl Invariant for ForgeryRejected {
    fn name(&self) -> &'static str {
        "forgery_rejected"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let forged = state
            .deliveries
            .iter()
            .find(|d| d.kind != DeliveryKind::Genuine && d.outcome.is_accepted());

        match forged {
            Some(delivery) => Err(Violation {
                invariant: self.name(),
                message: format!(
                    "{} accepted {:?} delivery of message {} to {:?}",
                    state.protocol, delivery.kind, delivery.id, delivery.to
                ),
            }),
            None => Ok(()),
        }
    }
}

/// Genuine deliveries are accepted.
///
/// The harness only schedules deliveries a protocol supports, and a rejected
/// forgery must not disturb the receiver, so every genuine message decrypts.
pub struct GenuineAccepted;

impl Invariant for GenuineAccepted {
    fn name(&self) -> &'static str {
        "genuine_accepted"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for delivery in state.genuine() {
            if let Outcome::Rejected(kind) = delivery.outcome {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{} rejected genuine message {} to {:?}: {kind:?}",
                        state.protocol, delivery.id, delivery.to
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Every sent message is either delivered once or still in flight.
pub struct NothingLost;

impl Invariant for NothingLost {
    fn name(&self) -> &'static str {
        "nothing_lost"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let mut handed: BTreeMap<u64, usize> = BTreeMap::new();
        for delivery in state.genuine() {
            *handed.entry(delivery.id).or_default() += 1;
        }
        for id in &state.in_flight {
            *handed.entry(*id).or_default() += 1;
        }

        for id in state.sent.keys() {
            let count = handed.get(id).copied().unwrap_or(0);
            if count != 1 {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{} message {id} delivered or queued {count} times",
                        state.protocol
                    ),
                });
            }
        }
        Ok(())
    }
}
