//! Scripted conversations.
//!
//! A [`Pattern`] expands into a fixed operation list; [`run`] plays it through
//! a [`Pair`] and checks the standard invariants after every step.

use ratchet_core::{Ratchet, RatchetConfig};
use tracing::{debug, info};

use crate::{
    error::HarnessError,
    invariants::InvariantRegistry,
    network::DeliveryPolicy,
    operation::{Operation, Party, SmallMessage},
    pair::Pair,
};

/// Shape of a scripted conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Parties take turns, each message delivered before the reply
    Alternating,
    /// Alice sends everything, Bob reads it all and answers once
    Burst,
    /// Both parties send before either receives
    Crossing,
    /// Bursts in both directions delivered in random order
    Shuffled,
}

impl Pattern {
    /// Delivery policy the pattern runs under.
    pub fn policy(self, seed: u64) -> DeliveryPolicy {
        match self {
            Pattern::Shuffled => DeliveryPolicy::Shuffled(seed),
            Pattern::Alternating | Pattern::Burst | Pattern::Crossing => DeliveryPolicy::InOrder,
        }
    }

    /// Operations for a conversation of `messages` messages.
    ///
    /// Every script ends with a `DeliverAll`, so nothing is left in flight.
    pub fn script(self, messages: usize) -> Vec<Operation> {
        let mut ops = Vec::new();
        let send = |from: Party, n: usize| Operation::Send {
            from,
            content: SmallMessage { seed: n as u8, size_class: (n % 4) as u8 },
        };

        match self {
            Pattern::Alternating => {
                let mut from = Party::Alice;
                for n in 0..messages {
                    ops.push(send(from, n));
                    ops.push(Operation::Deliver { to: from.peer() });
                    from = from.peer();
                }
            },
            Pattern::Burst => {
                for n in 0..messages.saturating_sub(1) {
                    ops.push(send(Party::Alice, n));
                }
                ops.push(Operation::DeliverAll);
                if messages > 0 {
                    ops.push(send(Party::Bob, messages - 1));
                }
            },
            Pattern::Crossing => {
                for n in (0..messages).step_by(2) {
                    ops.push(send(Party::Alice, n));
                    if n + 1 < messages {
                        ops.push(send(Party::Bob, n + 1));
                    }
                    ops.push(Operation::Deliver { to: Party::Alice });
                    ops.push(Operation::Deliver { to: Party::Bob });
                }
            },
            Pattern::Shuffled => {
                let mut from = Party::Alice;
                for (n, chunk) in (0..messages).collect::<Vec<_>>().chunks(4).enumerate() {
                    for &m in chunk {
                        ops.push(send(from, m));
                    }
                    // Leave every other burst in flight across the next one.
                    if n % 2 == 1 {
                        ops.push(Operation::DeliverAll);
                    }
                    from = from.peer();
                }
            },
        }

        ops.push(Operation::DeliverAll);
        ops
    }
}

/// Outcome of a scripted run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Protocol name
    pub protocol: &'static str,
    /// Messages encrypted
    pub sent: usize,
    /// Messages decrypted
    pub accepted: usize,
    /// Operations applied
    pub operations: usize,
}

/// Play `pattern` with `messages` messages through protocol `R`.
///
/// Fails if the protocol cannot run under the pattern's policy, or when an
/// invariant breaks.
pub fn run<R: Ratchet>(
    pattern: Pattern,
    messages: usize,
    seed: u64,
    config: &RatchetConfig,
) -> Result<Report, HarnessError> {
    let mut pair = Pair::<R>::new(seed, config, pattern.policy(seed))?;
    let registry = InvariantRegistry::standard();
    let script = pattern.script(messages);

    for (step, op) in script.iter().enumerate() {
        let result = pair.apply(op);
        debug!(protocol = R::NAME, step, ?op, ?result, "applied");
        registry
            .check_all(&pair.snapshot())
            .map_err(|violations| HarnessError::Violations { step, violations })?;
    }

    let snapshot = pair.snapshot();
    let report = Report {
        protocol: R::NAME,
        sent: snapshot.sent.len(),
        accepted: snapshot.accepted(),
        operations: script.len(),
    };
    info!(
        protocol = report.protocol,
        sent = report.sent,
        accepted = report.accepted,
        ?pattern,
        "scenario complete"
    );
    Ok(report)
}
