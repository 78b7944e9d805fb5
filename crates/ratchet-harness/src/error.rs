//! Harness errors

use ratchet_core::RatchetError;
use thiserror::Error;

use crate::{invariants::Violation, network::DeliveryPolicy};

/// Errors from setting up or running a simulated session
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The protocol cannot process messages in the order the policy delivers
    #[error("{protocol} requires in-order delivery, cannot run under {policy:?}")]
    UnsupportedPolicy {
        /// Protocol name
        protocol: &'static str,
        /// Requested policy
        policy: DeliveryPolicy,
    },

    /// Session initialisation failed
    #[error("session setup failed: {0}")]
    Init(#[from] RatchetError),

    /// Invariants broke after an operation
    #[error("{} invariant violation(s) after operation {step}", .violations.len())]
    Violations {
        /// Index of the operation after which the check failed
        step: usize,
        /// Every violation found
        violations: Vec<Violation>,
    },
}
