//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must always hold during a session. Unlike
//! example-based tests that check specific scenarios, invariants verify
//! behavioral properties across every schedule the harness generates.
//!
//! # Architecture
//!
//! A [`Pair`] records every send and delivery attempt; [`Pair::snapshot`]
//! turns that log into a [`SystemSnapshot`], and registered [`Invariant`]
//! checks run against it.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! registry.check_all(&pair.snapshot())?;
//! ```
//!
//! [`Pair`]: crate::Pair
//! [`Pair::snapshot`]: crate::Pair::snapshot

mod checks;
mod snapshot;

pub use checks::{ExactlyOnce, ForgeryRejected, GenuineAccepted, NothingLost, PlaintextIntegrity};
pub use snapshot::{DeliveryKind, DeliveryRecord, Outcome, SystemSnapshot};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// An invariant that can be checked against a session snapshot.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against the current state.
    ///
    /// Returns `Ok(())` if the invariant holds, or a [`Violation`]
    /// describing what went wrong.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
///
/// Collects multiple invariants and runs them all against a snapshot.
/// Use [`InvariantRegistry::standard()`] for the delivery guarantees every
/// protocol makes.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Create a registry with the standard delivery invariants.
    ///
    /// Includes:
    /// - [`PlaintextIntegrity`]: accepted plaintext equals sent plaintext
    /// - [`ExactlyOnce`]: no message is accepted twice
    /// - [`ForgeryRejected`]: replays and tampered messages are rejected
    /// - [`GenuineAccepted`]: genuine messages are accepted
    /// - [`NothingLost`]: every message is delivered once or still queued
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(PlaintextIntegrity);
        registry.add(ExactlyOnce);
        registry.add(ForgeryRejected);
        registry.add(GenuineAccepted);
        registry.add(NothingLost);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants against the given state.
    ///
    /// Returns `Ok(())` if all invariants hold, or all violations found.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_invariants() {
        let registry = InvariantRegistry::standard();
        assert!(!registry.is_empty());
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn empty_snapshot_passes_invariants() {
        let registry = InvariantRegistry::standard();
        let snapshot = SystemSnapshot::empty();
        assert!(registry.check_all(&snapshot).is_ok());
    }

    #[test]
    fn violation_display() {
        let violation = Violation { invariant: "exactly_once", message: "twice".to_string() };
        assert_eq!(violation.to_string(), "exactly_once: twice");
    }
}
