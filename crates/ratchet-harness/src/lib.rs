//! Deterministic two-party simulation for ratchet protocol testing.
//!
//! Every source of nondeterminism is seeded: the protocol entropy through
//! [`SeededEnv`](ratchet_crypto::SeededEnv) and delivery order through the
//! [`SimNetwork`] policy, so any failing schedule replays exactly.
//!
//! # Model-Based Testing
//!
//! [`Operation`]s derive `Arbitrary`, so proptest strategies and fuzz targets
//! can generate sends, deliveries, replays and tampering, and apply them to a
//! [`Pair`].
//!
//! # Invariant Testing
//!
//! The `invariants` module checks what every protocol promises regardless of
//! schedule. Use [`InvariantRegistry::standard()`] against
//! [`Pair::snapshot`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod invariants;
pub mod network;
pub mod operation;
pub mod pair;
pub mod scenario;

pub use error::HarnessError;
pub use invariants::{
    DeliveryKind, DeliveryRecord, ExactlyOnce, ForgeryRejected, GenuineAccepted, Invariant,
    InvariantRegistry, InvariantResult, NothingLost, Outcome, PlaintextIntegrity, SystemSnapshot,
    Violation,
};
pub use network::{DeliveryPolicy, Envelope, SimNetwork};
pub use operation::{Operation, OperationResult, Party, SmallMessage};
pub use pair::{Pair, SESSION_AD, TAMPERED_AD};
pub use scenario::{Pattern, Report, run};
