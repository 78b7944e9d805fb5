//! Fuzz target for two-party sessions under arbitrary schedules
//!
//! # Strategy
//!
//! - Arbitrary protocol, delivery policy and seed
//! - Arbitrary sequences of sends, deliveries, replays and tampering
//!
//! # Invariants
//!
//! - Every standard harness invariant holds after every operation
//! - Draining the network at the end delivers everything still in flight
//! - NEVER panic inside the protocols

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use ratchet_core::{Bark, DoubleRatchet, Hybrid, Jmm, Ratchet, RatchetConfig, UniVariant};
use ratchet_harness::{DeliveryPolicy, InvariantRegistry, Operation, OperationResult, Pair};

/// Pairing-based protocols are too slow for fuzzing throughput and are
/// covered by the harness property tests instead.
#[derive(Debug, Clone, Copy, Arbitrary)]
enum Protocol {
    DoubleRatchet,
    Bark,
    Hybrid,
    Jmm,
}

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Policy {
    InOrder,
    Reverse,
    Shuffled(u64),
    Deferred,
}

#[derive(Debug, Clone, Arbitrary)]
struct Session {
    protocol: Protocol,
    policy: Policy,
    seed: u64,
    operations: Vec<Operation>,
}

fn drive<R: Ratchet>(seed: u64, policy: DeliveryPolicy, operations: &[Operation]) {
    let config = RatchetConfig::default().with_uni_variant(UniVariant::Lite);
    // Reordering policies are refused for in-order protocols.
    let Ok(mut pair) = Pair::<R>::new(seed, &config, policy) else {
        return;
    };
    let registry = InvariantRegistry::standard();

    for (step, op) in operations.iter().take(64).enumerate() {
        pair.apply(op);
        if let Err(violations) = registry.check_all(&pair.snapshot()) {
            panic!("{} step {step} ({op:?}): {violations:?}", R::NAME);
        }
    }

    let drained = pair.apply(&Operation::DeliverAll);
    assert!(matches!(drained, OperationResult::Drained { rejected: 0, .. }), "{drained:?}");
    assert!(registry.check_all(&pair.snapshot()).is_ok());
}

fuzz_target!(|session: Session| {
    let policy = match session.policy {
        Policy::InOrder => DeliveryPolicy::InOrder,
        Policy::Reverse => DeliveryPolicy::Reverse,
        Policy::Shuffled(seed) => DeliveryPolicy::Shuffled(seed),
        Policy::Deferred => DeliveryPolicy::Deferred,
    };

    match session.protocol {
        Protocol::DoubleRatchet => drive::<DoubleRatchet>(session.seed, policy, &session.operations),
        Protocol::Bark => drive::<Bark>(session.seed, policy, &session.operations),
        Protocol::Hybrid => drive::<Hybrid>(session.seed, policy, &session.operations),
        Protocol::Jmm => drive::<Jmm>(session.seed, policy, &session.operations),
    }
});
