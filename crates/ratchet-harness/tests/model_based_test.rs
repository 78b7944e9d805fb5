//! Model-based tests over random operation sequences
//!
//! Proptest generates sends, deliveries, replays and tampering for both
//! parties; after every operation the standard invariants must hold:
//!
//! 1. **Integrity**: accepted plaintext equals sent plaintext
//! 2. **Exactly once**: no message is accepted twice
//! 3. **Forgery**: replays and tampered deliveries are rejected
//! 4. **Transactional**: a rejected forgery never breaks the genuine message
//!    queued behind it
//! 5. **Conservation**: every message is delivered once or still in flight

use proptest::prelude::*;
use ratchet_core::{
    Bark, Brke, DoubleRatchet, Hybrid, Jmm, Ratchet, RatchetConfig, Sch, UniVariant,
};
use ratchet_harness::{
    DeliveryPolicy, InvariantRegistry, Operation, OperationResult, Pair, Party, SmallMessage,
};

fn party() -> impl Strategy<Value = Party> {
    prop_oneof![Just(Party::Alice), Just(Party::Bob)]
}

fn operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        4 => (party(), any::<u8>(), 0u8..4).prop_map(|(from, seed, size_class)| {
            Operation::Send { from, content: SmallMessage { seed, size_class } }
        }),
        4 => party().prop_map(|to| Operation::Deliver { to }),
        1 => Just(Operation::DeliverAll),
        1 => party().prop_map(|to| Operation::Replay { to }),
        1 => party().prop_map(|to| Operation::Tamper { to }),
    ]
}

fn config() -> RatchetConfig {
    RatchetConfig::default().with_uni_variant(UniVariant::Lite)
}

fn run_operations<R: Ratchet>(
    seed: u64,
    policy: DeliveryPolicy,
    ops: &[Operation],
) -> Result<(), TestCaseError> {
    let mut pair = Pair::<R>::new(seed, &config(), policy).unwrap();
    let registry = InvariantRegistry::standard();

    for (step, op) in ops.iter().enumerate() {
        pair.apply(op);
        if let Err(violations) = registry.check_all(&pair.snapshot()) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            prop_assert!(false, "step {step} ({op:?}): {}", messages.join("; "));
        }
    }

    let drained = pair.apply(&Operation::DeliverAll);
    prop_assert!(
        matches!(drained, OperationResult::Drained { rejected: 0, .. }),
        "{}: {drained:?}",
        R::NAME
    );
    prop_assert_eq!(pair.in_flight(), 0);
    prop_assert!(registry.check_all(&pair.snapshot()).is_ok());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_double_ratchet_in_order(seed in any::<u64>(), ops in prop::collection::vec(operation(), 1..40)) {
        run_operations::<DoubleRatchet>(seed, DeliveryPolicy::InOrder, &ops)?;
    }

    #[test]
    fn prop_double_ratchet_shuffled(seed in any::<u64>(), ops in prop::collection::vec(operation(), 1..40)) {
        run_operations::<DoubleRatchet>(seed, DeliveryPolicy::Shuffled(seed), &ops)?;
    }

    #[test]
    fn prop_double_ratchet_reverse(seed in any::<u64>(), ops in prop::collection::vec(operation(), 1..40)) {
        run_operations::<DoubleRatchet>(seed, DeliveryPolicy::Reverse, &ops)?;
    }

    #[test]
    fn prop_bark(seed in any::<u64>(), ops in prop::collection::vec(operation(), 1..40)) {
        run_operations::<Bark>(seed, DeliveryPolicy::InOrder, &ops)?;
    }

    #[test]
    fn prop_hybrid(seed in any::<u64>(), ops in prop::collection::vec(operation(), 1..40)) {
        run_operations::<Hybrid>(seed, DeliveryPolicy::InOrder, &ops)?;
    }

    #[test]
    fn prop_jmm(seed in any::<u64>(), ops in prop::collection::vec(operation(), 1..30)) {
        run_operations::<Jmm>(seed, DeliveryPolicy::InOrder, &ops)?;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(6))]

    #[test]
    fn prop_brke(seed in any::<u64>(), ops in prop::collection::vec(operation(), 1..16)) {
        run_operations::<Brke>(seed, DeliveryPolicy::InOrder, &ops)?;
    }

    #[test]
    fn prop_sch(seed in any::<u64>(), ops in prop::collection::vec(operation(), 1..16)) {
        run_operations::<Sch>(seed, DeliveryPolicy::InOrder, &ops)?;
    }

    #[test]
    fn prop_brke_deferred(seed in any::<u64>(), ops in prop::collection::vec(operation(), 1..16)) {
        run_operations::<Brke>(seed, DeliveryPolicy::Deferred, &ops)?;
    }
}

#[test]
fn same_seed_same_outcomes() {
    let ops: Vec<Operation> = (0..12u8)
        .flat_map(|n| {
            let from = if n % 3 == 0 { Party::Bob } else { Party::Alice };
            [
                Operation::Send { from, content: SmallMessage { seed: n, size_class: n } },
                Operation::Deliver { to: from.peer() },
            ]
        })
        .collect();

    let run = || {
        let mut pair =
            Pair::<DoubleRatchet>::new(11, &config(), DeliveryPolicy::Shuffled(5)).unwrap();
        pair.apply_all(&ops)
    };
    assert_eq!(run(), run());
}
