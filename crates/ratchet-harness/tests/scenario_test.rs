//! Scripted conversation patterns for every protocol
//!
//! Each pattern runs to completion with the standard invariants checked
//! after every step. Protocols that need in-order delivery refuse the
//! shuffled pattern up front instead of failing mid-run.

use ratchet_core::{
    Bark, Brke, DoubleRatchet, Hybrid, Jmm, Ratchet, RatchetConfig, Sch, UniVariant,
};
use ratchet_harness::{HarnessError, Pattern, run};

const IN_ORDER: [Pattern; 3] = [Pattern::Alternating, Pattern::Burst, Pattern::Crossing];

fn all_in_order_patterns<R: Ratchet>(config: &RatchetConfig, messages: usize) {
    for pattern in IN_ORDER {
        let report = run::<R>(pattern, messages, 21, config)
            .unwrap_or_else(|err| panic!("{} {pattern:?}: {err}", R::NAME));
        assert_eq!(report.sent, messages, "{} {pattern:?}", R::NAME);
        assert_eq!(report.accepted, messages, "{} {pattern:?}", R::NAME);
    }
}

#[test]
fn double_ratchet_patterns() {
    let config = RatchetConfig::default();
    all_in_order_patterns::<DoubleRatchet>(&config, 12);

    let report = run::<DoubleRatchet>(Pattern::Shuffled, 16, 4, &config).unwrap();
    assert_eq!(report.accepted, 16);
}

#[test]
fn bark_full_patterns() {
    all_in_order_patterns::<Bark>(&RatchetConfig::default(), 8);
}

#[test]
fn bark_lite_patterns() {
    let config = RatchetConfig::default().with_uni_variant(UniVariant::Lite);
    all_in_order_patterns::<Bark>(&config, 12);
}

#[test]
fn hybrid_patterns() {
    let config = RatchetConfig::default().with_uni_variant(UniVariant::Lite);
    all_in_order_patterns::<Hybrid>(&config, 12);
}

#[test]
fn jmm_patterns() {
    all_in_order_patterns::<Jmm>(&RatchetConfig::default(), 10);
}

#[test]
fn brke_patterns() {
    all_in_order_patterns::<Brke>(&RatchetConfig::default(), 6);
}

#[test]
fn sch_patterns() {
    all_in_order_patterns::<Sch>(&RatchetConfig::default(), 6);
}

#[test]
fn in_order_protocols_refuse_shuffled() {
    let config = RatchetConfig::default();
    let err = run::<Jmm>(Pattern::Shuffled, 8, 1, &config).unwrap_err();
    assert!(matches!(err, HarnessError::UnsupportedPolicy { protocol: "jmm", .. }));
    assert!(err.to_string().contains("in-order"));
}

#[test]
fn empty_conversation() {
    let report = run::<DoubleRatchet>(Pattern::Alternating, 0, 1, &RatchetConfig::default())
        .unwrap();
    assert_eq!(report.sent, 0);
    assert_eq!(report.operations, 1);
}
