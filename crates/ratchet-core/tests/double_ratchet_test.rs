//! Double Ratchet scenarios
//!
//! Alternating conversations, unidirectional bursts received in arbitrary
//! order across several epochs, and rejection of ciphertexts outside the
//! receiver's window without disturbing its state.

use ratchet_core::{DoubleRatchet, DrCiphertext, RatchetConfig, RatchetError};
use ratchet_crypto::SeededEnv;

const VECTOR: [u8; 64] = [0; 64];

fn session(seed: u64) -> (SeededEnv, DoubleRatchet, DoubleRatchet) {
    let env = SeededEnv::from_u64(seed);
    let (alice, bob) = DoubleRatchet::init(&env, &RatchetConfig::default()).unwrap();
    (env, alice, bob)
}

#[test]
fn alternating_ten_rounds_with_zero_vector() {
    let (env, mut alice, mut bob) = session(1);

    for _ in 0..10 {
        let ct = alice.send(&env, b"ad", &VECTOR).unwrap();
        assert_eq!(bob.receive(b"ad", &ct).unwrap(), VECTOR);

        let ct = bob.send(&env, b"ad", &VECTOR).unwrap();
        assert_eq!(alice.receive(b"ad", &ct).unwrap(), VECTOR);
    }

    // Every direction switch opened a new epoch.
    assert_eq!(alice.epoch(), 20);
    assert_eq!(bob.epoch(), 20);
}

#[test]
fn bob_can_speak_first() {
    let (env, mut alice, mut bob) = session(2);

    let ct = bob.send(&env, b"", b"hello").unwrap();
    assert_eq!(ct.epoch, 0);
    assert!(ct.cka_message.is_none());
    assert_eq!(alice.receive(b"", &ct).unwrap(), b"hello");
}

#[test]
fn bursts_across_epochs_arrive_in_any_order() {
    let (env, mut alice, mut bob) = session(3);

    let first: Vec<DrCiphertext> = (0..3u8).map(|i| alice.send(&env, b"", &[1, i]).unwrap()).collect();
    bob.receive(b"", &first[2]).unwrap();

    let reply = bob.send(&env, b"", b"reply").unwrap();
    alice.receive(b"", &reply).unwrap();

    let second: Vec<DrCiphertext> = (0..3u8).map(|i| alice.send(&env, b"", &[3, i]).unwrap()).collect();
    assert!(second.iter().all(|ct| ct.epoch == 3));

    for (ct, expected) in [(&second[1], [3, 1]), (&first[0], [1, 0]), (&second[0], [3, 0])] {
        assert_eq!(bob.receive(b"", ct).unwrap(), expected);
    }
    assert_eq!(bob.receive(b"", &first[1]).unwrap(), [1, 1]);
    assert_eq!(bob.receive(b"", &second[2]).unwrap(), [3, 2]);
    assert_eq!(bob.live_receive_epochs(), vec![1, 3]);
}

#[test]
fn replay_in_earlier_epoch_is_rejected() {
    let (env, mut alice, mut bob) = session(4);

    let ct = alice.send(&env, b"", b"once").unwrap();
    bob.receive(b"", &ct).unwrap();
    let reply = bob.send(&env, b"", b"r").unwrap();
    alice.receive(b"", &reply).unwrap();
    let next = alice.send(&env, b"", b"next").unwrap();
    bob.receive(b"", &next).unwrap();

    assert!(matches!(bob.receive(b"", &ct), Err(RatchetError::AlreadyConsumed { index: 1 })));
}

#[test]
fn epoch_outside_window_does_not_mutate() {
    let (env, mut alice, mut bob) = session(5);

    let ct = alice.send(&env, b"", b"m").unwrap();
    let mut ahead = ct.clone();
    ahead.epoch = 3;

    assert_eq!(
        bob.receive(b"", &ahead),
        Err(RatchetError::EpochOutOfSync { current: 0, received: 3 })
    );
    assert_eq!(bob.epoch(), 0);

    let mut wrong_parity = ct.clone();
    wrong_parity.epoch = 2;
    assert!(matches!(bob.receive(b"", &wrong_parity), Err(RatchetError::EpochOutOfSync { .. })));

    assert_eq!(bob.receive(b"", &ct).unwrap(), b"m");
    assert_eq!(bob.epoch(), 1);
}

#[test]
fn tampered_epoch_opener_does_not_advance() {
    let (env, mut alice, mut bob) = session(6);

    let ct = alice.send(&env, b"", b"m").unwrap();
    let mut tampered = ct.clone();
    tampered.inner.body[0] ^= 0x80;

    assert!(bob.receive(b"", &tampered).is_err());
    assert_eq!(bob.epoch(), 0);
    assert!(bob.live_receive_epochs().is_empty());
    assert_eq!(bob.receive(b"", &ct).unwrap(), b"m");
}

#[test]
fn old_epochs_are_pruned() {
    let env = SeededEnv::from_u64(7);
    let config = RatchetConfig { max_live_epochs: 2, ..RatchetConfig::default() };
    let (mut alice, mut bob) = DoubleRatchet::init(&env, &config).unwrap();

    let mut stale = None;
    for round in 0..4 {
        let ct = alice.send(&env, b"", b"a").unwrap();
        let late = alice.send(&env, b"", b"late").unwrap();
        if round == 0 {
            stale = Some(late);
        }
        bob.receive(b"", &ct).unwrap();
        let ct = bob.send(&env, b"", b"b").unwrap();
        alice.receive(b"", &ct).unwrap();
    }

    assert_eq!(bob.live_receive_epochs(), vec![5, 7]);
    let stale = stale.unwrap();
    assert_eq!(bob.receive(b"", &stale), Err(RatchetError::EpochErased { epoch: 1 }));
}
