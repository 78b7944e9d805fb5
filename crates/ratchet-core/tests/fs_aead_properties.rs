//! Property-based tests for FS-AEAD
//!
//! 1. **Skip scenario**: ct2, ct1, ct3 all decrypt
//! 2. **Exactly once**: any permutation of a burst decrypts, and every
//!    replay afterwards fails
//! 3. **Determinism**: the same seed yields the same ciphertexts
//! 4. **Bounded cache**: skipped keys never outnumber the configured bound

use proptest::prelude::*;
use ratchet_core::{RatchetConfig, RatchetError, fs_aead};
use ratchet_crypto::PrngState;

const PLAINTEXT: &[u8] = b"forward secure";

#[test]
fn skip_then_cache_hits() {
    let (mut sender, mut receiver) = fs_aead::generate(PrngState::from_bytes([1; 16]), &RatchetConfig::default());

    let ct1 = sender.send(b"ad", PLAINTEXT).unwrap();
    let ct2 = sender.send(b"ad", PLAINTEXT).unwrap();
    let ct3 = sender.send(b"ad", PLAINTEXT).unwrap();

    assert_eq!(receiver.receive(b"ad", &ct2).unwrap(), PLAINTEXT);
    assert_eq!(receiver.cached_indices(), vec![1]);
    assert_eq!(receiver.receive(b"ad", &ct1).unwrap(), PLAINTEXT);
    assert!(receiver.cached_indices().is_empty());
    assert_eq!(receiver.receive(b"ad", &ct3).unwrap(), PLAINTEXT);
    assert_eq!(receiver.index(), 3);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_permutation_delivers_exactly_once(
        order in Just((0..12usize).collect::<Vec<_>>()).prop_shuffle(),
        seed in any::<[u8; 16]>(),
    ) {
        let (mut sender, mut receiver) = fs_aead::generate(PrngState::from_bytes(seed), &RatchetConfig::default());
        let cts: Vec<_> = (0..12u8).map(|i| sender.send(b"", &[i]).unwrap()).collect();

        for &i in &order {
            prop_assert_eq!(receiver.receive(b"", &cts[i]).unwrap(), vec![i as u8]);
        }
        prop_assert!(receiver.cached_indices().is_empty());

        for ct in &cts {
            let replay = receiver.receive(b"", ct);
            prop_assert_eq!(replay, Err(RatchetError::AlreadyConsumed { index: ct.index }));
        }
    }

    #[test]
    fn prop_same_seed_same_ciphertexts(
        seed in any::<[u8; 16]>(),
        messages in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..8),
    ) {
        let config = RatchetConfig::default();
        let (mut a, _) = fs_aead::generate(PrngState::from_bytes(seed), &config);
        let (mut b, _) = fs_aead::generate(PrngState::from_bytes(seed), &config);

        for msg in &messages {
            prop_assert_eq!(a.send(b"", msg).unwrap(), b.send(b"", msg).unwrap());
        }
    }

    #[test]
    fn prop_cache_never_exceeds_bound(
        jumps in prop::collection::vec(1u64..6, 1..12),
    ) {
        let config = RatchetConfig { max_skip: 4, max_cached_keys: 6, ..RatchetConfig::default() };
        let (mut sender, mut receiver) = fs_aead::generate(PrngState::from_bytes([9; 16]), &config);
        let total: u64 = jumps.iter().sum();
        let cts: Vec<_> = (0..total).map(|_| sender.send(b"", b"x").unwrap()).collect();

        let mut position = 0u64;
        for jump in jumps {
            position += jump;
            let before = receiver.index();
            let result = receiver.receive(b"", &cts[(position - 1) as usize]);
            match result {
                Ok(_) => prop_assert_eq!(receiver.index(), position),
                Err(RatchetError::GapTooLarge { .. }) => prop_assert_eq!(receiver.index(), before),
                Err(other) => prop_assert!(false, "unexpected error {other:?}"),
            }
            prop_assert!(receiver.cached_indices().len() <= 6);
        }
    }
}
