//! Forward-secure AEAD
//!
//! One direction of a symmetric chain. The sender derives a fresh message
//! key per message from a PRF-PRNG chain; the receiver follows the chain and
//! caches the keys of skipped indices so that messages can arrive in any
//! order.
//!
//! # Security Properties
//!
//! - Forward Secrecy: chain states are replaced after every derivation, and
//!   cached keys are erased the moment they decrypt their message
//! - Replay Rejection: any index at or below the receive counter without a
//!   cached key has been consumed, so a second delivery fails with
//!   `AlreadyConsumed`
//! - Bounded Memory: skips are bounded by `max_skip` and the cache by
//!   `max_cached_keys`; consumed indices leave nothing behind, so a message
//!   that never arrives costs one cached key and no more
//!
//! # Commit Order
//!
//! `receive` derives skipped keys on a scratch copy of the chain and commits
//! them only after the message authenticates. A forged ciphertext with a
//! large index therefore neither advances the chain nor fills the cache.

use ratchet_crypto::{AeadKey, Authenticated, PrngState, XChaCha};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{
    arena::{KeyArena, SlotStatus},
    codec::Header,
    config::RatchetConfig,
    error::RatchetError,
};

/// FS-AEAD ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsCiphertext {
    /// Message index, starting at 1
    pub index: u64,
    /// AEAD output
    #[serde(with = "serde_bytes")]
    pub body: Vec<u8>,
}

/// Sending half of an FS-AEAD direction.
#[derive(Debug, Clone, Zeroize)]
pub struct FsSender {
    chain: PrngState,
    index: u64,
}

/// Receiving half of an FS-AEAD direction.
#[derive(Debug, Clone, Zeroize)]
pub struct FsReceiver {
    chain: PrngState,
    index: u64,
    skipped: KeyArena<AeadKey>,
    max_skip: u64,
    max_cached_keys: usize,
}

/// Associated data: `index (u64 BE) || ad`.
fn header(index: u64, ad: &[u8]) -> Vec<u8> {
    let mut out = Header::default().u64(index).finish();
    out.extend_from_slice(ad);
    out
}

/// Matching sender and receiver from a shared seed.
pub fn generate(seed: PrngState, config: &RatchetConfig) -> (FsSender, FsReceiver) {
    let mut skipped = KeyArena::new();
    // Index 0 is never sent.
    skipped.erase(0);

    let sender = FsSender { chain: seed.clone(), index: 0 };
    let receiver = FsReceiver {
        chain: seed,
        index: 0,
        skipped,
        max_skip: config.max_skip,
        max_cached_keys: config.max_cached_keys,
    };
    (sender, receiver)
}

impl FsSender {
    /// Number of messages sent.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Encrypt the next message.
    pub fn send(&mut self, ad: &[u8], pt: &[u8]) -> Result<FsCiphertext, RatchetError> {
        let index = self.index + 1;
        let mut chain = self.chain.clone();
        let key: AeadKey = chain.advance(None)?;

        let body = XChaCha::encrypt(&key, pt, &header(index, ad));

        self.chain = chain;
        self.index = index;
        Ok(FsCiphertext { index, body })
    }
}

impl FsReceiver {
    /// Highest index received so far.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Indices whose keys are cached for late delivery.
    pub fn cached_indices(&self) -> Vec<u64> {
        self.skipped.live_indices().collect()
    }

    /// Decrypt a message.
    ///
    /// # Errors
    ///
    /// - `AlreadyConsumed`: index 0, or an index already delivered
    /// - `GapTooLarge`: skip exceeds `max_skip` or would overflow the cache
    /// - `Crypto(AuthenticationFailed)`: wrong key, `ad` or tampered body
    pub fn receive(&mut self, ad: &[u8], ct: &FsCiphertext) -> Result<Vec<u8>, RatchetError> {
        let index = ct.index;

        if index <= self.index {
            if self.skipped.status(index) != SlotStatus::Live {
                tracing::warn!(index, "fs-aead rejected consumed index");
                return Err(RatchetError::AlreadyConsumed { index });
            }
            let Some(key) = self.skipped.get(index) else {
                return Err(RatchetError::AlreadyConsumed { index });
            };
            let pt = XChaCha::decrypt(key, &ct.body, &header(index, ad))?;

            // Dropping the removed key zeroizes it.
            drop(self.skipped.remove(index));
            tracing::trace!(index, "fs-aead consumed cached key");
            return Ok(pt);
        }

        let gap = index - self.index - 1;
        if gap > self.max_skip
            || self.skipped.live_count().saturating_add(gap as usize) > self.max_cached_keys
        {
            tracing::warn!(current = self.index, requested = index, "fs-aead gap too large");
            return Err(RatchetError::GapTooLarge {
                current: self.index,
                requested: index,
                max: self.max_skip,
            });
        }

        let mut chain = self.chain.clone();
        let mut skipped = Vec::with_capacity(gap as usize);
        for skipped_index in self.index + 1..index {
            let key: AeadKey = chain.advance(None)?;
            skipped.push((skipped_index, key));
        }
        let key: AeadKey = chain.advance(None)?;

        let pt = XChaCha::decrypt(&key, &ct.body, &header(index, ad))?;

        for (skipped_index, key) in skipped {
            self.skipped.insert(skipped_index, key)?;
        }
        self.chain = chain;
        self.index = index;

        if gap > 0 {
            tracing::debug!(index, skipped = gap, "fs-aead cached skipped keys");
        }
        Ok(pt)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn pair() -> (FsSender, FsReceiver) {
        generate(PrngState::from_bytes([7; 16]), &RatchetConfig::default())
    }

    #[test]
    fn in_order_roundtrip() {
        let (mut sender, mut receiver) = pair();

        for i in 1..=5u8 {
            let ct = sender.send(b"ad", &[i]).unwrap();
            assert_eq!(ct.index, u64::from(i));
            assert_eq!(receiver.receive(b"ad", &ct).unwrap(), vec![i]);
        }
        assert!(receiver.cached_indices().is_empty());
    }

    #[test]
    fn skipped_message_scenario() {
        let (mut sender, mut receiver) = pair();
        let pt = [0u8; 64];

        let ct1 = sender.send(b"", &pt).unwrap();
        let ct2 = sender.send(b"", &pt).unwrap();
        let ct3 = sender.send(b"", &pt).unwrap();

        assert_eq!(receiver.receive(b"", &ct2).unwrap(), pt);
        assert_eq!(receiver.cached_indices(), vec![1]);

        assert_eq!(receiver.receive(b"", &ct1).unwrap(), pt);
        assert!(receiver.cached_indices().is_empty());

        assert_eq!(receiver.receive(b"", &ct3).unwrap(), pt);
        assert_eq!(receiver.index(), 3);
    }

    #[test]
    fn replay_is_rejected() {
        let (mut sender, mut receiver) = pair();
        let ct = sender.send(b"", b"once").unwrap();

        receiver.receive(b"", &ct).unwrap();
        assert_eq!(receiver.receive(b"", &ct), Err(RatchetError::AlreadyConsumed { index: 1 }));
    }

    #[test]
    fn cached_replay_is_rejected() {
        let (mut sender, mut receiver) = pair();
        let ct1 = sender.send(b"", b"1").unwrap();
        let ct2 = sender.send(b"", b"2").unwrap();

        receiver.receive(b"", &ct2).unwrap();
        receiver.receive(b"", &ct1).unwrap();
        assert!(matches!(receiver.receive(b"", &ct1), Err(RatchetError::AlreadyConsumed { .. })));
    }

    #[test]
    fn lost_message_does_not_pin_memory() {
        let (mut sender, mut receiver) = pair();

        let _lost = sender.send(b"", b"lost").unwrap();
        for i in 0..2000u32 {
            let ct = sender.send(b"", &i.to_be_bytes()).unwrap();
            receiver.receive(b"", &ct).unwrap();
        }

        assert_eq!(receiver.index(), 2001);
        assert_eq!(receiver.cached_indices(), vec![1]);
        assert_eq!(receiver.skipped.slot_count(), 1);
    }

    #[test]
    fn consumed_cached_keys_leave_nothing_behind() {
        let (mut sender, mut receiver) = pair();
        let cts: Vec<_> = (0..10u8).map(|i| sender.send(b"", &[i]).unwrap()).collect();

        // Lose the first message for good and deliver the rest backwards.
        for ct in cts[1..].iter().rev() {
            receiver.receive(b"", ct).unwrap();
        }
        assert_eq!(receiver.cached_indices(), vec![1]);
        assert_eq!(receiver.skipped.slot_count(), 1);

        for ct in &cts[1..] {
            assert!(matches!(receiver.receive(b"", ct), Err(RatchetError::AlreadyConsumed { .. })));
        }
    }

    #[test]
    fn index_zero_is_rejected() {
        let (_, mut receiver) = pair();
        let ct = FsCiphertext { index: 0, body: vec![0; 32] };
        assert_eq!(receiver.receive(b"", &ct), Err(RatchetError::AlreadyConsumed { index: 0 }));
    }

    #[test]
    fn tampered_message_does_not_advance() {
        let (mut sender, mut receiver) = pair();
        let _ = sender.send(b"", b"1").unwrap();
        let mut ct = sender.send(b"", b"2").unwrap();
        ct.body[0] ^= 1;

        assert!(receiver.receive(b"", &ct).is_err());
        assert_eq!(receiver.index(), 0);
        assert!(receiver.cached_indices().is_empty());
    }

    #[test]
    fn wrong_ad_fails() {
        let (mut sender, mut receiver) = pair();
        let ct = sender.send(b"ad", b"x").unwrap();
        assert!(receiver.receive(b"other", &ct).is_err());
        assert_eq!(receiver.receive(b"ad", &ct).unwrap(), b"x");
    }

    #[test]
    fn gap_bound_is_enforced() {
        let config = RatchetConfig { max_skip: 3, ..RatchetConfig::default() };
        let (mut sender, mut receiver) = generate(PrngState::from_bytes([1; 16]), &config);

        let cts: Vec<_> = (0..6).map(|_| sender.send(b"", b"m").unwrap()).collect();

        assert_eq!(
            receiver.receive(b"", &cts[4]),
            Err(RatchetError::GapTooLarge { current: 0, requested: 5, max: 3 })
        );
        assert_eq!(receiver.receive(b"", &cts[3]).unwrap(), b"m");
    }

    #[test]
    fn cache_bound_is_enforced() {
        let config = RatchetConfig { max_cached_keys: 2, ..RatchetConfig::default() };
        let (mut sender, mut receiver) = generate(PrngState::from_bytes([1; 16]), &config);

        let cts: Vec<_> = (0..6).map(|_| sender.send(b"", b"m").unwrap()).collect();

        receiver.receive(b"", &cts[2]).unwrap();
        assert_eq!(receiver.cached_indices(), vec![1, 2]);
        assert!(matches!(
            receiver.receive(b"", &cts[4]),
            Err(RatchetError::GapTooLarge { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn any_permutation_decrypts_once(order in Just((0..12usize).collect::<Vec<_>>()).prop_shuffle()) {
            let (mut sender, mut receiver) = pair();
            let cts: Vec<_> = (0..12u8).map(|i| sender.send(b"ad", &[i]).unwrap()).collect();

            for &i in &order {
                prop_assert_eq!(receiver.receive(b"ad", &cts[i]).unwrap(), vec![i as u8]);
            }
            for ct in &cts {
                prop_assert!(receiver.receive(b"ad", ct).is_err());
            }
            prop_assert!(receiver.cached_indices().is_empty());
        }
    }
}
