//! Fuzz target for the FS-AEAD receive path
//!
//! # Strategy
//!
//! - A sender encrypts a batch of messages from an arbitrary chain seed
//! - The receiver gets genuine messages in arbitrary order, interleaved with
//!   replays, forged indices (0, huge, past the skip bound) and random bodies
//!
//! # Invariants
//!
//! - Genuine messages decrypt to what was sent, exactly once
//! - Forgeries and replays are rejected
//! - A rejected input never prevents a later genuine delivery
//! - NEVER panic on adversarial input

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use ratchet_core::{fs_aead, FsCiphertext, RatchetConfig};
use ratchet_crypto::PrngState;

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    /// Chain seed shared by both halves
    seed: [u8; 16],
    /// Messages the sender encrypts (clamped to 64)
    messages: u8,
    /// Receiver-side events
    events: Vec<Event>,
}

#[derive(Debug, Clone, Arbitrary)]
enum Event {
    /// Deliver the genuine message at this slot
    Deliver { slot: u8 },
    /// Deliver a ciphertext with an arbitrary index and body
    Forge { index: u64, body: Vec<u8> },
    /// Deliver a genuine body under a different index
    Shift { slot: u8, delta: u16 },
    /// Deliver a genuine message with a flipped byte
    Flip { slot: u8, position: u16 },
}

fuzz_target!(|scenario: Scenario| {
    let config = RatchetConfig { max_skip: 32, max_cached_keys: 48, ..RatchetConfig::default() };
    let (mut sender, mut receiver) =
        fs_aead::generate(PrngState::from_bytes(scenario.seed), &config);

    let count = usize::from(scenario.messages % 65);
    let mut sent = Vec::with_capacity(count);
    for n in 0..count {
        let pt = (n as u32).to_be_bytes().to_vec();
        let ct = sender.send(b"fuzz", &pt).expect("sender never fails");
        sent.push((ct, pt));
    }
    let mut delivered = vec![false; count];

    for event in scenario.events {
        match event {
            Event::Deliver { slot } => {
                if count == 0 {
                    continue;
                }
                let slot = usize::from(slot) % count;
                let (ct, pt) = &sent[slot];
                match receiver.receive(b"fuzz", ct) {
                    Ok(out) => {
                        assert!(!delivered[slot], "message {slot} accepted twice");
                        assert_eq!(&out, pt);
                        delivered[slot] = true;
                    },
                    // Out of skip range or already consumed.
                    Err(_) => {},
                }
            },
            Event::Forge { index, body } => {
                let forged = FsCiphertext { index, body };
                if sent.iter().any(|(ct, _)| *ct == forged) {
                    continue;
                }
                assert!(receiver.receive(b"fuzz", &forged).is_err(), "forgery accepted");
            },
            Event::Shift { slot, delta } => {
                if count == 0 || delta == 0 {
                    continue;
                }
                let (ct, _) = &sent[usize::from(slot) % count];
                let shifted =
                    FsCiphertext { index: ct.index.wrapping_add(u64::from(delta)), ..ct.clone() };
                assert!(receiver.receive(b"fuzz", &shifted).is_err(), "shifted index accepted");
            },
            Event::Flip { slot, position } => {
                if count == 0 {
                    continue;
                }
                let (ct, _) = &sent[usize::from(slot) % count];
                if ct.body.is_empty() {
                    continue;
                }
                let mut flipped = ct.clone();
                let at = usize::from(position) % flipped.body.len();
                flipped.body[at] ^= 0x01;
                assert!(receiver.receive(b"fuzz", &flipped).is_err(), "flipped body accepted");
            },
        }
    }

    // Leftovers that still decrypt carry the sent plaintext.
    for (slot, (ct, pt)) in sent.iter().enumerate() {
        if delivered[slot] || ct.index > receiver.index() + config.max_skip {
            continue;
        }
        if let Ok(out) = receiver.receive(b"fuzz", ct) {
            assert_eq!(&out, pt);
        }
    }
});
