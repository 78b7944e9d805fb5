//! Fuzz target for envelope decoding
//!
//! # Strategy
//!
//! - Arbitrary bytes decoded as every protocol's ciphertext type
//! - Envelopes that decode are re-encoded and decoded again
//! - Decoded Double Ratchet envelopes are handed to a fresh receiver
//!
//! # Invariants
//!
//! - Decoding never panics, whatever lengths the input claims
//! - A decoded envelope survives a second encode/decode unchanged
//! - A receiver rejects envelopes it did not get from its partner
//! - NEVER panic on malformed CBOR

#![no_main]

use std::fmt::Debug;

use libfuzzer_sys::fuzz_target;
use ratchet_core::{
    codec, BarkCiphertext, BrkeCiphertext, DoubleRatchet, DrCiphertext, FsCiphertext,
    HybridCiphertext, JmmCiphertext, Ratchet, RatchetConfig, SchCiphertext,
};
use ratchet_crypto::SeededEnv;
use serde::{de::DeserializeOwned, Serialize};

fn stable<T: Serialize + DeserializeOwned + Debug>(bytes: &[u8]) -> Option<T> {
    let value: T = codec::decode(bytes).ok()?;
    let encoded = codec::encode(&value).expect("decoded envelope re-encodes");
    let again: T = codec::decode(&encoded).expect("re-encoded envelope decodes");
    assert_eq!(format!("{value:?}"), format!("{again:?}"));
    Some(value)
}

fuzz_target!(|data: &[u8]| {
    let _ = stable::<FsCiphertext>(data);
    let _ = stable::<BrkeCiphertext>(data);
    let _ = stable::<BarkCiphertext>(data);
    let _ = stable::<HybridCiphertext>(data);
    let _ = stable::<JmmCiphertext>(data);
    let _ = stable::<SchCiphertext>(data);

    if let Some(ct) = stable::<DrCiphertext>(data) {
        let env = SeededEnv::from_u64(0);
        let (mut alice, mut bob) =
            DoubleRatchet::init(&env, &RatchetConfig::default()).expect("init never fails");
        assert!(alice.receive(b"", &ct).is_err(), "alice accepted a foreign envelope");
        assert!(bob.receive(b"", &ct).is_err(), "bob accepted a foreign envelope");
    }
});
