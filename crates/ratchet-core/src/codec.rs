//! Envelope encoding
//!
//! Envelopes and shipped states are CBOR. Bytes that get authenticated
//! (associated data, signed headers, transcript inputs) are built with
//! [`Header`] instead, a fixed big-endian layout that does not depend on the
//! CBOR encoder.

use serde::{Serialize, de::DeserializeOwned};

use crate::error::RatchetError;

/// Encode a value as CBOR.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, RatchetError> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|_| RatchetError::Malformed { what: "envelope encoding" })?;
    Ok(buf)
}

/// Decode a CBOR value.
///
/// # Errors
///
/// - `Malformed` if `bytes` is not a valid encoding of `T` or has trailing
///   bytes
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, RatchetError> {
    let mut reader = bytes;
    let value = ciborium::de::from_reader(&mut reader)
        .map_err(|_| RatchetError::Malformed { what: "envelope" })?;
    if !reader.is_empty() {
        return Err(RatchetError::Malformed { what: "envelope trailing bytes" });
    }
    Ok(value)
}

/// Fixed-layout builder for authenticated bytes.
///
/// Integers are big-endian `u64`; byte strings are prefixed with their
/// length as a big-endian `u64`.
#[derive(Debug, Default, Clone)]
pub struct Header {
    buf: Vec<u8>,
}

impl Header {
    /// Start with a domain label.
    pub fn new(label: &[u8]) -> Self {
        Self::default().bytes(label)
    }

    /// Append an integer.
    #[must_use]
    pub fn u64(mut self, value: u64) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Append a length-prefixed byte string.
    #[must_use]
    pub fn bytes(mut self, value: &[u8]) -> Self {
        self.buf.extend_from_slice(&(value.len() as u64).to_be_bytes());
        self.buf.extend_from_slice(value);
        self
    }

    /// Finished bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}
