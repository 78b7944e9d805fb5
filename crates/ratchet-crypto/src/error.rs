//! Error types for the cryptographic collaborators

use thiserror::Error;

/// Errors from primitive operations.
///
/// Every variant is reported with a fixed shape: no variant carries data
/// derived from secret material, and authentication failures never say which
/// check failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// AEAD tag mismatch, wrong key, or truncated ciphertext
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Signature did not verify under the given key
    #[error("signature verification failed")]
    InvalidSignature,

    /// Encoded key, point or ciphertext could not be parsed
    #[error("malformed {what}")]
    Malformed {
        /// What failed to parse
        what: &'static str,
    },

    /// Diffie-Hellman produced a non-contributory (low order) result
    #[error("non-contributory key exchange")]
    NonContributory,

    /// Requested more output than the KDF can produce
    #[error("requested {requested} bytes of KDF output, at most {max} allowed")]
    OutputTooLong {
        /// Requested output length
        requested: usize,
        /// Maximum output length
        max: usize,
    },

    /// HIBE identity path would exceed the hierarchy depth
    #[error("hierarchy depth {depth} exhausted")]
    DepthExhausted {
        /// Configured hierarchy depth
        depth: usize,
    },
}

impl CryptoError {
    /// Returns true if this error indicates tampering or a forged input.
    pub fn is_verification_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed | Self::InvalidSignature | Self::NonContributory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_failures_are_verification_failures() {
        assert!(CryptoError::AuthenticationFailed.is_verification_failure());
        assert!(CryptoError::InvalidSignature.is_verification_failure());
        assert!(!CryptoError::Malformed { what: "point" }.is_verification_failure());
        assert!(!CryptoError::DepthExhausted { depth: 4 }.is_verification_failure());
    }

    #[test]
    fn error_display() {
        let err = CryptoError::OutputTooLong { requested: 9000, max: 8144 };
        assert_eq!(err.to_string(), "requested 9000 bytes of KDF output, at most 8144 allowed");
    }
}
