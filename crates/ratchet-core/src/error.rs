//! Error types for the ratchet state machines
//!
//! Every operation is transactional: when an operation returns one of these
//! errors, the state it was called on is unchanged.

use ratchet_crypto::CryptoError;
use thiserror::Error;

/// Coarse classification of a [`RatchetError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The parties disagree on epochs, indices or transcripts
    Desync,
    /// A tag, signature or MAC did not verify
    Verification,
    /// Input could not be decoded
    Malformed,
    /// The caller used a state in a way its role does not allow
    Misuse,
    /// A configured bound or key capacity would be exceeded
    Exhausted,
}

/// Errors from ratchet operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RatchetError {
    /// Primitive failure
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Message index was already consumed or never existed
    #[error("message {index} already consumed")]
    AlreadyConsumed {
        /// Rejected index
        index: u64,
    },

    /// Out-of-order gap exceeds the skip bound
    #[error("gap too large: at index {current}, received {requested} (max skip {max})")]
    GapTooLarge {
        /// Receiver's current index
        current: u64,
        /// Index carried by the ciphertext
        requested: u64,
        /// Configured bound
        max: u64,
    },

    /// Epoch outside the window this party can process
    #[error("epochs out of sync: at epoch {current}, received {received}")]
    EpochOutOfSync {
        /// Local epoch
        current: u64,
        /// Epoch carried by the ciphertext
        received: u64,
    },

    /// Epoch state existed but has been erased
    #[error("epoch {epoch} has been erased")]
    EpochErased {
        /// Erased epoch
        epoch: u64,
    },

    /// Message arrived out of the order this protocol requires
    #[error("out of order: expected message {expected}, received {received}")]
    OutOfOrder {
        /// Next index this party accepts
        expected: u64,
        /// Index carried by the ciphertext
        received: u64,
    },

    /// Acknowledgement refers to state this party does not hold
    #[error("participants are out of sync: {reason}")]
    OutOfSync {
        /// Which check failed
        reason: &'static str,
    },

    /// Acknowledged transcript differs from the local one
    #[error("transcript mismatch at acknowledged message {ack}")]
    TranscriptMismatch {
        /// Acknowledged index
        ack: u64,
    },

    /// State used in the wrong role
    #[error("wrong role: {operation} called on a {role} state")]
    WrongRole {
        /// Attempted operation
        operation: &'static str,
        /// Role the state is in
        role: &'static str,
    },

    /// Envelope or shipped state failed to decode
    #[error("malformed {what}")]
    Malformed {
        /// What failed to decode
        what: &'static str,
    },

    /// Key-updatable key ran out of hierarchy levels
    #[error("key exhausted after {depth} updates")]
    KeyExhausted {
        /// Configured depth
        depth: usize,
    },

    /// Too many unacknowledged epochs, layers or updates
    #[error("too many pending entries (limit {limit})")]
    TooManyPending {
        /// Configured bound
        limit: usize,
    },
}

impl RatchetError {
    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Crypto(err) => match err {
                CryptoError::AuthenticationFailed
                | CryptoError::InvalidSignature
                | CryptoError::NonContributory => ErrorKind::Verification,
                CryptoError::Malformed { .. } => ErrorKind::Malformed,
                CryptoError::OutputTooLong { .. } | CryptoError::DepthExhausted { .. } => {
                    ErrorKind::Exhausted
                },
            },

            Self::AlreadyConsumed { .. }
            | Self::EpochOutOfSync { .. }
            | Self::EpochErased { .. }
            | Self::OutOfOrder { .. }
            | Self::OutOfSync { .. }
            | Self::TranscriptMismatch { .. } => ErrorKind::Desync,

            Self::WrongRole { .. } => ErrorKind::Misuse,
            Self::Malformed { .. } => ErrorKind::Malformed,

            Self::GapTooLarge { .. } | Self::KeyExhausted { .. } | Self::TooManyPending { .. } => {
                ErrorKind::Exhausted
            },
        }
    }

    /// Returns true if this error is fatal (unrecoverable)
    ///
    /// Fatal errors indicate tampering or caller misuse. Desynchronisation
    /// and resource errors are recoverable by dropping the message or by
    /// re-initialising the session.
    pub fn is_fatal(&self) -> bool {
        match self.kind() {
            // Protocol violations - fatal
            ErrorKind::Verification | ErrorKind::Misuse => true,

            // Potentially recoverable - drop the message or resync
            ErrorKind::Desync | ErrorKind::Malformed | ErrorKind::Exhausted => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_failure_is_fatal() {
        let err = RatchetError::from(CryptoError::AuthenticationFailed);
        assert_eq!(err.kind(), ErrorKind::Verification);
        assert!(err.is_fatal());
    }

    #[test]
    fn wrong_role_is_fatal() {
        let err = RatchetError::WrongRole { operation: "send", role: "receiving" };
        assert_eq!(err.kind(), ErrorKind::Misuse);
        assert!(err.is_fatal());
    }

    #[test]
    fn desync_is_not_fatal() {
        assert!(!RatchetError::EpochOutOfSync { current: 3, received: 9 }.is_fatal());
        assert!(!RatchetError::AlreadyConsumed { index: 1 }.is_fatal());
        assert!(!RatchetError::TranscriptMismatch { ack: 2 }.is_fatal());
    }

    #[test]
    fn resource_errors_are_exhausted() {
        let err = RatchetError::GapTooLarge { current: 1, requested: 5000, max: 1000 };
        assert_eq!(err.kind(), ErrorKind::Exhausted);
        assert_eq!(RatchetError::TooManyPending { limit: 8 }.kind(), ErrorKind::Exhausted);
    }

    #[test]
    fn error_display() {
        let err = RatchetError::OutOfSync { reason: "layer count exceeds receivers" };
        assert_eq!(err.to_string(), "participants are out of sync: layer count exceeds receivers");

        let err = RatchetError::EpochOutOfSync { current: 2, received: 7 };
        assert_eq!(err.to_string(), "epochs out of sync: at epoch 2, received 7");
    }
}
