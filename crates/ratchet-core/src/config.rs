//! Session configuration

use serde::{Deserialize, Serialize};

/// Default maximum gap between the receiver's counter and an incoming index.
pub const DEFAULT_MAX_SKIP: u64 = 1000;

/// Default bound on cached skipped keys per receiver.
pub const DEFAULT_MAX_CACHED_KEYS: usize = 2000;

/// Default number of receive epochs kept alive.
pub const DEFAULT_MAX_LIVE_EPOCHS: usize = 64;

/// Default bound on unacknowledged epochs, layers and updates.
pub const DEFAULT_MAX_PENDING: usize = 256;

/// Default HIBE depth for key-updatable KEM keys.
pub const DEFAULT_HIBE_DEPTH: usize = 4;

/// Inner layer used by BARK onions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UniVariant {
    /// Signcryption layers that ship a fresh receiver state with every message
    #[default]
    Full,
    /// Symmetric hash-chain layers
    Lite,
}

/// Ratchet configuration
///
/// Bounds every structure a peer can grow. Both parties must use the same
/// `hibe_depth` and `uni_variant`; the other fields are local policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatchetConfig {
    /// Largest skip between consecutive received indices
    pub max_skip: u64,
    /// Largest number of skipped keys held by one receiver
    pub max_cached_keys: usize,
    /// Receive epochs kept before the oldest is erased
    pub max_live_epochs: usize,
    /// Unacknowledged entries tolerated before `send` fails
    pub max_pending: usize,
    /// Hierarchy depth of key-updatable KEM keys
    pub hibe_depth: usize,
    /// BARK layer type
    pub uni_variant: UniVariant,
}

impl Default for RatchetConfig {
    fn default() -> Self {
        Self {
            max_skip: DEFAULT_MAX_SKIP,
            max_cached_keys: DEFAULT_MAX_CACHED_KEYS,
            max_live_epochs: DEFAULT_MAX_LIVE_EPOCHS,
            max_pending: DEFAULT_MAX_PENDING,
            hibe_depth: DEFAULT_HIBE_DEPTH,
            uni_variant: UniVariant::default(),
        }
    }
}

impl RatchetConfig {
    /// Same configuration with the given BARK layer type.
    #[must_use]
    pub fn with_uni_variant(mut self, variant: UniVariant) -> Self {
        self.uni_variant = variant;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RatchetConfig::default();
        assert_eq!(config.max_skip, 1000);
        assert_eq!(config.max_cached_keys, 2000);
        assert_eq!(config.max_live_epochs, 64);
        assert_eq!(config.max_pending, 256);
        assert_eq!(config.hibe_depth, 4);
        assert_eq!(config.uni_variant, UniVariant::Full);
    }

    #[test]
    fn variant_override() {
        let config = RatchetConfig::default().with_uni_variant(UniVariant::Lite);
        assert_eq!(config.uni_variant, UniVariant::Lite);
    }
}
