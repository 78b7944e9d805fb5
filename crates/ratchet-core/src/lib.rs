//! Ratcheting state machines for two-party secure messaging.
//!
//! Every protocol keeps per-party state that is overwritten and erased as
//! messages flow, so that a compromise of one party's memory reveals as
//! little as possible about past traffic (forward secrecy) and stops being
//! useful once the parties exchange fresh randomness again (post-compromise
//! security).
//!
//! # Protocols
//!
//! ```text
//! double_ratchet  CKA + FS-AEAD epochs, out-of-order within an epoch
//! brke            ku-KEM over HIBE, one-time signatures, in-order
//! bark            onion of unidirectional ratchets, hash-chained
//! hybrid          BARK ratchet messages plus FS-AEAD light messages
//! jmm             hkuPKE + kuSig with piggybacked heals
//! sch             ku-KEM + kuSig with transcript acknowledgements
//! ```
//!
//! All of them implement [`Ratchet`], which the simulation harness and the
//! command-line driver use to run them uniformly.
//!
//! # Building Blocks
//!
//! [`fs_aead`], [`cka`], [`kukem`], [`uni`], [`hkupke`] and [`kusig`] are the
//! primitives the protocols are assembled from. Per-index secrets live in a
//! [`KeyArena`], which leaves tombstones behind so that a consumed index can
//! be told apart from one never seen.
//!
//! # Transactions
//!
//! Every `send` and `receive` either succeeds or leaves the state untouched.
//! Work happens on scratch copies that are committed once every check has
//! passed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod arena;
pub mod bark;
pub mod brke;
pub mod cka;
pub mod codec;
pub mod config;
pub mod double_ratchet;
pub mod error;
pub mod fs_aead;
pub mod hkupke;
pub mod hybrid;
pub mod jmm;
pub mod kukem;
pub mod kusig;
pub mod sch;
pub mod session;
pub mod uni;

pub use arena::{KeyArena, SlotStatus};
pub use bark::{Bark, BarkCiphertext};
pub use brke::{Brke, BrkeCiphertext, BrkeHeader};
pub use config::{RatchetConfig, UniVariant};
pub use double_ratchet::{DoubleRatchet, DrCiphertext};
pub use error::{ErrorKind, RatchetError};
pub use fs_aead::{FsCiphertext, FsReceiver, FsSender};
pub use hybrid::{Hybrid, HybridCiphertext};
pub use jmm::{Jmm, JmmCiphertext};
pub use sch::{Sch, SchCiphertext, SchHeader};
pub use session::{Capabilities, Ratchet, Role};
