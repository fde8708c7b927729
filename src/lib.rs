//! # Netlock
//!
//! A signed, append-only chain of authority updates that decides which keys
//! may vouch for nodes in a private network.
//!
//! Every change to the trusted key set is an Authority Update Message
//! ([`Aum`]), canonically encoded, content-addressed by its BLAKE2s hash and
//! signed by keys already trusted. Forks are resolved deterministically, so
//! every participant that has seen the same AUMs agrees on the same head and
//! the same [`State`].
//!
//! ## Quick Start
//!
//! ```
//! use netlock::{Aum, AumMessage, Identity, NetworkLockBuilder, State, StateId, VerifiedAum};
//! use netlock::crypto::DisablementSecret;
//!
//! # fn main() -> netlock::Result<()> {
//! let alice = Identity::generate();
//! let secret = DisablementSecret::generate();
//!
//! let genesis = VerifiedAum::verify(Aum::new(AumMessage::Checkpoint(State::new(
//!     vec![alice.key(1)],
//!     vec![secret.commitment()?],
//!     StateId(1, 0),
//! ))))?;
//!
//! let lock = NetworkLockBuilder::new().with_genesis(genesis).build()?;
//! assert!(lock.snapshot().is_trusted(&alice.key_id()));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod api;
pub mod authority;
pub mod crypto;
pub mod error;
pub mod output;
pub mod protocol;
pub mod storage;

// Re-export main types
pub use api::{
    AuthorityConfig, AumFetcher, AumRegistry, ChainEvent, NetworkLock, NetworkLockBuilder,
    QuorumPolicy, Snapshot, SubscriptionHandle,
};
pub use authority::{
    ApplyOutcome, Aum, AumKind, AumMessage, Chain, ChainStatus, HeadChange, Key, KeyId, KeyKind,
    Signature, State, StateId, VerifiedAum,
};
pub use crypto::{AumHash, Identity, PublicKey};
pub use error::{
    AumError, ConfigError, CryptoError, Error, KeyError, OutputError, ProtocolError, Result,
    StorageError,
};
pub use output::{parse_json, render_json, render_log, ChainUpdate};
pub use storage::{AumStore, FileArchive, MemStore};
