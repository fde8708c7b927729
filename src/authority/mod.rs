//! Network-lock authority: keys, updates and the chain that orders them
//!
//! An authority is a set of weighted signing keys. The set evolves through a
//! hash-linked chain of Authority Update Messages (AUMs), each naming its
//! parent by content hash and signed by keys trusted at that parent.
//!
//! # Overview
//!
//! ## Keys and Signatures
//!
//! A [`Key`] is an Ed25519 public key with a vote weight and optional
//! metadata. Its [`KeyId`] is the raw public key, so signatures can be
//! verified without consulting the chain.
//!
//! ## AUMs
//!
//! An [`Aum`] carries one [`AumMessage`]: add, remove or update a key, a
//! no-op, or a checkpoint asserting a complete [`State`]. The chain starts
//! with a parentless checkpoint (the genesis).
//!
//! ```rust
//! use netlock::authority::{Aum, AumMessage, Chain, State, StateId, VerifiedAum};
//! use netlock::crypto::{DisablementSecret, Identity};
//!
//! let alice = Identity::generate();
//! let secret = DisablementSecret::generate();
//! let genesis = State::new(
//!     vec![alice.key(1)],
//!     vec![secret.commitment().unwrap()],
//!     StateId(1, 0),
//! );
//!
//! let mut chain = Chain::new();
//! let genesis = VerifiedAum::verify(Aum::new(AumMessage::Checkpoint(genesis))).unwrap();
//! let root = genesis.hash();
//! chain.submit(genesis).unwrap();
//!
//! // Alice alone holds a majority and can trust Bob
//! let bob = Identity::generate();
//! let mut add = Aum::with_parent(AumMessage::AddKey(bob.key(1)), root);
//! add.sign(&alice).unwrap();
//! chain.submit(VerifiedAum::verify(add).unwrap()).unwrap();
//!
//! assert_eq!(chain.state().unwrap().keys.len(), 2);
//! ```
//!
//! ## Forks
//!
//! When two AUMs extend the same parent, [`Chain`] follows the branch with
//! the larger cumulative signer weight, breaking ties by lowest hash. See
//! the [`chain`] module for the exact rule.
//!
//! ## Disablement
//!
//! Every checkpoint commits to one or more disablement secrets. Revealing a
//! preimage through [`Chain::disable`] permanently disables the authority.

mod aum;
pub mod chain;
mod key;
mod signature;
mod state;

// Re-export public APIs
pub use aum::{Aum, AumKind, AumMessage, SIGNATURE_KEY_ID_LEN, SIGNATURE_LEN};
pub use chain::{ApplyOutcome, Chain, ChainStatus, HeadChange, VerifiedAum};
pub use key::{Key, KeyId, KeyKind, Meta, KEY_ID_PREFIX, MAX_KEY_VOTES, MAX_META_BYTES};
pub use signature::Signature;
pub use state::{State, StateId, MAX_DISABLEMENT_SECRETS, MAX_KEYS};
