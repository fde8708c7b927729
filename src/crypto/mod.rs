//! Cryptography module
//!
//! This module provides the cryptographic primitives the authority relies on:
//! - Ed25519 signatures over AUM signing hashes
//! - BLAKE2s-256 content and signing hashes
//! - Argon2id derivation of disablement commitments
//!
//! All implementations use audited crates from the RustCrypto and dalek projects.

pub mod disablement;
pub mod hash;
pub mod keys;
pub mod signing;

// Re-export main types
pub use disablement::{disablement_kdf, matches_commitment, DisablementSecret, DISABLEMENT_LENGTH};
pub use hash::{digest, AumHash, AumSigHash, HASH_LEN};
pub use keys::{Identity, PublicKey};
pub use signing::{sign_message, verify_signature};
