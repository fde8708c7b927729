//! Common test helpers and utilities
//!
//! Shared fixtures for building authorities in integration tests.

#![allow(dead_code)]

use netlock::authority::{Aum, AumMessage, Key, State, StateId, VerifiedAum};
use netlock::crypto::{AumHash, DisablementSecret, Identity};
use std::sync::OnceLock;
use tempfile::TempDir;

/// Create an identity from a specific seed value
///
/// # Arguments
///
/// * `seed` - A single byte that will be repeated to form the 32-byte seed
pub fn identity(seed: u8) -> Identity {
    Identity::from_seed(&[seed; 32])
}

/// Disablement secret committed to by every [`genesis`]
pub fn secret() -> DisablementSecret {
    DisablementSecret::from_bytes([42u8; 32])
}

/// Commitment to [`secret`], derived once per test binary
pub fn commitment() -> Vec<u8> {
    static COMMITMENT: OnceLock<Vec<u8>> = OnceLock::new();
    COMMITMENT
        .get_or_init(|| secret().commitment().unwrap())
        .clone()
}

/// Genesis checkpoint trusting `keys`
pub fn genesis(keys: Vec<Key>) -> VerifiedAum {
    let state = State::new(keys, vec![commitment()], StateId(7, 11));
    VerifiedAum::verify(Aum::new(AumMessage::Checkpoint(state))).unwrap()
}

/// AUM on top of `parent` signed by every identity in `signers`
pub fn signed(message: AumMessage, parent: AumHash, signers: &[&Identity]) -> VerifiedAum {
    let mut aum = Aum::with_parent(message, parent);
    for signer in signers {
        aum.sign(signer).unwrap();
    }
    VerifiedAum::verify(aum).unwrap()
}

/// Create a temporary directory for archives
///
/// The directory will be automatically cleaned up when the returned `TempDir` is dropped.
pub fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}
