//! Digital signature operations using Ed25519
//!
//! AUM signatures cover the 32 raw bytes of the signing hash, never the
//! encoded message itself.

use super::keys::{Identity, PublicKey};
use ed25519_dalek::{Signature as Ed25519Signature, Signer, Verifier, SIGNATURE_LENGTH};

/// Sign a message with an identity's signing key
///
/// # Arguments
///
/// * `identity` - The identity to sign with
/// * `message` - The message bytes to sign
///
/// # Example
///
/// ```
/// use netlock::crypto::{sign_message, verify_signature, Identity};
///
/// let identity = Identity::generate();
/// let signature = sign_message(&identity, b"digest bytes");
/// assert!(verify_signature(&identity.public_key(), b"digest bytes", &signature));
/// ```
pub fn sign_message(identity: &Identity, message: &[u8]) -> [u8; SIGNATURE_LENGTH] {
    identity.signing_keypair().sign(message).to_bytes()
}

/// Verify a signature on a message
///
/// # Returns
///
/// `true` if the signature is exactly 64 bytes and valid for `message`
/// under `public_key`, `false` otherwise
pub fn verify_signature(public_key: &PublicKey, message: &[u8], signature: &[u8]) -> bool {
    let Ok(bytes) = <[u8; SIGNATURE_LENGTH]>::try_from(signature) else {
        return false;
    };
    let signature = Ed25519Signature::from_bytes(&bytes);
    public_key
        .verifying_key()
        .verify(message, &signature)
        .is_ok()
}
