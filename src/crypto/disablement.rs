//! Disablement secrets and their public commitments
//!
//! A checkpoint commits to a set of KDF outputs. Presenting any preimage
//! disables the authority permanently.

use crate::error::CryptoError;
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of a disablement secret and of its commitment
pub const DISABLEMENT_LENGTH: usize = 32;

const DISABLEMENT_SALT: &[u8] = b"network-lock disablement salt";

// Argon2id cost: 4 passes over 16 MiB with 4 lanes.
const KDF_TIME_COST: u32 = 4;
const KDF_MEMORY_KIB: u32 = 16 * 1024;
const KDF_PARALLELISM: u32 = 4;

/// Derive the public commitment for a disablement secret
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivationFailed`] if Argon2 rejects the input.
pub fn disablement_kdf(secret: &[u8]) -> Result<[u8; DISABLEMENT_LENGTH], CryptoError> {
    let params = Params::new(
        KDF_MEMORY_KIB,
        KDF_TIME_COST,
        KDF_PARALLELISM,
        Some(DISABLEMENT_LENGTH),
    )
    .map_err(|e| CryptoError::KeyDerivationFailed {
        reason: e.to_string(),
    })?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut out = [0u8; DISABLEMENT_LENGTH];
    argon2
        .hash_password_into(secret, DISABLEMENT_SALT, &mut out)
        .map_err(|e| CryptoError::KeyDerivationFailed {
            reason: e.to_string(),
        })?;
    Ok(out)
}

/// Whether `secret` derives to one of `commitments`
pub fn matches_commitment(secret: &[u8], commitments: &[Vec<u8>]) -> Result<bool, CryptoError> {
    let derived = disablement_kdf(secret)?;
    Ok(commitments.iter().any(|c| c.as_slice() == derived.as_slice()))
}

/// A secret able to disable an authority
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DisablementSecret([u8; DISABLEMENT_LENGTH]);

impl DisablementSecret {
    /// Generate a new random secret
    pub fn generate() -> Self {
        let mut bytes = [0u8; DISABLEMENT_LENGTH];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap existing secret bytes
    pub fn from_bytes(bytes: [u8; DISABLEMENT_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Raw secret bytes
    pub fn as_bytes(&self) -> &[u8; DISABLEMENT_LENGTH] {
        &self.0
    }

    /// Public value to embed in a checkpoint's `disablement_secrets`
    pub fn commitment(&self) -> Result<Vec<u8>, CryptoError> {
        Ok(disablement_kdf(&self.0)?.to_vec())
    }
}

impl std::fmt::Debug for DisablementSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DisablementSecret(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kdf_is_deterministic() {
        let a = disablement_kdf(b"secret").unwrap();
        let b = disablement_kdf(b"secret").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, disablement_kdf(b"secret2").unwrap());
    }

    #[test]
    fn test_commitment_matches_secret() {
        let secret = DisablementSecret::from_bytes([8u8; 32]);
        let other = DisablementSecret::from_bytes([9u8; 32]);
        let commitments = vec![secret.commitment().unwrap()];

        assert!(matches_commitment(secret.as_bytes(), &commitments).unwrap());
        assert!(!matches_commitment(other.as_bytes(), &commitments).unwrap());
    }

    #[test]
    fn test_commitment_is_not_the_secret() {
        let secret = DisablementSecret::generate();
        let commitment = secret.commitment().unwrap();
        assert_eq!(commitment.len(), DISABLEMENT_LENGTH);
        assert_ne!(commitment.as_slice(), secret.as_bytes());
    }

    #[test]
    fn test_debug_redacts() {
        let secret = DisablementSecret::from_bytes([1u8; 32]);
        assert_eq!(format!("{:?}", secret), "DisablementSecret(..)");
    }
}
