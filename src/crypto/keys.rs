//! Signing identities and Ed25519 public keys
//!
//! An [`Identity`] is the private half of a trusted key. The chain itself
//! only ever stores public material, as [`Key`](crate::authority::Key)
//! records whose key id is the raw Ed25519 public key.

use crate::authority::{Key, KeyId};
use crate::error::KeyError;
use ed25519_dalek::{SigningKey, VerifyingKey, PUBLIC_KEY_LENGTH};
use rand::rngs::OsRng;
use zeroize::ZeroizeOnDrop;

/// A signing identity able to produce AUM signatures
///
/// Must be kept secure; the signing key is zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct Identity {
    /// Ed25519 signing keypair
    signing_keypair: SigningKey,
}

impl Identity {
    /// Generate a new random identity
    ///
    /// Uses the system's cryptographically secure random number generator.
    ///
    /// # Example
    ///
    /// ```
    /// use netlock::crypto::Identity;
    ///
    /// let identity = Identity::generate();
    /// let key = identity.key(1);
    /// assert!(key.validate().is_ok());
    /// ```
    pub fn generate() -> Self {
        Self {
            signing_keypair: SigningKey::generate(&mut OsRng),
        }
    }

    /// Build a deterministic identity from a 32-byte seed
    ///
    /// Useful for tests and for keys held in external key storage.
    ///
    /// # Arguments
    ///
    /// * `seed` - The Ed25519 secret key bytes
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_keypair: SigningKey::from_bytes(seed),
        }
    }

    /// Extract the public key portion that can be safely shared
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_keypair.verifying_key())
    }

    /// Identifier of this identity's key within an authority
    pub fn key_id(&self) -> KeyId {
        KeyId::from(self.public_key().to_bytes().to_vec())
    }

    /// Describe this identity as a trusted key with the given vote weight
    ///
    /// # Arguments
    ///
    /// * `votes` - Vote weight, which must be in `[1, 4096]` to validate
    pub fn key(&self, votes: u32) -> Key {
        Key::ed25519(self.public_key().to_bytes().to_vec(), votes)
    }

    /// Get reference to the signing keypair (internal use)
    pub(crate) fn signing_keypair(&self) -> &SigningKey {
        &self.signing_keypair
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("key_id", &self.key_id())
            .finish_non_exhaustive()
    }
}

/// Ed25519 public key used to verify AUM signatures
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Parse public key bytes
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidPublicKey`] if the bytes are not exactly
    /// 32 bytes or are not a valid curve point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let array: [u8; PUBLIC_KEY_LENGTH] =
            bytes.try_into().map_err(|_| KeyError::InvalidPublicKey {
                reason: format!(
                    "ed25519 public key must be {} bytes, got {}",
                    PUBLIC_KEY_LENGTH,
                    bytes.len()
                ),
            })?;
        let key = VerifyingKey::from_bytes(&array).map_err(|e| KeyError::InvalidPublicKey {
            reason: e.to_string(),
        })?;
        Ok(Self(key))
    }

    /// Raw 32-byte encoding
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.0.to_bytes()
    }

    pub(crate) fn verifying_key(&self) -> &VerifyingKey {
        &self.0
    }
}
