//! AUM digests using BLAKE2s-256
//!
//! Every party must agree on these digests byte-for-byte: they are the chain
//! linkage identity and the message every signature is computed over.

use crate::error::CryptoError;
use data_encoding::BASE32_NOPAD;
use std::fmt;
use std::str::FromStr;

/// Digest length in bytes
pub const HASH_LEN: usize = 32;

/// Compute the BLAKE2s-256 digest of `data`
pub fn digest(data: &[u8]) -> [u8; HASH_LEN] {
    let hash = blake2s_simd::blake2s(data);
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(hash.as_bytes());
    out
}

/// Content hash of an AUM, signatures included
///
/// This is the identifier that `prev_aum_hash` references and that external
/// tooling displays. Its text form is unpadded RFC 4648 base32.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AumHash([u8; HASH_LEN]);

impl AumHash {
    /// Wrap raw digest bytes
    pub fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from a byte slice, which must be exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; HASH_LEN] = bytes.try_into().map_err(|_| CryptoError::InvalidLength {
            what: "AUM hash",
            expected: HASH_LEN,
            got: bytes.len(),
        })?;
        Ok(Self(array))
    }

    /// Hash arbitrary bytes
    pub fn of(data: &[u8]) -> Self {
        Self(digest(data))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Base32 text form (upper case, no padding)
    pub fn to_base32(&self) -> String {
        BASE32_NOPAD.encode(&self.0)
    }

    /// Parse the base32 text form
    pub fn from_base32(text: &str) -> Result<Self, CryptoError> {
        let bytes = BASE32_NOPAD
            .decode(text.as_bytes())
            .map_err(|e| CryptoError::InvalidHashText {
                reason: e.to_string(),
            })?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for AumHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base32())
    }
}

impl fmt::Debug for AumHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AumHash({})", self.to_base32())
    }
}

impl FromStr for AumHash {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base32(s)
    }
}

// Text form on human-readable formats; the CBOR codec writes the raw bytes itself.
impl serde::Serialize for AumHash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_base32())
    }
}

impl<'de> serde::Deserialize<'de> for AumHash {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Self::from_base32(&text).map_err(serde::de::Error::custom)
    }
}

/// Signing hash of an AUM: the digest of its encoding with signatures omitted
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AumSigHash([u8; HASH_LEN]);

impl AumSigHash {
    /// Hash the signature-free canonical encoding
    pub(crate) fn of(data: &[u8]) -> Self {
        Self(digest(data))
    }

    /// Get the raw bytes; these are what each signature covers
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }
}

impl fmt::Debug for AumSigHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AumSigHash({})", hex::encode(self.0))
    }
}
