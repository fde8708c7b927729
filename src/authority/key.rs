//! Trusted keys
//!
//! A [`Key`] is a weighted public key allowed to sign AUMs. Keys are checked
//! statically (without any chain context) before they are ever considered
//! during chain application.

use crate::crypto::PublicKey;
use crate::error::KeyError;
use crate::protocol::{tagged_map, CanonicalMeta, TagSet, UnknownFields};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Largest permitted vote weight of a single key
pub const MAX_KEY_VOTES: u32 = 4096;

/// Byte budget for a key's metadata, summed over keys and values
pub const MAX_META_BYTES: usize = 512;

/// Text prefix of a key identifier
pub const KEY_ID_PREFIX: &str = "tlpub:";

/// Free-form string metadata attached to a key
pub type Meta = BTreeMap<String, String>;

/// Public-key algorithm of a [`Key`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// Unset; never validates
    #[default]
    Invalid,
    /// Ed25519 public key
    Ed25519,
    /// A kind this implementation does not know
    Other(u8),
}

impl KeyKind {
    /// Wire value of this kind
    pub fn as_u8(self) -> u8 {
        match self {
            KeyKind::Invalid => 0,
            KeyKind::Ed25519 => 1,
            KeyKind::Other(v) => v,
        }
    }

    /// Parse the wire value
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => KeyKind::Invalid,
            1 => KeyKind::Ed25519,
            v => KeyKind::Other(v),
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Invalid => f.write_str("invalid"),
            KeyKind::Ed25519 => f.write_str("25519"),
            KeyKind::Other(v) => write!(f, "Key?<{}>", v),
        }
    }
}

impl FromStr for KeyKind {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invalid" => Ok(KeyKind::Invalid),
            "25519" => Ok(KeyKind::Ed25519),
            other => Err(KeyError::UnrecognizedKind {
                kind: other.to_string(),
            }),
        }
    }
}

/// Opaque identifier of a key within an authority
///
/// For Ed25519 keys this is the 32-byte public key itself. Displayed as
/// `tlpub:` followed by lowercase hex.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(Vec<u8>);

impl KeyId {
    /// Raw identifier bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether the identifier is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume into raw bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for KeyId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for KeyId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", KEY_ID_PREFIX, hex::encode(&self.0))
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for KeyId {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_data = s
            .strip_prefix(KEY_ID_PREFIX)
            .ok_or_else(|| KeyError::InvalidPublicKey {
                reason: format!("missing required prefix {:?} in {:?}", KEY_ID_PREFIX, s),
            })?;
        let bytes = hex::decode(hex_data).map_err(|e| KeyError::InvalidPublicKey {
            reason: format!("invalid hex encoding in {:?}: {}", s, e),
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for KeyId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for KeyId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = serde_bytes::ByteBuf::deserialize(deserializer)?;
        Ok(Self(bytes.into_vec()))
    }
}

/// A public key trusted by the authority
///
/// Two keys are equal when they have the same identity (kind and public
/// key bytes); weight and metadata do not take part in equality. Changing
/// either is an explicit `update-key` AUM.
#[derive(Clone, Debug)]
pub struct Key {
    /// Algorithm of `public`
    pub kind: KeyKind,
    /// Weight applied to signatures made with this key
    pub votes: u32,
    /// Raw public key bytes
    pub public: Vec<u8>,
    /// Free-form metadata such as a display name
    pub meta: Meta,
    pub(crate) unknown: UnknownFields,
}

impl Key {
    /// Create a key of any kind
    pub fn new(kind: KeyKind, public: Vec<u8>, votes: u32) -> Self {
        Self {
            kind,
            votes,
            public,
            meta: Meta::new(),
            unknown: UnknownFields::default(),
        }
    }

    /// Create an Ed25519 key
    pub fn ed25519(public: Vec<u8>, votes: u32) -> Self {
        Self::new(KeyKind::Ed25519, public, votes)
    }

    /// Attach a metadata entry
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Check the static invariants of the key
    ///
    /// # Errors
    ///
    /// * [`KeyError::InvalidWeight`] when `votes` is outside `[1, 4096]`
    /// * [`KeyError::InvalidMetadataSize`] when `meta` exceeds 512 bytes
    /// * [`KeyError::UnrecognizedKind`] for invalid or unknown kinds
    /// * [`KeyError::InvalidPublicKey`] when the public key has the wrong length
    pub fn validate(&self) -> Result<(), KeyError> {
        if self.votes == 0 || self.votes > MAX_KEY_VOTES {
            return Err(KeyError::InvalidWeight { votes: self.votes });
        }

        let size = meta_size(&self.meta);
        if size > MAX_META_BYTES {
            return Err(KeyError::InvalidMetadataSize {
                size,
                max: MAX_META_BYTES,
            });
        }

        match self.kind {
            KeyKind::Ed25519 => {
                if self.public.len() != ed25519_dalek::PUBLIC_KEY_LENGTH {
                    return Err(KeyError::InvalidPublicKey {
                        reason: format!(
                            "ed25519 public key must be {} bytes, got {}",
                            ed25519_dalek::PUBLIC_KEY_LENGTH,
                            self.public.len()
                        ),
                    });
                }
                Ok(())
            }
            other => Err(KeyError::UnrecognizedKind {
                kind: other.to_string(),
            }),
        }
    }

    /// Identifier of this key
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::UnrecognizedKind`] for kinds without a defined
    /// identifier derivation.
    pub fn id(&self) -> Result<KeyId, KeyError> {
        match self.kind {
            KeyKind::Ed25519 => Ok(KeyId(self.public.clone())),
            other => Err(KeyError::UnrecognizedKind {
                kind: other.to_string(),
            }),
        }
    }

    /// Public key material for signature verification
    ///
    /// # Errors
    ///
    /// * [`KeyError::KindMismatch`] if the key is not an Ed25519 key
    /// * [`KeyError::InvalidPublicKey`] if the bytes are not a valid point
    pub fn as_verifying_key(&self) -> Result<PublicKey, KeyError> {
        match self.kind {
            KeyKind::Ed25519 => PublicKey::from_bytes(&self.public),
            other => Err(KeyError::KindMismatch {
                expected: "ed25519".to_string(),
                actual: other.to_string(),
            }),
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.public == other.public
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.public.hash(state);
    }
}

/// Total bytes of metadata keys and values
pub(crate) fn meta_size(meta: &Meta) -> usize {
    meta.iter().map(|(k, v)| k.len() + v.len()).sum()
}

const TAG_KIND: u64 = 1;
const TAG_VOTES: u64 = 2;
const TAG_PUBLIC: u64 = 3;
const TAG_META: u64 = 12;

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let known = if self.meta.is_empty() { 3 } else { 4 };
        let mut map = tagged_map(serializer, known, &self.unknown)?;
        map.field(TAG_KIND, &self.kind.as_u8())?;
        map.field(TAG_VOTES, &self.votes)?;
        map.field(TAG_PUBLIC, serde_bytes::Bytes::new(&self.public))?;
        if !self.meta.is_empty() {
            map.field(TAG_META, &CanonicalMeta(&self.meta))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl<'de> Visitor<'de> for KeyVisitor {
            type Value = Key;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a tagged key map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Key, A::Error> {
                let mut seen = TagSet::default();
                let mut kind: Option<u8> = None;
                let mut votes: Option<u32> = None;
                let mut public: Option<serde_bytes::ByteBuf> = None;
                let mut meta: Option<Meta> = None;
                let mut unknown = UnknownFields::default();

                while let Some(tag) = map.next_key::<u64>()? {
                    seen.first_sighting(tag)?;
                    match tag {
                        TAG_KIND => kind = Some(map.next_value()?),
                        TAG_VOTES => votes = Some(map.next_value()?),
                        TAG_PUBLIC => public = Some(map.next_value()?),
                        TAG_META => meta = Some(map.next_value()?),
                        _ => unknown.capture(tag, &mut map)?,
                    }
                }

                Ok(Key {
                    kind: KeyKind::from_u8(kind.ok_or_else(|| de::Error::missing_field("kind"))?),
                    votes: votes.ok_or_else(|| de::Error::missing_field("votes"))?,
                    public: public
                        .ok_or_else(|| de::Error::missing_field("public"))?
                        .into_vec(),
                    meta: meta.unwrap_or_default(),
                    unknown,
                })
            }
        }

        deserializer.deserialize_map(KeyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode, encode, MAX_AUM_SIZE};

    fn test_key(votes: u32) -> Key {
        Key::ed25519(vec![7u8; 32], votes)
    }

    #[test]
    fn test_validate_weight_bounds() {
        assert!(test_key(1).validate().is_ok());
        assert!(test_key(4096).validate().is_ok());
        assert_eq!(
            test_key(0).validate(),
            Err(KeyError::InvalidWeight { votes: 0 })
        );
        assert_eq!(
            test_key(4097).validate(),
            Err(KeyError::InvalidWeight { votes: 4097 })
        );
    }

    #[test]
    fn test_validate_meta_budget() {
        let within = test_key(1).with_meta("name", "a".repeat(508));
        assert!(within.validate().is_ok());

        let over = test_key(1).with_meta("name", "a".repeat(509));
        assert_eq!(
            over.validate(),
            Err(KeyError::InvalidMetadataSize { size: 513, max: 512 })
        );
    }

    #[test]
    fn test_validate_kind() {
        let invalid = Key::new(KeyKind::Invalid, vec![7u8; 32], 1);
        assert!(matches!(
            invalid.validate(),
            Err(KeyError::UnrecognizedKind { .. })
        ));

        let unknown = Key::new(KeyKind::Other(9), vec![7u8; 32], 1);
        assert_eq!(
            unknown.validate(),
            Err(KeyError::UnrecognizedKind {
                kind: "Key?<9>".to_string()
            })
        );
    }

    #[test]
    fn test_validate_public_length() {
        let short = Key::ed25519(vec![1, 1], 1);
        assert!(matches!(
            short.validate(),
            Err(KeyError::InvalidPublicKey { .. })
        ));
    }

    #[test]
    fn test_id_is_public_key() {
        let key = test_key(1);
        assert_eq!(key.id().unwrap().as_bytes(), key.public.as_slice());

        let invalid = Key::new(KeyKind::Invalid, vec![1], 1);
        assert!(invalid.id().is_err());
    }

    #[test]
    fn test_as_verifying_key_kind_mismatch() {
        let key = Key::new(KeyKind::Other(2), vec![7u8; 32], 1);
        assert_eq!(
            key.as_verifying_key(),
            Err(KeyError::KindMismatch {
                expected: "ed25519".to_string(),
                actual: "Key?<2>".to_string()
            })
        );
    }

    #[test]
    fn test_equality_ignores_weight_and_meta() {
        let a = test_key(1);
        let b = test_key(5).with_meta("name", "laptop");
        assert_eq!(a, b);
        assert_ne!(a, Key::ed25519(vec![8u8; 32], 1));
    }

    #[test]
    fn test_kind_text_forms() {
        assert_eq!(KeyKind::Invalid.to_string(), "invalid");
        assert_eq!(KeyKind::Ed25519.to_string(), "25519");
        assert_eq!("25519".parse::<KeyKind>().unwrap(), KeyKind::Ed25519);
        assert!("rsa".parse::<KeyKind>().is_err());
        assert_eq!(KeyKind::from_u8(KeyKind::Other(7).as_u8()), KeyKind::Other(7));
    }

    #[test]
    fn test_key_id_text_form() {
        let id = KeyId::from(vec![0x03, 0xab]);
        assert_eq!(id.to_string(), "tlpub:03ab");
        assert_eq!("tlpub:03ab".parse::<KeyId>().unwrap(), id);
        assert!("03ab".parse::<KeyId>().is_err());
        assert!("tlpub:zz".parse::<KeyId>().is_err());
    }

    #[test]
    fn test_wire_encoding() {
        let key = Key::ed25519(vec![2, 2], 1);
        let bytes = encode(&key, "Key").unwrap();
        assert_eq!(hex::encode(&bytes), "a30101020103420202");
    }

    #[test]
    fn test_wire_roundtrip_with_meta() {
        let key = test_key(3).with_meta("name", "laptop").with_meta("os", "linux");
        let bytes = encode(&key, "Key").unwrap();
        let back: Key = decode(&bytes, MAX_AUM_SIZE).unwrap();

        assert_eq!(back.votes, 3);
        assert_eq!(back.meta, key.meta);
        assert_eq!(encode(&back, "Key").unwrap(), bytes);
    }

    #[test]
    fn test_missing_field_rejected() {
        // {1: 1, 2: 1}
        let bytes = vec![0xa2, 0x01, 0x01, 0x02, 0x01];
        assert!(decode::<Key>(&bytes, MAX_AUM_SIZE).is_err());
    }
}
