//! Detached AUM signatures

use super::key::KeyId;
use crate::protocol::{tagged_map, TagSet, UnknownFields};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

const TAG_KEY_ID: u64 = 1;
const TAG_SIGNATURE: u64 = 2;

/// A signature over an AUM's signing hash, made by the key `key_id`
///
/// Only meaningful alongside the AUM it was made for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// Signing key
    pub key_id: KeyId,
    /// Raw signature bytes
    pub signature: Vec<u8>,
    pub(crate) unknown: UnknownFields,
}

impl Signature {
    /// Create a signature record
    pub fn new(key_id: impl Into<KeyId>, signature: Vec<u8>) -> Self {
        Self {
            key_id: key_id.into(),
            signature,
            unknown: UnknownFields::default(),
        }
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = tagged_map(serializer, 2, &self.unknown)?;
        map.field(TAG_KEY_ID, &self.key_id)?;
        map.field(TAG_SIGNATURE, serde_bytes::Bytes::new(&self.signature))?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SignatureVisitor;

        impl<'de> Visitor<'de> for SignatureVisitor {
            type Value = Signature;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a tagged signature map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Signature, A::Error> {
                let mut seen = TagSet::default();
                let mut key_id: Option<KeyId> = None;
                let mut signature: Option<serde_bytes::ByteBuf> = None;
                let mut unknown = UnknownFields::default();

                while let Some(tag) = map.next_key::<u64>()? {
                    seen.first_sighting(tag)?;
                    match tag {
                        TAG_KEY_ID => key_id = Some(map.next_value()?),
                        TAG_SIGNATURE => signature = Some(map.next_value()?),
                        _ => unknown.capture(tag, &mut map)?,
                    }
                }

                Ok(Signature {
                    key_id: key_id.ok_or_else(|| de::Error::missing_field("key_id"))?,
                    signature: signature
                        .ok_or_else(|| de::Error::missing_field("signature"))?
                        .into_vec(),
                    unknown,
                })
            }
        }

        deserializer.deserialize_map(SignatureVisitor)
    }
}
