//! Protocol module
//!
//! Canonical CBOR encoding shared by every authority value. All chain values
//! are integer-tagged CBOR maps written in CTAP2 canonical form: definite
//! lengths, ascending integer keys, smallest-width integers. Hashes are taken
//! over these bytes, so the encoding must never depend on construction order.
//!
//! Readers keep tags they do not understand in [`UnknownFields`] and write
//! them back in tag order, so a value re-encodes to the same bytes (and the
//! same hash) it arrived with.

use crate::error::ProtocolError;
use serde::de::{self, DeserializeOwned, MapAccess};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_cbor::Value;
use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::iter::Peekable;

/// Maximum accepted size of a single encoded AUM (32 KiB)
pub const MAX_AUM_SIZE: usize = 32 * 1024;

/// Serialize a value to canonical CBOR
///
/// # Arguments
/// * `value` - The value to serialize
/// * `message_type` - Name used in error reports
///
/// # Example
/// ```
/// use netlock::authority::Signature;
/// use netlock::protocol::{decode, encode, MAX_AUM_SIZE};
///
/// let sig = Signature::new(vec![1; 32], vec![2; 64]);
/// let bytes = encode(&sig, "Signature").unwrap();
/// let back: Signature = decode(&bytes, MAX_AUM_SIZE).unwrap();
/// assert_eq!(back, sig);
/// ```
pub fn encode<T: Serialize + ?Sized>(value: &T, message_type: &str) -> Result<Vec<u8>, ProtocolError> {
    serde_cbor::to_vec(&value).map_err(|e| ProtocolError::SerializationFailed {
        message_type: message_type.to_string(),
        reason: e.to_string(),
    })
}

/// Deserialize an untrusted CBOR value
///
/// The size limit is enforced before any parsing. Trailing bytes after the
/// value are rejected.
///
/// # Errors
/// * [`ProtocolError::MessageTooLarge`] if `bytes` exceeds `max_size`
/// * [`ProtocolError::MalformedEncoding`] for any structural problem
pub fn decode<T: DeserializeOwned>(bytes: &[u8], max_size: usize) -> Result<T, ProtocolError> {
    if bytes.len() > max_size {
        return Err(ProtocolError::MessageTooLarge {
            size: bytes.len(),
            max: max_size,
        });
    }

    serde_cbor::from_slice(bytes).map_err(|e| ProtocolError::MalformedEncoding {
        reason: e.to_string(),
    })
}

/// Map entries carried under tags this implementation does not know
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownFields(BTreeMap<u64, Value>);

impl UnknownFields {
    /// Whether no unknown tags were seen
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of unknown tags
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Value stored under an unknown tag
    pub fn get(&self, tag: u64) -> Option<&Value> {
        self.0.get(&tag)
    }

    /// Read the value for `tag` from a map being decoded and keep it
    pub(crate) fn capture<'de, A>(&mut self, tag: u64, map: &mut A) -> Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        let value: Value = map.next_value()?;
        self.0.insert(tag, value);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn insert(&mut self, tag: u64, value: Value) {
        self.0.insert(tag, value);
    }
}

/// Rejects repeated tags while decoding a tagged map
#[derive(Default)]
pub(crate) struct TagSet(BTreeSet<u64>);

impl TagSet {
    pub(crate) fn first_sighting<E: de::Error>(&mut self, tag: u64) -> Result<(), E> {
        if self.0.insert(tag) {
            Ok(())
        } else {
            Err(E::custom(format!("duplicate map tag {}", tag)))
        }
    }
}

/// Writes an integer-tagged map in ascending tag order
///
/// Known fields must be written in ascending tag order; preserved unknown
/// fields are slotted in between them.
pub(crate) struct TaggedMapWriter<'a, M> {
    map: M,
    extra: Peekable<btree_map::Iter<'a, u64, Value>>,
}

/// Start a map with `known` present known fields plus every unknown one
pub(crate) fn tagged_map<S: Serializer>(
    serializer: S,
    known: usize,
    extra: &UnknownFields,
) -> Result<TaggedMapWriter<'_, S::SerializeMap>, S::Error> {
    let map = serializer.serialize_map(Some(known + extra.len()))?;
    Ok(TaggedMapWriter {
        map,
        extra: extra.0.iter().peekable(),
    })
}

impl<M: SerializeMap> TaggedMapWriter<'_, M> {
    pub(crate) fn field<V: Serialize + ?Sized>(&mut self, tag: u64, value: &V) -> Result<(), M::Error> {
        while let Some((extra_tag, extra_value)) = self.extra.next_if(|(t, _)| **t < tag) {
            self.map.serialize_entry(extra_tag, extra_value)?;
        }
        self.map.serialize_entry(&tag, value)
    }

    pub(crate) fn end(mut self) -> Result<M::Ok, M::Error> {
        for (extra_tag, extra_value) in self.extra.by_ref() {
            self.map.serialize_entry(extra_tag, extra_value)?;
        }
        self.map.end()
    }
}

/// Serialize a string map in canonical order: shorter keys first, then bytewise
pub(crate) struct CanonicalMeta<'a>(pub(crate) &'a BTreeMap<String, String>);

impl Serialize for CanonicalMeta<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut entries: Vec<_> = self.0.iter().collect();
        entries.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));

        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (k, v) in entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
