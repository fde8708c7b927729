//! Materialized authority state
//!
//! A [`State`] is the result of applying one root-to-tip path of AUMs. It is
//! replaced wholesale on every accepted update and never edited in place.

use super::aum::AumMessage;
use super::key::{Key, KeyId};
use crate::crypto::{matches_commitment, AumHash, DISABLEMENT_LENGTH};
use crate::error::{AumError, CryptoError};
use crate::protocol::{tagged_map, TagSet, UnknownFields};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Most keys a checkpoint may carry
pub const MAX_KEYS: usize = 512;

/// Most disablement commitments a checkpoint may carry
pub const MAX_DISABLEMENT_SECRETS: usize = 32;

/// Compound identifier of an authority instance
///
/// Fixed at genesis and carried forward by every checkpoint, so that updates
/// from one authority can never be replayed into another.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct StateId(pub u64, pub u64);

impl StateId {
    /// Whether both halves are zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0 && self.1 == 0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.0, self.1)
    }
}

/// Authority state at one point in history
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct State {
    /// Content hash of the AUM that produced this state
    pub last_aum_hash: Option<AumHash>,
    /// Commitments whose preimages disable the authority
    pub disablement_secrets: Vec<Vec<u8>>,
    /// Trusted keys, unique by key id
    pub keys: Vec<Key>,
    /// First half of the compound state id
    pub state_id1: u64,
    /// Second half of the compound state id
    pub state_id2: u64,
    pub(crate) unknown: UnknownFields,
}

impl State {
    /// Create a state suitable for a genesis or checkpoint AUM
    ///
    /// # Arguments
    ///
    /// * `keys` - Trusted keys
    /// * `disablement_secrets` - Commitments produced by the disablement KDF
    /// * `state_id` - Identifier fixed for the life of the authority
    pub fn new(keys: Vec<Key>, disablement_secrets: Vec<Vec<u8>>, state_id: StateId) -> Self {
        Self {
            last_aum_hash: None,
            disablement_secrets,
            keys,
            state_id1: state_id.0,
            state_id2: state_id.1,
            unknown: UnknownFields::default(),
        }
    }

    /// Compound state identifier
    pub fn state_id(&self) -> StateId {
        StateId(self.state_id1, self.state_id2)
    }

    /// Look up a trusted key
    pub fn get_key(&self, key_id: &KeyId) -> Option<&Key> {
        self.keys
            .iter()
            .find(|k| k.id().is_ok_and(|id| &id == key_id))
    }

    /// Sum of the vote weights of all trusted keys
    pub fn total_votes(&self) -> u64 {
        self.keys.iter().map(|k| u64::from(k.votes)).sum()
    }

    /// Whether `secret` is the preimage of one of the disablement commitments
    ///
    /// Runs the disablement KDF, which is slow.
    pub fn check_disablement(&self, secret: &[u8]) -> Result<bool, CryptoError> {
        matches_commitment(secret, &self.disablement_secrets)
    }

    /// Check the invariants of a state asserted by a checkpoint
    pub(crate) fn validate_checkpoint(&self) -> Result<(), AumError> {
        let fail = |reason: String| AumError::StaticValidationFailed { reason };

        if self.last_aum_hash.is_some() {
            return Err(fail("checkpoint state cannot name a parent AUM".to_string()));
        }

        if self.disablement_secrets.is_empty() {
            return Err(fail("at least one disablement secret is required".to_string()));
        }
        if self.disablement_secrets.len() > MAX_DISABLEMENT_SECRETS {
            return Err(fail(format!(
                "too many disablement secrets ({} > {})",
                self.disablement_secrets.len(),
                MAX_DISABLEMENT_SECRETS
            )));
        }
        let mut commitments = HashSet::with_capacity(self.disablement_secrets.len());
        for secret in &self.disablement_secrets {
            if secret.len() != DISABLEMENT_LENGTH {
                return Err(fail(format!(
                    "disablement secret must be {} bytes, got {}",
                    DISABLEMENT_LENGTH,
                    secret.len()
                )));
            }
            if !commitments.insert(secret.as_slice()) {
                return Err(fail("duplicate disablement secret".to_string()));
            }
        }

        if self.keys.is_empty() {
            return Err(fail("at least one key is required".to_string()));
        }
        if self.keys.len() > MAX_KEYS {
            return Err(fail(format!(
                "too many keys ({} > {})",
                self.keys.len(),
                MAX_KEYS
            )));
        }
        let mut ids = HashSet::with_capacity(self.keys.len());
        for key in &self.keys {
            key.validate()?;
            let id = key.id()?;
            if !ids.insert(id.clone()) {
                return Err(fail(format!("duplicate key {}", id)));
            }
        }

        Ok(())
    }

    /// Derive the state produced by applying `message` (hashing to `hash`)
    /// on top of this one
    ///
    /// Signatures and static bounds must already have been checked; this
    /// enforces only the per-kind semantic rules.
    ///
    /// # Errors
    ///
    /// * [`AumError::KeyAlreadyExists`] for an add-key of a trusted key
    /// * [`AumError::NoSuchKey`] for a remove-key or update-key of an unknown key
    /// * [`AumError::WouldBrickAuthority`] when removing the last key
    /// * [`AumError::StateIdMismatch`] when a checkpoint changes the state id
    pub fn apply(&self, message: &AumMessage, hash: AumHash) -> Result<State, AumError> {
        let mut next = match message {
            AumMessage::AddKey(key) => {
                let id = key.id()?;
                if self.get_key(&id).is_some() {
                    return Err(AumError::KeyAlreadyExists {
                        key_id: id.to_string(),
                    });
                }
                let mut next = self.clone();
                next.keys.push(key.clone());
                next
            }

            AumMessage::RemoveKey(key_id) => {
                let position = self.position_of(key_id)?;
                if self.keys.len() == 1 {
                    return Err(AumError::WouldBrickAuthority {
                        key_id: key_id.to_string(),
                    });
                }
                let mut next = self.clone();
                next.keys.remove(position);
                next
            }

            AumMessage::NoOp => self.clone(),

            AumMessage::UpdateKey {
                key_id,
                votes,
                meta,
            } => {
                let position = self.position_of(key_id)?;
                let mut next = self.clone();
                let key = &mut next.keys[position];
                if let Some(votes) = votes {
                    key.votes = *votes;
                }
                if let Some(meta) = meta {
                    key.meta = meta.clone();
                }
                key.validate()?;
                next
            }

            AumMessage::Checkpoint(state) => {
                if state.state_id() != self.state_id() {
                    return Err(AumError::StateIdMismatch {
                        want: self.state_id().to_string(),
                        got: state.state_id().to_string(),
                    });
                }
                state.clone()
            }
        };

        next.last_aum_hash = Some(hash);
        Ok(next)
    }

    fn position_of(&self, key_id: &KeyId) -> Result<usize, AumError> {
        self.keys
            .iter()
            .position(|k| k.id().is_ok_and(|id| &id == key_id))
            .ok_or_else(|| AumError::NoSuchKey {
                key_id: key_id.to_string(),
            })
    }
}

const TAG_LAST_AUM_HASH: u64 = 1;
const TAG_DISABLEMENT_SECRETS: u64 = 2;
const TAG_KEYS: u64 = 3;
const TAG_STATE_ID1: u64 = 4;
const TAG_STATE_ID2: u64 = 5;

impl Serialize for State {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let known = 3 + usize::from(self.state_id1 != 0) + usize::from(self.state_id2 != 0);
        let mut map = tagged_map(serializer, known, &self.unknown)?;

        map.field(
            TAG_LAST_AUM_HASH,
            &self
                .last_aum_hash
                .as_ref()
                .map(|h| serde_bytes::Bytes::new(h.as_bytes())),
        )?;

        let secrets: Option<Vec<&serde_bytes::Bytes>> = if self.disablement_secrets.is_empty() {
            None
        } else {
            Some(
                self.disablement_secrets
                    .iter()
                    .map(|s| serde_bytes::Bytes::new(s))
                    .collect(),
            )
        };
        map.field(TAG_DISABLEMENT_SECRETS, &secrets)?;

        let keys = if self.keys.is_empty() {
            None
        } else {
            Some(&self.keys)
        };
        map.field(TAG_KEYS, &keys)?;

        if self.state_id1 != 0 {
            map.field(TAG_STATE_ID1, &self.state_id1)?;
        }
        if self.state_id2 != 0 {
            map.field(TAG_STATE_ID2, &self.state_id2)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for State {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StateVisitor;

        impl<'de> Visitor<'de> for StateVisitor {
            type Value = State;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a tagged state map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<State, A::Error> {
                let mut seen = TagSet::default();
                let mut last: Option<Option<serde_bytes::ByteBuf>> = None;
                let mut secrets: Option<Option<Vec<serde_bytes::ByteBuf>>> = None;
                let mut keys: Option<Option<Vec<Key>>> = None;
                let mut state_id1 = 0u64;
                let mut state_id2 = 0u64;
                let mut unknown = UnknownFields::default();

                while let Some(tag) = map.next_key::<u64>()? {
                    seen.first_sighting(tag)?;
                    match tag {
                        TAG_LAST_AUM_HASH => last = Some(map.next_value()?),
                        TAG_DISABLEMENT_SECRETS => secrets = Some(map.next_value()?),
                        TAG_KEYS => keys = Some(map.next_value()?),
                        TAG_STATE_ID1 => state_id1 = map.next_value()?,
                        TAG_STATE_ID2 => state_id2 = map.next_value()?,
                        _ => unknown.capture(tag, &mut map)?,
                    }
                }

                let last_aum_hash = match last
                    .ok_or_else(|| de::Error::missing_field("last_aum_hash"))?
                {
                    Some(bytes) => Some(AumHash::from_slice(&bytes).map_err(de::Error::custom)?),
                    None => None,
                };
                let disablement_secrets = secrets
                    .ok_or_else(|| de::Error::missing_field("disablement_secrets"))?
                    .unwrap_or_default()
                    .into_iter()
                    .map(serde_bytes::ByteBuf::into_vec)
                    .collect();
                let keys = keys
                    .ok_or_else(|| de::Error::missing_field("keys"))?
                    .unwrap_or_default();

                Ok(State {
                    last_aum_hash,
                    disablement_secrets,
                    keys,
                    state_id1,
                    state_id2,
                    unknown,
                })
            }
        }

        deserializer.deserialize_map(StateVisitor)
    }
}
