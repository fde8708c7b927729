//! Authority Update Messages
//!
//! An [`Aum`] is one signed, hash-linked entry in the authority chain. The
//! instruction it carries is an [`AumMessage`]; each kind holds exactly the
//! payload it needs.
//!
//! Two digests are derived from the canonical encoding and never stored:
//! the signing hash (signatures omitted, covered by every signature) and
//! the content hash (signatures included, referenced by child AUMs).

use super::key::{meta_size, Key, KeyId, Meta, MAX_KEY_VOTES, MAX_META_BYTES};
use super::signature::Signature;
use super::state::State;
use crate::crypto::{sign_message, verify_signature, AumHash, AumSigHash, Identity, PublicKey};
use crate::error::{AumError, ProtocolError};
use crate::protocol::{self, tagged_map, CanonicalMeta, TagSet, UnknownFields};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Exact length of a signing key id
pub const SIGNATURE_KEY_ID_LEN: usize = 32;

/// Exact length of an Ed25519 signature
pub const SIGNATURE_LEN: usize = 64;

/// Kind of an AUM, as carried on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AumKind {
    /// Adds a trusted key
    AddKey,
    /// Removes a trusted key
    RemoveKey,
    /// Changes nothing but the chain head
    NoOp,
    /// Changes the weight or metadata of a trusted key
    UpdateKey,
    /// Asserts a complete state
    Checkpoint,
}

impl AumKind {
    /// Wire value of this kind
    pub fn as_u8(self) -> u8 {
        match self {
            AumKind::AddKey => 1,
            AumKind::RemoveKey => 2,
            AumKind::NoOp => 3,
            AumKind::UpdateKey => 4,
            AumKind::Checkpoint => 5,
        }
    }

    /// Parse the wire value; 0 and unassigned values are not kinds
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(AumKind::AddKey),
            2 => Some(AumKind::RemoveKey),
            3 => Some(AumKind::NoOp),
            4 => Some(AumKind::UpdateKey),
            5 => Some(AumKind::Checkpoint),
            _ => None,
        }
    }

    /// Text tag used in logs and JSON
    pub fn as_str(self) -> &'static str {
        match self {
            AumKind::AddKey => "add-key",
            AumKind::RemoveKey => "remove-key",
            AumKind::NoOp => "no-op",
            AumKind::UpdateKey => "update-key",
            AumKind::Checkpoint => "checkpoint",
        }
    }
}

impl fmt::Display for AumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AumKind {
    type Err = AumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            AumKind::AddKey,
            AumKind::RemoveKey,
            AumKind::NoOp,
            AumKind::UpdateKey,
            AumKind::Checkpoint,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == s)
        .ok_or_else(|| AumError::MalformedEncoding {
            reason: format!("unknown AUM kind {:?}", s),
        })
    }
}

/// The instruction an AUM carries
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AumMessage {
    /// Trust a new key
    AddKey(Key),
    /// Stop trusting a key
    RemoveKey(KeyId),
    /// Change nothing
    NoOp,
    /// Change the weight and/or metadata of a trusted key
    UpdateKey {
        /// Key to update
        key_id: KeyId,
        /// New vote weight
        votes: Option<u32>,
        /// Replacement metadata
        meta: Option<Meta>,
    },
    /// Assert a complete authority state
    Checkpoint(State),
}

impl AumMessage {
    /// Kind tag of this message
    pub fn kind(&self) -> AumKind {
        match self {
            AumMessage::AddKey(_) => AumKind::AddKey,
            AumMessage::RemoveKey(_) => AumKind::RemoveKey,
            AumMessage::NoOp => AumKind::NoOp,
            AumMessage::UpdateKey { .. } => AumKind::UpdateKey,
            AumMessage::Checkpoint(_) => AumKind::Checkpoint,
        }
    }
}

/// Authority Update Message
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Aum {
    /// What this update does
    pub message: AumMessage,
    /// Content hash of the parent; absent only for the genesis checkpoint
    pub prev_aum_hash: Option<AumHash>,
    /// State carried by a non-checkpoint AUM; hashed but otherwise ignored
    pub state_hint: Option<State>,
    /// Signatures authorizing this update
    pub signatures: Vec<Signature>,
    pub(crate) unknown: UnknownFields,
}

impl Aum {
    /// Create an unsigned AUM without a parent
    pub fn new(message: AumMessage) -> Self {
        Self {
            message,
            prev_aum_hash: None,
            state_hint: None,
            signatures: Vec::new(),
            unknown: UnknownFields::default(),
        }
    }

    /// Create an unsigned AUM extending `parent`
    pub fn with_parent(message: AumMessage, parent: AumHash) -> Self {
        Self {
            prev_aum_hash: Some(parent),
            ..Self::new(message)
        }
    }

    /// Attach a state hint
    pub fn with_state_hint(mut self, state: State) -> Self {
        self.state_hint = Some(state);
        self
    }

    /// Kind of the carried message
    pub fn kind(&self) -> AumKind {
        self.message.kind()
    }

    /// Whether this AUM can start a chain
    pub fn is_genesis(&self) -> bool {
        self.prev_aum_hash.is_none() && matches!(self.message, AumMessage::Checkpoint(_))
    }

    /// Canonical encoding, signatures included
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        protocol::encode(self, "AUM")
    }

    /// Decode an AUM received from an untrusted source
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MessageTooLarge`] or
    /// [`ProtocolError::MalformedEncoding`]; never panics.
    pub fn from_bytes(bytes: &[u8], max_size: usize) -> Result<Self, ProtocolError> {
        protocol::decode(bytes, max_size)
    }

    /// Digest of the full canonical encoding
    pub fn content_hash(&self) -> Result<AumHash, ProtocolError> {
        Ok(AumHash::of(&self.to_bytes()?))
    }

    /// Digest of the canonical encoding with signatures omitted
    pub fn signing_hash(&self) -> Result<AumSigHash, ProtocolError> {
        let unsigned = protocol::encode(
            &AumWire {
                aum: self,
                signatures: false,
            },
            "AUM",
        )?;
        Ok(AumSigHash::of(&unsigned))
    }

    /// Append a signature by `identity` over the signing hash
    ///
    /// # Example
    ///
    /// ```
    /// use netlock::authority::{Aum, AumMessage};
    /// use netlock::crypto::{AumHash, Identity};
    ///
    /// let signer = Identity::generate();
    /// let parent = AumHash::of(b"parent");
    /// let mut aum = Aum::with_parent(AumMessage::NoOp, parent);
    /// aum.sign(&signer).unwrap();
    /// assert!(aum.verify_signatures().is_ok());
    /// ```
    pub fn sign(&mut self, identity: &Identity) -> Result<(), ProtocolError> {
        let sig_hash = self.signing_hash()?;
        let signature = sign_message(identity, sig_hash.as_bytes());
        self.signatures
            .push(Signature::new(identity.key_id(), signature.to_vec()));
        Ok(())
    }

    /// Check the bounds that hold independent of any chain context
    ///
    /// # Errors
    ///
    /// Returns [`AumError::StaticValidationFailed`] naming the violated bound.
    pub fn static_validate(&self) -> Result<(), AumError> {
        for sig in &self.signatures {
            if sig.key_id.as_bytes().len() != SIGNATURE_KEY_ID_LEN {
                return Err(invalid(format!(
                    "signature key id must be {} bytes, got {}",
                    SIGNATURE_KEY_ID_LEN,
                    sig.key_id.as_bytes().len()
                )));
            }
            if sig.signature.len() != SIGNATURE_LEN {
                return Err(invalid(format!(
                    "signature must be {} bytes, got {}",
                    SIGNATURE_LEN,
                    sig.signature.len()
                )));
            }
        }

        if self.prev_aum_hash.is_none() && self.kind() != AumKind::Checkpoint {
            return Err(invalid(format!(
                "{} AUM must reference a parent",
                self.kind()
            )));
        }

        if let Some(hint) = &self.state_hint {
            for key in &hint.keys {
                key.validate()?;
            }
        }

        match &self.message {
            AumMessage::AddKey(key) => key.validate()?,
            AumMessage::RemoveKey(key_id) => {
                if key_id.is_empty() {
                    return Err(invalid("remove-key must name a key".to_string()));
                }
            }
            AumMessage::NoOp => {}
            AumMessage::UpdateKey {
                key_id,
                votes,
                meta,
            } => {
                if key_id.is_empty() {
                    return Err(invalid("update-key must name a key".to_string()));
                }
                let meta_given = meta.as_ref().is_some_and(|m| !m.is_empty());
                if votes.is_none() && !meta_given {
                    return Err(invalid(
                        "update-key must change votes or metadata".to_string(),
                    ));
                }
                if let Some(votes) = votes {
                    if *votes == 0 || *votes > MAX_KEY_VOTES {
                        return Err(invalid(format!(
                            "update-key weight {} outside [1, {}]",
                            votes, MAX_KEY_VOTES
                        )));
                    }
                }
                if let Some(meta) = meta {
                    let size = meta_size(meta);
                    if size > MAX_META_BYTES {
                        return Err(invalid(format!(
                            "update-key metadata too big ({} > {})",
                            size, MAX_META_BYTES
                        )));
                    }
                }
            }
            AumMessage::Checkpoint(state) => state.validate_checkpoint()?,
        }

        Ok(())
    }

    /// Cryptographically verify every signature against the signing hash
    ///
    /// For Ed25519 the key id is the public key, so no chain state is
    /// needed; whether a signer is trusted is decided separately by
    /// [`weight`](Self::weight).
    pub fn verify_signatures(&self) -> Result<(), AumError> {
        let sig_hash = self.signing_hash()?;
        for sig in &self.signatures {
            let public = PublicKey::from_bytes(sig.key_id.as_bytes()).map_err(|e| {
                AumError::InvalidSignature {
                    key_id: sig.key_id.to_string(),
                    reason: e.to_string(),
                }
            })?;
            if !verify_signature(&public, sig_hash.as_bytes(), &sig.signature) {
                return Err(AumError::InvalidSignature {
                    key_id: sig.key_id.to_string(),
                    reason: "signature does not match AUM contents".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Vote weight of the distinct signers trusted by `state`
    ///
    /// Signatures by keys `state` does not know contribute nothing, and a key
    /// that signed more than once is counted once.
    pub fn weight(&self, state: &State) -> u64 {
        let mut seen = HashSet::with_capacity(self.signatures.len());
        self.signatures
            .iter()
            .filter(|sig| seen.insert(&sig.key_id))
            .filter_map(|sig| state.get_key(&sig.key_id))
            .map(|key| u64::from(key.votes))
            .sum()
    }
}

fn invalid(reason: String) -> AumError {
    AumError::StaticValidationFailed { reason }
}

const TAG_KIND: u64 = 1;
const TAG_PREV: u64 = 2;
const TAG_KEY: u64 = 3;
const TAG_KEY_ID: u64 = 4;
const TAG_STATE: u64 = 5;
const TAG_VOTES: u64 = 6;
const TAG_META: u64 = 7;
const TAG_SIGNATURES: u64 = 23;

/// Borrowed view used for both digests
struct AumWire<'a> {
    aum: &'a Aum,
    signatures: bool,
}

impl Serialize for AumWire<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let aum = self.aum;

        let mut key = None;
        let mut key_id = None;
        let mut votes = None;
        let mut meta = None;
        let state = match &aum.message {
            AumMessage::Checkpoint(state) => Some(state),
            _ => aum.state_hint.as_ref(),
        };
        match &aum.message {
            AumMessage::AddKey(k) => key = Some(k),
            AumMessage::RemoveKey(id) => key_id = Some(id),
            AumMessage::UpdateKey {
                key_id: id,
                votes: v,
                meta: m,
            } => {
                key_id = Some(id);
                votes = *v;
                meta = m.as_ref().filter(|m| !m.is_empty());
            }
            AumMessage::NoOp | AumMessage::Checkpoint(_) => {}
        }
        let signatures = if self.signatures && !aum.signatures.is_empty() {
            Some(&aum.signatures)
        } else {
            None
        };

        let known = 2
            + usize::from(key.is_some())
            + usize::from(key_id.is_some())
            + usize::from(state.is_some())
            + usize::from(votes.is_some())
            + usize::from(meta.is_some())
            + usize::from(signatures.is_some());

        let mut map = tagged_map(serializer, known, &aum.unknown)?;
        map.field(TAG_KIND, &aum.kind().as_u8())?;
        map.field(
            TAG_PREV,
            &aum.prev_aum_hash
                .as_ref()
                .map(|h| serde_bytes::Bytes::new(h.as_bytes())),
        )?;
        if let Some(key) = key {
            map.field(TAG_KEY, key)?;
        }
        if let Some(key_id) = key_id {
            map.field(TAG_KEY_ID, key_id)?;
        }
        if let Some(state) = state {
            map.field(TAG_STATE, state)?;
        }
        if let Some(votes) = votes {
            map.field(TAG_VOTES, &votes)?;
        }
        if let Some(meta) = meta {
            map.field(TAG_META, &CanonicalMeta(meta))?;
        }
        if let Some(signatures) = signatures {
            map.field(TAG_SIGNATURES, signatures)?;
        }
        map.end()
    }
}

impl Serialize for Aum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        AumWire {
            aum: self,
            signatures: true,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Aum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AumVisitor;

        impl<'de> Visitor<'de> for AumVisitor {
            type Value = Aum;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a tagged AUM map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Aum, A::Error> {
                let mut seen = TagSet::default();
                let mut kind: Option<u8> = None;
                let mut prev: Option<Option<serde_bytes::ByteBuf>> = None;
                let mut key: Option<Key> = None;
                let mut key_id: Option<KeyId> = None;
                let mut state: Option<State> = None;
                let mut votes: Option<u32> = None;
                let mut meta: Option<Meta> = None;
                let mut signatures: Option<Vec<Signature>> = None;
                let mut unknown = UnknownFields::default();

                while let Some(tag) = map.next_key::<u64>()? {
                    seen.first_sighting(tag)?;
                    match tag {
                        TAG_KIND => kind = Some(map.next_value()?),
                        TAG_PREV => prev = Some(map.next_value()?),
                        TAG_KEY => key = Some(map.next_value()?),
                        TAG_KEY_ID => key_id = Some(map.next_value()?),
                        TAG_STATE => state = Some(map.next_value()?),
                        TAG_VOTES => votes = Some(map.next_value()?),
                        TAG_META => meta = Some(map.next_value()?),
                        TAG_SIGNATURES => signatures = Some(map.next_value()?),
                        _ => unknown.capture(tag, &mut map)?,
                    }
                }

                let raw_kind = kind.ok_or_else(|| de::Error::missing_field("message_kind"))?;
                let kind = AumKind::from_u8(raw_kind).ok_or_else(|| {
                    de::Error::custom(format!("unknown AUM message kind {}", raw_kind))
                })?;
                let prev_aum_hash = match prev
                    .ok_or_else(|| de::Error::missing_field("prev_aum_hash"))?
                {
                    Some(bytes) => Some(AumHash::from_slice(&bytes).map_err(de::Error::custom)?),
                    None => None,
                };

                let unexpected = |field: &'static str| {
                    de::Error::custom(format!("{} AUM must not carry {}", kind, field))
                };
                let (message, state_hint) = match kind {
                    AumKind::AddKey => {
                        if key_id.is_some() || votes.is_some() || meta.is_some() {
                            return Err(unexpected("key_id, votes or meta"));
                        }
                        let key = key.ok_or_else(|| de::Error::missing_field("key"))?;
                        (AumMessage::AddKey(key), state)
                    }
                    AumKind::RemoveKey => {
                        if key.is_some() || votes.is_some() || meta.is_some() {
                            return Err(unexpected("key, votes or meta"));
                        }
                        let key_id = key_id.ok_or_else(|| de::Error::missing_field("key_id"))?;
                        (AumMessage::RemoveKey(key_id), state)
                    }
                    AumKind::NoOp => {
                        if key.is_some() || key_id.is_some() || votes.is_some() || meta.is_some() {
                            return Err(unexpected("key, key_id, votes or meta"));
                        }
                        (AumMessage::NoOp, state)
                    }
                    AumKind::UpdateKey => {
                        if key.is_some() {
                            return Err(unexpected("key"));
                        }
                        let key_id = key_id.ok_or_else(|| de::Error::missing_field("key_id"))?;
                        (
                            AumMessage::UpdateKey {
                                key_id,
                                votes,
                                meta,
                            },
                            state,
                        )
                    }
                    AumKind::Checkpoint => {
                        if key.is_some() || key_id.is_some() || votes.is_some() || meta.is_some() {
                            return Err(unexpected("key, key_id, votes or meta"));
                        }
                        let state = state.ok_or_else(|| de::Error::missing_field("state"))?;
                        (AumMessage::Checkpoint(state), None)
                    }
                };

                Ok(Aum {
                    message,
                    prev_aum_hash,
                    state_hint,
                    signatures: signatures.unwrap_or_default(),
                    unknown,
                })
            }
        }

        deserializer.deserialize_map(AumVisitor)
    }
}
