//! Versioned JSON projection
//!
//! Key ids and public keys appear as `tlpub:<hex>`, raw signatures and
//! disablement secrets as standard base64, hashes as base32. Empty byte
//! strings, lists and maps appear as `null`.

use super::ChainUpdate;
use crate::authority::{Aum, AumKind, AumMessage, Key, KeyId, KeyKind, Meta, Signature, State};
use crate::crypto::AumHash;
use crate::error::OutputError;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The only schema version currently produced
pub const SCHEMA_VERSION_1: u32 = 1;

/// Top-level JSON document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEnvelope {
    /// Schema version, as a decimal string
    #[serde(rename = "SchemaVersion")]
    pub schema_version: String,
    /// Updates, newest first
    #[serde(rename = "Messages")]
    pub messages: Vec<LogMessage>,
}

/// One update: its hash, its expanded form and its raw bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    /// Content hash of the AUM
    #[serde(rename = "Hash")]
    pub hash: AumHash,
    /// Expanded AUM
    #[serde(rename = "AUM")]
    pub aum: AumJson,
    /// URL-safe base64 of the canonical encoding
    #[serde(rename = "Raw")]
    pub raw: String,
}

/// JSON form of an [`Aum`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AumJson {
    /// Kind of update, e.g. `add-key`
    #[serde(rename = "MessageKind")]
    pub message_kind: String,
    /// Parent hash
    #[serde(rename = "PrevAUMHash")]
    pub prev_aum_hash: Option<AumHash>,
    /// Key added by an add-key
    #[serde(rename = "Key")]
    pub key: Option<KeyJson>,
    /// Key named by a remove-key or update-key
    #[serde(rename = "KeyID")]
    pub key_id: Option<String>,
    /// Checkpoint state, or the state hint of other kinds
    #[serde(rename = "State")]
    pub state: Option<StateJson>,
    /// New weight set by an update-key
    #[serde(rename = "Votes")]
    pub votes: Option<u32>,
    /// Metadata
    #[serde(rename = "Meta")]
    pub meta: Option<Meta>,
    /// Signatures over the signing hash
    #[serde(rename = "Signatures")]
    pub signatures: Option<Vec<SignatureJson>>,
}

/// JSON form of a [`Key`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyJson {
    /// Key algorithm
    #[serde(rename = "Kind")]
    pub kind: String,
    /// Vote weight
    #[serde(rename = "Votes")]
    pub votes: u32,
    /// Public key
    #[serde(rename = "Public")]
    pub public: Option<String>,
    /// Metadata
    #[serde(rename = "Meta")]
    pub meta: Option<Meta>,
}

/// JSON form of a [`State`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateJson {
    /// Hash of the AUM that produced the state
    #[serde(rename = "LastAUMHash")]
    pub last_aum_hash: Option<AumHash>,
    /// Disablement commitments
    #[serde(rename = "DisablementSecrets")]
    pub disablement_secrets: Option<Vec<String>>,
    /// Trusted keys
    #[serde(rename = "Keys")]
    pub keys: Option<Vec<KeyJson>>,
    /// First half of the state id
    #[serde(rename = "StateID1")]
    pub state_id1: u64,
    /// Second half of the state id
    #[serde(rename = "StateID2")]
    pub state_id2: u64,
}

/// JSON form of a [`Signature`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureJson {
    /// Signing key
    #[serde(rename = "KeyID")]
    pub key_id: Option<String>,
    /// Raw signature
    #[serde(rename = "Signature")]
    pub signature: Option<String>,
}

/// Render updates as a JSON document of the requested schema version
///
/// Every raw entry is decoded and re-hashed; an entry whose hash does not
/// match its recorded hash fails the whole rendering. The output ends with
/// a newline.
///
/// # Errors
///
/// * [`OutputError::UnrecognisedVersion`] for any version other than 1
/// * [`OutputError::Decoding`] if a raw entry does not decode
/// * [`OutputError::HashMismatch`] if a raw entry hashes differently
pub fn render_json(updates: &[ChainUpdate], version: u32) -> Result<String, OutputError> {
    if version != SCHEMA_VERSION_1 {
        return Err(OutputError::UnrecognisedVersion { version });
    }

    let messages = updates
        .iter()
        .map(|update| {
            let aum = Aum::from_bytes(&update.raw, update.raw.len())?;
            let hash = aum.content_hash()?;
            if hash != update.hash {
                return Err(OutputError::HashMismatch {
                    got: hash,
                    want: update.hash,
                });
            }
            Ok(LogMessage {
                hash,
                aum: AumJson::from(&aum),
                raw: URL_SAFE.encode(&update.raw),
            })
        })
        .collect::<Result<Vec<_>, OutputError>>()?;

    let envelope = LogEnvelope {
        schema_version: SCHEMA_VERSION_1.to_string(),
        messages,
    };

    let mut out = serde_json::to_string_pretty(&envelope)?;
    out.push('\n');
    Ok(out)
}

/// Parse and audit a JSON document produced by [`render_json`]
///
/// Each message's raw bytes are decoded and must hash to its `Hash`, and
/// its expanded `AUM` must describe the same update as the raw bytes.
pub fn parse_json(text: &str) -> Result<Vec<ChainUpdate>, OutputError> {
    let envelope: LogEnvelope = serde_json::from_str(text)?;
    let version = envelope
        .schema_version
        .parse::<u32>()
        .map_err(|e| invalid("SchemaVersion", e))?;
    if version != SCHEMA_VERSION_1 {
        return Err(OutputError::UnrecognisedVersion { version });
    }

    envelope
        .messages
        .into_iter()
        .map(|message| {
            let raw = URL_SAFE
                .decode(&message.raw)
                .map_err(|e| invalid("Raw", e))?;
            let mut decoded = Aum::from_bytes(&raw, raw.len())?;
            let hash = decoded.content_hash()?;
            if hash != message.hash {
                return Err(OutputError::HashMismatch {
                    got: hash,
                    want: message.hash,
                });
            }

            let change = message.aum.message_kind.clone();
            let projected = Aum::try_from(message.aum)?;
            decoded.unknown = Default::default();
            if projected.to_bytes()? != decoded.to_bytes()? {
                return Err(invalid("AUM", "expanded form does not match Raw"));
            }

            Ok(ChainUpdate { hash, change, raw })
        })
        .collect()
}

fn invalid(field: &str, reason: impl ToString) -> OutputError {
    OutputError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn tlpub(bytes: &[u8]) -> Option<String> {
    (!bytes.is_empty()).then(|| KeyId::from(bytes).to_string())
}

fn parse_tlpub(field: &str, text: Option<String>) -> Result<Vec<u8>, OutputError> {
    match text {
        Some(text) => Ok(KeyId::from_str(&text)
            .map_err(|e| invalid(field, e))?
            .into_bytes()),
        None => Ok(Vec::new()),
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

fn parse_kind(text: &str) -> Result<KeyKind, OutputError> {
    if let Some(n) = text.strip_prefix("Key?<").and_then(|t| t.strip_suffix('>')) {
        let value = n.parse::<u8>().map_err(|e| invalid("Kind", e))?;
        return Ok(KeyKind::from_u8(value));
    }
    KeyKind::from_str(text).map_err(|e| invalid("Kind", e))
}

impl From<&Key> for KeyJson {
    fn from(key: &Key) -> Self {
        Self {
            kind: key.kind.to_string(),
            votes: key.votes,
            public: tlpub(&key.public),
            meta: (!key.meta.is_empty()).then(|| key.meta.clone()),
        }
    }
}

impl TryFrom<KeyJson> for Key {
    type Error = OutputError;

    fn try_from(json: KeyJson) -> Result<Self, Self::Error> {
        let mut key = Key::new(
            parse_kind(&json.kind)?,
            parse_tlpub("Public", json.public)?,
            json.votes,
        );
        key.meta = json.meta.unwrap_or_default();
        Ok(key)
    }
}

impl From<&State> for StateJson {
    fn from(state: &State) -> Self {
        Self {
            last_aum_hash: state.last_aum_hash,
            disablement_secrets: non_empty(
                state
                    .disablement_secrets
                    .iter()
                    .map(|s| STANDARD.encode(s))
                    .collect(),
            ),
            keys: non_empty(state.keys.iter().map(KeyJson::from).collect()),
            state_id1: state.state_id1,
            state_id2: state.state_id2,
        }
    }
}

impl TryFrom<StateJson> for State {
    type Error = OutputError;

    fn try_from(json: StateJson) -> Result<Self, Self::Error> {
        let secrets = json
            .disablement_secrets
            .unwrap_or_default()
            .iter()
            .map(|s| STANDARD.decode(s).map_err(|e| invalid("DisablementSecrets", e)))
            .collect::<Result<Vec<_>, _>>()?;
        let keys = json
            .keys
            .unwrap_or_default()
            .into_iter()
            .map(Key::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = State::new(
            keys,
            secrets,
            crate::authority::StateId(json.state_id1, json.state_id2),
        );
        state.last_aum_hash = json.last_aum_hash;
        Ok(state)
    }
}

impl From<&Signature> for SignatureJson {
    fn from(sig: &Signature) -> Self {
        Self {
            key_id: tlpub(sig.key_id.as_bytes()),
            signature: (!sig.signature.is_empty()).then(|| STANDARD.encode(&sig.signature)),
        }
    }
}

impl TryFrom<SignatureJson> for Signature {
    type Error = OutputError;

    fn try_from(json: SignatureJson) -> Result<Self, Self::Error> {
        let signature = match json.signature {
            Some(text) => STANDARD
                .decode(text)
                .map_err(|e| invalid("Signature", e))?,
            None => Vec::new(),
        };
        Ok(Signature::new(parse_tlpub("KeyID", json.key_id)?, signature))
    }
}

impl From<&Aum> for AumJson {
    fn from(aum: &Aum) -> Self {
        let mut json = AumJson {
            message_kind: aum.kind().to_string(),
            prev_aum_hash: aum.prev_aum_hash,
            key: None,
            key_id: None,
            state: aum.state_hint.as_ref().map(StateJson::from),
            votes: None,
            meta: None,
            signatures: non_empty(aum.signatures.iter().map(SignatureJson::from).collect()),
        };

        match &aum.message {
            AumMessage::AddKey(key) => json.key = Some(KeyJson::from(key)),
            AumMessage::RemoveKey(key_id) => json.key_id = tlpub(key_id.as_bytes()),
            AumMessage::NoOp => {}
            AumMessage::UpdateKey {
                key_id,
                votes,
                meta,
            } => {
                json.key_id = tlpub(key_id.as_bytes());
                json.votes = *votes;
                json.meta = meta.clone().filter(|m| !m.is_empty());
            }
            AumMessage::Checkpoint(state) => json.state = Some(StateJson::from(state)),
        }
        json
    }
}

impl TryFrom<AumJson> for Aum {
    type Error = OutputError;

    fn try_from(json: AumJson) -> Result<Self, Self::Error> {
        let kind = AumKind::from_str(&json.message_kind).map_err(|e| invalid("MessageKind", e))?;
        let state = json.state.map(State::try_from).transpose()?;
        let missing = |field: &str| invalid(field, format!("required for {}", kind));

        let (message, state_hint) = match kind {
            AumKind::AddKey => {
                let key = json.key.ok_or_else(|| missing("Key"))?;
                (AumMessage::AddKey(Key::try_from(key)?), state)
            }
            AumKind::RemoveKey => {
                let key_id = json.key_id.ok_or_else(|| missing("KeyID"))?;
                let key_id = KeyId::from(parse_tlpub("KeyID", Some(key_id))?);
                (AumMessage::RemoveKey(key_id), state)
            }
            AumKind::NoOp => (AumMessage::NoOp, state),
            AumKind::UpdateKey => {
                let key_id = json.key_id.ok_or_else(|| missing("KeyID"))?;
                let message = AumMessage::UpdateKey {
                    key_id: KeyId::from(parse_tlpub("KeyID", Some(key_id))?),
                    votes: json.votes,
                    meta: json.meta,
                };
                (message, state)
            }
            AumKind::Checkpoint => {
                let state = state.ok_or_else(|| missing("State"))?;
                (AumMessage::Checkpoint(state), None)
            }
        };

        let mut aum = Aum::new(message);
        aum.prev_aum_hash = json.prev_aum_hash;
        aum.state_hint = state_hint;
        aum.signatures = json
            .signatures
            .unwrap_or_default()
            .into_iter()
            .map(Signature::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(aum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Identity;

    fn update_for(aum: &Aum) -> ChainUpdate {
        ChainUpdate {
            hash: aum.content_hash().unwrap(),
            change: aum.kind().to_string(),
            raw: aum.to_bytes().unwrap(),
        }
    }

    #[test]
    fn test_unrecognised_version() {
        let err = render_json(&[], 2).unwrap_err();
        assert_eq!(err.to_string(), "unrecognised version: 2");
    }

    #[test]
    fn test_empty_list() {
        let json = render_json(&[], 1).unwrap();
        assert_eq!(json, "{\n  \"SchemaVersion\": \"1\",\n  \"Messages\": []\n}\n");
    }

    #[test]
    fn test_hash_mismatch() {
        let aum = Aum::with_parent(AumMessage::NoOp, AumHash::of(b"p"));
        let mut update = update_for(&aum);
        update.hash = AumHash::of(b"other");

        assert!(matches!(
            render_json(&[update], 1),
            Err(OutputError::HashMismatch { .. })
        ));
    }

    #[test]
    fn test_undecodable_raw() {
        let update = ChainUpdate {
            hash: AumHash::of(b"x"),
            change: "no-op".to_string(),
            raw: vec![0xff],
        };
        assert!(matches!(
            render_json(&[update], 1),
            Err(OutputError::Decoding(_))
        ));
    }

    #[test]
    fn test_update_key_projection() {
        let identity = Identity::from_seed(&[3u8; 32]);
        let mut meta = Meta::new();
        meta.insert("role".to_string(), "ops".to_string());
        let mut aum = Aum::with_parent(
            AumMessage::UpdateKey {
                key_id: identity.key_id(),
                votes: Some(2),
                meta: Some(meta.clone()),
            },
            AumHash::of(b"p"),
        );
        aum.sign(&identity).unwrap();

        let json = AumJson::from(&aum);
        assert_eq!(json.message_kind, "update-key");
        assert_eq!(json.votes, Some(2));
        assert_eq!(json.meta, Some(meta));
        assert!(json.key_id.as_deref().unwrap().starts_with("tlpub:"));
        assert!(json.state.is_none());
        assert_eq!(json.signatures.as_ref().unwrap().len(), 1);

        assert_eq!(Aum::try_from(json).unwrap(), aum);
    }

    #[test]
    fn test_parse_back_verifies_everything() {
        let identity = Identity::from_seed(&[4u8; 32]);
        let mut aum = Aum::with_parent(AumMessage::AddKey(identity.key(2)), AumHash::of(b"p"));
        aum.sign(&identity).unwrap();
        let updates = vec![update_for(&aum)];

        let text = render_json(&updates, 1).unwrap();
        assert_eq!(parse_json(&text).unwrap(), updates);

        // Tampering with the expanded form is detected
        let tampered = text.replace("\"Votes\": 2", "\"Votes\": 3");
        assert_ne!(tampered, text);
        assert!(matches!(
            parse_json(&tampered),
            Err(OutputError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_version() {
        let text = "{\"SchemaVersion\": \"7\", \"Messages\": []}";
        assert!(matches!(
            parse_json(text),
            Err(OutputError::UnrecognisedVersion { version: 7 })
        ));
    }

    #[test]
    fn test_unknown_key_kind_projection() {
        let key = Key::new(KeyKind::Other(9), vec![1], 1);
        let json = KeyJson::from(&key);
        assert_eq!(json.kind, "Key?<9>");
        assert_eq!(Key::try_from(json).unwrap().kind, KeyKind::Other(9));
    }
}
