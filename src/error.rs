//! Error types for netlock
//!
//! Each concern owns an error enum; [`Error`] wraps them all so that callers
//! working across concerns can use the crate-wide [`Result`] alias.

use crate::crypto::AumHash;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for netlock operations
#[derive(Error, Debug)]
pub enum Error {
    /// Key-level static validation failures
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Chain validation and application failures
    #[error(transparent)]
    Aum(#[from] AumError),

    /// Wire encoding failures
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Presentation failures (JSON projection, log rendering)
    #[error(transparent)]
    Output(#[from] OutputError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Cryptographic primitive failures
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// AUM archive failures
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Error {
    /// Whether the same input may succeed if retried later
    ///
    /// Only a missing parent (or a timed-out fetch of one) is transient;
    /// cryptographic and bounds failures never change on resubmission.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Aum(AumError::UnknownParent { .. }) | Error::Aum(AumError::FetchTimeout { .. })
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Static validation failures for a [`Key`](crate::authority::Key)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Vote weight outside `[1, 4096]`
    #[error("invalid key weight {votes}: must be between 1 and 4096")]
    InvalidWeight {
        /// The rejected weight
        votes: u32,
    },

    /// Metadata exceeds the byte budget
    #[error("key metadata too big ({size} > {max})")]
    InvalidMetadataSize {
        /// Total bytes of keys and values
        size: usize,
        /// Allowed maximum
        max: usize,
    },

    /// Key kind is unset or unknown to this implementation
    #[error("unrecognized key kind: {kind}")]
    UnrecognizedKind {
        /// Display form of the kind
        kind: String,
    },

    /// Key material was requested as an algorithm it is not
    #[error("key is of type {actual}, not {expected}")]
    KindMismatch {
        /// Requested algorithm
        expected: String,
        /// Declared kind
        actual: String,
    },

    /// Public key bytes do not describe a usable key of the declared kind
    #[error("invalid public key: {reason}")]
    InvalidPublicKey {
        /// What was wrong
        reason: String,
    },
}

/// Errors raised while building, verifying or applying AUMs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AumError {
    /// Untrusted bytes could not be parsed
    #[error("malformed AUM encoding: {reason}")]
    MalformedEncoding {
        /// Decoder diagnostic
        reason: String,
    },

    /// Content violates static bounds; permanent
    #[error("static validation failed: {reason}")]
    StaticValidationFailed {
        /// Which bound was violated
        reason: String,
    },

    /// Parent has not been accepted yet; transient
    #[error("unknown parent AUM {parent} (held pending: {held})")]
    UnknownParent {
        /// Referenced parent hash
        parent: AumHash,
        /// Whether the AUM was buffered until the parent arrives
        held: bool,
    },

    /// A signature failed cryptographic verification
    #[error("invalid signature by key {key_id}: {reason}")]
    InvalidSignature {
        /// Display form of the signing key id
        key_id: String,
        /// Why verification failed
        reason: String,
    },

    /// Trusted signer weight is below the quorum threshold
    #[error("quorum not met: {have} votes signed, {need} required")]
    QuorumNotMet {
        /// Weight of distinct trusted signers
        have: u64,
        /// Weight required by the quorum policy
        need: u64,
    },

    /// The update would leave the authority without keys
    #[error("removing key {key_id} would leave the authority with no keys")]
    WouldBrickAuthority {
        /// Display form of the key id
        key_id: String,
    },

    /// add-key for a key already trusted at the parent
    #[error("key {key_id} already exists")]
    KeyAlreadyExists {
        /// Display form of the key id
        key_id: String,
    },

    /// remove-key or update-key for a key not trusted at the parent
    #[error("no such key: {key_id}")]
    NoSuchKey {
        /// Display form of the key id
        key_id: String,
    },

    /// A checkpoint tried to change the compound state identifier
    #[error("checkpoint state id {got} does not match authority state id {want}")]
    StateIdMismatch {
        /// State id of the parent
        want: String,
        /// State id carried by the checkpoint
        got: String,
    },

    /// A second genesis was offered to a bootstrapped chain
    #[error("authority is already bootstrapped")]
    AlreadyBootstrapped,

    /// The chain has no genesis yet
    #[error("authority has not been bootstrapped")]
    NotBootstrapped,

    /// The authority has been disabled; no further updates apply
    #[error("authority is disabled")]
    AuthorityDisabled,

    /// The offered secret matches no committed disablement value
    #[error("disablement secret does not match any commitment")]
    InvalidDisablementSecret,

    /// Fetching a missing parent did not finish in time
    #[error("timed out fetching parent AUM {parent}")]
    FetchTimeout {
        /// Parent being fetched
        parent: AumHash,
    },

    /// Too many parents had to be fetched for a single submission
    #[error("parent chain deeper than {max} fetches")]
    FetchDepthExceeded {
        /// Configured bound
        max: usize,
    },
}

impl From<KeyError> for AumError {
    fn from(err: KeyError) -> Self {
        AumError::StaticValidationFailed {
            reason: err.to_string(),
        }
    }
}

impl From<ProtocolError> for AumError {
    fn from(err: ProtocolError) -> Self {
        AumError::MalformedEncoding {
            reason: err.to_string(),
        }
    }
}

/// Wire encoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Bytes are not a well-formed encoding of the expected type
    #[error("malformed encoding: {reason}")]
    MalformedEncoding {
        /// Decoder diagnostic
        reason: String,
    },

    /// A value could not be encoded
    #[error("failed to serialize {message_type}: {reason}")]
    SerializationFailed {
        /// Type being encoded
        message_type: String,
        /// Encoder diagnostic
        reason: String,
    },

    /// Input exceeds the configured size limit
    #[error("message too large: {size} bytes (max: {max} bytes)")]
    MessageTooLarge {
        /// Offered size
        size: usize,
        /// Allowed maximum
        max: usize,
    },
}

/// Errors from the presentation layer
#[derive(Error, Debug)]
pub enum OutputError {
    /// Requested JSON schema version is not known
    #[error("unrecognised version: {version}")]
    UnrecognisedVersion {
        /// Requested version
        version: u32,
    },

    /// A listed update's bytes do not hash to its recorded hash
    #[error("incorrect AUM hash: got {got}, want {want}")]
    HashMismatch {
        /// Hash of the decoded bytes
        got: AumHash,
        /// Hash recorded alongside them
        want: AumHash,
    },

    /// A listed update could not be decoded
    #[error("decoding: {0}")]
    Decoding(#[from] ProtocolError),

    /// JSON encoding or parsing failed
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// A JSON value does not describe a valid chain value
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Offending JSON field
        field: String,
        /// What was wrong
        reason: String,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A field holds an unusable value
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// Config file could not be read or written
    #[error("config file {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for [`AuthorityConfig`](crate::api::AuthorityConfig)
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// AUM archive errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// No archived AUM has this hash
    #[error("AUM not found: {hash}")]
    NotFound {
        /// Requested hash
        hash: AumHash,
    },

    /// Archive file or directory could not be accessed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Cryptographic primitive failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key derivation could not run
    #[error("key derivation failed: {reason}")]
    KeyDerivationFailed {
        /// KDF diagnostic
        reason: String,
    },

    /// A byte string has the wrong length for its role
    #[error("invalid length for {what}: expected {expected}, got {got}")]
    InvalidLength {
        /// What was being parsed
        what: &'static str,
        /// Required length
        expected: usize,
        /// Offered length
        got: usize,
    },

    /// Text could not be parsed as a hash
    #[error("invalid hash text: {reason}")]
    InvalidHashText {
        /// Parser diagnostic
        reason: String,
    },
}
