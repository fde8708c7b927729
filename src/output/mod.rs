//! Presentation of chain contents
//!
//! Collaborators that audit an authority consume a list of
//! [`ChainUpdate`]s, newest first, as produced by
//! [`Chain::updates`](crate::authority::Chain::updates). This module renders
//! that list as:
//!
//! - a versioned JSON document ([`render_json`]) that can be parsed back and
//!   re-verified with [`parse_json`]
//! - a human-readable log ([`render_log`])
//!
//! Both re-decode every raw entry; nothing here trusts the caller's view of
//! an update beyond its bytes.

pub mod json;
pub mod text;

use crate::crypto::AumHash;

pub use json::{
    parse_json, render_json, AumJson, KeyJson, LogEnvelope, LogMessage, SignatureJson, StateJson,
    SCHEMA_VERSION_1,
};
pub use text::render_log;

/// One accepted update as presented to external tooling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainUpdate {
    /// Content hash of the AUM
    pub hash: AumHash,
    /// Kind of change, e.g. `add-key`
    pub change: String,
    /// Canonical encoding of the AUM
    pub raw: Vec<u8>,
}
