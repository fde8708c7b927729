//! Human-readable chain log

use super::ChainUpdate;
use crate::authority::{Aum, AumMessage, Key, Meta};
use crate::error::OutputError;
use std::fmt::Write as _;

/// Render updates as a list of stanzas, one per update
///
/// Each stanza is a header line `update <HASH> (<change>)`, kind-specific
/// detail lines, then a blank line.
///
/// # Errors
///
/// Returns [`OutputError::Decoding`] if a raw entry does not decode.
pub fn render_log(updates: &[ChainUpdate]) -> Result<String, OutputError> {
    let mut out = String::new();
    for update in updates {
        let aum = Aum::from_bytes(&update.raw, update.raw.len())?;
        // Writing to a String cannot fail
        let _ = write_stanza(&mut out, update, &aum);
    }
    Ok(out)
}

fn write_stanza(out: &mut String, update: &ChainUpdate, aum: &Aum) -> std::fmt::Result {
    writeln!(out, "update {} ({})", update.hash, update.change)?;

    match &aum.message {
        AumMessage::AddKey(key) => write_key(out, key, "")?,
        AumMessage::RemoveKey(key_id) => writeln!(out, "KeyID: {}", key_id)?,
        AumMessage::UpdateKey {
            key_id,
            votes,
            meta,
        } => {
            writeln!(out, "KeyID: {}", key_id)?;
            if let Some(votes) = votes {
                writeln!(out, "Votes: {}", votes)?;
            }
            if let Some(meta) = meta.as_ref().filter(|m| !m.is_empty()) {
                writeln!(out, "Metadata: {}", format_meta(meta))?;
            }
        }
        AumMessage::Checkpoint(state) => {
            writeln!(out, "Disablement values:")?;
            for secret in &state.disablement_secrets {
                writeln!(out, " - {}", hex::encode(secret))?;
            }
            writeln!(out, "Keys:")?;
            for key in &state.keys {
                write_key(out, key, "  ")?;
            }
        }
        AumMessage::NoOp => {}
    }

    writeln!(out)
}

fn write_key(out: &mut String, key: &Key, prefix: &str) -> std::fmt::Result {
    writeln!(out, "{}Type: {}", prefix, key.kind)?;
    match key.id() {
        Ok(id) => writeln!(out, "{}KeyID: {}", prefix, id)?,
        Err(e) => writeln!(out, "{}KeyID: <Error: {}>", prefix, e)?,
    }
    if !key.meta.is_empty() {
        writeln!(out, "{}Metadata: {}", prefix, format_meta(&key.meta))?;
    }
    Ok(())
}

fn format_meta(meta: &Meta) -> String {
    let pairs: Vec<String> = meta.iter().map(|(k, v)| format!("{}:{}", k, v)).collect();
    format!("map[{}]", pairs.join(" "))
}
