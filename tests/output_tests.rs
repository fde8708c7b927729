//! Byte-exact compatibility of the wire format and both log renderings
//!
//! The fixture is a three-update chain (checkpoint, add-key, remove-key)
//! whose encodings, hashes and rendered output are fixed. Any change to the
//! canonical encoding shows up here first.

mod common;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use netlock::authority::{Aum, AumMessage, Key, KeyId, Signature, State, StateId};
use netlock::crypto::AumHash;
use netlock::error::OutputError;
use netlock::output::{parse_json, render_json, render_log, ChainUpdate};

const CHECKPOINT_HASH: &str = "C4CRI2FP246RDASCLR6QIX6WTXKW7G64HXN6LZVLQNWU6EKSOPBA";
const ADD_KEY_HASH: &str = "YWWMHTE7L7WNIBXQFNUIEPOO4VMQ5SG4GDCUKFBG4ISTUHTF6GNQ";
const REMOVE_KEY_HASH: &str = "D3FLVPFAB5MAVOY572IFTRAWHSYLJEKHQ33MWWICFNHS3UEDRJTA";

const CHECKPOINT_RAW: &str = "owEFAvYFowH2AoNDAQIDQwQFBkMHCAkDgaMBAQIBA0IBAQ==";
const ADD_KEY_RAW: &str =
    "pAEBAlggFwUUaK_XPRGCQlx9BF_WndVvm9w92-Xmq4NtTxFSc8IDowEBAgEDQgICBaMB9gL2A_Y=";
const REMOVE_KEY_RAW: &str =
    "pQECAlggxazDzJ9f7NQG8Ctogj3O5VkOyNwwxUUUJuIlOh5l8ZsEQgMDBaMB9gL2A_YXgaIBQgMEAkIEBQ==";

const EXPECTED_LOG: &str = "\
update D3FLVPFAB5MAVOY572IFTRAWHSYLJEKHQ33MWWICFNHS3UEDRJTA (remove-key)
KeyID: tlpub:0303

update YWWMHTE7L7WNIBXQFNUIEPOO4VMQ5SG4GDCUKFBG4ISTUHTF6GNQ (add-key)
Type: 25519
KeyID: tlpub:0202

update C4CRI2FP246RDASCLR6QIX6WTXKW7G64HXN6LZVLQNWU6EKSOPBA (checkpoint)
Disablement values:
 - 010203
 - 040506
 - 070809
Keys:
  Type: 25519
  KeyID: tlpub:0101

";

const EXPECTED_JSON: &str = r#"{
  "SchemaVersion": "1",
  "Messages": [
    {
      "Hash": "D3FLVPFAB5MAVOY572IFTRAWHSYLJEKHQ33MWWICFNHS3UEDRJTA",
      "AUM": {
        "MessageKind": "remove-key",
        "PrevAUMHash": "YWWMHTE7L7WNIBXQFNUIEPOO4VMQ5SG4GDCUKFBG4ISTUHTF6GNQ",
        "Key": null,
        "KeyID": "tlpub:0303",
        "State": {
          "LastAUMHash": null,
          "DisablementSecrets": null,
          "Keys": null,
          "StateID1": 0,
          "StateID2": 0
        },
        "Votes": null,
        "Meta": null,
        "Signatures": [
          {
            "KeyID": "tlpub:0304",
            "Signature": "BAU="
          }
        ]
      },
      "Raw": "pQECAlggxazDzJ9f7NQG8Ctogj3O5VkOyNwwxUUUJuIlOh5l8ZsEQgMDBaMB9gL2A_YXgaIBQgMEAkIEBQ=="
    },
    {
      "Hash": "YWWMHTE7L7WNIBXQFNUIEPOO4VMQ5SG4GDCUKFBG4ISTUHTF6GNQ",
      "AUM": {
        "MessageKind": "add-key",
        "PrevAUMHash": "C4CRI2FP246RDASCLR6QIX6WTXKW7G64HXN6LZVLQNWU6EKSOPBA",
        "Key": {
          "Kind": "25519",
          "Votes": 1,
          "Public": "tlpub:0202",
          "Meta": null
        },
        "KeyID": null,
        "State": {
          "LastAUMHash": null,
          "DisablementSecrets": null,
          "Keys": null,
          "StateID1": 0,
          "StateID2": 0
        },
        "Votes": null,
        "Meta": null,
        "Signatures": null
      },
      "Raw": "pAEBAlggFwUUaK_XPRGCQlx9BF_WndVvm9w92-Xmq4NtTxFSc8IDowEBAgEDQgICBaMB9gL2A_Y="
    },
    {
      "Hash": "C4CRI2FP246RDASCLR6QIX6WTXKW7G64HXN6LZVLQNWU6EKSOPBA",
      "AUM": {
        "MessageKind": "checkpoint",
        "PrevAUMHash": null,
        "Key": null,
        "KeyID": null,
        "State": {
          "LastAUMHash": null,
          "DisablementSecrets": [
            "AQID",
            "BAUG",
            "BwgJ"
          ],
          "Keys": [
            {
              "Kind": "25519",
              "Votes": 1,
              "Public": "tlpub:0101",
              "Meta": null
            }
          ],
          "StateID1": 0,
          "StateID2": 0
        },
        "Votes": null,
        "Meta": null,
        "Signatures": null
      },
      "Raw": "owEFAvYFowH2AoNDAQIDQwQFBkMHCAkDgaMBAQIBA0IBAQ=="
    }
  ]
}
"#;

fn empty_state() -> State {
    State::new(Vec::new(), Vec::new(), StateId(0, 0))
}

/// The three fixture AUMs, oldest first
fn fixture_aums() -> [Aum; 3] {
    let checkpoint = Aum::new(AumMessage::Checkpoint(State::new(
        vec![Key::ed25519(vec![1, 1], 1)],
        vec![vec![1, 2, 3], vec![4, 5, 6], vec![7, 8, 9]],
        StateId(0, 0),
    )));
    let h1 = checkpoint.content_hash().unwrap();

    let add = Aum::with_parent(AumMessage::AddKey(Key::ed25519(vec![2, 2], 1)), h1)
        .with_state_hint(empty_state());
    let h2 = add.content_hash().unwrap();

    let mut remove = Aum::with_parent(AumMessage::RemoveKey(KeyId::from(vec![3, 3])), h2)
        .with_state_hint(empty_state());
    remove.signatures.push(Signature::new(vec![3, 4], vec![4, 5]));

    [checkpoint, add, remove]
}

/// Fixture updates, newest first
fn fixture_updates() -> Vec<ChainUpdate> {
    fixture_aums()
        .iter()
        .rev()
        .map(|aum| ChainUpdate {
            hash: aum.content_hash().unwrap(),
            change: aum.kind().to_string(),
            raw: aum.to_bytes().unwrap(),
        })
        .collect()
}

#[test]
fn test_fixture_encodings_are_byte_exact() {
    let [checkpoint, add, remove] = fixture_aums();

    assert_eq!(URL_SAFE.encode(checkpoint.to_bytes().unwrap()), CHECKPOINT_RAW);
    assert_eq!(URL_SAFE.encode(add.to_bytes().unwrap()), ADD_KEY_RAW);
    assert_eq!(URL_SAFE.encode(remove.to_bytes().unwrap()), REMOVE_KEY_RAW);
}

#[test]
fn test_fixture_hashes_are_byte_exact() {
    let [checkpoint, add, remove] = fixture_aums();

    assert_eq!(checkpoint.content_hash().unwrap().to_string(), CHECKPOINT_HASH);
    assert_eq!(add.content_hash().unwrap().to_string(), ADD_KEY_HASH);
    assert_eq!(remove.content_hash().unwrap().to_string(), REMOVE_KEY_HASH);
}

#[test]
fn test_fixture_raw_decodes_to_same_update() {
    let expected = fixture_aums();
    let raws = [CHECKPOINT_RAW, ADD_KEY_RAW, REMOVE_KEY_RAW];

    for (raw, aum) in raws.iter().zip(expected.iter()) {
        let bytes = URL_SAFE.decode(raw).unwrap();
        let decoded = Aum::from_bytes(&bytes, bytes.len()).unwrap();
        assert_eq!(decoded.kind(), aum.kind());
        assert_eq!(decoded.prev_aum_hash, aum.prev_aum_hash);
        assert_eq!(decoded.to_bytes().unwrap(), bytes);
    }
}

#[test]
fn test_human_log_matches_fixture() {
    let log = render_log(&fixture_updates()).unwrap();
    assert_eq!(log, EXPECTED_LOG);
}

#[test]
fn test_json_v1_matches_fixture() {
    let json = render_json(&fixture_updates(), 1).unwrap();
    assert_eq!(json, EXPECTED_JSON);
}

#[test]
fn test_json_v1_parses_back_to_fixture_updates() {
    let updates = parse_json(EXPECTED_JSON).unwrap();
    assert_eq!(updates, fixture_updates());

    let expected: Vec<AumHash> = [REMOVE_KEY_HASH, ADD_KEY_HASH, CHECKPOINT_HASH]
        .iter()
        .map(|h| h.parse().unwrap())
        .collect();
    let hashes: Vec<AumHash> = updates.iter().map(|u| u.hash).collect();
    assert_eq!(hashes, expected);
}

#[test]
fn test_json_rejects_unknown_schema_version() {
    let err = render_json(&fixture_updates(), 2).unwrap_err();
    assert!(matches!(err, OutputError::UnrecognisedVersion { version: 2 }));
    assert_eq!(err.to_string(), "unrecognised version: 2");
}

#[test]
fn test_json_rejects_edited_key_id() {
    let tampered = EXPECTED_JSON.replacen("\"KeyID\": \"tlpub:0303\"", "\"KeyID\": \"tlpub:0404\"", 1);
    assert!(matches!(
        parse_json(&tampered),
        Err(OutputError::InvalidField { .. })
    ));
}

#[test]
fn test_log_of_live_chain() {
    let a = common::identity(1);
    let b = common::identity(2);
    let mut chain = netlock::authority::Chain::new();

    let g = common::genesis(vec![a.key(1)]);
    let g_hash = g.hash();
    chain.submit(g).unwrap();
    chain
        .submit(common::signed(AumMessage::AddKey(b.key(1)), g_hash, &[&a]))
        .unwrap();

    let log = render_log(&chain.updates()).unwrap();
    let headers: Vec<&str> = log.lines().filter(|l| l.starts_with("update ")).collect();
    assert_eq!(headers.len(), 2);
    assert!(headers[0].ends_with("(add-key)"));
    assert!(headers[1].ends_with("(checkpoint)"));
    assert!(log.contains(&format!("KeyID: {}", b.key_id())));
}
