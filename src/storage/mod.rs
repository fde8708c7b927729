//! Storage layer for netlock
//!
//! # Components
//!
//! - **AumStore**: content-addressed store the chain engine keeps accepted AUMs in
//! - **MemStore**: the default, in-memory `AumStore`
//! - **FileArchive**: directory of raw AUM encodings for persistence and replay
//!
//! # Example
//!
//! ```no_run
//! use netlock::storage::{AumStore, FileArchive, MemStore};
//! use std::path::Path;
//!
//! let store = MemStore::new();
//! assert!(store.is_empty());
//!
//! let archive = FileArchive::new(Path::new("./aums")).unwrap();
//! for hash in archive.hashes().unwrap() {
//!     let bytes = archive.load(&hash).unwrap();
//!     println!("{}: {} bytes", hash, bytes.len());
//! }
//! ```

pub mod backend;

pub use backend::{AumStore, FileArchive, MemStore, ARCHIVE_EXTENSION};
