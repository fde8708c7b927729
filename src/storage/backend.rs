//! Storage backend abstraction
//!
//! [`AumStore`] is what the chain engine keeps accepted AUMs in. It is
//! content-addressed: an AUM is stored under its own hash, so a store never
//! has to resolve conflicting writes.
//!
//! [`FileArchive`] persists raw AUM bytes to a directory so an authority can
//! be rebuilt by replaying them.

use crate::authority::VerifiedAum;
use crate::crypto::AumHash;
use crate::error::{Result, StorageError};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File extension used by [`FileArchive`]
pub const ARCHIVE_EXTENSION: &str = "aum";

/// Content-addressed storage for accepted AUMs
///
/// Implementations use interior mutability so that readers holding a shared
/// reference can look AUMs up while the engine writes.
pub trait AumStore: Send + Sync {
    /// Look up an AUM by hash
    fn get(&self, hash: &AumHash) -> Option<Arc<VerifiedAum>>;

    /// Store an AUM under its own hash
    ///
    /// # Returns
    ///
    /// `true` if the AUM was not stored before
    fn put(&self, aum: Arc<VerifiedAum>) -> bool;

    /// Check if an AUM is stored
    fn contains(&self, hash: &AumHash) -> bool;

    /// Drop an AUM, returning it if it was stored
    fn remove(&self, hash: &AumHash) -> Option<Arc<VerifiedAum>>;

    /// Number of stored AUMs
    fn len(&self) -> usize;

    /// Whether the store is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hashes of every stored AUM, in no particular order
    fn hashes(&self) -> Vec<AumHash>;
}

/// In-memory store backed by a concurrent map
///
/// Cloning yields another handle to the same map.
#[derive(Clone, Default)]
pub struct MemStore {
    aums: Arc<DashMap<AumHash, Arc<VerifiedAum>>>,
}

impl MemStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl AumStore for MemStore {
    fn get(&self, hash: &AumHash) -> Option<Arc<VerifiedAum>> {
        self.aums.get(hash).map(|entry| Arc::clone(entry.value()))
    }

    fn put(&self, aum: Arc<VerifiedAum>) -> bool {
        self.aums.insert(aum.hash(), aum).is_none()
    }

    fn contains(&self, hash: &AumHash) -> bool {
        self.aums.contains_key(hash)
    }

    fn remove(&self, hash: &AumHash) -> Option<Arc<VerifiedAum>> {
        self.aums.remove(hash).map(|(_, aum)| aum)
    }

    fn len(&self) -> usize {
        self.aums.len()
    }

    fn hashes(&self) -> Vec<AumHash> {
        self.aums.iter().map(|entry| *entry.key()).collect()
    }
}

impl std::fmt::Debug for MemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemStore")
            .field("len", &self.aums.len())
            .finish()
    }
}

/// Directory of raw AUM encodings, one file per AUM
///
/// Files are named `<base32 hash>.aum`. Contents are untrusted on reload and
/// must go through verification again.
#[derive(Debug, Clone)]
pub struct FileArchive {
    /// Base directory for storage
    base_path: PathBuf,
}

impl FileArchive {
    /// Open (creating if needed) an archive directory
    ///
    /// # Arguments
    ///
    /// * `base_path` - Directory where AUM files will be stored
    ///
    /// # Example
    ///
    /// ```no_run
    /// use netlock::storage::FileArchive;
    /// use std::path::Path;
    ///
    /// let archive = FileArchive::new(Path::new("./aums")).unwrap();
    /// ```
    pub fn new(base_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_path).map_err(|e| io_error(base_path, e))?;

        // Set directory permissions to user-only (0700 on Unix)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(base_path)
                .map_err(|e| io_error(base_path, e))?
                .permissions();
            perms.set_mode(0o700);
            std::fs::set_permissions(base_path, perms).map_err(|e| io_error(base_path, e))?;
        }

        Ok(Self {
            base_path: base_path.to_path_buf(),
        })
    }

    fn hash_to_path(&self, hash: &AumHash) -> PathBuf {
        self.base_path
            .join(format!("{}.{}", hash.to_base32(), ARCHIVE_EXTENSION))
    }

    /// Write an AUM's canonical encoding
    pub fn save(&self, aum: &VerifiedAum) -> Result<()> {
        let path = self.hash_to_path(&aum.hash());
        std::fs::write(&path, aum.raw()).map_err(|e| io_error(&path, e))?;
        Ok(())
    }

    /// Read the stored bytes for `hash`
    pub fn load(&self, hash: &AumHash) -> Result<Vec<u8>> {
        let path = self.hash_to_path(hash);
        if !path.exists() {
            return Err(StorageError::NotFound { hash: *hash }.into());
        }
        std::fs::read(&path).map_err(|e| io_error(&path, e).into())
    }

    /// Check if an AUM is archived
    pub fn exists(&self, hash: &AumHash) -> bool {
        self.hash_to_path(hash).is_file()
    }

    /// Delete an archived AUM
    pub fn delete(&self, hash: &AumHash) -> Result<()> {
        let path = self.hash_to_path(hash);
        if !path.exists() {
            return Err(StorageError::NotFound { hash: *hash }.into());
        }
        std::fs::remove_file(&path).map_err(|e| io_error(&path, e))?;
        Ok(())
    }

    /// Hashes of every archived AUM, sorted
    ///
    /// Files whose names are not a hash followed by the archive extension
    /// are skipped.
    pub fn hashes(&self) -> Result<Vec<AumHash>> {
        let entries =
            std::fs::read_dir(&self.base_path).map_err(|e| io_error(&self.base_path, e))?;

        let mut hashes = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_error(&self.base_path, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ARCHIVE_EXTENSION) {
                continue;
            }
            if let Some(hash) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| AumHash::from_base32(s).ok())
            {
                hashes.push(hash);
            }
        }
        hashes.sort();
        Ok(hashes)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}
