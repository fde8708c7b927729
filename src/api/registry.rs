//! In-memory AUM registry
//!
//! [`AumRegistry`] serves raw AUMs by hash without any network, which lets
//! several [`NetworkLock`](super::NetworkLock)s in one process sync from each
//! other. Useful for testing and development.

use crate::api::lock::AumFetcher;
use crate::authority::VerifiedAum;
use crate::crypto::AumHash;
use crate::error::{Result, StorageError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Shared map from content hash to raw AUM bytes
///
/// Cloning yields another handle to the same registry.
///
/// # Examples
///
/// ```
/// use netlock::api::{AumFetcher, AumRegistry};
/// use netlock::authority::{Aum, AumMessage, VerifiedAum};
/// use netlock::crypto::AumHash;
///
/// # async fn example() -> netlock::Result<()> {
/// let registry = AumRegistry::new();
/// let aum = VerifiedAum::verify(Aum::with_parent(AumMessage::NoOp, AumHash::of(b"p")))?;
/// registry.publish(&aum);
///
/// let bytes = registry.fetch(aum.hash()).await?;
/// assert_eq!(bytes, aum.raw());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct AumRegistry {
    aums: Arc<DashMap<AumHash, Vec<u8>>>,
}

impl AumRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a verified AUM available under its hash
    pub fn publish(&self, aum: &VerifiedAum) {
        self.aums.insert(aum.hash(), aum.raw().to_vec());
    }

    /// Serve arbitrary bytes under `hash`
    ///
    /// Nothing checks that the bytes hash to `hash`; fetchers must.
    pub fn insert_raw(&self, hash: AumHash, bytes: Vec<u8>) {
        self.aums.insert(hash, bytes);
    }

    /// Stop serving `hash`
    pub fn withdraw(&self, hash: &AumHash) -> bool {
        self.aums.remove(hash).is_some()
    }

    /// Number of AUMs served
    pub fn len(&self) -> usize {
        self.aums.len()
    }

    /// Whether nothing is served
    pub fn is_empty(&self) -> bool {
        self.aums.is_empty()
    }
}

#[async_trait]
impl AumFetcher for AumRegistry {
    async fn fetch(&self, hash: AumHash) -> Result<Vec<u8>> {
        self.aums
            .get(&hash)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound { hash }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::{Aum, AumMessage};
    use crate::error::Error;

    fn sample() -> VerifiedAum {
        VerifiedAum::verify(Aum::with_parent(AumMessage::NoOp, AumHash::of(b"p"))).unwrap()
    }

    #[tokio::test]
    async fn test_publish_and_fetch() {
        let registry = AumRegistry::new();
        let aum = sample();
        registry.publish(&aum);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.fetch(aum.hash()).await.unwrap(), aum.raw());
    }

    #[tokio::test]
    async fn test_fetch_missing() {
        let registry = AumRegistry::new();
        let result = registry.fetch(AumHash::of(b"missing")).await;
        assert!(matches!(
            result,
            Err(Error::Storage(StorageError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_withdraw() {
        let registry = AumRegistry::new();
        let handle = registry.clone();
        let aum = sample();
        registry.publish(&aum);

        assert!(handle.withdraw(&aum.hash()));
        assert!(registry.is_empty());
        assert!(registry.fetch(aum.hash()).await.is_err());
    }
}
