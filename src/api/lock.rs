//! NetworkLock - the process-scoped authority handle
//!
//! This module provides [`NetworkLock`], which owns a [`Chain`] behind a
//! single-writer lock, and [`NetworkLockBuilder`] for configuring one.
//!
//! Readers never take the writer lock: every accepted update publishes a
//! fresh immutable [`Snapshot`], and [`NetworkLock::snapshot`] hands out the
//! current one.

use crate::api::config::{AuthorityConfig, QuorumPolicy};
use crate::api::events::{ChainEvent, EventHandlers, SubscriptionHandle};
use crate::authority::{
    ApplyOutcome, AumKind, Chain, ChainStatus, HeadChange, Key, KeyId, State, VerifiedAum,
};
use crate::crypto::AumHash;
use crate::error::{AumError, Result};
use crate::output::ChainUpdate;
use crate::storage::{AumStore, FileArchive, MemStore};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source of AUMs that this node has not seen yet
///
/// Implemented by whatever transport connects peers. A fetch that takes
/// longer than the configured timeout is abandoned.
#[async_trait]
pub trait AumFetcher: Send + Sync {
    /// Fetch the raw encoding of the AUM with content hash `hash`
    async fn fetch(&self, hash: AumHash) -> Result<Vec<u8>>;
}

/// Immutable view of the authority at one point in time
#[derive(Debug, Clone)]
pub struct Snapshot {
    status: ChainStatus,
    root: Option<AumHash>,
    head: Option<AumHash>,
    state: Option<Arc<State>>,
    chain: Vec<AumHash>,
}

impl Snapshot {
    fn of<S: AumStore>(chain: &Chain<S>) -> Self {
        Self {
            status: chain.status(),
            root: chain.root(),
            head: chain.head(),
            state: chain.state(),
            chain: chain.chain(),
        }
    }

    /// Lifecycle stage
    pub fn status(&self) -> ChainStatus {
        self.status
    }

    /// Root of the chain
    pub fn root(&self) -> Option<AumHash> {
        self.root
    }

    /// Tip of the preferred branch
    pub fn head(&self) -> Option<AumHash> {
        self.head
    }

    /// State at the head
    pub fn state(&self) -> Option<&State> {
        self.state.as_deref()
    }

    /// Preferred branch, root first
    pub fn chain(&self) -> &[AumHash] {
        &self.chain
    }

    /// Look up a key trusted at the head
    ///
    /// Always `None` once the authority is disabled.
    pub fn key(&self, key_id: &KeyId) -> Option<&Key> {
        if self.status == ChainStatus::Disabled {
            return None;
        }
        self.state()?.get_key(key_id)
    }

    /// Whether `key_id` is trusted at the head
    pub fn is_trusted(&self, key_id: &KeyId) -> bool {
        self.key(key_id).is_some()
    }
}

/// Builder for creating NetworkLock instances with progressive configuration
///
/// # Examples
///
/// ```
/// use netlock::api::{NetworkLockBuilder, QuorumPolicy};
/// use netlock::authority::ChainStatus;
///
/// let lock = NetworkLockBuilder::new()
///     .with_quorum(QuorumPolicy::Majority)
///     .with_max_pending(16)
///     .build()
///     .unwrap();
///
/// assert_eq!(lock.snapshot().status(), ChainStatus::Empty);
/// ```
pub struct NetworkLockBuilder {
    config: AuthorityConfig,
    genesis: Option<VerifiedAum>,
}

impl NetworkLockBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            config: AuthorityConfig::default(),
            genesis: None,
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: AuthorityConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the quorum policy
    pub fn with_quorum(mut self, quorum: QuorumPolicy) -> Self {
        self.config.quorum = quorum;
        self
    }

    /// Set the pending buffer bound
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.config.max_pending = max_pending;
        self
    }

    /// Set the per-parent fetch timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_fetch_timeout(timeout);
        self
    }

    /// Set the fetch depth bound
    pub fn with_max_fetch_depth(mut self, depth: usize) -> Self {
        self.config.max_fetch_depth = depth;
        self
    }

    /// Bootstrap the authority from this genesis AUM when building
    pub fn with_genesis(mut self, genesis: VerifiedAum) -> Self {
        self.genesis = Some(genesis);
        self
    }

    /// Build a NetworkLock backed by an in-memory store
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the genesis is
    /// rejected.
    pub fn build(self) -> Result<NetworkLock> {
        self.build_with_store(MemStore::new())
    }

    /// Build a NetworkLock backed by `store`
    pub fn build_with_store<S: AumStore>(self, store: S) -> Result<NetworkLock<S>> {
        self.config.validate()?;

        let chain = Chain::with_config(store, &self.config);
        let lock = NetworkLock {
            snapshot: Arc::new(RwLock::new(Arc::new(Snapshot::of(&chain)))),
            chain: Arc::new(Mutex::new(chain)),
            events: EventHandlers::new(),
            config: self.config,
        };

        if let Some(genesis) = self.genesis {
            lock.submit(genesis)?;
        }
        Ok(lock)
    }
}

impl Default for NetworkLockBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to a network-lock authority
///
/// Cloning yields another handle to the same authority. All writes are
/// serialized; reads go through [`snapshot`](Self::snapshot).
pub struct NetworkLock<S: AumStore = MemStore> {
    /// The single writer
    chain: Arc<Mutex<Chain<S>>>,
    /// Latest published view
    snapshot: Arc<RwLock<Arc<Snapshot>>>,
    /// Event handler registry
    events: EventHandlers,
    /// Immutable configuration
    config: AuthorityConfig,
}

impl<S: AumStore> Clone for NetworkLock<S> {
    fn clone(&self) -> Self {
        Self {
            chain: Arc::clone(&self.chain),
            snapshot: Arc::clone(&self.snapshot),
            events: self.events.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: AumStore> NetworkLock<S> {
    /// Current view of the authority
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.snapshot.read())
    }

    /// Configuration this lock was built with
    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }

    /// Register an event handler
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionHandle
    where
        F: Fn(ChainEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler)
    }

    /// Unsubscribe an event handler
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.events.unsubscribe(handle);
    }

    /// Get the event handler registry
    pub fn event_handlers(&self) -> &EventHandlers {
        &self.events
    }

    /// Apply a verified AUM
    ///
    /// See [`Chain::submit`] for the acceptance rules.
    pub fn submit(&self, aum: VerifiedAum) -> Result<ApplyOutcome> {
        self.apply(aum, |chain, aum| chain.submit(aum))
    }

    /// Start an empty authority from a trusted checkpoint
    ///
    /// See [`Chain::bootstrap_from_checkpoint`].
    pub fn bootstrap_from_checkpoint(&self, checkpoint: VerifiedAum) -> Result<ApplyOutcome> {
        self.apply(checkpoint, |chain, aum| chain.bootstrap_from_checkpoint(aum))
    }

    fn apply<F>(&self, aum: VerifiedAum, op: F) -> Result<ApplyOutcome>
    where
        F: FnOnce(&mut Chain<S>, VerifiedAum) -> std::result::Result<ApplyOutcome, AumError>,
    {
        let hash = aum.hash();
        let parent = aum.aum().prev_aum_hash;

        let (result, events) = {
            let mut chain = self.chain.lock();
            let result = op(&mut *chain, aum);
            let events = match &result {
                Ok(outcome) => {
                    self.publish(&*chain);
                    outcome_events(&*chain, outcome)
                }
                Err(AumError::UnknownParent { held: true, .. }) => parent
                    .map(|parent| vec![ChainEvent::Held { hash, parent }])
                    .unwrap_or_default(),
                Err(error) => vec![ChainEvent::Rejected {
                    hash,
                    error: error.clone(),
                }],
            };
            (result, events)
        };

        for event in events {
            self.events.dispatch(event);
        }
        result.map_err(Into::into)
    }

    /// Decode, verify and apply an AUM received as bytes
    pub fn submit_bytes(&self, bytes: &[u8]) -> Result<ApplyOutcome> {
        let aum = VerifiedAum::from_bytes(bytes, self.config.max_aum_size)?;
        self.submit(aum)
    }

    /// Verify a batch in parallel, then apply it in order
    ///
    /// Decoding, static validation and signature checks for every entry run
    /// concurrently on the blocking pool. Application is serial, so the
    /// result for each entry is the same as submitting them one by one.
    pub async fn submit_batch(&self, batch: Vec<Vec<u8>>) -> Vec<Result<ApplyOutcome>> {
        let max_size = self.config.max_aum_size;
        let tasks: Vec<_> = batch
            .into_iter()
            .map(|bytes| {
                tokio::task::spawn_blocking(move || VerifiedAum::from_bytes(&bytes, max_size))
            })
            .collect();

        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            let verified = match task.await {
                Ok(verified) => verified,
                Err(e) => Err(AumError::StaticValidationFailed {
                    reason: format!("verification task failed: {}", e),
                }),
            };
            results.push(verified.map_err(Into::into).and_then(|v| self.submit(v)));
        }
        results
    }

    /// Apply `aum`, first fetching any ancestors this node lacks
    ///
    /// Walks parent links through `fetcher` until it reaches an accepted AUM
    /// or a genesis, then applies the fetched ancestors oldest first.
    ///
    /// # Errors
    ///
    /// * [`AumError::FetchTimeout`] if one fetch exceeds the configured timeout
    /// * [`AumError::FetchDepthExceeded`] if more than `max_fetch_depth`
    ///   ancestors are missing
    /// * any error from the fetcher, from verification, or from applying
    ///   an ancestor
    pub async fn sync_from<F>(&self, fetcher: &F, aum: VerifiedAum) -> Result<ApplyOutcome>
    where
        F: AumFetcher + ?Sized,
    {
        let mut ancestors = Vec::new();
        let mut cursor = aum.aum().prev_aum_hash;

        while let Some(parent) = cursor {
            if self.knows(&parent) {
                break;
            }
            if ancestors.len() >= self.config.max_fetch_depth {
                return Err(AumError::FetchDepthExceeded {
                    max: self.config.max_fetch_depth,
                }
                .into());
            }

            debug!(parent = %parent, "fetching missing parent");
            let bytes = tokio::time::timeout(self.config.fetch_timeout(), fetcher.fetch(parent))
                .await
                .map_err(|_| AumError::FetchTimeout { parent })??;

            let fetched = VerifiedAum::from_bytes(&bytes, self.config.max_aum_size)?;
            if fetched.hash() != parent {
                return Err(AumError::MalformedEncoding {
                    reason: format!(
                        "fetched AUM hashes to {}, requested {}",
                        fetched.hash(),
                        parent
                    ),
                }
                .into());
            }

            cursor = fetched.aum().prev_aum_hash;
            ancestors.push(fetched);
        }

        if !ancestors.is_empty() {
            info!(count = ancestors.len(), "fetched missing ancestors");
        }

        let mut combined = ApplyOutcome::default();
        for verified in ancestors.into_iter().rev().chain(std::iter::once(aum)) {
            let outcome = self.submit(verified)?;
            combined.duplicate = outcome.duplicate;
            combined.accepted.extend(outcome.accepted);
            combined.rejected.extend(outcome.rejected);
            if let Some(change) = outcome.head_change {
                combined.head_change = Some(HeadChange {
                    previous: combined
                        .head_change
                        .map_or(change.previous, |first| first.previous),
                    current: change.current,
                });
            }
        }
        combined.duplicate &= combined.accepted.is_empty();
        Ok(combined)
    }

    /// Disable the authority by revealing a disablement secret
    ///
    /// See [`Chain::disable`].
    pub fn disable(&self, secret: &[u8]) -> Result<()> {
        {
            let mut chain = self.chain.lock();
            chain.disable(secret)?;
            self.publish(&*chain);
        }
        self.events.dispatch(ChainEvent::Disabled);
        Ok(())
    }

    /// Re-root at the last checkpoint on the preferred branch
    ///
    /// See [`Chain::compact`].
    pub fn compact(&self) -> usize {
        let mut chain = self.chain.lock();
        let removed = chain.compact();
        self.publish(&*chain);
        removed
    }

    /// Updates along the preferred branch, newest first
    pub fn updates(&self) -> Vec<ChainUpdate> {
        self.chain.lock().updates()
    }

    /// Mirror the accepted AUMs into `archive`
    ///
    /// Every accepted AUM is written, and archived AUMs the chain no longer
    /// holds (for instance after [`compact`](Self::compact)) are deleted.
    /// Returns the number of AUMs written.
    pub fn archive_to(&self, archive: &FileArchive) -> Result<usize> {
        let accepted = self.chain.lock().accepted();
        let keep: HashSet<AumHash> = accepted.iter().map(|v| v.hash()).collect();
        for aum in &accepted {
            archive.save(aum)?;
        }

        let mut pruned = 0;
        for hash in archive.hashes()? {
            if !keep.contains(&hash) {
                archive.delete(&hash)?;
                pruned += 1;
            }
        }
        if pruned > 0 {
            info!(pruned, "pruned archived AUMs no longer in the chain");
        }
        Ok(accepted.len())
    }

    /// Replay the AUMs stored in `archive`
    ///
    /// Archived bytes are untrusted and verified again; an entry that does
    /// not decode, fails verification or hashes differently from its file
    /// name is skipped. AUMs are applied parents first regardless of the
    /// order the archive lists them in. If this authority is empty and the
    /// archive has no genesis, a checkpoint whose parent is not archived is
    /// taken as the root, as left behind by compaction. Entries that are
    /// rejected or never connect to the chain are skipped. Returns the
    /// number accepted.
    pub fn restore_from(&self, archive: &FileArchive) -> Result<usize> {
        let mut waiting: HashMap<Option<AumHash>, Vec<VerifiedAum>> = HashMap::new();
        let mut archived = HashSet::new();
        for hash in archive.hashes()? {
            let loaded = archive.load(&hash).and_then(|bytes| {
                VerifiedAum::from_bytes(&bytes, self.config.max_aum_size).map_err(Into::into)
            });
            let verified = match loaded {
                Ok(verified) => verified,
                Err(e) => {
                    warn!(file = %hash, error = %e, "skipping unreadable archived AUM");
                    continue;
                }
            };
            if verified.hash() != hash {
                warn!(
                    file = %hash,
                    aum = %verified.hash(),
                    "skipping archived AUM stored under another hash"
                );
                continue;
            }
            archived.insert(hash);
            waiting
                .entry(verified.aum().prev_aum_hash)
                .or_default()
                .push(verified);
        }

        let mut restored = 0;
        let mut ready: Vec<Option<AumHash>> = vec![None];
        ready.extend(self.chain.lock().accepted().iter().map(|v| Some(v.hash())));

        let empty = self.chain.lock().root().is_none();
        if empty && !waiting.contains_key(&None) {
            if let Some(root) = compacted_root(&mut waiting, &archived) {
                let hash = root.hash();
                match self.bootstrap_from_checkpoint(root) {
                    Ok(outcome) => {
                        restored += outcome.accepted.len();
                        ready.push(Some(hash));
                    }
                    Err(e) => warn!(aum = %hash, error = %e, "archived root checkpoint rejected"),
                }
            }
        }

        while let Some(parent) = ready.pop() {
            for verified in waiting.remove(&parent).unwrap_or_default() {
                let hash = verified.hash();
                match self.submit(verified) {
                    Ok(outcome) => {
                        restored += outcome.accepted.len();
                        ready.push(Some(hash));
                    }
                    Err(e) => warn!(aum = %hash, error = %e, "skipping archived AUM"),
                }
            }
        }

        info!(restored, "restored AUMs from archive");
        Ok(restored)
    }

    fn knows(&self, hash: &AumHash) -> bool {
        self.chain.lock().contains(hash)
    }

    fn publish(&self, chain: &Chain<S>) {
        *self.snapshot.write() = Arc::new(Snapshot::of(chain));
    }
}

/// Take the checkpoint a compacted archive starts from
///
/// Candidates are checkpoints whose parent is not archived; the lowest hash
/// wins if there are several.
fn compacted_root(
    waiting: &mut HashMap<Option<AumHash>, Vec<VerifiedAum>>,
    archived: &HashSet<AumHash>,
) -> Option<VerifiedAum> {
    let (parent, hash) = waiting
        .iter()
        .filter(|(parent, _)| matches!(parent, Some(p) if !archived.contains(p)))
        .flat_map(|(parent, aums)| aums.iter().map(move |v| (*parent, v)))
        .filter(|(_, v)| v.aum().kind() == AumKind::Checkpoint)
        .map(|(parent, v)| (parent, v.hash()))
        .min_by_key(|(_, hash)| *hash)?;

    let siblings = waiting.get_mut(&parent)?;
    let position = siblings.iter().position(|v| v.hash() == hash)?;
    Some(siblings.swap_remove(position))
}

fn outcome_events<S: AumStore>(chain: &Chain<S>, outcome: &ApplyOutcome) -> Vec<ChainEvent> {
    let mut events: Vec<ChainEvent> = outcome
        .accepted
        .iter()
        .filter_map(|hash| chain.get(hash))
        .map(|aum| ChainEvent::Accepted {
            hash: aum.hash(),
            kind: aum.aum().kind(),
        })
        .collect();

    events.extend(
        outcome
            .rejected
            .iter()
            .map(|(hash, error)| ChainEvent::Rejected {
                hash: *hash,
                error: error.clone(),
            }),
    );

    if let Some(change) = outcome.head_change {
        events.push(ChainEvent::HeadChanged {
            previous: change.previous,
            current: change.current,
        });
    }
    events
}
