//! The chain engine
//!
//! [`Chain`] validates candidate AUMs against the state at their declared
//! parent, materializes the resulting states and picks the preferred branch
//! when several AUMs extend the same parent.
//!
//! # Fork resolution
//!
//! Every accepted AUM records the weight of its trusted signers, measured
//! against its parent's state. The weight of a branch is the sum of those
//! weights from the fork point down to the branch tip, following the
//! heaviest path. At each fork the heavier branch wins; an exact tie goes to
//! the child with the lowest content hash. Losing branches are kept, so a
//! later arrival can tip the balance back.
//!
//! Branch weights are memoized per node and invalidated along the ancestor
//! path of every newly accepted AUM.

use super::aum::{Aum, AumKind, AumMessage};
use super::state::State;
use crate::api::{AuthorityConfig, QuorumPolicy};
use crate::crypto::AumHash;
use crate::error::{AumError, Result};
use crate::output::ChainUpdate;
use crate::storage::{AumStore, MemStore};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// An AUM that passed every check not requiring chain state
///
/// Produced by static validation plus cryptographic verification of each
/// signature, both of which are independent of the chain and may run in
/// parallel before AUMs are applied one at a time.
#[derive(Debug, Clone)]
pub struct VerifiedAum {
    aum: Aum,
    hash: AumHash,
    raw: Vec<u8>,
}

impl VerifiedAum {
    /// Statically validate `aum` and verify its signatures
    pub fn verify(aum: Aum) -> std::result::Result<Self, AumError> {
        aum.static_validate()?;
        aum.verify_signatures()?;
        let raw = aum.to_bytes()?;
        Ok(Self {
            hash: AumHash::of(&raw),
            aum,
            raw,
        })
    }

    /// Decode untrusted bytes and verify the result
    pub fn from_bytes(bytes: &[u8], max_size: usize) -> std::result::Result<Self, AumError> {
        Self::verify(Aum::from_bytes(bytes, max_size)?)
    }

    /// The verified AUM
    pub fn aum(&self) -> &Aum {
        &self.aum
    }

    /// Content hash
    pub fn hash(&self) -> AumHash {
        self.hash
    }

    /// Canonical encoding the hash was computed over
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Give up the verified wrapper
    pub fn into_aum(self) -> Aum {
        self.aum
    }
}

/// Lifecycle of an authority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStatus {
    /// No genesis yet
    Empty,
    /// A root is known and no update beyond it was ever accepted
    Bootstrapped,
    /// At least one update beyond a root was accepted; compaction keeps this
    Active,
    /// A disablement secret was revealed; terminal
    Disabled,
}

/// Preferred head moved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadChange {
    /// Head before the update
    pub previous: Option<AumHash>,
    /// Head after the update
    pub current: AumHash,
}

/// Result of offering an AUM to the chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// The offered AUM was already accepted; nothing changed
    pub duplicate: bool,
    /// Newly accepted AUMs: the offered one, then any held descendants it released
    pub accepted: Vec<AumHash>,
    /// Held descendants that failed once their parent arrived
    pub rejected: Vec<(AumHash, AumError)>,
    /// Set when the preferred head moved
    pub head_change: Option<HeadChange>,
}

#[derive(Debug)]
struct Node {
    parent: Option<AumHash>,
    kind: AumKind,
    state: Arc<State>,
    weight: u64,
    children: Vec<AumHash>,
}

#[derive(Debug, Clone, Copy)]
struct Branch {
    weight: u64,
    tip: AumHash,
}

/// Single-writer chain engine
///
/// All mutation goes through `&mut self`; wrap it in a lock (as
/// [`NetworkLock`](crate::api::NetworkLock) does) to share it.
pub struct Chain<S: AumStore = MemStore> {
    store: S,
    quorum: QuorumPolicy,
    max_pending: usize,
    max_aum_size: usize,
    root: Option<AumHash>,
    head: Option<AumHash>,
    nodes: HashMap<AumHash, Node>,
    order: Vec<AumHash>,
    best: HashMap<AumHash, Branch>,
    pending: HashMap<AumHash, Vec<VerifiedAum>>,
    disabled: bool,
    /// Some AUM beyond a root has been accepted; survives compaction
    advanced: bool,
}

impl Chain<MemStore> {
    /// Create an empty chain with the default configuration
    pub fn new() -> Self {
        Self::with_config(MemStore::new(), &AuthorityConfig::default())
    }
}

impl Default for Chain<MemStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: AumStore> Chain<S> {
    /// Create an empty chain backed by `store`
    ///
    /// # Arguments
    ///
    /// * `store` - Where accepted AUMs are kept
    /// * `config` - Quorum policy and resource bounds
    pub fn with_config(store: S, config: &AuthorityConfig) -> Self {
        Self {
            store,
            quorum: config.quorum,
            max_pending: config.max_pending,
            max_aum_size: config.max_aum_size,
            root: None,
            head: None,
            nodes: HashMap::new(),
            order: Vec::new(),
            best: HashMap::new(),
            pending: HashMap::new(),
            disabled: false,
            advanced: false,
        }
    }

    /// Current lifecycle stage
    pub fn status(&self) -> ChainStatus {
        if self.disabled {
            ChainStatus::Disabled
        } else {
            match (self.root, self.advanced) {
                (None, _) => ChainStatus::Empty,
                (Some(_), false) => ChainStatus::Bootstrapped,
                (Some(_), true) => ChainStatus::Active,
            }
        }
    }

    /// Tip of the preferred branch
    pub fn head(&self) -> Option<AumHash> {
        self.head
    }

    /// Genesis, or the checkpoint the chain was last compacted to
    pub fn root(&self) -> Option<AumHash> {
        self.root
    }

    /// State at the preferred head
    pub fn state(&self) -> Option<Arc<State>> {
        self.head.and_then(|h| self.state_at(&h))
    }

    /// State produced by an accepted AUM
    pub fn state_at(&self, hash: &AumHash) -> Option<Arc<State>> {
        self.nodes.get(hash).map(|n| Arc::clone(&n.state))
    }

    /// Accepted AUM by content hash
    pub fn get(&self, hash: &AumHash) -> Option<Arc<VerifiedAum>> {
        self.store.get(hash)
    }

    /// Whether an AUM has been accepted
    pub fn contains(&self, hash: &AumHash) -> bool {
        self.nodes.contains_key(hash)
    }

    /// Number of accepted AUMs on all branches
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether nothing has been accepted
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every accepted AUM on all branches, in acceptance order
    pub fn accepted(&self) -> Vec<Arc<VerifiedAum>> {
        self.order.iter().filter_map(|h| self.store.get(h)).collect()
    }

    /// Number of AUMs held until their parent arrives
    pub fn pending_len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Weight of the heaviest branch starting at `hash`, the AUM's own
    /// signer weight included
    pub fn branch_weight(&self, hash: &AumHash) -> Option<u64> {
        self.best.get(hash).map(|b| b.weight)
    }

    /// Accepted AUMs with no accepted children
    pub fn tips(&self) -> Vec<AumHash> {
        self.order
            .iter()
            .filter(|h| self.nodes.get(*h).is_some_and(|n| n.children.is_empty()))
            .copied()
            .collect()
    }

    /// Decode, verify and apply an AUM received as bytes
    pub fn submit_bytes(&mut self, bytes: &[u8]) -> std::result::Result<ApplyOutcome, AumError> {
        let verified = VerifiedAum::from_bytes(bytes, self.max_aum_size)?;
        self.submit(verified)
    }

    /// Apply a verified AUM
    ///
    /// An AUM whose parent is unknown is held (buffer permitting) and
    /// applied automatically once the parent is accepted; either way the
    /// call reports [`AumError::UnknownParent`]. Re-submitting an accepted
    /// AUM succeeds with [`ApplyOutcome::duplicate`] set.
    pub fn submit(&mut self, verified: VerifiedAum) -> std::result::Result<ApplyOutcome, AumError> {
        if self.disabled {
            warn!(aum = %verified.hash(), "rejected AUM: authority is disabled");
            return Err(AumError::AuthorityDisabled);
        }

        let hash = verified.hash();
        if self.nodes.contains_key(&hash) {
            debug!(aum = %hash, "duplicate AUM");
            return Ok(ApplyOutcome {
                duplicate: true,
                ..ApplyOutcome::default()
            });
        }

        if let Some(parent) = verified.aum().prev_aum_hash {
            if !self.nodes.contains_key(&parent) {
                return Err(self.hold(parent, verified));
            }
        }

        let previous_head = self.head;
        if let Err(err) = self.link(verified) {
            warn!(aum = %hash, error = %err, "rejected AUM");
            self.evict_descendants(&hash);
            return Err(err);
        }

        let mut outcome = ApplyOutcome {
            accepted: vec![hash],
            ..ApplyOutcome::default()
        };
        self.release_pending(hash, &mut outcome);
        self.resolve();

        if let Some(current) = self.head.filter(|h| Some(*h) != previous_head) {
            info!(previous = ?previous_head, head = %current, "preferred head changed");
            outcome.head_change = Some(HeadChange {
                previous: previous_head,
                current,
            });
        }

        Ok(outcome)
    }

    /// Start the chain from a trusted checkpoint instead of a genesis
    ///
    /// Used to reload a chain that was compacted: the checkpoint's parent is
    /// no longer available, so its embedded state is taken as given. The
    /// caller vouches for the checkpoint; signatures are verified but no
    /// quorum is checked.
    ///
    /// # Errors
    ///
    /// * [`AumError::AuthorityDisabled`] once disabled
    /// * [`AumError::AlreadyBootstrapped`] if the chain has a root
    /// * [`AumError::StaticValidationFailed`] if `verified` is not a
    ///   checkpoint or its state id is zero
    pub fn bootstrap_from_checkpoint(
        &mut self,
        verified: VerifiedAum,
    ) -> std::result::Result<ApplyOutcome, AumError> {
        if self.disabled {
            return Err(AumError::AuthorityDisabled);
        }
        if self.root.is_some() {
            return Err(AumError::AlreadyBootstrapped);
        }

        let hash = verified.hash();
        let aum = verified.aum();
        let AumMessage::Checkpoint(checkpoint) = &aum.message else {
            return Err(AumError::StaticValidationFailed {
                reason: format!("trusted root must be a checkpoint, not {}", aum.kind()),
            });
        };
        if checkpoint.state_id().is_zero() {
            return Err(AumError::StaticValidationFailed {
                reason: "trusted root state id must be non-zero".to_string(),
            });
        }

        let mut state = checkpoint.clone();
        state.last_aum_hash = Some(hash);
        let node = Node {
            parent: aum.prev_aum_hash,
            kind: AumKind::Checkpoint,
            weight: aum.weight(&state),
            state: Arc::new(state),
            children: Vec::new(),
        };
        info!(aum = %hash, parent = ?node.parent, "bootstrapped from trusted checkpoint");

        self.nodes.insert(hash, node);
        self.order.push(hash);
        self.root = Some(hash);
        self.store.put(Arc::new(verified));
        for waiting in self.pending.values_mut() {
            waiting.retain(|v| v.hash() != hash);
        }
        self.pending.retain(|_, waiting| !waiting.is_empty());

        let mut outcome = ApplyOutcome {
            accepted: vec![hash],
            ..ApplyOutcome::default()
        };
        self.release_pending(hash, &mut outcome);
        self.resolve();
        if let Some(current) = self.head {
            outcome.head_change = Some(HeadChange {
                previous: None,
                current,
            });
        }
        Ok(outcome)
    }

    /// Hashes along the preferred branch, root first
    pub fn chain(&self) -> Vec<AumHash> {
        let mut path = Vec::new();
        let mut cursor = self.head;
        while let Some(hash) = cursor {
            path.push(hash);
            if Some(hash) == self.root {
                break;
            }
            cursor = self.nodes.get(&hash).and_then(|n| n.parent);
        }
        path.reverse();
        path
    }

    /// Updates along the preferred branch, newest first
    pub fn updates(&self) -> Vec<ChainUpdate> {
        self.chain()
            .into_iter()
            .rev()
            .filter_map(|hash| self.store.get(&hash))
            .map(|v| ChainUpdate {
                hash: v.hash(),
                change: v.aum().kind().to_string(),
                raw: v.raw().to_vec(),
            })
            .collect()
    }

    /// Disable the authority by revealing a disablement secret
    ///
    /// Irreversible: every later submission fails with
    /// [`AumError::AuthorityDisabled`].
    ///
    /// # Errors
    ///
    /// * [`AumError::NotBootstrapped`] before genesis
    /// * [`AumError::AuthorityDisabled`] if already disabled
    /// * [`AumError::InvalidDisablementSecret`] if `secret` matches no commitment
    pub fn disable(&mut self, secret: &[u8]) -> Result<()> {
        if self.disabled {
            return Err(AumError::AuthorityDisabled.into());
        }
        let state = self.state().ok_or(AumError::NotBootstrapped)?;

        if !state.check_disablement(secret)? {
            warn!("disablement attempted with a secret matching no commitment");
            return Err(AumError::InvalidDisablementSecret.into());
        }

        self.disabled = true;
        self.pending.clear();
        error!(head = ?self.head, "network lock authority DISABLED by disablement secret");
        Ok(())
    }

    /// Re-root the chain at the last checkpoint on the preferred branch
    ///
    /// Everything not descended from that checkpoint is dropped from the
    /// engine and the store. Returns the number of AUMs removed.
    pub fn compact(&mut self) -> usize {
        let Some(new_root) = self
            .chain()
            .into_iter()
            .rev()
            .find(|h| self.nodes.get(h).is_some_and(|n| n.kind == AumKind::Checkpoint))
        else {
            return 0;
        };
        if Some(new_root) == self.root {
            return 0;
        }

        let mut keep = HashSet::new();
        let mut stack = vec![new_root];
        while let Some(hash) = stack.pop() {
            if keep.insert(hash) {
                if let Some(node) = self.nodes.get(&hash) {
                    stack.extend(node.children.iter().copied());
                }
            }
        }

        let removed: HashSet<AumHash> = self
            .order
            .iter()
            .filter(|h| !keep.contains(*h))
            .copied()
            .collect();
        for hash in &removed {
            self.nodes.remove(hash);
            self.best.remove(hash);
            self.store.remove(hash);
        }
        self.order.retain(|h| keep.contains(h));
        self.pending.retain(|parent, _| !removed.contains(parent));
        self.root = Some(new_root);
        self.resolve();

        info!(root = %new_root, removed = removed.len(), "compacted chain");
        removed.len()
    }

    fn hold(&mut self, parent: AumHash, verified: VerifiedAum) -> AumError {
        let hash = verified.hash();
        let already_held = self
            .pending
            .get(&parent)
            .is_some_and(|w| w.iter().any(|v| v.hash() == hash));
        if already_held {
            return AumError::UnknownParent { parent, held: true };
        }

        if self.pending_len() >= self.max_pending {
            warn!(aum = %hash, parent = %parent, "pending buffer full, not holding AUM");
            return AumError::UnknownParent {
                parent,
                held: false,
            };
        }

        debug!(aum = %hash, parent = %parent, "holding AUM until parent arrives");
        self.pending.entry(parent).or_default().push(verified);
        AumError::UnknownParent { parent, held: true }
    }

    fn release_pending(&mut self, accepted: AumHash, outcome: &mut ApplyOutcome) {
        let mut ready = vec![accepted];
        while let Some(parent) = ready.pop() {
            for child in self.pending.remove(&parent).unwrap_or_default() {
                let hash = child.hash();
                if self.nodes.contains_key(&hash) {
                    continue;
                }
                match self.link(child) {
                    Ok(()) => {
                        outcome.accepted.push(hash);
                        ready.push(hash);
                    }
                    Err(err) => {
                        warn!(aum = %hash, error = %err, "rejected held AUM");
                        self.evict_descendants(&hash);
                        outcome.rejected.push((hash, err));
                    }
                }
            }
        }
    }

    fn evict_descendants(&mut self, rejected: &AumHash) {
        let mut stack = vec![*rejected];
        while let Some(parent) = stack.pop() {
            for orphan in self.pending.remove(&parent).unwrap_or_default() {
                warn!(aum = %orphan.hash(), parent = %parent, "evicted held AUM whose parent was rejected");
                stack.push(orphan.hash());
            }
        }
    }

    /// Validate against the parent state and insert; the parent is known
    fn link(&mut self, verified: VerifiedAum) -> std::result::Result<(), AumError> {
        let hash = verified.hash();
        let aum = verified.aum();

        let (state, weight) = match aum.prev_aum_hash {
            None => {
                if self.root.is_some() {
                    return Err(AumError::AlreadyBootstrapped);
                }
                let AumMessage::Checkpoint(genesis) = &aum.message else {
                    return Err(AumError::StaticValidationFailed {
                        reason: format!("genesis must be a checkpoint, not {}", aum.kind()),
                    });
                };
                if genesis.state_id().is_zero() {
                    return Err(AumError::StaticValidationFailed {
                        reason: "genesis state id must be non-zero".to_string(),
                    });
                }
                if let Some(sig) = aum
                    .signatures
                    .iter()
                    .find(|s| genesis.get_key(&s.key_id).is_none())
                {
                    return Err(AumError::InvalidSignature {
                        key_id: sig.key_id.to_string(),
                        reason: "signer is not a key of the genesis state".to_string(),
                    });
                }

                let mut state = genesis.clone();
                state.last_aum_hash = Some(hash);
                (state, aum.weight(genesis))
            }

            Some(parent) => {
                let parent_state = &self
                    .nodes
                    .get(&parent)
                    .ok_or(AumError::UnknownParent {
                        parent,
                        held: false,
                    })?
                    .state;

                let total = parent_state.total_votes();
                let weight = aum.weight(parent_state);
                if aum.signatures.is_empty() || !self.quorum.is_met(weight, total) {
                    return Err(AumError::QuorumNotMet {
                        have: weight,
                        need: self.quorum.required(total),
                    });
                }

                (parent_state.apply(&aum.message, hash)?, weight)
            }
        };

        let node = Node {
            parent: aum.prev_aum_hash,
            kind: aum.kind(),
            state: Arc::new(state),
            weight,
            children: Vec::new(),
        };
        debug!(aum = %hash, kind = %node.kind, weight, "accepted AUM");

        match node.parent {
            Some(parent) => {
                if let Some(p) = self.nodes.get_mut(&parent) {
                    p.children.push(hash);
                }
                self.invalidate_from(parent);
                self.advanced = true;
            }
            None => self.root = Some(hash),
        }
        self.nodes.insert(hash, node);
        self.order.push(hash);
        self.store.put(Arc::new(verified));
        Ok(())
    }

    fn invalidate_from(&mut self, mut hash: AumHash) {
        loop {
            self.best.remove(&hash);
            match self.nodes.get(&hash).and_then(|n| n.parent) {
                Some(parent) if self.nodes.contains_key(&parent) => hash = parent,
                _ => break,
            }
        }
    }

    fn resolve(&mut self) {
        // Children are always accepted after their parent, so a reverse walk
        // sees every child before the node itself.
        for hash in self.order.iter().rev() {
            if self.best.contains_key(hash) {
                continue;
            }
            let Some(node) = self.nodes.get(hash) else {
                continue;
            };

            let heaviest = node
                .children
                .iter()
                .filter_map(|c| self.best.get(c).map(|b| (c, *b)))
                .max_by(|(ha, a), (hb, b)| a.weight.cmp(&b.weight).then_with(|| hb.cmp(ha)));

            let branch = match heaviest {
                Some((_, child)) => Branch {
                    weight: node.weight + child.weight,
                    tip: child.tip,
                },
                None => Branch {
                    weight: node.weight,
                    tip: *hash,
                },
            };
            self.best.insert(*hash, branch);
        }

        self.head = self.root.and_then(|r| self.best.get(&r)).map(|b| b.tip);
    }
}
