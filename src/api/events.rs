//! Event system for chain notifications
//!
//! This module defines the events a [`NetworkLock`](super::NetworkLock)
//! emits as AUMs are accepted, held or rejected, and the handler registry
//! that delivers them.

use crate::authority::AumKind;
use crate::crypto::AumHash;
use crate::error::AumError;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::error;

/// Notification about a change to the authority
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    /// An AUM was applied to the chain
    Accepted {
        /// Content hash
        hash: AumHash,
        /// Kind of update
        kind: AumKind,
    },

    /// An AUM is waiting for its parent
    Held {
        /// Content hash
        hash: AumHash,
        /// The missing parent
        parent: AumHash,
    },

    /// An AUM failed validation against the chain
    Rejected {
        /// Content hash
        hash: AumHash,
        /// Why it was rejected
        error: AumError,
    },

    /// The preferred head moved
    HeadChanged {
        /// Head before the change
        previous: Option<AumHash>,
        /// New head
        current: AumHash,
    },

    /// The authority was disabled; no further events follow
    Disabled,
}

impl ChainEvent {
    /// AUM the event concerns, if any
    pub fn hash(&self) -> Option<AumHash> {
        match self {
            Self::Accepted { hash, .. } | Self::Held { hash, .. } | Self::Rejected { hash, .. } => {
                Some(*hash)
            }
            Self::HeadChanged { current, .. } => Some(*current),
            Self::Disabled => None,
        }
    }
}

/// Identifies one registered handler
///
/// Dropping the handle does not unsubscribe; pass it to
/// [`NetworkLock::unsubscribe`](super::NetworkLock::unsubscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionHandle(u64);

/// Shared event handler callback
pub type EventCallback = Arc<dyn Fn(ChainEvent) + Send + Sync + 'static>;

/// Registry of handlers, keyed by handle so delivery follows subscription order
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct EventHandlers {
    handlers: Arc<RwLock<BTreeMap<SubscriptionHandle, EventCallback>>>,
    next_id: Arc<AtomicU64>,
}

impl EventHandlers {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for every event dispatched from now on
    ///
    /// # Arguments
    ///
    /// * `callback` - Invoked once per event, on the dispatching thread
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(ChainEvent) + Send + Sync + 'static,
    {
        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().insert(handle, Arc::new(callback));
        handle
    }

    /// Remove a handler; unknown handles are ignored
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.handlers.write().remove(&handle);
    }

    /// Deliver `event` to every handler
    ///
    /// A panicking handler is logged and the rest still run.
    pub fn dispatch(&self, event: ChainEvent) {
        // Handlers may (un)subscribe from inside a callback
        let callbacks: Vec<(SubscriptionHandle, EventCallback)> = self
            .handlers
            .read()
            .iter()
            .map(|(handle, callback)| (*handle, Arc::clone(callback)))
            .collect();

        for (handle, callback) in callbacks {
            let delivered = event.clone();
            let result =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(delivered)));
            if let Err(payload) = result {
                let reason = payload
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                    .unwrap_or("unknown panic");
                error!(?handle, aum = ?event.hash(), reason, "event handler panicked");
            }
        }
    }

    /// Number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }
}
