//! High-level API for netlock
//!
//! This module provides the public-facing handle applications use to run a
//! network-lock authority: configuration, events, the concurrent
//! [`NetworkLock`] and an in-memory [`AumRegistry`] for syncing between
//! locks in one process.

pub mod config;
pub mod events;
pub mod lock;
pub mod registry;

// Re-export main types for convenience
pub use config::{
    AuthorityConfig, QuorumPolicy, DEFAULT_FETCH_TIMEOUT_MS, DEFAULT_MAX_FETCH_DEPTH,
    DEFAULT_MAX_PENDING,
};
pub use events::{ChainEvent, EventCallback, EventHandlers, SubscriptionHandle};
pub use lock::{AumFetcher, NetworkLock, NetworkLockBuilder, Snapshot};
pub use registry::AumRegistry;
