//! Configuration types for a network-lock authority
//!
//! This module defines [`AuthorityConfig`], which bounds the resources the
//! chain engine may use, and [`QuorumPolicy`], which decides how much signer
//! weight an update needs.

use crate::error::{ConfigError, Result};
use crate::protocol::MAX_AUM_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default bound on AUMs held while their parent is unknown
pub const DEFAULT_MAX_PENDING: usize = 64;

/// Default per-parent fetch timeout in milliseconds
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 5_000;

/// Default bound on parents fetched for a single submission
pub const DEFAULT_MAX_FETCH_DEPTH: usize = 128;

/// How much trusted signer weight an update needs
///
/// Weight is always measured against the state at the update's parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuorumPolicy {
    /// Strictly more than half of the parent state's total votes (default)
    #[default]
    Majority,

    /// At least a fixed number of votes
    Threshold {
        /// Required vote weight
        votes: u64,
    },

    /// Any single trusted signer
    AnySigner,
}

impl QuorumPolicy {
    /// Whether `weight` signed votes suffice out of `total`
    pub fn is_met(&self, weight: u64, total: u64) -> bool {
        match self {
            Self::Majority => weight.saturating_mul(2) > total,
            Self::Threshold { votes } => weight >= *votes,
            Self::AnySigner => weight >= 1,
        }
    }

    /// Smallest weight that satisfies the policy out of `total`
    pub fn required(&self, total: u64) -> u64 {
        match self {
            Self::Majority => total / 2 + 1,
            Self::Threshold { votes } => *votes,
            Self::AnySigner => 1,
        }
    }
}

/// Complete authority configuration
///
/// Every field has a default, so a config file only needs to name what it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Signer weight required for an update to apply
    pub quorum: QuorumPolicy,

    /// Maximum number of AUMs held until their parent arrives
    ///
    /// Zero disables holding entirely.
    pub max_pending: usize,

    /// Timeout for fetching a single missing parent, in milliseconds
    pub fetch_timeout_ms: u64,

    /// Maximum number of parents fetched while syncing one AUM
    pub max_fetch_depth: usize,

    /// Byte limit enforced before any AUM is decoded
    pub max_aum_size: usize,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            quorum: QuorumPolicy::default(),
            max_pending: DEFAULT_MAX_PENDING,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            max_fetch_depth: DEFAULT_MAX_FETCH_DEPTH,
            max_aum_size: MAX_AUM_SIZE,
        }
    }
}

impl AuthorityConfig {
    /// Set the quorum policy
    pub fn with_quorum(mut self, quorum: QuorumPolicy) -> Self {
        self.quorum = quorum;
        self
    }

    /// Set the pending buffer bound
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Set the per-parent fetch timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the fetch depth bound
    pub fn with_max_fetch_depth(mut self, depth: usize) -> Self {
        self.max_fetch_depth = depth;
        self
    }

    /// Set the decode size limit
    pub fn with_max_aum_size(mut self, size: usize) -> Self {
        self.max_aum_size = size;
        self
    }

    /// Per-parent fetch timeout
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if:
    /// - `fetch_timeout_ms` is zero
    /// - `max_fetch_depth` is zero
    /// - `max_aum_size` is zero
    /// - the quorum is a threshold of zero votes
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, reason: &str| ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if self.fetch_timeout_ms == 0 {
            return Err(invalid("fetch_timeout_ms", "must be greater than 0").into());
        }
        if self.max_fetch_depth == 0 {
            return Err(invalid("max_fetch_depth", "must be greater than 0").into());
        }
        if self.max_aum_size == 0 {
            return Err(invalid("max_aum_size", "must be greater than 0").into());
        }
        if self.quorum == (QuorumPolicy::Threshold { votes: 0 }) {
            return Err(invalid("quorum", "threshold must require at least one vote").into());
        }

        Ok(())
    }

    /// Save configuration to a JSON file
    ///
    /// # Example
    ///
    /// ```no_run
    /// use netlock::api::AuthorityConfig;
    /// use std::path::Path;
    ///
    /// AuthorityConfig::default().save(Path::new("authority.json")).unwrap();
    /// ```
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        // Pretty JSON for human readability
        let json = serde_json::to_string_pretty(self).map_err(ConfigError::from)?;

        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }

    /// Load and validate configuration from a JSON file
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file can't be read
    /// - The file contains invalid JSON
    /// - The loaded values fail [`validate`](Self::validate)
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_json::from_str(&json).map_err(ConfigError::from)?;
        config.validate()?;

        Ok(config)
    }
}
