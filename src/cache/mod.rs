//! Content-addressed reply cache, namespaced by seed.
//!
//! Keys are `(seed, fingerprint)`. A disabled seed makes every lookup a miss
//! and every write a no-op. Only [`CacheSeed::Default`] may read through to
//! the legacy on-disk layout; writes always land in the current layout.

pub mod disk;
pub mod memory;

pub use disk::DiskCache;
pub use memory::InMemoryCache;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfabError;
use crate::types::{Cost, Usage};

/// Seed under which legacy caches stored every entry.
pub const LEGACY_DEFAULT_SEED: u64 = 41;

/// Cache namespace selector for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSeed {
    /// Caller did not pick a seed: use the backend's default seed.
    #[default]
    Default,
    /// Explicit seed namespace.
    Seed(u64),
    /// Caching disabled for this call.
    Disabled,
}

impl CacheSeed {
    /// Resolve to a concrete namespace, `None` when caching is disabled.
    pub fn resolve(self, default_seed: u64) -> Option<u64> {
        match self {
            Self::Default => Some(default_seed),
            Self::Seed(seed) => Some(seed),
            Self::Disabled => None,
        }
    }

    pub fn is_disabled(self) -> bool {
        matches!(self, Self::Disabled)
    }
}

impl From<Option<u64>> for CacheSeed {
    fn from(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::Seed(seed),
            None => Self::Disabled,
        }
    }
}

/// A cached completion response plus its accounting metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    /// Serialized response, returned byte-for-byte on a hit.
    pub response: String,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub cost: Cost,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(response: impl Into<String>, usage: Usage, cost: Cost) -> Self {
        Self {
            response: response.into(),
            usage,
            cost,
            model: None,
            created_at: Utc::now(),
        }
    }

    /// Same content, ignoring when it was written.
    pub fn same_content(&self, other: &CacheEntry) -> bool {
        self.response == other.response
            && self.usage == other.usage
            && self.cost == other.cost
            && self.model == other.model
    }
}

/// Storage backend for cached replies.
///
/// Implementations must tolerate concurrent `get`/`put` from many
/// conversations; concurrent writes of the same key carry the same content
/// and must not corrupt the store.
pub trait ReplyCache: Send + Sync {
    fn get(&self, seed: CacheSeed, fingerprint: &str) -> Result<Option<CacheEntry>, ConfabError>;

    fn put(&self, seed: CacheSeed, fingerprint: &str, entry: &CacheEntry) -> Result<(), ConfabError>;

    /// Drop every entry of one namespace.
    fn clear(&self, seed: CacheSeed) -> Result<(), ConfabError>;
}
