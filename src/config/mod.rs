//! Configuration system (layered: defaults < TOML file < environment).

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheSeed, DiskCache, ReplyCache, LEGACY_DEFAULT_SEED};
use crate::error::ConfabError;
use crate::util::retry::RetryPolicy;

/// Global default config (lazy-initialized from env).
static DEFAULT_CONFIG: OnceLock<ConfabConfig> = OnceLock::new();

/// Top-level configuration.
///
/// ```toml
/// [cache]
/// root = "/var/cache/confab"
/// default_seed = 7
///
/// [completion]
/// timeout_ms = 60000
/// max_attempts = 2
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfabConfig {
    pub cache: CacheConfig,
    pub completion: CompletionConfig,
}

/// Reply cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// `false` disables caching for every call.
    pub enabled: bool,
    /// Root of the current seed-scoped layout.
    pub root: PathBuf,
    /// Root of the legacy single-seed layout, read-only.
    pub legacy_root: Option<PathBuf>,
    /// Seed used when a caller does not pick one.
    pub default_seed: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: default_cache_dir(),
            legacy_root: Some(PathBuf::from(".cache")),
            default_seed: LEGACY_DEFAULT_SEED,
        }
    }
}

impl CacheConfig {
    /// Seed to use for calls that do not pick one.
    pub fn seed(&self) -> CacheSeed {
        if self.enabled {
            CacheSeed::Default
        } else {
            CacheSeed::Disabled
        }
    }

    /// Disk cache for this config, `None` when caching is disabled.
    pub fn build(&self) -> Option<Arc<dyn ReplyCache>> {
        self.enabled
            .then(|| Arc::new(DiskCache::from_config(self)) as Arc<dyn ReplyCache>)
    }
}

/// Completion backend call settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub timeout_ms: Option<u64>,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            timeout_ms: Some(600_000),
            max_attempts: retry.max_attempts,
            initial_backoff_ms: retry.initial_backoff.as_millis() as u64,
            max_backoff_ms: retry.max_backoff.as_millis() as u64,
        }
    }
}

impl CompletionConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            ..RetryPolicy::default()
        }
    }
}

impl ConfabConfig {
    /// Defaults overlaid with environment variables (and `.env`, if present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfabError> {
        toml::from_str(raw).map_err(|e| ConfabError::Configuration(e.to_string()))
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfabError> {
        let _ = dotenvy::dotenv();
        let raw = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env();
        Ok(config)
    }

    /// Get (or create) the global default config.
    pub fn global() -> &'static ConfabConfig {
        DEFAULT_CONFIG.get_or_init(Self::from_env)
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("CONFAB_CACHE_DIR") {
            self.cache.root = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("CONFAB_LEGACY_CACHE_DIR") {
            self.cache.legacy_root = Some(PathBuf::from(dir));
        }
        if let Ok(seed) = std::env::var("CONFAB_CACHE_SEED") {
            self.apply_seed(&seed);
        }
        if let Ok(ms) = std::env::var("CONFAB_COMPLETION_TIMEOUT_MS") {
            match ms.trim().parse::<u64>() {
                Ok(ms) => self.completion.timeout_ms = Some(ms),
                Err(_) => tracing::warn!(value = %ms, "ignoring invalid CONFAB_COMPLETION_TIMEOUT_MS"),
            }
        }
    }

    fn apply_seed(&mut self, raw: &str) {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("none") {
            self.cache.enabled = false;
            return;
        }
        match raw.parse::<u64>() {
            Ok(seed) => {
                self.cache.enabled = true;
                self.cache.default_seed = seed;
            }
            Err(_) => tracing::warn!(value = %raw, "ignoring invalid CONFAB_CACHE_SEED"),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".confab").join("cache"))
        .unwrap_or_else(|| PathBuf::from(".confab/cache"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn toml_overrides_defaults() {
        let config = ConfabConfig::from_toml_str(
            r#"
            [cache]
            root = "/tmp/confab"
            default_seed = 7

            [completion]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.root, PathBuf::from("/tmp/confab"));
        assert_eq!(config.cache.default_seed, 7);
        assert!(config.cache.enabled);
        assert_eq!(config.completion.max_attempts, 5);
        assert_eq!(config.completion.timeout(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn seed_none_disables_cache() {
        let mut config = ConfabConfig::default();
        config.apply_seed("None");
        assert_eq!(config.cache.seed(), CacheSeed::Disabled);
        assert!(config.cache.build().is_none());

        config.apply_seed("13");
        assert_eq!(config.cache.default_seed, 13);
        assert_eq!(config.cache.seed(), CacheSeed::Default);
    }

    #[test]
    fn invalid_toml_is_configuration_error() {
        let err = ConfabConfig::from_toml_str("[cache\n").unwrap_err();
        assert!(matches!(err, ConfabError::Configuration(_)));
    }

    #[test]
    fn retry_policy_never_drops_below_one_attempt() {
        let config = CompletionConfig {
            max_attempts: 0,
            ..CompletionConfig::default()
        };
        assert_eq!(config.retry_policy().max_attempts, 1);
    }
}
