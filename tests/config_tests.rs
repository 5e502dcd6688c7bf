//! Tests for configuration system.

mod common;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use common::MockCompletionService;
use confab::cache::CacheSeed;
use confab::completion::{CompletionClient, CompletionRequest};
use confab::config::ConfabConfig;
use confab::error::ConfabError;
use confab::types::ModelMessage;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const CONFIG_ENV_VARS: [&str; 4] = [
    "CONFAB_CACHE_DIR",
    "CONFAB_LEGACY_CACHE_DIR",
    "CONFAB_CACHE_SEED",
    "CONFAB_COMPLETION_TIMEOUT_MS",
];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn capture(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|key| ((*key).to_string(), std::env::var(key).ok()))
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn clean_env() -> EnvGuard {
    let guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    for key in CONFIG_ENV_VARS {
        std::env::remove_var(key);
    }
    guard
}

#[test]
fn config_defaults() {
    let config = ConfabConfig::default();
    assert!(config.cache.enabled);
    assert_eq!(config.cache.default_seed, 41);
    assert_eq!(config.cache.legacy_root, Some(PathBuf::from(".cache")));
    assert!(config.cache.root.ends_with(".confab/cache"));
    assert_eq!(config.completion.timeout(), Some(Duration::from_secs(600)));
    assert_eq!(config.completion.retry_policy().max_attempts, 3);
}

#[test]
fn config_from_env_maps_cache_and_timeout() {
    let _env_lock = env_lock_guard();
    let _env_guard = clean_env();

    std::env::set_var("CONFAB_CACHE_DIR", "/tmp/confab-test-cache");
    std::env::set_var("CONFAB_LEGACY_CACHE_DIR", "/tmp/confab-legacy");
    std::env::set_var("CONFAB_CACHE_SEED", "49");
    std::env::set_var("CONFAB_COMPLETION_TIMEOUT_MS", "1500");

    let config = ConfabConfig::from_env();

    assert_eq!(config.cache.root, PathBuf::from("/tmp/confab-test-cache"));
    assert_eq!(config.cache.legacy_root, Some(PathBuf::from("/tmp/confab-legacy")));
    assert_eq!(config.cache.default_seed, 49);
    assert_eq!(config.completion.timeout(), Some(Duration::from_millis(1500)));
}

#[test]
fn config_from_env_seed_none_disables_cache() {
    let _env_lock = env_lock_guard();
    let _env_guard = clean_env();

    std::env::set_var("CONFAB_CACHE_SEED", "none");
    let config = ConfabConfig::from_env();

    assert!(!config.cache.enabled);
    assert_eq!(config.cache.seed(), CacheSeed::Disabled);
    assert!(config.cache.build().is_none());
}

#[test]
fn config_from_env_ignores_invalid_values() {
    let _env_lock = env_lock_guard();
    let _env_guard = clean_env();

    std::env::set_var("CONFAB_CACHE_SEED", "forty-one");
    std::env::set_var("CONFAB_COMPLETION_TIMEOUT_MS", "soon");
    let config = ConfabConfig::from_env();

    assert_eq!(config.cache.default_seed, 41);
    assert_eq!(config.completion.timeout_ms, Some(600_000));
}

#[test]
fn config_load_applies_env_over_file() {
    let _env_lock = env_lock_guard();
    let _env_guard = clean_env();

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("confab.toml");
    std::fs::write(
        &path,
        r#"
        [cache]
        default_seed = 7
        legacy_root = "/srv/old-cache"

        [completion]
        timeout_ms = 2000
        max_attempts = 1
        "#,
    )
    .unwrap();
    std::env::set_var("CONFAB_COMPLETION_TIMEOUT_MS", "9000");

    let config = ConfabConfig::load(&path).unwrap();

    assert_eq!(config.cache.default_seed, 7);
    assert_eq!(config.cache.legacy_root, Some(PathBuf::from("/srv/old-cache")));
    assert_eq!(config.completion.timeout_ms, Some(9000));
    assert_eq!(config.completion.max_attempts, 1);
}

#[test]
fn config_load_missing_file_is_io_error() {
    let err = ConfabConfig::load(std::path::Path::new("/definitely/not/here.toml")).unwrap_err();
    assert!(matches!(err, ConfabError::Io(_)));
}

#[tokio::test]
async fn cache_config_builds_a_disk_cache_for_the_client() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = ConfabConfig::from_toml_str(&format!(
        "[cache]\nroot = {:?}\nlegacy_root = {:?}\n",
        dir.path().join("cache").display().to_string(),
        dir.path().join("legacy").display().to_string(),
    ))
    .unwrap();

    let service = Arc::new(MockCompletionService::new());
    let client = CompletionClient::from_config(service.clone(), &config.completion)
        .with_cache(config.cache.build().unwrap());
    let request = CompletionRequest::new(vec![ModelMessage::user("persist me")]);

    client.create(&request, config.cache.seed()).await.unwrap();
    client.create(&request, config.cache.seed()).await.unwrap();

    assert_eq!(service.calls(), 1);
    assert!(dir.path().join("cache").join("41").is_dir());
}
