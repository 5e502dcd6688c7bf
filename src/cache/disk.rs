//! File-backed reply cache.
//!
//! Layout: `<root>/<seed>/<fingerprint>.json`. A legacy layout kept every
//! entry under `<legacy_root>/<LEGACY_DEFAULT_SEED>/`; it is read, never
//! written, and only for calls that did not pick a seed.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::config::CacheConfig;
use crate::error::ConfabError;

use super::{CacheEntry, CacheSeed, ReplyCache, LEGACY_DEFAULT_SEED};

/// Reply cache persisted as one JSON file per entry.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
    legacy_root: Option<PathBuf>,
    default_seed: u64,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            legacy_root: None,
            default_seed: LEGACY_DEFAULT_SEED,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            root: config.root.clone(),
            legacy_root: config.legacy_root.clone(),
            default_seed: config.default_seed,
        }
    }

    /// Enable transparent reads from the legacy layout.
    pub fn with_legacy_root(mut self, legacy_root: impl Into<PathBuf>) -> Self {
        self.legacy_root = Some(legacy_root.into());
        self
    }

    pub fn with_default_seed(mut self, seed: u64) -> Self {
        self.default_seed = seed;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one seed namespace.
    pub fn namespace_dir(&self, seed: u64) -> PathBuf {
        self.root.join(seed.to_string())
    }

    fn legacy_path(&self, fingerprint: &str) -> Option<PathBuf> {
        self.legacy_root.as_ref().map(|legacy| {
            legacy
                .join(LEGACY_DEFAULT_SEED.to_string())
                .join(format!("{fingerprint}.json"))
        })
    }

    fn entry_path(&self, seed: u64, fingerprint: &str) -> PathBuf {
        self.namespace_dir(seed).join(format!("{fingerprint}.json"))
    }

    fn read_entry(path: &Path) -> Result<Option<CacheEntry>, ConfabError> {
        let raw = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "ignoring unreadable cache entry");
                Ok(None)
            }
        }
    }

    /// Write via a unique temp file and rename, so concurrent writers of the
    /// same key never leave a torn file behind.
    fn write_entry(path: &Path, entry: &CacheEntry) -> Result<(), ConfabError> {
        let parent = path.parent().ok_or_else(|| {
            ConfabError::Configuration(format!("cache path {} has no parent", path.display()))
        })?;
        fs::create_dir_all(parent)?;

        let serialized = serde_json::to_string_pretty(entry)?;
        let tmp_path = parent.join(format!(
            ".{}.{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("entry"),
            uuid::Uuid::new_v4()
        ));
        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(serialized.as_bytes())?;
        tmp_file.sync_all()?;
        drop(tmp_file);

        if let Err(err) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err.into());
        }
        Ok(())
    }
}

fn check_fingerprint(fingerprint: &str) -> Result<(), ConfabError> {
    let valid = !fingerprint.is_empty()
        && fingerprint
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfabError::Configuration(format!(
            "invalid cache fingerprint '{fingerprint}'"
        )))
    }
}

impl ReplyCache for DiskCache {
    fn get(&self, seed: CacheSeed, fingerprint: &str) -> Result<Option<CacheEntry>, ConfabError> {
        check_fingerprint(fingerprint)?;
        let Some(resolved) = seed.resolve(self.default_seed) else {
            return Ok(None);
        };

        if let Some(entry) = Self::read_entry(&self.entry_path(resolved, fingerprint))? {
            return Ok(Some(entry));
        }

        if seed != CacheSeed::Default {
            return Ok(None);
        }
        match self.legacy_path(fingerprint) {
            Some(path) => {
                let entry = Self::read_entry(&path)?;
                if entry.is_some() {
                    tracing::debug!(fingerprint, "cache hit in legacy layout");
                }
                Ok(entry)
            }
            None => Ok(None),
        }
    }

    fn put(&self, seed: CacheSeed, fingerprint: &str, entry: &CacheEntry) -> Result<(), ConfabError> {
        check_fingerprint(fingerprint)?;
        let Some(resolved) = seed.resolve(self.default_seed) else {
            return Ok(());
        };
        let path = self.entry_path(resolved, fingerprint);

        if let Some(existing) = Self::read_entry(&path)? {
            if existing.same_content(entry) {
                return Ok(());
            }
            tracing::warn!(
                seed = resolved,
                fingerprint,
                "overwriting cached reply with different content"
            );
        }
        Self::write_entry(&path, entry)
    }

    fn clear(&self, seed: CacheSeed) -> Result<(), ConfabError> {
        let Some(resolved) = seed.resolve(self.default_seed) else {
            return Ok(());
        };
        match fs::remove_dir_all(self.namespace_dir(resolved)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
