//! Load/save path resolution for versioned datasets.
//!
//! A versioned dataset stored at `data/aia.fits` keeps each version in its
//! own directory: `data/aia.fits/<version>/aia.fits`. Version ids are UTC
//! timestamps, so the lexically greatest id is the most recent one.

use crate::core::protocol::{file_name, get_filepath_str};
use crate::domain::ports::FileSystem;
use crate::utils::error::{DatasetError, Result};
use crate::utils::validation::validate_version_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

pub const VERSION_FORMAT: &str = "%Y-%m-%dT%H.%M.%S%.3fZ";

/// Requested versions. `None` on either side means "latest" for loads and
/// "mint a new timestamp" for saves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    #[serde(default)]
    pub load: Option<String>,
    #[serde(default)]
    pub save: Option<String>,
}

impl Version {
    pub fn new(load: Option<String>, save: Option<String>) -> Self {
        Self { load, save }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(load) = &self.load {
            validate_version_id("version.load", load)?;
        }
        if let Some(save) = &self.save {
            validate_version_id("version.save", save)?;
        }
        Ok(())
    }
}

pub fn generate_timestamp() -> String {
    format_version(Utc::now())
}

pub fn format_version(at: DateTime<Utc>) -> String {
    at.format(VERSION_FORMAT).to_string()
}

#[derive(Debug, Default)]
struct VersionCache {
    load: Option<String>,
    save: Option<String>,
}

/// Resolves the concrete load and save paths of one dataset. Resolved
/// versions are cached until `clear_cache`, so repeated loads within a run
/// read the same version even if newer ones appear on disk.
#[derive(Debug)]
pub struct VersionedPath {
    filepath: String,
    protocol: String,
    version: Option<Version>,
    cache: Mutex<VersionCache>,
}

impl VersionedPath {
    pub fn new(filepath: String, protocol: String, version: Option<Version>) -> Self {
        Self {
            filepath,
            protocol,
            version,
            cache: Mutex::new(VersionCache::default()),
        }
    }

    pub fn filepath(&self) -> &str {
        &self.filepath
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn is_versioned(&self) -> bool {
        self.version.is_some()
    }

    /// Filesystem path of the unversioned dataset location.
    pub fn filepath_str(&self) -> String {
        get_filepath_str(&self.filepath, &self.protocol)
    }

    pub fn versioned_path(&self, version: &str) -> String {
        format!("{}/{}/{}", self.filepath, version, file_name(&self.filepath))
    }

    fn cache(&self) -> MutexGuard<'_, VersionCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn clear_cache(&self) {
        let mut cache = self.cache();
        cache.load = None;
        cache.save = None;
    }

    pub fn resolve_load_version(&self, fs: &dyn FileSystem) -> Result<Option<String>> {
        let Some(version) = &self.version else {
            return Ok(None);
        };
        if let Some(load) = &version.load {
            return Ok(Some(load.clone()));
        }

        let mut cache = self.cache();
        if let Some(load) = &cache.load {
            return Ok(Some(load.clone()));
        }
        let latest = self.fetch_latest_load_version(fs)?;
        cache.load = Some(latest.clone());
        Ok(Some(latest))
    }

    pub fn resolve_save_version(&self) -> Option<String> {
        let version = self.version.as_ref()?;
        if let Some(save) = &version.save {
            return Some(save.clone());
        }
        let mut cache = self.cache();
        let save = cache.save.get_or_insert_with(generate_timestamp);
        Some(save.clone())
    }

    fn fetch_latest_load_version(&self, fs: &dyn FileSystem) -> Result<String> {
        let pattern = get_filepath_str(&self.versioned_path("*"), &self.protocol);
        let mut candidates = fs.glob(&pattern)?;
        candidates.sort_unstable_by(|a, b| b.cmp(a));

        for candidate in candidates {
            if !fs.exists(&candidate)? {
                continue;
            }
            if let Some(version) = parent_name(&candidate) {
                tracing::debug!("Resolved latest version {} for {}", version, self.filepath);
                return Ok(version.to_string());
            }
        }

        Err(DatasetError::VersionNotFound {
            message: format!("Did not find any versions for {}", self.filepath),
        })
    }

    pub fn load_path(&self, fs: &dyn FileSystem) -> Result<String> {
        let path = match self.resolve_load_version(fs)? {
            Some(version) => self.versioned_path(&version),
            None => self.filepath.clone(),
        };
        Ok(get_filepath_str(&path, &self.protocol))
    }

    /// A versioned save path must not exist yet; versions are immutable.
    pub fn save_path(&self, fs: &dyn FileSystem) -> Result<String> {
        let Some(version) = self.resolve_save_version() else {
            return Ok(self.filepath_str());
        };

        let path = get_filepath_str(&self.versioned_path(&version), &self.protocol);
        if fs.exists(&path)? {
            return Err(DatasetError::persistence(format!(
                "Save path '{}' for {} must not exist if versioning is enabled",
                path, self.filepath
            )));
        }
        Ok(path)
    }
}

fn parent_name(path: &str) -> Option<&str> {
    let mut segments = path.rsplit('/');
    segments.next()?;
    segments.next().filter(|name| !name.is_empty())
}
