pub mod fits_dataset;
pub mod map_dataset;

pub use fits_dataset::{FitsDataset, FitsDatasetConfig};
pub use map_dataset::{MapDataset, MapDatasetConfig};

use crate::adapters::storage::FileSystemRegistry;
use crate::config::args::{Credentials, FsArgs, OpenArgs, OpenMode};
use crate::core::protocol::{get_protocol_and_path, normalize_posix};
use crate::core::version::{Version, VersionedPath};
use crate::domain::ports::{Description, FileSystem};
use crate::utils::error::{DatasetError, ErrorKind, Result};
use crate::utils::validation::validate_filepath;
use serde_json::Value;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

/// Filesystem and version plumbing shared by every file-backed dataset:
/// one filesystem handle, one versioned path and the open args for each
/// direction.
#[derive(Debug)]
pub struct VersionedFsDataset {
    fs: Arc<dyn FileSystem>,
    path: VersionedPath,
    open_args_load: OpenArgs,
    open_args_save: OpenArgs,
}

impl VersionedFsDataset {
    pub fn new(
        filepath: &str,
        version: Option<Version>,
        credentials: &Credentials,
        fs_args: FsArgs,
        registry: &FileSystemRegistry,
    ) -> Result<Self> {
        validate_filepath("filepath", filepath)?;
        if let Some(version) = &version {
            version.validate()?;
        }

        let (mut options, open_args_load, mut open_args_save) = fs_args.split();
        let (protocol, path) = get_protocol_and_path(filepath, version.is_some())?;
        if protocol == "file" {
            options.auto_mkdir.get_or_insert(true);
        }
        let fs = registry.filesystem(&protocol, credentials, &options)?;

        open_args_load.read_mode()?;
        open_args_save.write_mode()?;
        fs.check_open_args("fs_args.open_args_load", &open_args_load)?;
        fs.check_open_args("fs_args.open_args_save", &open_args_save)?;
        open_args_save.mode.get_or_insert(OpenMode::WriteBinary);

        tracing::debug!("Dataset path {} resolved to {}://{}", filepath, protocol, path);
        Ok(Self {
            fs,
            path: VersionedPath::new(normalize_posix(&path), protocol, version),
            open_args_load,
            open_args_save,
        })
    }

    pub fn protocol(&self) -> &str {
        self.path.protocol()
    }

    pub fn filepath(&self) -> &str {
        self.path.filepath()
    }

    pub fn version(&self) -> Option<&Version> {
        self.path.version()
    }

    pub fn filesystem(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn open_args_load(&self) -> &OpenArgs {
        &self.open_args_load
    }

    pub fn open_args_save(&self) -> &OpenArgs {
        &self.open_args_save
    }

    pub fn load_path(&self) -> Result<String> {
        self.path.load_path(self.fs.as_ref())
    }

    pub fn save_path(&self) -> Result<String> {
        self.path.save_path(self.fs.as_ref())
    }

    /// Opens the current load path for reading.
    pub fn open_load(&self) -> Result<(String, Box<dyn Read + Send>)> {
        let load_path = self.load_path()?;
        tracing::debug!("Opening {} for reading", load_path);
        let stream = self.fs.open_read(&load_path, &self.open_args_load)?;
        Ok((load_path, stream))
    }

    /// Opens `save_path` for writing with the configured save args, or
    /// with `mode` in their place. Any failure is a persistence error.
    pub fn open_save(
        &self,
        save_path: &str,
        mode: Option<OpenMode>,
    ) -> Result<Box<dyn Write + Send>> {
        let mut args = self.open_args_save.clone();
        if let Some(mode) = mode {
            args.mode = Some(mode);
        }
        tracing::debug!("Opening {} for writing ({})", save_path, args.write_mode()?);
        self.fs.open_write(save_path, &args).map_err(|e| {
            DatasetError::persistence(format!("Failed to open '{}' for writing: {}", save_path, e))
        })
    }

    /// Runs one versioned save: resolves a fresh save path, hands it to
    /// `write`, then invalidates caches and checks that a subsequent load
    /// would read what was just written.
    pub fn save_with<F>(&self, write: F) -> Result<()>
    where
        F: FnOnce(&str) -> Result<()>,
    {
        self.path.clear_cache();
        let save_path = self.save_path()?;
        write(&save_path)?;
        self.invalidate_cache();

        if let Some(save_version) = self.path.resolve_save_version() {
            match self.path.resolve_load_version(self.fs.as_ref()) {
                Ok(Some(load_version)) if load_version != save_version => {
                    tracing::warn!(
                        "Save version '{}' did not match load version '{}' for {}. \
                         This is strongly discouraged due to inconsistencies it may cause \
                         between 'save' and 'load' operations. Please refrain from setting \
                         exact load version for intermediate datasets where possible to \
                         avoid this warning.",
                        save_version,
                        load_version,
                        self
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::debug!("Could not resolve load version after save: {}", e),
            }
        }
        Ok(())
    }

    /// Resolution failures (no version found, unreadable listing) mean
    /// there is nothing to check, so they answer `false`.
    pub fn exists(&self) -> Result<bool> {
        let load_path = match self.load_path() {
            Ok(path) => path,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::Io) => {
                tracing::debug!("{} does not resolve to a load path: {}", self, e);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        self.fs.exists(&load_path)
    }

    pub fn invalidate_cache(&self) {
        let filepath = self.path.filepath_str();
        tracing::debug!("Invalidating filesystem cache for {}", filepath);
        self.fs.invalidate_cache(&filepath);
    }

    /// Forgets resolved versions, then cached filesystem metadata.
    pub fn release(&self) {
        self.path.clear_cache();
        self.invalidate_cache();
    }

    /// Keys common to every dataset description.
    pub fn describe_into(&self, description: &mut Description) {
        description.insert("filepath".into(), Value::from(self.filepath()));
        description.insert("protocol".into(), Value::from(self.protocol()));
        description.insert(
            "version".into(),
            self.version()
                .and_then(|v| serde_json::to_value(v).ok())
                .unwrap_or(Value::Null),
        );
    }
}

impl fmt::Display for VersionedFsDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol(), self.filepath())
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Renders `TypeName(key=value, ...)`, leaving out empty entries.
pub fn format_description(
    f: &mut fmt::Formatter<'_>,
    type_name: &str,
    description: &Description,
) -> fmt::Result {
    let parts: Vec<String> = description
        .iter()
        .filter(|(_, value)| !is_empty_value(value))
        .map(|(key, value)| match value {
            Value::String(s) => format!("{}={}", key, s),
            other => format!("{}={}", key, other),
        })
        .collect();
    write!(f, "{}({})", type_name, parts.join(", "))
}

pub(crate) fn to_description_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
