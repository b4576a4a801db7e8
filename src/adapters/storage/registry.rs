use crate::adapters::storage::{LocalFileSystem, MemoryFileSystem};
use crate::config::args::{reject_unknown_args, Credentials, FileSystemOptions};
use crate::domain::ports::FileSystem;
use crate::utils::error::{DatasetError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type FileSystemFactory =
    Arc<dyn Fn(&Credentials, &FileSystemOptions) -> Result<Arc<dyn FileSystem>> + Send + Sync>;

/// Maps a protocol name to the factory that builds its filesystem handle.
#[derive(Clone)]
pub struct FileSystemRegistry {
    factories: BTreeMap<String, FileSystemFactory>,
}

impl FileSystemRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn register<F>(&mut self, protocol: &str, factory: F)
    where
        F: Fn(&Credentials, &FileSystemOptions) -> Result<Arc<dyn FileSystem>> + Send + Sync + 'static,
    {
        self.factories
            .insert(protocol.to_ascii_lowercase(), Arc::new(factory));
    }

    pub fn protocols(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn supports(&self, protocol: &str) -> bool {
        self.factories.contains_key(&protocol.to_ascii_lowercase())
    }

    pub fn filesystem(
        &self,
        protocol: &str,
        credentials: &Credentials,
        options: &FileSystemOptions,
    ) -> Result<Arc<dyn FileSystem>> {
        let factory = self
            .factories
            .get(&protocol.to_ascii_lowercase())
            .ok_or_else(|| {
                DatasetError::config(format!(
                    "No filesystem registered for protocol '{}'. Known protocols: {}",
                    protocol,
                    self.protocols().collect::<Vec<_>>().join(", ")
                ))
            })?;
        tracing::debug!("Creating '{}' filesystem", protocol);
        factory(credentials, options)
    }
}

impl Default for FileSystemRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        let local = |credentials: &Credentials,
                     options: &FileSystemOptions|
         -> Result<Arc<dyn FileSystem>> {
            if !credentials.is_empty() {
                tracing::debug!("Local filesystem ignores {} credential(s)", credentials.len());
            }
            reject_unknown_args("fs_args", &options.extra)?;
            Ok(Arc::new(LocalFileSystem::new(options)) as Arc<dyn FileSystem>)
        };
        registry.register("file", local);
        registry.register("local", local);
        registry.register("memory", |_: &Credentials, options: &FileSystemOptions| {
            reject_unknown_args("fs_args", &options.extra)?;
            Ok(Arc::new(MemoryFileSystem::new(options)) as Arc<dyn FileSystem>)
        });
        registry
    }
}

impl fmt::Debug for FileSystemRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystemRegistry")
            .field("protocols", &self.protocols().collect::<Vec<_>>())
            .finish()
    }
}
