use crate::adapters::storage::{glob_regex, ListingsCache};
use crate::config::args::{reject_unknown_args, FileSystemOptions, OpenArgs, OpenMode};
use crate::core::protocol::normalize_posix;
use crate::domain::ports::FileSystem;
use crate::utils::error::{DatasetError, Result};
use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

type Store = Arc<RwLock<BTreeMap<String, Vec<u8>>>>;

fn global_store() -> Store {
    static STORE: OnceLock<Store> = OnceLock::new();
    STORE.get_or_init(Store::default).clone()
}

/// In-memory filesystem for the `memory` protocol. Handles created through
/// `new` share one process-wide store, so a file written through one
/// dataset is visible to every other dataset in the process.
#[derive(Debug)]
pub struct MemoryFileSystem {
    store: Store,
    listings: ListingsCache,
}

impl MemoryFileSystem {
    pub fn new(options: &FileSystemOptions) -> Self {
        Self {
            store: global_store(),
            listings: ListingsCache::new(options.use_listings_cache.unwrap_or(false)),
        }
    }

    /// A handle with its own private store.
    pub fn isolated() -> Self {
        Self {
            store: Store::default(),
            listings: ListingsCache::new(false),
        }
    }

    fn read_store(&self) -> RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.store.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_store(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.store.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn remove(&self, path: &str) -> bool {
        let path = strip_protocol(path);
        self.listings.invalidate(&path);
        self.write_store().remove(&path).is_some()
    }

    pub fn files(&self) -> Vec<String> {
        self.read_store().keys().cloned().collect()
    }
}

fn strip_protocol(path: &str) -> String {
    let path = path.strip_prefix("memory://").unwrap_or(path);
    let normalized = normalize_posix(path);
    match normalized.as_str() {
        "." => "/".to_string(),
        p if p.starts_with('/') => normalized,
        p => format!("/{}", p),
    }
}

/// Buffers writes and publishes the whole file to the store on flush and
/// when dropped.
struct MemoryWriter {
    store: Store,
    path: String,
    buffer: Vec<u8>,
}

impl MemoryWriter {
    fn commit(&self) {
        let mut store = self.store.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        store.insert(self.path.clone(), self.buffer.clone());
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.commit();
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        self.commit();
    }
}

impl FileSystem for MemoryFileSystem {
    fn protocol(&self) -> &str {
        "memory"
    }

    fn open_read(&self, path: &str, args: &OpenArgs) -> Result<Box<dyn Read + Send>> {
        args.read_mode()?;
        let path = strip_protocol(path);
        let bytes = self.read_store().get(&path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("No such file: {}", path))
        })?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn open_write(&self, path: &str, args: &OpenArgs) -> Result<Box<dyn Write + Send>> {
        let mode = args.write_mode()?;
        let path = strip_protocol(path);
        let existing = self.read_store().get(&path).cloned();

        let buffer = match (mode, existing) {
            (OpenMode::CreateNew, Some(_)) => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("File exists: {}", path),
                )
                .into())
            }
            (OpenMode::AppendBinary, Some(bytes)) => bytes,
            (OpenMode::ReadBinary, _) => {
                return Err(DatasetError::config("cannot open a write stream in 'rb' mode"))
            }
            _ => Vec::new(),
        };

        self.listings.invalidate(&path);
        let writer = MemoryWriter {
            store: self.store.clone(),
            path,
            buffer,
        };
        // Publish immediately so the file exists while it is being written.
        writer.commit();
        Ok(Box::new(writer))
    }

    fn check_open_args(&self, field: &str, args: &OpenArgs) -> Result<()> {
        reject_unknown_args(field, &args.extra)
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let path = strip_protocol(path);
        self.listings.exists(&path, || {
            let store = self.read_store();
            if path == "/" || store.contains_key(&path) {
                return Ok(true);
            }
            let prefix = format!("{}/", path);
            Ok(store
                .range(prefix.clone()..)
                .next()
                .is_some_and(|(key, _)| key.starts_with(&prefix)))
        })
    }

    fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = strip_protocol(pattern);
        self.listings.glob(&pattern, || {
            let matcher = glob_regex(&pattern)?;
            Ok(self
                .read_store()
                .keys()
                .filter(|key| matcher.is_match(key))
                .cloned()
                .collect())
        })
    }

    fn invalidate_cache(&self, path: &str) {
        self.listings.invalidate(&strip_protocol(path));
    }
}
