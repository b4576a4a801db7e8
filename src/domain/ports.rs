use crate::config::args::OpenArgs;
use crate::utils::error::Result;
use serde_json::{Map, Value};
use std::fmt::Debug;
use std::io::{Read, Write};

/// Introspection output of a dataset, used for logging and the catalog CLI.
pub type Description = Map<String, Value>;

/// A filesystem handle bound to one protocol. Paths are protocol-relative
/// POSIX strings as produced by `core::protocol::get_filepath_str`.
///
/// Streams returned by `open_read`/`open_write` are closed when dropped.
/// Callers that need write errors reported must `flush` before dropping.
pub trait FileSystem: Send + Sync + Debug {
    fn protocol(&self) -> &str;

    fn open_read(&self, path: &str, args: &OpenArgs) -> Result<Box<dyn Read + Send>>;

    fn open_write(&self, path: &str, args: &OpenArgs) -> Result<Box<dyn Write + Send>>;

    /// Rejects open args this filesystem would ignore. Checked once, when a
    /// dataset is built; `field` names the args in the error.
    fn check_open_args(&self, _field: &str, _args: &OpenArgs) -> Result<()> {
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool>;

    /// Paths matching a pattern where `*` and `?` match within one segment.
    fn glob(&self, pattern: &str) -> Result<Vec<String>>;

    /// Drops any cached metadata for `path`, its ancestors and descendants.
    fn invalidate_cache(&self, path: &str);
}

/// Versioned dataset contract the host pipeline drives.
pub trait Dataset: Send + Sync {
    type Data;

    fn load(&self) -> Result<Self::Data>;
    fn save(&self, data: &Self::Data) -> Result<()>;
    fn exists(&self) -> Result<bool>;
    fn describe(&self) -> Description;
    fn release(&self);
}
