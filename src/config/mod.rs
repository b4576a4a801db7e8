pub mod args;
pub mod catalog;

#[cfg(feature = "cli")]
pub mod cli;

pub use args::{Credentials, FitsLoadArgs, FitsSaveArgs, FsArgs, OpenArgs, OpenMode};
pub use catalog::CatalogConfig;

#[cfg(feature = "cli")]
pub use cli::{CliConfig, Command};
