use crate::core::catalog::CatalogOptions;
use crate::utils::error::{DatasetError, Result};
use crate::utils::validation::{validate_filepath, validate_version_id, Validate};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "astro-catalog")]
#[command(about = "Inspect FITS and solar map datasets declared in a TOML data catalog")]
pub struct CliConfig {
    #[arg(long, default_value = "catalog.toml", help = "Path to the catalog file")]
    pub catalog: PathBuf,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit JSON log lines instead of human-readable logs")]
    pub json_logs: bool,

    #[arg(
        long = "load-version",
        value_name = "NAME=VERSION",
        help = "Pin the load version of a versioned dataset (repeatable)"
    )]
    pub load_versions: Vec<String>,

    #[arg(long, help = "Save version shared by every versioned dataset of this run")]
    pub save_version: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List dataset names and types
    List,
    /// Print the description of a dataset as JSON
    Describe { name: String },
    /// Report whether the data behind a dataset exists
    Exists { name: String },
    /// Load a dataset and print a summary of its header and data
    Inspect { name: String },
    /// Drop cached versions and filesystem metadata of a dataset
    Release { name: String },
}

fn parse_load_version(raw: &str) -> Result<(String, String)> {
    let (name, version) = raw.split_once('=').ok_or_else(|| DatasetError::InvalidConfigValue {
        field: "--load-version".to_string(),
        value: raw.to_string(),
        reason: "expected NAME=VERSION".to_string(),
    })?;
    let name = name.trim();
    let version = version.trim();
    if name.is_empty() {
        return Err(DatasetError::InvalidConfigValue {
            field: "--load-version".to_string(),
            value: raw.to_string(),
            reason: "dataset name cannot be empty".to_string(),
        });
    }
    validate_version_id("--load-version", version)?;
    Ok((name.to_string(), version.to_string()))
}

impl CliConfig {
    pub fn catalog_options(&self) -> Result<CatalogOptions> {
        let mut load_versions = BTreeMap::new();
        for raw in &self.load_versions {
            let (name, version) = parse_load_version(raw)?;
            load_versions.insert(name, version);
        }
        Ok(CatalogOptions {
            load_versions,
            save_version: self.save_version.clone(),
        })
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_filepath("--catalog", &self.catalog.to_string_lossy())?;
        if let Some(save_version) = &self.save_version {
            validate_version_id("--save-version", save_version)?;
        }
        self.catalog_options().map(|_| ())
    }
}
