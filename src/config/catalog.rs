use crate::config::args::{Credentials, FitsLoadArgs, FitsSaveArgs, FsArgs};
use crate::core::datasets::{FitsDatasetConfig, MapDatasetConfig};
use crate::core::version::Version;
use crate::utils::error::{DatasetError, Result};
use crate::utils::validation::{
    validate_file_extension, validate_filepath, validate_non_empty_string,
    validate_required_field, validate_version_id, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const FITS_EXTENSIONS: [&str; 3] = ["fits", "fit", "fts"];

/// A data catalog file: one `[datasets.<name>]` table per dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub datasets: BTreeMap<String, DatasetEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatasetEntry {
    #[serde(alias = "fits.FITSDataSet", alias = "FITSDataSet")]
    Fits(FitsEntry),
    #[serde(alias = "sunpy.MapDataSet", alias = "MapDataSet")]
    Map(MapEntry),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitsEntry {
    pub hdu_index: Option<i64>,
    #[serde(flatten)]
    pub common: EntryCommon,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    #[serde(flatten)]
    pub common: EntryCommon,
}

/// Fields shared by every dataset type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryCommon {
    pub filepath: String,
    #[serde(default)]
    pub versioned: bool,
    #[serde(default)]
    pub load_version: Option<String>,
    #[serde(default)]
    pub load_args: FitsLoadArgs,
    #[serde(default)]
    pub save_args: FitsSaveArgs,
    #[serde(default)]
    pub fs_args: FsArgs,
    #[serde(default)]
    pub credentials: Credentials,
}

impl EntryCommon {
    /// Version pair for this entry. Overrides win over the configured load
    /// version; unversioned entries ignore them.
    pub fn version(&self, load_override: Option<&str>, save_override: Option<&str>) -> Option<Version> {
        if !self.versioned {
            return None;
        }
        Some(Version::new(
            load_override
                .map(str::to_string)
                .or_else(|| self.load_version.clone()),
            save_override.map(str::to_string),
        ))
    }

    fn validate_as(&self, name: &str) -> Result<()> {
        let field = |suffix: &str| format!("datasets.{}.{}", name, suffix);

        validate_filepath(&field("filepath"), &self.filepath)?;
        // `.fits.gz` and extensionless files still load, so a mismatch only warns.
        if let Err(e) = validate_file_extension(&field("filepath"), &self.filepath, &FITS_EXTENSIONS) {
            tracing::warn!(dataset = name, "{}", e);
        }

        if let Some(load_version) = &self.load_version {
            if !self.versioned {
                return Err(DatasetError::InvalidConfigValue {
                    field: field("load_version"),
                    value: load_version.clone(),
                    reason: "load_version requires versioned = true".to_string(),
                });
            }
            validate_version_id(&field("load_version"), load_version)?;
        }
        Ok(())
    }
}

impl DatasetEntry {
    pub fn common(&self) -> &EntryCommon {
        match self {
            DatasetEntry::Fits(entry) => &entry.common,
            DatasetEntry::Map(entry) => &entry.common,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            DatasetEntry::Fits(_) => "fits",
            DatasetEntry::Map(_) => "map",
        }
    }
}

impl FitsEntry {
    pub fn to_config(&self, name: &str, version: Option<Version>) -> Result<FitsDatasetConfig> {
        let hdu_index = validate_required_field(&format!("datasets.{}.hdu_index", name), &self.hdu_index)?;
        Ok(FitsDatasetConfig {
            filepath: self.common.filepath.clone(),
            hdu_index: *hdu_index,
            load_args: self.common.load_args.clone(),
            save_args: self.common.save_args.clone(),
            version,
            credentials: self.common.credentials.clone(),
            fs_args: self.common.fs_args.clone(),
        })
    }
}

impl MapEntry {
    pub fn to_config(&self, version: Option<Version>) -> MapDatasetConfig {
        MapDatasetConfig {
            filepath: self.common.filepath.clone(),
            load_args: self.common.load_args.clone(),
            save_args: self.common.save_args.clone(),
            version,
            credentials: self.common.credentials.clone(),
            fs_args: self.common.fs_args.clone(),
        }
    }
}

impl CatalogConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        tracing::debug!("Loaded catalog from {}", path.as_ref().display());
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| DatasetError::InvalidConfigValue {
            field: "catalog".to_string(),
            value: String::new(),
            reason: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value. Unset variables are
    /// left as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| DatasetError::config(format!("invalid substitution pattern: {}", e)))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    pub fn entry(&self, name: &str) -> Option<&DatasetEntry> {
        self.datasets.get(name)
    }
}

impl Validate for CatalogConfig {
    fn validate(&self) -> Result<()> {
        for (name, entry) in &self.datasets {
            validate_non_empty_string("datasets.<name>", name)?;
            entry.common().validate_as(name)?;
            if let DatasetEntry::Fits(fits) = entry {
                validate_required_field(&format!("datasets.{}.hdu_index", name), &fits.hdu_index)?;
            }
        }
        Ok(())
    }
}
