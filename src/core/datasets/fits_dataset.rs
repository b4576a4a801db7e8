use crate::adapters::storage::FileSystemRegistry;
use crate::config::args::{reject_unknown_args, Credentials, FitsLoadArgs, FitsSaveArgs, FsArgs};
use crate::core::datasets::{format_description, to_description_value, VersionedFsDataset};
use crate::core::fits::{self, VerifyOption};
use crate::core::version::Version;
use crate::domain::model::ImageHdu;
use crate::domain::ports::{Dataset, Description};
use crate::utils::error::{DatasetError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const DEFAULT_LOAD_ARGS: FitsLoadArgs = FitsLoadArgs::empty();
pub const DEFAULT_SAVE_ARGS: FitsSaveArgs = FitsSaveArgs::empty();

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitsDatasetConfig {
    pub filepath: String,
    pub hdu_index: i64,
    #[serde(default)]
    pub load_args: FitsLoadArgs,
    #[serde(default)]
    pub save_args: FitsSaveArgs,
    #[serde(default)]
    pub version: Option<Version>,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub fs_args: FsArgs,
}

impl FitsDatasetConfig {
    pub fn new(filepath: impl Into<String>, hdu_index: i64) -> Self {
        Self {
            filepath: filepath.into(),
            hdu_index,
            ..Self::default()
        }
    }
}

/// One image HDU of a multi-extension FITS file.
///
/// `hdu_index` is not checked against the file until `load`; negative
/// values count back from the last HDU. Saving is not supported: `save`
/// writes nothing and only drops cached filesystem metadata.
#[derive(Debug)]
pub struct FitsDataset {
    base: VersionedFsDataset,
    hdu_index: i64,
    load_args: FitsLoadArgs,
    save_args: FitsSaveArgs,
}

impl FitsDataset {
    pub fn new(config: FitsDatasetConfig) -> Result<Self> {
        Self::with_registry(config, &FileSystemRegistry::default())
    }

    pub fn with_registry(config: FitsDatasetConfig, registry: &FileSystemRegistry) -> Result<Self> {
        reject_unknown_args("load_args", &config.load_args.extra)?;
        reject_unknown_args("save_args", &config.save_args.extra)?;
        let base = VersionedFsDataset::new(
            &config.filepath,
            config.version,
            &config.credentials,
            config.fs_args,
            registry,
        )?;
        Ok(Self {
            base,
            hdu_index: config.hdu_index,
            load_args: config.load_args.merged_over(&DEFAULT_LOAD_ARGS),
            save_args: config.save_args.merged_over(&DEFAULT_SAVE_ARGS),
        })
    }

    pub fn hdu_index(&self) -> i64 {
        self.hdu_index
    }

    pub fn load_args(&self) -> &FitsLoadArgs {
        &self.load_args
    }

    pub fn save_args(&self) -> &FitsSaveArgs {
        &self.save_args
    }

    pub fn base(&self) -> &VersionedFsDataset {
        &self.base
    }
}

impl Dataset for FitsDataset {
    type Data = ImageHdu;

    fn load(&self) -> Result<ImageHdu> {
        let (load_path, stream) = self.base.open_load()?;
        let mut hdul = fits::open(stream, &self.load_args)?;

        let hdu = hdul.get_mut(self.hdu_index)?;
        if !hdu.is_image() {
            return Err(DatasetError::codec(format!(
                "HDU {} of '{}' is a {} extension, not an image",
                self.hdu_index, load_path, hdu.kind
            )));
        }
        let report = hdu.verify(VerifyOption::SilentFix)?;
        if !report.is_clean() {
            tracing::debug!("Fixed HDU {} of {}: {}", self.hdu_index, load_path, report);
        }

        tracing::debug!("Loaded HDU {} from {}", self.hdu_index, load_path);
        Ok(hdu.clone())
    }

    fn save(&self, _data: &ImageHdu) -> Result<()> {
        tracing::debug!("{} does not persist HDUs; nothing written", self);
        self.base.invalidate_cache();
        Ok(())
    }

    fn exists(&self) -> Result<bool> {
        self.base.exists()
    }

    fn describe(&self) -> Description {
        let mut description = Description::new();
        self.base.describe_into(&mut description);
        description.insert("hdu_index".into(), Value::from(self.hdu_index));
        description.insert("load_args".into(), to_description_value(&self.load_args));
        description.insert("save_args".into(), to_description_value(&self.save_args));
        description
    }

    fn release(&self) {
        self.base.release();
    }
}

impl fmt::Display for FitsDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_description(f, "FitsDataset", &self.describe())
    }
}
