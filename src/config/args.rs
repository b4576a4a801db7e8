//! Typed option structs passed through to the filesystem and the FITS codec.
//!
//! Every struct keeps the options this crate understands as named fields and
//! collects anything else in a flattened `extra` map. The FITS codec and the
//! built-in filesystems reject a non-empty `extra`; filesystems registered by
//! the caller receive theirs untouched.

use crate::core::fits::VerifyOption;
use crate::utils::error::{DatasetError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub type ExtraArgs = BTreeMap<String, Value>;

/// Passthrough credentials for the filesystem provider.
pub type Credentials = BTreeMap<String, Value>;

/// Fails with a configuration error naming every key in `extra`.
pub fn reject_unknown_args(field: &str, extra: &ExtraArgs) -> Result<()> {
    if extra.is_empty() {
        return Ok(());
    }
    Err(DatasetError::InvalidConfigValue {
        field: field.to_string(),
        value: extra.keys().cloned().collect::<Vec<_>>().join(", "),
        reason: "unrecognised option(s)".to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenMode {
    #[serde(rename = "rb")]
    ReadBinary,
    #[serde(rename = "wb")]
    WriteBinary,
    /// Exclusive create: fails if the target exists.
    #[serde(rename = "xb")]
    CreateNew,
    #[serde(rename = "ab")]
    AppendBinary,
}

impl OpenMode {
    pub fn is_read(self) -> bool {
        matches!(self, OpenMode::ReadBinary)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OpenMode::ReadBinary => "rb",
            OpenMode::WriteBinary => "wb",
            OpenMode::CreateNew => "xb",
            OpenMode::AppendBinary => "ab",
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for a single stream-open call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<OpenMode>,
    #[serde(flatten)]
    pub extra: ExtraArgs,
}

impl OpenArgs {
    pub fn with_mode(mode: OpenMode) -> Self {
        Self {
            mode: Some(mode),
            extra: ExtraArgs::new(),
        }
    }

    pub fn read_mode(&self) -> Result<OpenMode> {
        let mode = self.mode.unwrap_or(OpenMode::ReadBinary);
        if !mode.is_read() {
            return Err(DatasetError::InvalidConfigValue {
                field: "open_args_load.mode".to_string(),
                value: mode.to_string(),
                reason: "load streams must be opened in 'rb' mode".to_string(),
            });
        }
        Ok(mode)
    }

    pub fn write_mode(&self) -> Result<OpenMode> {
        let mode = self.mode.unwrap_or(OpenMode::WriteBinary);
        if mode.is_read() {
            return Err(DatasetError::InvalidConfigValue {
                field: "open_args_save.mode".to_string(),
                value: mode.to_string(),
                reason: "save streams must be opened in a write mode".to_string(),
            });
        }
        Ok(mode)
    }
}

/// Filesystem arguments as configured on a dataset. The two open-args tables
/// are routed to stream-open calls; the rest goes to the filesystem
/// constructor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FsArgs {
    #[serde(default)]
    pub open_args_load: OpenArgs,
    #[serde(default)]
    pub open_args_save: OpenArgs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_mkdir: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_listings_cache: Option<bool>,
    #[serde(flatten)]
    pub extra: ExtraArgs,
}

impl FsArgs {
    /// Splits off the open-args tables, leaving the constructor options.
    pub fn split(self) -> (FileSystemOptions, OpenArgs, OpenArgs) {
        let options = FileSystemOptions {
            auto_mkdir: self.auto_mkdir,
            use_listings_cache: self.use_listings_cache,
            extra: self.extra,
        };
        (options, self.open_args_load, self.open_args_save)
    }
}

/// Options handed to a filesystem factory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileSystemOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_mkdir: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_listings_cache: Option<bool>,
    #[serde(flatten)]
    pub extra: ExtraArgs,
}

/// Options for opening a FITS container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitsLoadArgs {
    /// Accept a final header that runs to EOF without an END card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_missing_end: Option<bool>,
    #[serde(flatten)]
    pub extra: ExtraArgs,
}

impl FitsLoadArgs {
    pub const fn empty() -> Self {
        Self {
            ignore_missing_end: None,
            extra: ExtraArgs::new(),
        }
    }

    /// Fields set on `self` win over `defaults`.
    pub fn merged_over(&self, defaults: &FitsLoadArgs) -> FitsLoadArgs {
        let mut extra = defaults.extra.clone();
        extra.extend(self.extra.clone());
        FitsLoadArgs {
            ignore_missing_end: self.ignore_missing_end.or(defaults.ignore_missing_end),
            extra,
        }
    }
}

/// Options for writing a FITS container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitsSaveArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_verify: Option<VerifyOption>,
    #[serde(flatten)]
    pub extra: ExtraArgs,
}

impl FitsSaveArgs {
    pub const fn empty() -> Self {
        Self {
            overwrite: None,
            output_verify: None,
            extra: ExtraArgs::new(),
        }
    }

    /// Fields set on `self` win over `defaults`.
    pub fn merged_over(&self, defaults: &FitsSaveArgs) -> FitsSaveArgs {
        let mut extra = defaults.extra.clone();
        extra.extend(self.extra.clone());
        FitsSaveArgs {
            overwrite: self.overwrite.or(defaults.overwrite),
            output_verify: self.output_verify.or(defaults.output_verify),
            extra,
        }
    }
}
