use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for '{field}': '{value}' ({reason})")]
    InvalidConfigValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfig { field: String },

    #[error("Version not found: {message}")]
    VersionNotFound { message: String },

    #[error("HDU index {index} is out of range for a file with {count} HDU(s)")]
    HduIndexOutOfRange { index: i64, count: usize },

    #[error("FITS codec error: {message}")]
    CodecError { message: String },

    #[error("Persistence error: {message}")]
    PersistenceError { message: String },
}

/// Abstract failure classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    NotFound,
    Codec,
    Persistence,
    Io,
}

impl DatasetError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn codec(message: impl Into<String>) -> Self {
        Self::CodecError {
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::PersistenceError {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigError { .. }
            | Self::InvalidConfigValue { .. }
            | Self::MissingConfig { .. }
            | Self::SerializationError(_) => ErrorKind::Configuration,
            Self::VersionNotFound { .. } | Self::HduIndexOutOfRange { .. } => ErrorKind::NotFound,
            Self::CodecError { .. } => ErrorKind::Codec,
            Self::PersistenceError { .. } => ErrorKind::Persistence,
            Self::IoError(_) => ErrorKind::Io,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.kind() {
            ErrorKind::Configuration => format!("Dataset configuration is invalid: {}", self),
            ErrorKind::NotFound => format!("Requested data could not be found: {}", self),
            ErrorKind::Codec => format!("File could not be decoded as FITS: {}", self),
            ErrorKind::Persistence => format!("Data could not be written: {}", self),
            ErrorKind::Io => format!("Filesystem access failed: {}", self),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::ConfigError { .. } | Self::InvalidConfigValue { .. } => {
                "Check the filepath, protocol and option values in the catalog entry"
            }
            Self::MissingConfig { .. } => "Add the missing field to the catalog entry",
            Self::SerializationError(_) => "Check the option value types in the catalog entry",
            Self::VersionNotFound { .. } => {
                "Save the dataset at least once or pass an existing load version"
            }
            Self::HduIndexOutOfRange { .. } => "Pick an hdu_index that exists in the file",
            Self::CodecError { .. } => "Verify the file is a valid FITS file with an image extension",
            Self::PersistenceError { .. } => {
                "Enable overwrite in save_args or make sure the target location is writable"
            }
            Self::IoError(_) => "Check that the path exists and is readable",
        }
    }
}

pub type Result<T> = std::result::Result<T, DatasetError>;
