//! Upload error definitions.

use std::path::PathBuf;

use stream::StreamError;
use support::fs::FileSystemError;

macro_rules! from_error {
    ($type:ty, $target:ident, $targetvar:expr) => {
        impl From<$type> for $target {
            fn from(s: $type) -> Self {
                $targetvar(s.into())
            }
        }
    };
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Uploaded file {0} has already been moved")]
    AlreadyMoved(String),
    #[error("Upload target directory {0:?} does not exist or is not writable")]
    TargetNotWritable(PathBuf),
    #[error("{0:?} is not a valid uploaded file")]
    NotUploadedFile(PathBuf),
    #[error("Error {op} uploaded file {name} to {target}: {source}")]
    Relocate {
        op: &'static str,
        name: String,
        target: String,
        #[source]
        source: FileSystemError,
    },
    #[error("Error removing uploaded file {name}: {source}")]
    Remove {
        name: String,
        #[source]
        source: FileSystemError,
    },
    #[error("Invalid upload error code {0}")]
    InvalidErrorCode(i64),
    #[error("Malformed upload field '{field}': {reason}")]
    MalformedField { field: String, reason: String },
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl UploadError {
    /// Errors caused by the caller handing over a bad argument.
    pub fn is_invalid_argument(&self) -> bool {
        match self {
            UploadError::TargetNotWritable(_) => true,
            UploadError::Stream(err) => err.is_invalid_argument(),
            _ => false,
        }
    }

    pub(crate) fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        UploadError::MalformedField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Error reading settings: {0}")]
    Io(std::io::Error),
    #[error("Invalid settings: {0}")]
    Toml(toml::de::Error),
}

from_error!(std::io::Error, SettingsError, SettingsError::Io);
from_error!(toml::de::Error, SettingsError, SettingsError::Toml);
