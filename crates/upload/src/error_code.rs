use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::errors::UploadError;

/// Outcome of an upload as reported by the host, with the host's numeric codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum UploadErrorCode {
    #[default]
    Ok,
    /// Larger than the size allowed by the host configuration.
    ExceedsConfigSize,
    /// Larger than the size declared by the submitting form.
    ExceedsFormSize,
    Partial,
    NoFile,
    NoTmpDir,
    CantWrite,
    /// Stopped by a host extension.
    Extension,
}

impl UploadErrorCode {
    pub fn code(self) -> i64 {
        match self {
            UploadErrorCode::Ok => 0,
            UploadErrorCode::ExceedsConfigSize => 1,
            UploadErrorCode::ExceedsFormSize => 2,
            UploadErrorCode::Partial => 3,
            UploadErrorCode::NoFile => 4,
            UploadErrorCode::NoTmpDir => 6,
            UploadErrorCode::CantWrite => 7,
            UploadErrorCode::Extension => 8,
        }
    }

    pub fn is_ok(self) -> bool {
        self == UploadErrorCode::Ok
    }
}

impl TryFrom<i64> for UploadErrorCode {
    type Error = UploadError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => UploadErrorCode::Ok,
            1 => UploadErrorCode::ExceedsConfigSize,
            2 => UploadErrorCode::ExceedsFormSize,
            3 => UploadErrorCode::Partial,
            4 => UploadErrorCode::NoFile,
            6 => UploadErrorCode::NoTmpDir,
            7 => UploadErrorCode::CantWrite,
            8 => UploadErrorCode::Extension,
            _ => return Err(UploadError::InvalidErrorCode(code)),
        })
    }
}

impl From<UploadErrorCode> for i64 {
    fn from(code: UploadErrorCode) -> Self {
        code.code()
    }
}

impl Display for UploadErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            UploadErrorCode::Ok => "there is no error, the file uploaded with success",
            UploadErrorCode::ExceedsConfigSize => {
                "the uploaded file exceeds the configured maximum size"
            },
            UploadErrorCode::ExceedsFormSize => {
                "the uploaded file exceeds the maximum size declared by the form"
            },
            UploadErrorCode::Partial => "the uploaded file was only partially uploaded",
            UploadErrorCode::NoFile => "no file was uploaded",
            UploadErrorCode::NoTmpDir => "missing a temporary folder",
            UploadErrorCode::CantWrite => "failed to write file to disk",
            UploadErrorCode::Extension => "a host extension stopped the file upload",
        };
        write!(f, "{message}")
    }
}
