//! Uploaded files for HTTP messages.
//!
//! An [`UploadedFile`] describes one file submitted by a client. Files parsed
//! from a raw submission with [`parse_uploaded_files`] come from the host
//! ([`UploadHost`]) and are checked against it before being moved; files built
//! directly with [`UploadedFileBuilder`] are moved with a plain rename.

mod error_code;
pub mod errors;
mod host;
mod parser;
mod settings;
mod uploaded_file;

pub use error_code::UploadErrorCode;
pub use errors::{SettingsError, UploadError};
pub use host::{DynUploadHost, HostUploads, StagedFile, UploadHost};
pub use parser::{collect_uploaded_files, parse_uploaded_files, UploadedFileNode, UploadedFiles};
pub use settings::{UploadSettings, UploadSettingsBuilder};
pub use uploaded_file::{Origin, UploadedFile, UploadedFileBuilder};
