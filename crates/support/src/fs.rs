use std::{ffi::OsString, path::Path, sync::Arc};

use crate::constants::SCHEME_SEPARATOR;

pub mod in_memory;
pub mod local;

#[derive(Debug, thiserror::Error)]
pub enum FileSystemError {
    #[error("Ancestor {0:?} doesn't exists")]
    AncestorDoesntExists(OsString),
    #[error("Ancestor {0:?} is not a directory")]
    AncestorNotDirectory(OsString),
    #[error("File {0:?} not found")]
    FileNotFound(OsString),
    #[error("File {0:?} is a directory")]
    FileIsDirectory(OsString),
    #[error("Stream scheme '{0}' is not supported")]
    UnsupportedScheme(String),
    #[error("Removing {0:?} is not permitted")]
    RemovalDenied(OsString),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type FileSystemResult<T> = Result<T, FileSystemError>;

/// Blocking filesystem operations used when relocating uploaded files.
///
/// Destinations passed to [`FileSystem::copy`] and [`FileSystem::write`] may be
/// stream-style (`scheme://...`); each implementation decides which schemes it
/// understands.
pub trait FileSystem: std::fmt::Debug {
    fn copy(&self, from: &Path, to: &Path) -> FileSystemResult<()>;

    fn rename(&self, from: &Path, to: &Path) -> FileSystemResult<()>;

    fn remove_file(&self, path: &Path) -> FileSystemResult<()>;

    fn read(&self, path: &Path) -> FileSystemResult<Vec<u8>>;

    fn write(&self, path: &Path, contents: &[u8]) -> FileSystemResult<()>;

    fn exists(&self, path: &Path) -> bool;

    /// Whether `path` is an existing directory the current process may write into.
    fn is_writable_dir(&self, path: &Path) -> bool;
}

pub type DynFileSystem = Arc<dyn FileSystem + Send + Sync>;

/// Returns the scheme of a stream-style target (`scheme://...`).
///
/// A separator at position zero does not count, so `"://x"` is a plain path.
pub fn stream_scheme(target: &str) -> Option<&str> {
    match target.find(SCHEME_SEPARATOR) {
        Some(pos) if pos > 0 => Some(&target[..pos]),
        _ => None,
    }
}

/// Directory that would receive `path`, `.` for a bare file name.
pub fn target_directory(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
