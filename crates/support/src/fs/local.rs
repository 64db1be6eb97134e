use std::{
    borrow::Cow,
    path::{Path, PathBuf},
};

use nix::unistd::{access, AccessFlags};
use tracing::trace;

use super::{stream_scheme, FileSystem, FileSystemError, FileSystemResult};
use crate::constants::{FILE_SCHEME, SCHEME_SEPARATOR};

#[derive(Default, Debug, Clone)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    /// Maps `file://` targets onto the local path they name.
    fn resolve(path: &Path) -> FileSystemResult<Cow<'_, Path>> {
        let Some(target) = path.to_str() else {
            return Ok(Cow::Borrowed(path));
        };

        match stream_scheme(target) {
            None => Ok(Cow::Borrowed(path)),
            Some(FILE_SCHEME) => {
                let local = &target[FILE_SCHEME.len() + SCHEME_SEPARATOR.len()..];
                Ok(Cow::Owned(PathBuf::from(local)))
            },
            Some(scheme) => Err(FileSystemError::UnsupportedScheme(scheme.to_string())),
        }
    }
}

impl FileSystem for LocalFileSystem {
    fn copy(&self, from: &Path, to: &Path) -> FileSystemResult<()> {
        let from = Self::resolve(from)?;
        let to = Self::resolve(to)?;
        trace!("copying {:?} to {:?}", from, to);

        std::fs::copy(from, to).and(Ok(())).map_err(Into::into)
    }

    fn rename(&self, from: &Path, to: &Path) -> FileSystemResult<()> {
        std::fs::rename(Self::resolve(from)?, Self::resolve(to)?).map_err(Into::into)
    }

    fn remove_file(&self, path: &Path) -> FileSystemResult<()> {
        std::fs::remove_file(Self::resolve(path)?).map_err(Into::into)
    }

    fn read(&self, path: &Path) -> FileSystemResult<Vec<u8>> {
        std::fs::read(Self::resolve(path)?).map_err(Into::into)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> FileSystemResult<()> {
        std::fs::write(Self::resolve(path)?, contents).map_err(Into::into)
    }

    fn exists(&self, path: &Path) -> bool {
        Self::resolve(path).map(|path| path.exists()).unwrap_or(false)
    }

    fn is_writable_dir(&self, path: &Path) -> bool {
        match Self::resolve(path) {
            Ok(path) => path.is_dir() && access(&*path, AccessFlags::W_OK).is_ok(),
            Err(_) => false,
        }
    }
}
