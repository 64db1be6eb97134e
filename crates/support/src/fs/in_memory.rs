use std::{
    collections::{HashMap, HashSet},
    ffi::OsString,
    path::Path,
    sync::{Arc, RwLock},
};

use super::{stream_scheme, FileSystem, FileSystemError, FileSystemResult};
use crate::constants::THIS_IS_A_BUG;

#[derive(Debug, Clone)]
pub enum InMemoryFile {
    File(Vec<u8>),
    Directory,
}

/// Map-backed [`FileSystem`] used to exercise relocation paths without
/// touching the disk. Stream-style targets are stored under their full URL.
#[derive(Default, Debug, Clone)]
pub struct InMemoryFileSystem {
    files: Arc<RwLock<HashMap<OsString, InMemoryFile>>>,
    undeletable: Arc<RwLock<HashSet<OsString>>>,
}

impl InMemoryFileSystem {
    pub fn new(files: HashMap<OsString, InMemoryFile>) -> Self {
        Self {
            files: Arc::new(RwLock::new(files)),
            undeletable: Default::default(),
        }
    }

    /// Makes every later `remove_file` on `path` fail.
    pub fn deny_removal(&self, path: impl AsRef<Path>) {
        self.undeletable
            .write()
            .unwrap_or_else(|_| panic!("undeletable lock poisoned {THIS_IS_A_BUG}"))
            .insert(path.as_ref().as_os_str().to_owned());
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<InMemoryFile> {
        self.files
            .read()
            .unwrap_or_else(|_| panic!("files lock poisoned {THIS_IS_A_BUG}"))
            .get(path.as_ref().as_os_str())
            .cloned()
    }

    fn check_ancestors(
        files: &HashMap<OsString, InMemoryFile>,
        path: &Path,
    ) -> FileSystemResult<()> {
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                continue;
            }

            match files.get(ancestor.as_os_str()) {
                Some(InMemoryFile::Directory) => continue,
                Some(InMemoryFile::File(_)) => Err(FileSystemError::AncestorNotDirectory(
                    ancestor.as_os_str().to_owned(),
                ))?,
                None => Err(FileSystemError::AncestorDoesntExists(
                    ancestor.as_os_str().to_owned(),
                ))?,
            };
        }

        Ok(())
    }
}

impl FileSystem for InMemoryFileSystem {
    fn copy(&self, from: &Path, to: &Path) -> FileSystemResult<()> {
        let content = self.read(from)?;
        self.write(to, &content)
    }

    fn rename(&self, from: &Path, to: &Path) -> FileSystemResult<()> {
        let content = self.read(from)?;
        self.write(to, &content)?;
        self.files
            .write()
            .unwrap_or_else(|_| panic!("files lock poisoned {THIS_IS_A_BUG}"))
            .remove(from.as_os_str());

        Ok(())
    }

    fn remove_file(&self, path: &Path) -> FileSystemResult<()> {
        let os_path = path.as_os_str();
        if self
            .undeletable
            .read()
            .unwrap_or_else(|_| panic!("undeletable lock poisoned {THIS_IS_A_BUG}"))
            .contains(os_path)
        {
            return Err(FileSystemError::RemovalDenied(os_path.to_owned()));
        }

        let mut files = self
            .files
            .write()
            .unwrap_or_else(|_| panic!("files lock poisoned {THIS_IS_A_BUG}"));

        match files.get(os_path) {
            Some(InMemoryFile::File(_)) => {
                files.remove(os_path);
                Ok(())
            },
            Some(InMemoryFile::Directory) => {
                Err(FileSystemError::FileIsDirectory(os_path.to_owned()))
            },
            None => Err(FileSystemError::FileNotFound(os_path.to_owned())),
        }
    }

    fn read(&self, path: &Path) -> FileSystemResult<Vec<u8>> {
        let os_path = path.as_os_str();

        match self.get(path) {
            Some(InMemoryFile::File(content)) => Ok(content),
            Some(InMemoryFile::Directory) => {
                Err(FileSystemError::FileIsDirectory(os_path.to_owned()))
            },
            None => Err(FileSystemError::FileNotFound(os_path.to_owned())),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> FileSystemResult<()> {
        let os_path = path.as_os_str();
        let mut files = self
            .files
            .write()
            .unwrap_or_else(|_| panic!("files lock poisoned {THIS_IS_A_BUG}"));

        let is_stream = path.to_str().and_then(stream_scheme).is_some();
        if !is_stream {
            Self::check_ancestors(&files, path)?;
        }

        if let Some(InMemoryFile::Directory) = files.get(os_path) {
            return Err(FileSystemError::FileIsDirectory(os_path.to_owned()));
        }

        files.insert(os_path.to_owned(), InMemoryFile::File(contents.to_vec()));

        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.get(path).is_some()
    }

    fn is_writable_dir(&self, path: &Path) -> bool {
        matches!(self.get(path), Some(InMemoryFile::Directory))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn fs_with_source() -> InMemoryFileSystem {
        InMemoryFileSystem::new(HashMap::from([
            (OsString::from_str("/").unwrap(), InMemoryFile::Directory),
            (OsString::from_str("/tmp").unwrap(), InMemoryFile::Directory),
            (
                OsString::from_str("/tmp/upload").unwrap(),
                InMemoryFile::File("content".as_bytes().to_vec()),
            ),
        ]))
    }

    #[test]
    fn copy_should_store_stream_targets_under_their_url() {
        let fs = fs_with_source();

        fs.copy(Path::new("/tmp/upload"), Path::new("memory://bucket/a"))
            .unwrap();

        assert!(matches!(
            fs.get("memory://bucket/a"),
            Some(InMemoryFile::File(content)) if content == b"content"
        ));
        assert!(fs.exists(Path::new("/tmp/upload")));
    }

    #[test]
    fn write_should_return_an_error_if_some_ancestor_doesnt_exists() {
        let fs = fs_with_source();

        let err = fs.write(Path::new("/var/data/file"), b"x").unwrap_err();

        assert!(matches!(
            err,
            FileSystemError::AncestorDoesntExists(path) if path == "/var/data"
        ));
    }

    #[test]
    fn rename_should_move_the_entry() {
        let fs = fs_with_source();

        fs.rename(Path::new("/tmp/upload"), Path::new("/tmp/final"))
            .unwrap();

        assert!(!fs.exists(Path::new("/tmp/upload")));
        assert!(fs.exists(Path::new("/tmp/final")));
    }

    #[test]
    fn remove_file_should_fail_for_denied_paths() {
        let fs = fs_with_source();
        fs.deny_removal("/tmp/upload");

        let err = fs.remove_file(Path::new("/tmp/upload")).unwrap_err();

        assert!(matches!(err, FileSystemError::RemovalDenied(_)));
        assert!(fs.exists(Path::new("/tmp/upload")));
    }

    #[test]
    fn is_writable_dir_should_only_accept_directories() {
        let fs = fs_with_source();

        assert!(fs.is_writable_dir(Path::new("/tmp")));
        assert!(!fs.is_writable_dir(Path::new("/tmp/upload")));
        assert!(!fs.is_writable_dir(Path::new("/nope")));
    }
}
