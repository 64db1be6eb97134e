use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use nix::errno::Errno;
use serde_json::{json, Map, Value};
use support::{
    constants::THIS_IS_A_BUG,
    fs::{local::LocalFileSystem, DynFileSystem, FileSystemError},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{error_code::UploadErrorCode, errors::UploadError, settings::UploadSettings};

/// The request-handling side that delivered an upload.
///
/// Host uploads are only moved after the host confirms the source is one of
/// its own temporary files.
pub trait UploadHost: std::fmt::Debug {
    fn is_uploaded_file(&self, path: &Path) -> bool;

    fn move_uploaded_file(&self, from: &Path, to: &Path) -> Result<(), UploadError>;
}

pub type DynUploadHost = Arc<dyn UploadHost + Send + Sync>;

/// One client file handed to [`HostUploads::stage`].
#[derive(Debug, Clone, Copy)]
pub struct StagedFile<'a> {
    pub client_filename: Option<&'a str>,
    pub media_type: Option<&'a str>,
    pub contents: &'a [u8],
}

/// Registry of the temporary files written for incoming uploads.
#[derive(Debug)]
pub struct HostUploads {
    settings: UploadSettings,
    file_system: DynFileSystem,
    staged: Mutex<HashSet<PathBuf>>,
}

impl HostUploads {
    pub fn new(settings: UploadSettings) -> Self {
        Self::with_file_system(settings, Arc::new(LocalFileSystem))
    }

    pub fn with_file_system(settings: UploadSettings, file_system: DynFileSystem) -> Self {
        Self {
            settings,
            file_system,
            staged: Mutex::new(HashSet::new()),
        }
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    /// Writes `file` into the temporary directory and returns its raw
    /// submission entry (`name`, `type`, `tmp_name`, `error`, `size`).
    ///
    /// Failures are reported through the entry's `error` code, never as `Err`,
    /// the same way a request handler reports them.
    pub fn stage(&self, file: &StagedFile<'_>) -> Value {
        let size = file.contents.len() as u64;

        let outcome = if self
            .settings
            .max_file_size()
            .is_some_and(|max| size > max)
        {
            Err(UploadErrorCode::ExceedsConfigSize)
        } else if !self.file_system.is_writable_dir(self.settings.tmp_dir()) {
            Err(UploadErrorCode::NoTmpDir)
        } else {
            let tmp_name = self
                .settings
                .tmp_dir()
                .join(format!("upload_{}", Uuid::new_v4().simple()));

            match self.file_system.write(&tmp_name, file.contents) {
                Ok(()) => Ok(tmp_name),
                Err(err) => {
                    warn!("failed to stage upload in {:?}: {}", tmp_name, err);
                    Err(UploadErrorCode::CantWrite)
                },
            }
        };

        let (tmp_name, error, size) = match outcome {
            Ok(tmp_name) => {
                debug!("staged {} bytes as {:?}", size, tmp_name);
                self.registry().insert(tmp_name.clone());
                (tmp_name.to_string_lossy().into_owned(), UploadErrorCode::Ok, size)
            },
            Err(code) => (String::new(), code, 0),
        };

        json!({
            "name": file.client_filename.unwrap_or_default(),
            "type": file.media_type.unwrap_or_default(),
            "tmp_name": tmp_name,
            "error": error.code(),
            "size": size,
        })
    }

    /// Stages several files submitted under one field and lays them out as
    /// parallel index-keyed arrays (`name[i]`, `type[i]`, ...).
    pub fn stage_all(&self, files: &[StagedFile<'_>]) -> Value {
        let mut grouped = Map::new();
        for key in ["name", "type", "tmp_name", "error", "size"] {
            grouped.insert(key.to_string(), Value::Array(vec![]));
        }

        for file in files {
            let entry = self.stage(file);
            for (key, column) in grouped.iter_mut() {
                if let Value::Array(column) = column {
                    column.push(entry[key.as_str()].clone());
                }
            }
        }

        Value::Object(grouped)
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
        self.staged
            .lock()
            .unwrap_or_else(|_| panic!("upload registry lock poisoned {THIS_IS_A_BUG}"))
    }
}

impl UploadHost for HostUploads {
    fn is_uploaded_file(&self, path: &Path) -> bool {
        self.registry().contains(path)
    }

    fn move_uploaded_file(&self, from: &Path, to: &Path) -> Result<(), UploadError> {
        if !self.is_uploaded_file(from) {
            return Err(UploadError::NotUploadedFile(from.to_path_buf()));
        }

        let relocate = |op, source| UploadError::Relocate {
            op,
            name: from.to_string_lossy().into_owned(),
            target: to.to_string_lossy().into_owned(),
            source,
        };

        match self.file_system.rename(from, to) {
            Ok(()) => {},
            Err(FileSystemError::Io(err)) if err.raw_os_error() == Some(Errno::EXDEV as i32) => {
                debug!("{:?} and {:?} are on different devices, copying", from, to);
                self.file_system
                    .copy(from, to)
                    .map_err(|source| relocate("copying", source))?;
                self.file_system
                    .remove_file(from)
                    .map_err(|source| UploadError::Remove {
                        name: from.to_string_lossy().into_owned(),
                        source,
                    })?;
            },
            Err(source) => return Err(relocate("moving", source)),
        }

        self.registry().remove(from);
        info!("host moved upload {:?} to {:?}", from, to);

        Ok(())
    }
}
