use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use stream::Stream;
use support::fs::{local::LocalFileSystem, stream_scheme, target_directory, DynFileSystem};
use tracing::{info, warn};

use crate::{error_code::UploadErrorCode, errors::UploadError, host::DynUploadHost};

/// Where an uploaded file came from, which decides how it is moved.
#[derive(Debug, Clone)]
pub enum Origin {
    /// Built by application code or tests; moved with a plain rename.
    Programmatic,
    /// Delivered by the host; checked and moved by the host itself.
    Host(DynUploadHost),
}

/// One file submitted by a client.
///
/// Client supplied values (`client_filename`, `client_media_type`, `size`) are
/// kept as received and must not be trusted.
#[derive(Debug)]
pub struct UploadedFile {
    file: PathBuf,
    client_filename: Option<String>,
    client_media_type: Option<String>,
    size: Option<u64>,
    error: UploadErrorCode,
    origin: Origin,
    file_system: DynFileSystem,
    stream: Option<Stream>,
    moved: bool,
}

impl UploadedFile {
    pub fn file_path(&self) -> &Path {
        &self.file
    }

    pub fn client_filename(&self) -> Option<&str> {
        self.client_filename.as_deref()
    }

    pub fn client_media_type(&self) -> Option<&str> {
        self.client_media_type.as_deref()
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn error(&self) -> UploadErrorCode {
        self.error
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn is_host_upload(&self) -> bool {
        matches!(self.origin, Origin::Host(_))
    }

    pub fn is_moved(&self) -> bool {
        self.moved
    }

    /// Read stream over the file, opened on first call and reused afterwards.
    pub fn stream(&mut self) -> Result<&mut Stream, UploadError> {
        if self.moved {
            return Err(UploadError::AlreadyMoved(self.name()));
        }

        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => Stream::open(&self.file, "r")?,
        };

        Ok(self.stream.insert(stream))
    }

    /// Moves the file to `target_path`, once.
    ///
    /// A `scheme://` target is written with copy then remove; a plain path is
    /// renamed, or handed to the host for host uploads.
    pub fn move_to(&mut self, target_path: impl AsRef<Path>) -> Result<(), UploadError> {
        if self.moved {
            return Err(UploadError::AlreadyMoved(self.name()));
        }

        let target = target_path.as_ref();
        let target_is_stream = target.to_str().and_then(stream_scheme).is_some();

        if !target_is_stream {
            let directory = target_directory(target);
            if !self.file_system.is_writable_dir(directory) {
                return Err(UploadError::TargetNotWritable(directory.to_path_buf()));
            }
        }

        if target_is_stream {
            self.file_system
                .copy(&self.file, target)
                .map_err(|source| self.relocate_error("copying", target, source))?;
            self.file_system
                .remove_file(&self.file)
                .map_err(|source| UploadError::Remove {
                    name: self.name(),
                    source,
                })?;
        } else {
            match &self.origin {
                Origin::Host(host) => {
                    if !host.is_uploaded_file(&self.file) {
                        return Err(UploadError::NotUploadedFile(self.file.clone()));
                    }
                    host.move_uploaded_file(&self.file, target)?;
                },
                Origin::Programmatic => {
                    self.file_system
                        .rename(&self.file, target)
                        .map_err(|source| self.relocate_error("moving", target, source))?;
                },
            }
        }

        self.moved = true;
        info!("moved uploaded file {} to {}", self.name(), target.display());

        if let Some(mut stream) = self.stream.take() {
            if let Err(err) = stream.close() {
                warn!("closing stream of moved file {} failed: {}", self.name(), err);
            }
        }

        Ok(())
    }

    fn name(&self) -> String {
        match &self.client_filename {
            Some(name) => name.clone(),
            None => self.file.display().to_string(),
        }
    }

    fn relocate_error(
        &self,
        op: &'static str,
        target: &Path,
        source: support::fs::FileSystemError,
    ) -> UploadError {
        UploadError::Relocate {
            op,
            name: self.name(),
            target: target.display().to_string(),
            source,
        }
    }
}

#[derive(Debug)]
pub struct UploadedFileBuilder {
    config: UploadedFile,
}

impl UploadedFileBuilder {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            config: UploadedFile {
                file: file.into(),
                client_filename: None,
                client_media_type: None,
                size: None,
                error: UploadErrorCode::Ok,
                origin: Origin::Programmatic,
                file_system: Arc::new(LocalFileSystem),
                stream: None,
                moved: false,
            },
        }
    }

    fn transition(config: UploadedFile) -> Self {
        Self { config }
    }

    pub fn with_client_filename(self, client_filename: impl Into<String>) -> Self {
        Self::transition(UploadedFile {
            client_filename: Some(client_filename.into()),
            ..self.config
        })
    }

    pub fn with_client_media_type(self, client_media_type: impl Into<String>) -> Self {
        Self::transition(UploadedFile {
            client_media_type: Some(client_media_type.into()),
            ..self.config
        })
    }

    pub fn with_size(self, size: u64) -> Self {
        Self::transition(UploadedFile {
            size: Some(size),
            ..self.config
        })
    }

    pub fn with_error(self, error: UploadErrorCode) -> Self {
        Self::transition(UploadedFile {
            error,
            ..self.config
        })
    }

    pub fn with_host(self, host: DynUploadHost) -> Self {
        Self::transition(UploadedFile {
            origin: Origin::Host(host),
            ..self.config
        })
    }

    pub fn with_file_system(self, file_system: DynFileSystem) -> Self {
        Self::transition(UploadedFile {
            file_system,
            ..self.config
        })
    }

    pub fn build(self) -> UploadedFile {
        self.config
    }
}
