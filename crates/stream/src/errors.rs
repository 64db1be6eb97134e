//! Stream error definitions.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Argument must be a valid stream resource: {0}")]
    InvalidResource(#[source] io::Error),
    #[error("Invalid stream mode '{0}'")]
    InvalidMode(String),
    #[error("No resource is attached to the stream")]
    Detached,
    #[error("Stream {0} is not seekable")]
    NotSeekable(String),
    #[error("Stream {0} is not readable")]
    NotReadable(String),
    #[error("Stream {0} is not writable")]
    NotWritable(String),
    #[error("Could not get the position of the pointer in pipe {0}")]
    PipePosition(String),
    #[error("Could not {op} {target}: {source}")]
    Io {
        op: &'static str,
        target: String,
        #[source]
        source: io::Error,
    },
}

impl StreamError {
    /// Errors caused by the caller handing over a bad argument, as opposed to
    /// a failure of the underlying descriptor.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            StreamError::InvalidResource(_) | StreamError::InvalidMode(_)
        )
    }

    pub(crate) fn io(op: &'static str, target: impl Into<String>, source: io::Error) -> Self {
        StreamError::Io {
            op,
            target: target.into(),
            source,
        }
    }
}
