//! Stream adapter over an owned OS file descriptor.
//!
//! [`Stream`] wraps one descriptor (regular file, pipe or process pipe) and
//! exposes read/write/seek and metadata queries with validation. Derived state
//! (readability, seekability, size, pipe detection) is computed lazily and
//! cached until the descriptor changes.

pub mod errors;
mod mode;
mod stream;

pub use errors::StreamError;
pub use mode::{READABLE_MODES, WRITABLE_MODES};
pub use stream::{Metadata, Stream};
