//! Memory-mapped I/O over anonymous and file-backed regions.
//!
//! A [`Mapping`] owns one region of virtual memory together with its backing file, if any.
//! It can change its protection, grow or shrink, flush itself to disk and pin its pages in
//! RAM. [`Source`] and [`Sink`] stream bytes out of and into a mapping as ordinary
//! sequential I/O.
//!
//! ```no_run
//! use std::io::Write;
//! use mmapio::{AccessFlags, MapCfg};
//!
//! let mapping = MapCfg::new()
//!     .path("data.bin")
//!     .access(AccessFlags::READ | AccessFlags::WRITE)
//!     .size(4096)
//!     .create()?;
//!
//! let mut sink = mapping.sink();
//! sink.write_all(b"hello")?;
//! sink.flush()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```



pub mod flags;
mod map;
pub mod stream;

pub use flags::*;
pub use map::*;
pub use stream::*;



use std::{io, path::PathBuf};



pub type Result<T> = std::result::Result<T, Error>;

/// A failure reported by the operating system, with its diagnostic text.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message} (os error {code})")]
pub struct OsError {
    pub code: i32,
    pub message: String,
}

impl From<io::Error> for OsError {
    fn from(e: io::Error) -> Self {
        let code = e.raw_os_error().unwrap_or(0);
        let mut message = e.to_string();
        // `io::Error` already appends the code.
        let suffix = format!(" (os error {code})");
        if message.ends_with(&suffix) {
            message.truncate(message.len() - suffix.len());
        }
        Self { code, message }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Attempted to create or resize a mapping to less than one byte.
    #[error("mapping size must be at least 1 byte, got {0}")]
    InvalidSize(usize),
    /// The backing file could not be opened or created.
    #[error("failed to open `{}`: {source}", path.display())]
    OpenFailed { path: PathBuf, source: OsError },
    #[error("failed to map memory: {0}")]
    MapFailed(OsError),
    /// Tearing down the current view failed; the mapping was left untouched.
    #[error("failed to unmap memory: {0}")]
    UnmapFailed(OsError),
    #[error("failed to change memory protection: {0}")]
    ProtectFailed(OsError),
    #[error("failed to sync memory: {0}")]
    SyncFailed(OsError),
    #[error("failed to lock memory: {0}")]
    LockFailed(OsError),
    #[error("failed to unlock memory: {0}")]
    UnlockFailed(OsError),
    #[error("failed to truncate backing file: {0}")]
    TruncateFailed(OsError),
    /// The view was released but the backing file handle could not be closed.
    #[error("failed to close backing file: {0}")]
    CloseFailed(OsError),
    /// The mapping has already been closed.
    #[error("mapping has already been closed")]
    UseAfterClose,
    /// The access flags cannot be expressed as a file open mode.
    #[error("unsupported access flags for a file-backed mapping: {0:?}")]
    UnsupportedAccessCombination(AccessFlags),
    /// The mapping's protection does not allow the attempted access.
    #[error("access denied: operation requires {required:?}, mapping grants {granted:?}")]
    AccessDenied { required: AccessFlags, granted: AccessFlags },
    /// A sink was asked to write more than the space left in its region.
    #[error("not enough space in mapping: requested {requested} bytes, {remaining} bytes remaining")]
    InsufficientSpace { requested: usize, remaining: usize },
    /// The mapping is too large to be copied into a single `Vec<u8>`.
    #[error("mapping of {size} bytes exceeds the array limit of {limit} bytes")]
    ArrayLimitExceeded { size: usize, limit: usize },
    /// A seek resolved to a position before the start of the stream or past `u64::MAX`.
    #[error("invalid seek by {offset} from {whence:?}")]
    InvalidSeek { offset: i64, whence: Whence },
    /// A reader or writer supplied by the caller failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        let kind = match &e {
            Error::Io(inner) => inner.kind(),
            Error::InvalidSize(_)
            | Error::InvalidSeek { .. }
            | Error::InsufficientSpace { .. }
            | Error::UnsupportedAccessCombination(_) => io::ErrorKind::InvalidInput,
            Error::AccessDenied { .. } => io::ErrorKind::PermissionDenied,
            Error::ArrayLimitExceeded { .. } => io::ErrorKind::OutOfMemory,
            _ => io::ErrorKind::Other,
        };
        match e {
            Error::Io(inner) => inner,
            other => io::Error::new(kind, other),
        }
    }
}
