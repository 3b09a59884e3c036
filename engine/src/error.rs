//! Error types of the engine, layered the way the crates are.
//!
//! The sparse data store has its own small error type; the engine-level
//! [`FsError`] embeds it (and the API layer's error) via `#[from]`, so `?`
//! moves failures up the layers without hand-written conversions. Every
//! variant maps onto exactly one [`Errno`]; a binding calls
//! [`FsError::errno`] and negates.

use memvfs_api::error::{ApiError, Errno};
use thiserror::Error;

/// Error type of the sparse data layer.
#[derive(Error, Debug)]
pub enum DataError {
    /// A buffer or table allocation failed.
    #[error("data store allocation failed")]
    NoMemory,
    /// An offset or length reached past the maximum file size.
    #[error("file size limit exceeded")]
    TooBig,
    /// Malformed input to a range operation.
    #[error("invalid range input: {0}")]
    Input(&'static str),
}

impl DataError {
    /// The POSIX number this failure surfaces as.
    pub fn errno(&self) -> Errno {
        match self {
            DataError::NoMemory => Errno::ENOMEM,
            DataError::TooBig => Errno::EFBIG,
            DataError::Input(_) => Errno::EINVAL,
        }
    }
}

/// Error type of the engine's operation surface.
#[derive(Error, Debug)]
pub enum FsError {
    /// Operation not permitted on this object
    #[error("operation not permitted: {0}")]
    NotPermitted(&'static str),
    /// A path component does not exist
    #[error("no such file or directory")]
    NotFound,
    /// The descriptor is not open, or refuses this access
    #[error("bad file descriptor {0}")]
    BadFd(i32),
    /// The permission gate rejected the caller
    #[error("permission denied")]
    Access,
    /// The object is in use and cannot be removed or renamed
    #[error("resource busy: {0}")]
    Busy(&'static str),
    /// The target name already exists
    #[error("file exists")]
    Exists,
    /// A non-terminal component is not a directory, or a directory was required
    #[error("not a directory")]
    NotDir,
    /// The target is a directory where one is not allowed
    #[error("is a directory")]
    IsDir,
    /// An argument failed validation
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// The caller's buffer cannot hold the result
    #[error("result does not fit the provided buffer")]
    Range,
    /// A path or component exceeded its limit
    #[error("file name too long")]
    NameTooLong,
    /// A directory scheduled for removal still has entries
    #[error("directory not empty")]
    NotEmpty,
    /// The symlink follow budget ran out
    #[error("too many levels of symbolic links")]
    Loop,
    /// Seek arithmetic left the representable range
    #[error("offset overflows the result type")]
    Overflow,
    /// The flag grammar accepts this, but the engine does not implement it
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),
    /// The descriptor does not refer to an object this operation accepts
    #[error("no such device")]
    NoDevice,
    /// A table allocation failed
    #[error("engine allocation failed")]
    NoMemory,
    /// An internal invariant did not hold; surfaces as an I/O error
    #[error("engine state corrupt: {0}")]
    Corrupt(&'static str),

    /// Failure in the sparse data layer
    #[error("error in the data layer")]
    Data(#[from] DataError),
    /// Failure in the API layer (dump image, record codec)
    #[error("error in the image layer")]
    Api(#[from] ApiError),
    ///Catch-all for one-off failures from glue code, kept castable via
    ///[`anyhow`](https://docs.rs/anyhow/1.0.33/anyhow/) so `?` stays usable there
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FsError {
    /// The POSIX number this failure surfaces as; a binding returns
    /// `errno().as_neg()`.
    pub fn errno(&self) -> Errno {
        match self {
            FsError::NotPermitted(_) => Errno::EPERM,
            FsError::NotFound => Errno::ENOENT,
            FsError::BadFd(_) => Errno::EBADF,
            FsError::Access => Errno::EACCES,
            FsError::Busy(_) => Errno::EBUSY,
            FsError::Exists => Errno::EEXIST,
            FsError::NotDir => Errno::ENOTDIR,
            FsError::IsDir => Errno::EISDIR,
            FsError::Invalid(_) => Errno::EINVAL,
            FsError::Range => Errno::ERANGE,
            FsError::NameTooLong => Errno::ENAMETOOLONG,
            FsError::NotEmpty => Errno::ENOTEMPTY,
            FsError::Loop => Errno::ELOOP,
            FsError::Overflow => Errno::EOVERFLOW,
            FsError::NotSupported(_) => Errno::EOPNOTSUPP,
            FsError::NoDevice => Errno::ENODEV,
            FsError::NoMemory => Errno::ENOMEM,
            FsError::Corrupt(_) => Errno::EIO,
            FsError::Data(e) => e.errno(),
            FsError::Api(e) => e.errno(),
            FsError::Other(_) => Errno::EIO,
        }
    }
}

/// Shorthand for results produced by the engine.
pub type Result<T> = std::result::Result<T, FsError>;
