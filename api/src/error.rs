//! Error surface shared between the engine and its host bindings.
//!
//! The engine reports every failure as a POSIX error number; a host binding
//! turns that into the negative integer return value of the corresponding
//! call. [`Errno`] is that number. [`ApiError`] covers the failures of the
//! API-side collaborators (the dump image and the record codec); the engine
//! embeds it in its own error type via `#[from]`, so `?` composes across the
//! crate boundary.

use std::fmt;
use std::io;
use thiserror::Error;

/// POSIX error numbers surfaced by the engine.
///
/// The discriminants are the classic Linux values, so `as_neg` yields the
/// exact negative integer a binding hands back to its caller.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    /// Operation not permitted
    EPERM = 1,
    /// No such file or directory
    ENOENT = 2,
    /// I/O error (also: internal allocation-driven failure)
    EIO = 5,
    /// Bad file descriptor
    EBADF = 9,
    /// Out of memory
    ENOMEM = 12,
    /// Permission denied
    EACCES = 13,
    /// Device or resource busy
    EBUSY = 16,
    /// File exists
    EEXIST = 17,
    /// No such device
    ENODEV = 19,
    /// Not a directory
    ENOTDIR = 20,
    /// Is a directory
    EISDIR = 21,
    /// Invalid argument
    EINVAL = 22,
    /// File too large
    EFBIG = 27,
    /// Result too large for the provided buffer
    ERANGE = 34,
    /// File name too long
    ENAMETOOLONG = 36,
    /// Directory not empty
    ENOTEMPTY = 39,
    /// Too many levels of symbolic links
    ELOOP = 40,
    /// Value too large for defined data type
    EOVERFLOW = 75,
    /// Operation not supported
    EOPNOTSUPP = 95,
}

impl Errno {
    /// The negative integer form a binding returns to its caller.
    pub fn as_neg(self) -> i32 {
        -(self as i32)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error type used by the API-side collaborators (dump image, record codec).
#[derive(Error, Debug)]
pub enum ApiError {
    /// I/O on the host file backing a dump image failed
    #[error("issue using IO on the dump image")]
    ImageIo(#[from] io::Error),
    /// Encoding or decoding a fixed image record failed
    #[error("issue with the image record codec")]
    ImageCodec(#[from] bincode::Error),
    /// Invalid input to the image layer
    #[error("invalid image input: {0}")]
    ImageInput(&'static str),

    ///Catch-all for errors that carry no structure the caller can act on.
    ///The [`anyhow`](https://docs.rs/anyhow/1.0.33/anyhow/) crate lets any error be cast into this variant,
    ///which keeps `?` usable in glue code without growing this enum for every one-off failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// The POSIX number this failure surfaces as.
    pub fn errno(&self) -> Errno {
        match self {
            ApiError::ImageIo(_) => Errno::EIO,
            ApiError::ImageCodec(_) => Errno::EIO,
            ApiError::ImageInput(_) => Errno::EINVAL,
            ApiError::Other(_) => Errno::EIO,
        }
    }
}

/// Shorthand for results produced by the API layer.
pub type Result<T> = std::result::Result<T, ApiError>;
