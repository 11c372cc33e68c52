use std::io;

use thiserror::Error;

/// The shared error taxonomy.
///
/// Every native error space (POSIX `errno`, Win32 error codes) is folded into
/// this enum exactly once, at the native boundary, by the tables in
/// [`crate::errno`]. Callers only ever observe these values.
///
/// The discriminants are stable: the C surface hands them out as plain
/// integers and `0` is reserved for "no error".
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorKind {
    /// The handle is null, already closed or of the wrong class
    #[error("invalid handle")]
    InvalidHandle = 1,
    /// An allocation failed
    #[error("out of memory")]
    OutOfMemory,
    /// An argument was out of its domain
    #[error("invalid argument")]
    InvalidArgument,
    /// The object is not in a state that allows the operation
    #[error("invalid state")]
    InvalidState,
    /// The handle's class has no wait function
    #[error("handle is not waitable")]
    NotWaitable,
    /// Caller was not allowed to perform this operation
    #[error("access denied")]
    AccessDenied,
    /// The requested entity could not be found
    #[error("not found")]
    NotFound,
    /// The requested file could not be found
    #[error("file not found")]
    FileNotFound,
    /// A directory component of the path could not be found
    #[error("path not found")]
    PathNotFound,
    /// The caller supplied buffer cannot hold the result
    #[error("buffer too small")]
    BufferTooSmall,
    /// The file is opened by someone else in an incompatible mode
    #[error("sharing violation")]
    SharingViolation,
    /// A numeric value does not fit the allowed range
    #[error("value out of range")]
    OutOfRange,
    /// The platform does not support the operation
    #[error("operation not supported")]
    NotSupported,
    /// Found EOF where data was expected
    #[error("end of file")]
    EndOfFile,
    /// File exists
    #[error("already exists")]
    AlreadyExists,
    /// A pipe was closed
    #[error("broken pipe")]
    BrokenPipe,
    /// Directory enumeration is exhausted
    #[error("no more files")]
    NoMoreFiles,
    /// Nothing is available to read
    #[error("no data available")]
    NoData,
    /// The device or object is not ready
    #[error("not ready")]
    NotReady,
    /// The operation would deadlock
    #[error("resource deadlock avoided")]
    Deadlock,
    /// The operation was interrupted before it could finish
    #[error("interrupted")]
    Interrupted,
    /// Something failed when doing IO
    #[error("i/o error")]
    IoError,
    /// No space left on the device
    #[error("disk full")]
    DiskFull,
    /// An operation is already in flight on this object
    #[error("resource busy")]
    Busy,
    /// The operation did not complete within the given amount of time
    #[error("timed out")]
    TimedOut,
    /// The path is malformed
    #[error("invalid path")]
    InvalidPath,
    /// The executable image is malformed
    #[error("invalid image")]
    InvalidImage,
    /// The operation was canceled
    #[error("canceled")]
    Canceled,
    /// Some other unhandled error. If you see this, it's probably a bug.
    #[error("internal error")]
    InternalError,
    /// The operation is not implemented on this backend
    #[error("not implemented")]
    NotImplemented,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 30] = [
        ErrorKind::InvalidHandle,
        ErrorKind::OutOfMemory,
        ErrorKind::InvalidArgument,
        ErrorKind::InvalidState,
        ErrorKind::NotWaitable,
        ErrorKind::AccessDenied,
        ErrorKind::NotFound,
        ErrorKind::FileNotFound,
        ErrorKind::PathNotFound,
        ErrorKind::BufferTooSmall,
        ErrorKind::SharingViolation,
        ErrorKind::OutOfRange,
        ErrorKind::NotSupported,
        ErrorKind::EndOfFile,
        ErrorKind::AlreadyExists,
        ErrorKind::BrokenPipe,
        ErrorKind::NoMoreFiles,
        ErrorKind::NoData,
        ErrorKind::NotReady,
        ErrorKind::Deadlock,
        ErrorKind::Interrupted,
        ErrorKind::IoError,
        ErrorKind::DiskFull,
        ErrorKind::Busy,
        ErrorKind::TimedOut,
        ErrorKind::InvalidPath,
        ErrorKind::InvalidImage,
        ErrorKind::Canceled,
        ErrorKind::InternalError,
        ErrorKind::NotImplemented,
    ];

    /// Stable integer code, never `0`.
    pub const fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<ErrorKind> {
        Self::ALL.iter().copied().find(|kind| kind.code() == code)
    }

    /// Whether this kind means "the thing is not there", whichever flavour
    /// of not-found the native layer reported.
    pub fn is_not_found(self) -> bool {
        matches!(
            self,
            ErrorKind::NotFound | ErrorKind::FileNotFound | ErrorKind::PathNotFound
        )
    }
}

/// Error type for external users.
///
/// Carries the translated [`ErrorKind`], the name of the operation that
/// failed and, when the failure came from the OS, the original I/O error.
#[derive(Error, Debug)]
#[error("{context}: {kind}")]
pub struct Error {
    kind: ErrorKind,
    context: &'static str,
    #[source]
    source: Option<io::Error>,
}

impl Error {
    pub fn new(kind: ErrorKind, context: &'static str) -> Self {
        Self {
            kind,
            context,
            source: None,
        }
    }

    pub fn with_source(kind: ErrorKind, context: &'static str, source: io::Error) -> Self {
        Self {
            kind,
            context,
            source: Some(source),
        }
    }

    /// Translate an OS error through the native tables.
    pub fn from_io(context: &'static str, err: io::Error) -> Self {
        let kind = crate::errno::io_error_kind(&err);
        Self::with_source(kind, context, err)
    }

    /// Build an error from the calling thread's last OS error.
    pub fn last_os_error(context: &'static str) -> Self {
        Self::from_io(context, io::Error::last_os_error())
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn context(&self) -> &'static str {
        self.context
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind, "hostio")
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn io_result<T>(context: &'static str, result: io::Result<T>) -> Result<T> {
    result.map_err(|err| Error::from_io(context, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique_and_round_trip() {
        for (index, kind) in ErrorKind::ALL.iter().enumerate() {
            assert_eq!(kind.code(), index as i32 + 1);
            assert_eq!(ErrorKind::from_code(kind.code()), Some(*kind));
        }
        assert_eq!(ErrorKind::from_code(0), None);
    }

    #[test]
    fn display_includes_context() {
        let err = Error::new(ErrorKind::Busy, "aio.read");
        assert_eq!(err.to_string(), "aio.read: resource busy");
        assert_eq!(err.kind(), ErrorKind::Busy);
    }
}
