//! Native error → [`ErrorKind`] translation.
//!
//! This is the single source of truth for mapping platform error codes into
//! the shared taxonomy. Backends must not duplicate this mapping elsewhere.

use std::io;

use crate::ErrorKind;

/// Convert an I/O error, preferring the raw OS code when there is one.
pub fn io_error_kind(err: &io::Error) -> ErrorKind {
    if let Some(code) = err.raw_os_error() {
        return native_to_kind(code);
    }
    match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::PermissionDenied => ErrorKind::AccessDenied,
        io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
        io::ErrorKind::BrokenPipe => ErrorKind::BrokenPipe,
        io::ErrorKind::Interrupted => ErrorKind::Interrupted,
        io::ErrorKind::InvalidInput => ErrorKind::InvalidArgument,
        io::ErrorKind::InvalidData => ErrorKind::InvalidArgument,
        io::ErrorKind::TimedOut => ErrorKind::TimedOut,
        io::ErrorKind::UnexpectedEof => ErrorKind::EndOfFile,
        io::ErrorKind::WouldBlock => ErrorKind::NotReady,
        io::ErrorKind::Unsupported => ErrorKind::NotSupported,
        io::ErrorKind::OutOfMemory => ErrorKind::OutOfMemory,
        io::ErrorKind::WriteZero => ErrorKind::IoError,
        _ => ErrorKind::IoError,
    }
}

#[cfg(unix)]
fn native_to_kind(code: i32) -> ErrorKind {
    errno_to_kind(code)
}

#[cfg(windows)]
fn native_to_kind(code: i32) -> ErrorKind {
    win32_to_kind(code as u32)
}

#[cfg(not(any(unix, windows)))]
fn native_to_kind(_code: i32) -> ErrorKind {
    ErrorKind::IoError
}

/// Convert a POSIX `errno` value.
#[cfg(unix)]
pub fn errno_to_kind(errno: i32) -> ErrorKind {
    match errno {
        0 => ErrorKind::InternalError,
        libc::EBADF => ErrorKind::InvalidHandle,
        libc::ENOMEM => ErrorKind::OutOfMemory,
        libc::EINVAL => ErrorKind::InvalidArgument,
        libc::EACCES | libc::EPERM | libc::EROFS => ErrorKind::AccessDenied,
        libc::ENOENT => ErrorKind::FileNotFound,
        libc::ENOTDIR => ErrorKind::PathNotFound,
        libc::ENAMETOOLONG | libc::ELOOP => ErrorKind::InvalidPath,
        libc::ERANGE | libc::EOVERFLOW | libc::EFBIG => ErrorKind::OutOfRange,
        libc::ENOSYS => ErrorKind::NotImplemented,
        libc::ENOTSUP => ErrorKind::NotSupported,
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        libc::EOPNOTSUPP => ErrorKind::NotSupported,
        libc::ENODEV | libc::ENXIO => ErrorKind::NotSupported,
        libc::EEXIST | libc::ENOTEMPTY => ErrorKind::AlreadyExists,
        libc::EPIPE => ErrorKind::BrokenPipe,
        libc::EAGAIN => ErrorKind::NotReady,
        libc::EDEADLK => ErrorKind::Deadlock,
        libc::EINTR => ErrorKind::Interrupted,
        libc::EIO => ErrorKind::IoError,
        libc::ENOSPC | libc::EDQUOT => ErrorKind::DiskFull,
        libc::EBUSY | libc::ETXTBSY | libc::EINPROGRESS => ErrorKind::Busy,
        libc::ETIMEDOUT => ErrorKind::TimedOut,
        libc::ENOEXEC => ErrorKind::InvalidImage,
        libc::ECANCELED => ErrorKind::Canceled,
        libc::EMFILE | libc::ENFILE => ErrorKind::OutOfMemory,
        libc::EISDIR => ErrorKind::AccessDenied,
        libc::ESPIPE => ErrorKind::InvalidArgument,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        libc::ENODATA => ErrorKind::NoData,
        _ => ErrorKind::IoError,
    }
}

/// Convert a Win32 error code (`GetLastError`).
#[cfg(windows)]
pub fn win32_to_kind(code: u32) -> ErrorKind {
    use windows_sys::Win32::Foundation::*;

    match code {
        ERROR_INVALID_HANDLE => ErrorKind::InvalidHandle,
        ERROR_NOT_ENOUGH_MEMORY | ERROR_OUTOFMEMORY => ErrorKind::OutOfMemory,
        ERROR_INVALID_PARAMETER | ERROR_INVALID_FUNCTION => ErrorKind::InvalidArgument,
        ERROR_ACCESS_DENIED | ERROR_WRITE_PROTECT => ErrorKind::AccessDenied,
        ERROR_FILE_NOT_FOUND => ErrorKind::FileNotFound,
        ERROR_PATH_NOT_FOUND => ErrorKind::PathNotFound,
        ERROR_INSUFFICIENT_BUFFER | ERROR_MORE_DATA => ErrorKind::BufferTooSmall,
        ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION => ErrorKind::SharingViolation,
        ERROR_ARITHMETIC_OVERFLOW => ErrorKind::OutOfRange,
        ERROR_NOT_SUPPORTED => ErrorKind::NotSupported,
        ERROR_HANDLE_EOF => ErrorKind::EndOfFile,
        ERROR_ALREADY_EXISTS | ERROR_FILE_EXISTS | ERROR_DIR_NOT_EMPTY => {
            ErrorKind::AlreadyExists
        }
        ERROR_BROKEN_PIPE | ERROR_NO_DATA => ErrorKind::BrokenPipe,
        ERROR_NO_MORE_FILES => ErrorKind::NoMoreFiles,
        ERROR_NOT_READY | ERROR_IO_INCOMPLETE => ErrorKind::NotReady,
        ERROR_POSSIBLE_DEADLOCK => ErrorKind::Deadlock,
        ERROR_IO_DEVICE | ERROR_CRC => ErrorKind::IoError,
        ERROR_DISK_FULL | ERROR_HANDLE_DISK_FULL => ErrorKind::DiskFull,
        ERROR_BUSY | ERROR_IO_PENDING => ErrorKind::Busy,
        WAIT_TIMEOUT | ERROR_TIMEOUT => ErrorKind::TimedOut,
        ERROR_INVALID_NAME | ERROR_BAD_PATHNAME | ERROR_FILENAME_EXCED_RANGE => {
            ErrorKind::InvalidPath
        }
        ERROR_BAD_EXE_FORMAT => ErrorKind::InvalidImage,
        ERROR_OPERATION_ABORTED | ERROR_CANCELLED => ErrorKind::Canceled,
        ERROR_CALL_NOT_IMPLEMENTED => ErrorKind::NotImplemented,
        _ => ErrorKind::IoError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn posix_table() {
        assert_eq!(errno_to_kind(libc::ENOENT), ErrorKind::FileNotFound);
        assert_eq!(errno_to_kind(libc::EACCES), ErrorKind::AccessDenied);
        assert_eq!(errno_to_kind(libc::ECANCELED), ErrorKind::Canceled);
        assert_eq!(errno_to_kind(libc::EBADF), ErrorKind::InvalidHandle);
        assert_eq!(errno_to_kind(libc::ENOSPC), ErrorKind::DiskFull);
        assert_eq!(errno_to_kind(-12345), ErrorKind::IoError);
    }

    #[cfg(unix)]
    #[test]
    fn raw_os_error_takes_precedence() {
        let err = io::Error::from_raw_os_error(libc::ENOTDIR);
        assert_eq!(io_error_kind(&err), ErrorKind::PathNotFound);
    }

    #[test]
    fn synthetic_io_errors_fall_back_to_kind() {
        let err = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert_eq!(io_error_kind(&err), ErrorKind::NotFound);
        let err = io::Error::new(io::ErrorKind::Other, "??");
        assert_eq!(io_error_kind(&err), ErrorKind::IoError);
    }
}
