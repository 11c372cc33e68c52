//! String plumbing shared by every function that takes or returns text.

use libc::c_char;
use std::ffi::{CStr, CString};
use std::path::{Path, PathBuf};

use hostio_core::{Error, ErrorKind, Result};

/// The two-call size convention.
///
/// With a null `buf` or a zero `cap`, returns the size `bytes` needs with
/// its NUL terminator. Otherwise copies `bytes` and the NUL and returns the
/// same size, or fails with [`ErrorKind::BufferTooSmall`] without writing.
///
/// # Safety
///
/// `buf` must be null or valid for `cap` bytes of writes.
pub(crate) unsafe fn copy_out(bytes: &[u8], buf: *mut c_char, cap: usize) -> Result<usize> {
    let size = bytes.len() + 1;
    if buf.is_null() || cap == 0 {
        return Ok(size);
    }
    if cap < size {
        return Err(Error::new(ErrorKind::BufferTooSmall, "string.copy"));
    }
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf.cast::<u8>(), bytes.len());
        *buf.add(bytes.len()) = 0;
    }
    Ok(size)
}

/// Borrow a path argument.
///
/// # Safety
///
/// `ptr` must be null or a valid NUL-terminated string.
pub(crate) unsafe fn path_from_c(ptr: *const c_char) -> Result<PathBuf> {
    if ptr.is_null() {
        return Err(Error::new(ErrorKind::InvalidArgument, "string.path"));
    }
    let bytes = unsafe { CStr::from_ptr(ptr) }.to_bytes();
    if bytes.is_empty() {
        return Err(Error::new(ErrorKind::InvalidPath, "string.path"));
    }
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        Ok(PathBuf::from(std::ffi::OsStr::from_bytes(bytes)))
    }
    #[cfg(not(unix))]
    {
        std::str::from_utf8(bytes)
            .map(PathBuf::from)
            .map_err(|_| Error::new(ErrorKind::InvalidPath, "string.path"))
    }
}

/// The bytes a path is handed back to C as: raw on Unix, UTF-8 elsewhere.
pub(crate) fn path_bytes(path: &Path) -> Vec<u8> {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        path.as_os_str().as_bytes().to_vec()
    }
    #[cfg(not(unix))]
    {
        path.to_string_lossy().into_owned().into_bytes()
    }
}

pub(crate) fn path_to_c(path: &Path) -> Result<CString> {
    CString::new(path_bytes(path)).map_err(|_| Error::new(ErrorKind::InvalidPath, "string.path"))
}
