//! Asynchronous I/O requests.
//!
//! ```c
//! hostio_handle_t *file = hostio_file_open("data.bin", HOSTIO_FILE_READ | HOSTIO_FILE_ASYNC);
//! hostio_handle_t *aio = hostio_aio_open(file);
//! char buf[4096];
//! if (hostio_aio_read(aio, 0, buf, sizeof buf) == 0) {
//!     size_t n;
//!     hostio_wait(aio);
//!     if (hostio_aio_status(aio, &n) == HOSTIO_AIO_COMPLETED) { /* n bytes in buf */ }
//! }
//! hostio_close(aio);
//! hostio_close(file);
//! ```

use libc::{c_int, c_void};

use hostio_aio::{AioRequest, AioStatus};
use hostio_core::{ErrorKind, File};

use crate::error::{check, set_last_error};
use crate::handle::{hostio_handle_t, payload};

#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum hostio_aio_status_t {
    /// Nothing has been issued yet.
    HOSTIO_AIO_IDLE = 0,
    HOSTIO_AIO_PENDING = 1,
    HOSTIO_AIO_COMPLETED = 2,
    HOSTIO_AIO_CANCELED = 3,
    /// The operation failed, or the handle is not an AIO request. The last
    /// error says which.
    HOSTIO_AIO_ERROR = -1,
}

/// Bind an AIO request to a file opened with `HOSTIO_FILE_ASYNC`.
#[unsafe(no_mangle)]
pub extern "C" fn hostio_aio_open(file: Option<&hostio_handle_t>) -> Option<Box<hostio_handle_t>> {
    let file = payload::<File>(file, "aio.open")?;
    let request = check(AioRequest::open(file))?;
    Some(hostio_handle_t::boxed(request))
}

/// Queue a read of `length` bytes at `offset`. Returns `0` once queued and
/// `-1` on failure, `Busy` when the previous operation is still pending.
///
/// # Safety
///
/// `buffer` must be valid for `length` bytes of writes and left alone until
/// the request reaches a terminal status.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostio_aio_read(
    aio: Option<&hostio_handle_t>,
    offset: u64,
    buffer: *mut c_void,
    length: usize,
) -> c_int {
    let Some(request) = payload::<AioRequest>(aio, "aio.read") else {
        return -1;
    };
    if buffer.is_null() && length != 0 {
        set_last_error(ErrorKind::InvalidArgument, "aio.read");
        return -1;
    }
    match check(unsafe { request.read_raw(offset, buffer.cast(), length) }) {
        Some(()) => 0,
        None => -1,
    }
}

/// Queue a write of `length` bytes at `offset`. Same contract as
/// [`hostio_aio_read`].
///
/// # Safety
///
/// `buffer` must be valid for `length` bytes of reads and left unmodified
/// until the request reaches a terminal status.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostio_aio_write(
    aio: Option<&hostio_handle_t>,
    offset: u64,
    buffer: *const c_void,
    length: usize,
) -> c_int {
    let Some(request) = payload::<AioRequest>(aio, "aio.write") else {
        return -1;
    };
    if buffer.is_null() && length != 0 {
        set_last_error(ErrorKind::InvalidArgument, "aio.write");
        return -1;
    }
    match check(unsafe { request.write_raw(offset, buffer.cast(), length) }) {
        Some(()) => 0,
        None => -1,
    }
}

/// Poll the request without blocking. On `HOSTIO_AIO_COMPLETED` the
/// transferred byte count is stored through `transferred` when it is not
/// null.
///
/// # Safety
///
/// `transferred` must be null or valid for a write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostio_aio_status(
    aio: Option<&hostio_handle_t>,
    transferred: *mut usize,
) -> hostio_aio_status_t {
    let Some(request) = payload::<AioRequest>(aio, "aio.status") else {
        return hostio_aio_status_t::HOSTIO_AIO_ERROR;
    };
    match request.status() {
        AioStatus::Idle => hostio_aio_status_t::HOSTIO_AIO_IDLE,
        AioStatus::Pending => hostio_aio_status_t::HOSTIO_AIO_PENDING,
        AioStatus::Completed(n) => {
            if !transferred.is_null() {
                unsafe { *transferred = n };
            }
            hostio_aio_status_t::HOSTIO_AIO_COMPLETED
        }
        AioStatus::Canceled => hostio_aio_status_t::HOSTIO_AIO_CANCELED,
        AioStatus::Failed(kind) => {
            set_last_error(kind, "aio.status");
            hostio_aio_status_t::HOSTIO_AIO_ERROR
        }
    }
}

/// Request cancellation of the in-flight operation. Succeeds at once when
/// nothing is pending.
#[unsafe(no_mangle)]
pub extern "C" fn hostio_aio_cancel(aio: Option<&hostio_handle_t>) -> c_int {
    let Some(request) = payload::<AioRequest>(aio, "aio.cancel") else {
        return -1;
    };
    match check(request.cancel()) {
        Some(()) => 0,
        None => -1,
    }
}
