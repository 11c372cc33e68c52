//! Generic handle operations and the synchronous file collaborator.

use libc::c_char;

use hostio_core::{
    Error, ErrorKind, File, Handle, OpenOptions, Payload, PseudoHandle, Timeout, WaitStatus,
};

use crate::error::{check, update_last_error};
use crate::string::path_from_c;

/// Opaque owner of one handle. Created by the `*_open`, `*_dir` and
/// `hostio_pseudo_handle` functions, destroyed by [`hostio_close`].
#[allow(non_camel_case_types)]
#[derive(Debug)]
pub struct hostio_handle_t {
    pub(crate) inner: Handle,
}

impl hostio_handle_t {
    pub(crate) fn boxed<P: Payload>(payload: P) -> Box<hostio_handle_t> {
        Box::new(hostio_handle_t {
            inner: Handle::new(payload),
        })
    }
}

#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum hostio_wait_result_t {
    HOSTIO_WAIT_SIGNALED = 0,
    HOSTIO_WAIT_TIMED_OUT = 1,
    HOSTIO_WAIT_FAILED = -1,
}

#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum hostio_pseudo_t {
    HOSTIO_CURRENT_PROCESS = 0,
    HOSTIO_STDIN = 1,
    HOSTIO_STDOUT = 2,
    HOSTIO_STDERR = 3,
}

pub const HOSTIO_FILE_READ: u32 = 1 << 0;
pub const HOSTIO_FILE_WRITE: u32 = 1 << 1;
pub const HOSTIO_FILE_CREATE: u32 = 1 << 2;
pub const HOSTIO_FILE_TRUNCATE: u32 = 1 << 3;
pub const HOSTIO_FILE_APPEND: u32 = 1 << 4;
/// Open for asynchronous access, as `hostio_aio_open` requires.
pub const HOSTIO_FILE_ASYNC: u32 = 1 << 5;

/// Resolve a handle argument to the payload an operation expects, recording
/// `InvalidHandle` when it is null or of another class.
pub(crate) fn payload<'a, P: Payload>(
    handle: Option<&'a hostio_handle_t>,
    context: &'static str,
) -> Option<&'a P> {
    match handle {
        Some(handle) => check(handle.inner.downcast_ref::<P>()),
        None => {
            update_last_error(&Error::new(ErrorKind::InvalidHandle, context));
            None
        }
    }
}

fn wait(handle: Option<&hostio_handle_t>, timeout: Timeout) -> hostio_wait_result_t {
    let Some(handle) = handle else {
        update_last_error(&Error::new(ErrorKind::InvalidHandle, "handle.wait"));
        return hostio_wait_result_t::HOSTIO_WAIT_FAILED;
    };
    match check(handle.inner.wait(timeout)) {
        Some(WaitStatus::Signaled) => hostio_wait_result_t::HOSTIO_WAIT_SIGNALED,
        Some(WaitStatus::TimedOut) => hostio_wait_result_t::HOSTIO_WAIT_TIMED_OUT,
        None => hostio_wait_result_t::HOSTIO_WAIT_FAILED,
    }
}

/// Block until the handle is signaled.
#[unsafe(no_mangle)]
pub extern "C" fn hostio_wait(handle: Option<&hostio_handle_t>) -> hostio_wait_result_t {
    wait(handle, Timeout::Infinite)
}

/// Block for at most `timeout_ms` milliseconds. `0` polls and `UINT32_MAX`
/// waits forever.
#[unsafe(no_mangle)]
pub extern "C" fn hostio_timedwait(
    handle: Option<&hostio_handle_t>,
    timeout_ms: u32,
) -> hostio_wait_result_t {
    wait(handle, Timeout::from_millis(timeout_ms))
}

/// Destroy a handle. Null is ignored; closing twice is undefined.
#[unsafe(no_mangle)]
pub extern "C" fn hostio_close(handle: Option<Box<hostio_handle_t>>) {
    if let Some(handle) = handle {
        handle.inner.close();
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn hostio_pseudo_handle(kind: hostio_pseudo_t) -> Box<hostio_handle_t> {
    let kind = match kind {
        hostio_pseudo_t::HOSTIO_CURRENT_PROCESS => PseudoHandle::CurrentProcess,
        hostio_pseudo_t::HOSTIO_STDIN => PseudoHandle::Stdin,
        hostio_pseudo_t::HOSTIO_STDOUT => PseudoHandle::Stdout,
        hostio_pseudo_t::HOSTIO_STDERR => PseudoHandle::Stderr,
    };
    Box::new(hostio_handle_t {
        inner: Handle::pseudo(kind),
    })
}

/// Open a file with a combination of the `HOSTIO_FILE_*` flags.
///
/// # Safety
///
/// `path` must be a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostio_file_open(
    path: *const c_char,
    flags: u32,
) -> Option<Box<hostio_handle_t>> {
    let path = check(unsafe { path_from_c(path) })?;
    let file = check(
        OpenOptions::new()
            .read(flags & HOSTIO_FILE_READ != 0)
            .write(flags & HOSTIO_FILE_WRITE != 0)
            .create(flags & HOSTIO_FILE_CREATE != 0)
            .truncate(flags & HOSTIO_FILE_TRUNCATE != 0)
            .append(flags & HOSTIO_FILE_APPEND != 0)
            .asynchronous(flags & HOSTIO_FILE_ASYNC != 0)
            .open(path),
    )?;
    Some(hostio_handle_t::boxed(file))
}

/// The null device: reads see end of file, writes are discarded.
#[unsafe(no_mangle)]
pub extern "C" fn hostio_file_open_null() -> Box<hostio_handle_t> {
    hostio_handle_t::boxed(File::null())
}
