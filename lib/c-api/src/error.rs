//! The thread-local last-error slot.
//!
//! Every fallible function signals failure through its return value (a null
//! pointer, `-1`, or a documented enum member) and records the reason here.
//! Success leaves the slot alone, so callers check the sentinel first and
//! only then ask for the error:
//!
//! ```c
//! hostio_handle_t *watch = hostio_watch_dir("/srv/in", HOSTIO_WATCH_RECURSIVE);
//! if (watch == NULL) {
//!     hostio_perror("watch");
//!     return hostio_last_error();
//! }
//! ```
//!
//! Messages follow the two-call size convention: ask with a null buffer for
//! the size (NUL included), then call again with a buffer that large.

use libc::{c_char, c_int};
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::sync::LazyLock;

use hostio_core::{Error, ErrorKind};

use crate::string::copy_out;

struct LastError {
    kind: ErrorKind,
    message: String,
}

thread_local! {
    static LAST_ERROR: RefCell<Option<LastError>> = const { RefCell::new(None) };
}

/// One static message per error code, indexed by `code - 1`.
static MESSAGES: LazyLock<Vec<CString>> = LazyLock::new(|| {
    ErrorKind::ALL
        .iter()
        .map(|kind| CString::new(kind.to_string()).unwrap_or_default())
        .collect()
});

/// Record `err` as the calling thread's last error.
pub fn update_last_error(err: &Error) {
    tracing::trace!(error = %err, "c api call failed");
    LAST_ERROR.with(|prev| {
        *prev.borrow_mut() = Some(LastError {
            kind: err.kind(),
            message: err.to_string(),
        });
    });
}

pub(crate) fn set_last_error(kind: ErrorKind, context: &'static str) {
    update_last_error(&Error::new(kind, context));
}

/// Unwrap a result, recording the error and returning `None` on failure.
pub(crate) fn check<T>(result: hostio_core::Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            update_last_error(&err);
            None
        }
    }
}

/// Code of the calling thread's last error, `0` if there is none.
#[unsafe(no_mangle)]
pub extern "C" fn hostio_last_error() -> c_int {
    LAST_ERROR.with(|prev| match &*prev.borrow() {
        Some(last) => last.kind.code(),
        None => 0,
    })
}

/// Static, NUL-terminated description of an error code. Never null.
#[unsafe(no_mangle)]
pub extern "C" fn hostio_strerror(code: c_int) -> *const c_char {
    let message: &CStr = match code {
        0 => c"no error",
        code => match ErrorKind::from_code(code) {
            Some(kind) => MESSAGES[(kind.code() - 1) as usize].as_c_str(),
            None => c"unknown error",
        },
    };
    message.as_ptr()
}

/// Write `"<prefix>: <message>\n"` for the last error to standard error.
/// A null or empty prefix prints the message alone.
///
/// # Safety
///
/// `prefix` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostio_perror(prefix: *const c_char) {
    let message = LAST_ERROR.with(|prev| match &*prev.borrow() {
        Some(last) => last.message.clone(),
        None => "no error".to_string(),
    });
    let prefix = if prefix.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(prefix) }.to_string_lossy())
    };
    match prefix {
        Some(prefix) if !prefix.is_empty() => eprintln!("{prefix}: {message}"),
        _ => eprintln!("{message}"),
    }
}

/// Copy the last error's full message (operation name included) into
/// `buffer`.
///
/// Returns the size the message needs, NUL included, when `buffer` is null
/// or `length` is zero, and the number of bytes written otherwise. `0` means
/// there is no error. A buffer that is too small gets nothing and the call
/// returns `-1`; the slot keeps the original error.
///
/// # Safety
///
/// `buffer` must be null or valid for `length` bytes of writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostio_last_error_message(buffer: *mut c_char, length: usize) -> isize {
    LAST_ERROR.with(|prev| match &*prev.borrow() {
        Some(last) => match unsafe { copy_out(last.message.as_bytes(), buffer, length) } {
            Ok(size) => size as isize,
            Err(_) => -1,
        },
        None => 0,
    })
}
