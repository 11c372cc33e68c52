//! hostio C API.
//!
//! Every object crosses the boundary as an opaque `hostio_handle_t *`: files
//! from `hostio_file_open`, AIO requests from `hostio_aio_open`, watches from
//! `hostio_watch_dir` and snapshots from `hostio_snapshot_dir`. All of them
//! are released with `hostio_close`, and the waitable ones (AIO requests and
//! watches) work with `hostio_wait` and `hostio_timedwait`. Files and
//! snapshots are not waitable.
//!
//! Failures are reported through a sentinel return value plus the
//! thread-local last error, see [`error`]. Functions returning text or
//! events use the two-call size convention: pass a null buffer to learn the
//! size, then pass a buffer that large.
//!
//! The crate is built as a `staticlib` and a `cdylib`; the Rust `rlib` is
//! only there for the tests.

#![deny(
    dead_code,
    unused_imports,
    unused_unsafe,
    unreachable_patterns
)]

pub mod aio;
pub mod error;
pub mod handle;
pub mod snapshot;
mod string;
pub mod watch;

pub use aio::*;
pub use error::{
    hostio_last_error, hostio_last_error_message, hostio_perror, hostio_strerror,
    update_last_error,
};
pub use handle::{
    hostio_close, hostio_file_open, hostio_file_open_null, hostio_handle_t, hostio_pseudo_handle,
    hostio_pseudo_t, hostio_timedwait, hostio_wait, hostio_wait_result_t, HOSTIO_FILE_APPEND,
    HOSTIO_FILE_ASYNC, HOSTIO_FILE_CREATE, HOSTIO_FILE_READ, HOSTIO_FILE_TRUNCATE,
    HOSTIO_FILE_WRITE,
};
pub use snapshot::*;
pub use watch::*;
