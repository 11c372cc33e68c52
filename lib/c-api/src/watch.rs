//! Directory watches.
//!
//! Events come out in the encoded form of [`hostio_watch::WatchEvent`]:
//! a little-endian `u32` kind (one of the `HOSTIO_EVENT_*` values), a
//! little-endian `u32` offset of the old name, the name and, for renames,
//! the old name, each NUL-terminated. The offset counts from the first name
//! byte and is `0` when there is no old name.

use libc::c_char;

use hostio_watch::{Watch, WatchEventKind, WatchFlags};

use crate::error::check;
use crate::handle::{hostio_handle_t, payload};
use crate::string::path_from_c;

pub const HOSTIO_WATCH_RECURSIVE: u32 = WatchFlags::RECURSIVE.bits();
pub const HOSTIO_WATCH_EVENTS_ONLY: u32 = WatchFlags::EVENTS_ONLY.bits();

pub const HOSTIO_EVENT_ADD: u32 = WatchEventKind::Add as u32;
pub const HOSTIO_EVENT_REMOVE: u32 = WatchEventKind::Remove as u32;
pub const HOSTIO_EVENT_MODIFY: u32 = WatchEventKind::Modify as u32;
pub const HOSTIO_EVENT_RENAME: u32 = WatchEventKind::Rename as u32;

/// Start watching a directory. Unknown flag bits are ignored.
///
/// # Safety
///
/// `path` must be a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostio_watch_dir(
    path: *const c_char,
    flags: u32,
) -> Option<Box<hostio_handle_t>> {
    let path = check(unsafe { path_from_c(path) })?;
    let watch = check(Watch::open(path, WatchFlags::from_bits_truncate(flags)))?;
    Some(hostio_handle_t::boxed(watch))
}

/// Two-phase retrieval of the oldest queued event.
///
/// With a null `buffer` or a zero `length`, returns the size the front event
/// needs and leaves it queued. With a large enough buffer, pops the event,
/// writes it and returns its size. Returns `0` when nothing is queued and
/// `-1` on failure: `BufferTooSmall` leaves the event queued, and once the
/// watch has failed every call returns its stored error.
///
/// # Safety
///
/// `buffer` must be null or valid for `length` bytes of writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostio_watch_get_result(
    watch: Option<&hostio_handle_t>,
    buffer: *mut u8,
    length: usize,
) -> isize {
    let Some(watch) = payload::<Watch>(watch, "watch.get_result") else {
        return -1;
    };
    let buf = if buffer.is_null() || length == 0 {
        None
    } else {
        Some(unsafe { std::slice::from_raw_parts_mut(buffer, length) })
    };
    match check(watch.get_result(buf)) {
        Some(size) => size as isize,
        None => -1,
    }
}
