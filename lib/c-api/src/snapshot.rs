//! Directory snapshots.
//!
//! `hostio_snapshot_dir` returns an owning handle. Every node of the tree,
//! the root included, is reached through borrowed `hostio_snapshot_t`
//! views: [`hostio_snapshot_root`], [`hostio_snapshot_enumerate`] and
//! [`hostio_snapshot_lookup`] hand them out, and they stay valid until the
//! next [`hostio_snapshot_refresh`] or [`crate::hostio_close`] of the
//! handle. Views are never closed.

use libc::{c_char, c_int, c_void};

use hostio_core::{ErrorKind, FileType, Stat, Timespec};
use hostio_snapshot::{MaxDepth, Snapshot, SnapshotCursor, SnapshotEvent, SnapshotFlags};

use crate::error::{check, set_last_error, update_last_error};
use crate::handle::{hostio_handle_t, payload};
use crate::string::{copy_out, path_bytes, path_from_c, path_to_c};

pub const HOSTIO_SNAPSHOT_FOLLOW_SYMLINKS: u32 = SnapshotFlags::FOLLOW_SYMLINKS.bits();
pub const HOSTIO_SNAPSHOT_SKIP_HIDDEN: u32 = SnapshotFlags::SKIP_HIDDEN.bits();

/// A borrowed node of a snapshot tree.
#[allow(non_camel_case_types)]
#[repr(transparent)]
pub struct hostio_snapshot_t(Snapshot);

impl hostio_snapshot_t {
    fn view(node: &Snapshot) -> &hostio_snapshot_t {
        // Sound because of `repr(transparent)`.
        unsafe { &*(node as *const Snapshot as *const hostio_snapshot_t) }
    }
}

/// Opaque enumeration position; zero-initialize it before the first call.
#[allow(non_camel_case_types)]
pub type hostio_snapshot_cursor_t = SnapshotCursor;

#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum hostio_snapshot_event_t {
    HOSTIO_SNAPSHOT_ADD = 1,
    HOSTIO_SNAPSHOT_REMOVE = 2,
    HOSTIO_SNAPSHOT_MODIFY = 3,
}

impl From<SnapshotEvent> for hostio_snapshot_event_t {
    fn from(event: SnapshotEvent) -> Self {
        match event {
            SnapshotEvent::Add => hostio_snapshot_event_t::HOSTIO_SNAPSHOT_ADD,
            SnapshotEvent::Remove => hostio_snapshot_event_t::HOSTIO_SNAPSHOT_REMOVE,
            SnapshotEvent::Modify => hostio_snapshot_event_t::HOSTIO_SNAPSHOT_MODIFY,
        }
    }
}

/// Receives the absolute path of each change. It must not call back into
/// the snapshot being refreshed.
#[allow(non_camel_case_types)]
pub type hostio_snapshot_callback_t =
    unsafe extern "C" fn(path: *const c_char, event: hostio_snapshot_event_t, user_data: *mut c_void);

#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum hostio_file_type_t {
    HOSTIO_TYPE_FILE = 0,
    HOSTIO_TYPE_DIRECTORY = 1,
    HOSTIO_TYPE_SYMLINK = 2,
    HOSTIO_TYPE_OTHER = 3,
}

#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct hostio_timespec_t {
    pub secs: i64,
    pub nanos: u32,
}

impl From<Timespec> for hostio_timespec_t {
    fn from(time: Timespec) -> Self {
        Self {
            secs: time.secs,
            nanos: time.nanos,
        }
    }
}

#[allow(non_camel_case_types)]
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct hostio_stat_t {
    pub file_type: hostio_file_type_t,
    pub size: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub inode: u64,
    pub device: u64,
    pub accessed: hostio_timespec_t,
    pub modified: hostio_timespec_t,
    pub changed: hostio_timespec_t,
}

impl From<&Stat> for hostio_stat_t {
    fn from(stat: &Stat) -> Self {
        Self {
            file_type: match stat.file_type {
                FileType::File => hostio_file_type_t::HOSTIO_TYPE_FILE,
                FileType::Directory => hostio_file_type_t::HOSTIO_TYPE_DIRECTORY,
                FileType::Symlink => hostio_file_type_t::HOSTIO_TYPE_SYMLINK,
                FileType::Other => hostio_file_type_t::HOSTIO_TYPE_OTHER,
            },
            size: stat.size,
            mode: stat.mode,
            nlink: stat.nlink,
            uid: stat.uid,
            gid: stat.gid,
            inode: stat.inode,
            device: stat.device,
            accessed: stat.accessed.into(),
            modified: stat.modified.into(),
            changed: stat.changed.into(),
        }
    }
}

fn node<'a>(snapshot: Option<&'a hostio_snapshot_t>, context: &'static str) -> Option<&'a Snapshot> {
    match snapshot {
        Some(view) => Some(&view.0),
        None => {
            set_last_error(ErrorKind::InvalidHandle, context);
            None
        }
    }
}

/// Capture `path` down to `max_depth` levels below it; negative means no
/// limit.
///
/// # Safety
///
/// `path` must be a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostio_snapshot_dir(
    path: *const c_char,
    flags: u32,
    max_depth: c_int,
) -> Option<Box<hostio_handle_t>> {
    let path = check(unsafe { path_from_c(path) })?;
    let snapshot = check(Snapshot::capture(
        path,
        SnapshotFlags::from_bits_truncate(flags),
        MaxDepth::from(max_depth),
    ))?;
    Some(hostio_handle_t::boxed(snapshot))
}

/// The root node of a snapshot handle.
#[unsafe(no_mangle)]
pub extern "C" fn hostio_snapshot_root(
    snapshot: Option<&hostio_handle_t>,
) -> Option<&hostio_snapshot_t> {
    payload::<Snapshot>(snapshot, "snapshot.root").map(hostio_snapshot_t::view)
}

/// Absolute path of a node, with the two-call size convention. Returns the
/// size including the NUL, or `-1`.
///
/// # Safety
///
/// `buffer` must be null or valid for `length` bytes of writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostio_snapshot_path(
    snapshot: Option<&hostio_snapshot_t>,
    buffer: *mut c_char,
    length: usize,
) -> isize {
    let Some(node) = node(snapshot, "snapshot.path") else {
        return -1;
    };
    match check(unsafe { copy_out(&path_bytes(node.path()), buffer, length) }) {
        Some(size) => size as isize,
        None => -1,
    }
}

/// Final path component of a node, with the two-call size convention.
///
/// # Safety
///
/// `buffer` must be null or valid for `length` bytes of writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostio_snapshot_name(
    snapshot: Option<&hostio_snapshot_t>,
    buffer: *mut c_char,
    length: usize,
) -> isize {
    let Some(node) = node(snapshot, "snapshot.name") else {
        return -1;
    };
    let name = path_bytes(std::path::Path::new(node.name()));
    match check(unsafe { copy_out(&name, buffer, length) }) {
        Some(size) => size as isize,
        None => -1,
    }
}

/// Copy the metadata cached at the last capture or refresh. Nothing is
/// re-stat'ed.
#[unsafe(no_mangle)]
pub extern "C" fn hostio_snapshot_stat(
    snapshot: Option<&hostio_snapshot_t>,
    out: Option<&mut hostio_stat_t>,
) -> c_int {
    let Some(node) = node(snapshot, "snapshot.stat") else {
        return -1;
    };
    let Some(out) = out else {
        set_last_error(ErrorKind::InvalidArgument, "snapshot.stat");
        return -1;
    };
    *out = hostio_stat_t::from(node.stat());
    0
}

/// Next immediate child, or null with `NoMoreFiles` once the children are
/// exhausted.
#[unsafe(no_mangle)]
pub extern "C" fn hostio_snapshot_enumerate<'a>(
    snapshot: Option<&'a hostio_snapshot_t>,
    cursor: Option<&mut hostio_snapshot_cursor_t>,
) -> Option<&'a hostio_snapshot_t> {
    let node = node(snapshot, "snapshot.enumerate")?;
    let Some(cursor) = cursor else {
        set_last_error(ErrorKind::InvalidArgument, "snapshot.enumerate");
        return None;
    };
    match node.enumerate(cursor) {
        Some(child) => Some(hostio_snapshot_t::view(child)),
        None => {
            set_last_error(ErrorKind::NoMoreFiles, "snapshot.enumerate");
            None
        }
    }
}

/// Find a descendant by relative path, or null with `NotFound`.
///
/// # Safety
///
/// `relative` must be a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostio_snapshot_lookup<'a>(
    snapshot: Option<&'a hostio_snapshot_t>,
    relative: *const c_char,
) -> Option<&'a hostio_snapshot_t> {
    let node = node(snapshot, "snapshot.lookup")?;
    if relative.is_null() {
        set_last_error(ErrorKind::InvalidArgument, "snapshot.lookup");
        return None;
    }
    let relative = unsafe { std::ffi::CStr::from_ptr(relative) };
    // An empty path names the node itself.
    if relative.is_empty() {
        return Some(hostio_snapshot_t::view(node));
    }
    let relative = check(unsafe { path_from_c(relative.as_ptr()) })?;
    check(node.lookup(relative)).map(hostio_snapshot_t::view)
}

/// Bring the tree up to date, calling `callback` once per change. Views
/// taken before the call are invalid afterwards. Returns `0`, or `-1` when
/// the root can no longer be stat'ed; changes applied before that point are
/// kept.
///
/// # Safety
///
/// `callback`, when given, must be safe to call with `user_data`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn hostio_snapshot_refresh(
    snapshot: Option<&mut hostio_handle_t>,
    max_depth: c_int,
    callback: Option<hostio_snapshot_callback_t>,
    user_data: *mut c_void,
) -> c_int {
    let Some(handle) = snapshot else {
        set_last_error(ErrorKind::InvalidHandle, "snapshot.refresh");
        return -1;
    };
    let Some(snapshot) = check(handle.inner.downcast_mut::<Snapshot>()) else {
        return -1;
    };
    let result = snapshot.refresh(MaxDepth::from(max_depth), |path, event| {
        let Some(callback) = callback else {
            return;
        };
        match path_to_c(path) {
            Ok(path) => unsafe { callback(path.as_ptr(), event.into(), user_data) },
            Err(err) => update_last_error(&err),
        }
    });
    match check(result) {
        Some(()) => 0,
        None => -1,
    }
}
