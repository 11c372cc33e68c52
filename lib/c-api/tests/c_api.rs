use std::ffi::{CStr, CString, c_char, c_void};
use std::path::{Path, PathBuf};
use std::ptr;

use hostio_c_api::*;
use hostio_core::ErrorKind;
use hostio_snapshot::SnapshotCursor;
use pretty_assertions::assert_eq;

fn c_path(path: &Path) -> CString {
    CString::new(path.to_str().unwrap()).unwrap()
}

fn last_message() -> String {
    let size = unsafe { hostio_last_error_message(ptr::null_mut(), 0) };
    assert!(size > 0);
    let mut buf = vec![0 as c_char; size as usize];
    assert_eq!(
        unsafe { hostio_last_error_message(buf.as_mut_ptr(), buf.len()) },
        size
    );
    unsafe { CStr::from_ptr(buf.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

#[test]
fn async_read_through_the_c_surface() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ten");
    std::fs::write(&path, b"0123456789").unwrap();

    let file = unsafe {
        hostio_file_open(c_path(&path).as_ptr(), HOSTIO_FILE_READ | HOSTIO_FILE_ASYNC)
    }
    .unwrap();
    let aio = hostio_aio_open(Some(&*file)).unwrap();

    let mut transferred = 0usize;
    assert_eq!(
        unsafe { hostio_aio_status(Some(&*aio), &mut transferred) },
        hostio_aio_status_t::HOSTIO_AIO_IDLE
    );

    let mut buf = [0u8; 64];
    assert_eq!(
        unsafe { hostio_aio_read(Some(&*aio), 0, buf.as_mut_ptr().cast(), buf.len()) },
        0
    );
    assert_eq!(hostio_wait(Some(&*aio)), hostio_wait_result_t::HOSTIO_WAIT_SIGNALED);
    assert_eq!(
        unsafe { hostio_aio_status(Some(&*aio), &mut transferred) },
        hostio_aio_status_t::HOSTIO_AIO_COMPLETED
    );
    assert_eq!(transferred, 10);
    assert_eq!(&buf[..10], b"0123456789");

    hostio_close(Some(aio));
    hostio_close(Some(file));
}

#[cfg(target_os = "linux")]
#[test]
fn second_aio_read_while_pending_is_busy() {
    use std::io::Write;
    use std::os::unix::ffi::OsStrExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fifo");
    let raw = CString::new(path.as_os_str().as_bytes()).unwrap();
    assert_eq!(unsafe { libc::mkfifo(raw.as_ptr(), 0o600) }, 0);

    // Opened for reading and writing, the FIFO never reports end of file.
    let file = unsafe {
        hostio_file_open(
            raw.as_ptr(),
            HOSTIO_FILE_READ | HOSTIO_FILE_WRITE | HOSTIO_FILE_ASYNC,
        )
    }
    .unwrap();
    let aio = hostio_aio_open(Some(&*file)).unwrap();

    let mut first = [0u8; 16];
    let mut second = [0u8; 16];
    assert_eq!(
        unsafe { hostio_aio_read(Some(&*aio), 0, first.as_mut_ptr().cast(), first.len()) },
        0
    );
    assert_eq!(
        unsafe { hostio_aio_read(Some(&*aio), 0, second.as_mut_ptr().cast(), second.len()) },
        -1
    );
    assert_eq!(hostio_last_error(), ErrorKind::Busy.code());

    let mut writer = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    writer.write_all(b"ping").unwrap();
    assert_eq!(hostio_wait(Some(&*aio)), hostio_wait_result_t::HOSTIO_WAIT_SIGNALED);
    let mut transferred = 0usize;
    assert_eq!(
        unsafe { hostio_aio_status(Some(&*aio), &mut transferred) },
        hostio_aio_status_t::HOSTIO_AIO_COMPLETED
    );
    assert_eq!(transferred, 4);
    assert_eq!(&first[..4], b"ping");
    assert_eq!(second, [0u8; 16]);

    hostio_close(Some(aio));
    hostio_close(Some(file));
}

#[test]
fn aio_on_a_synchronous_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sync");
    std::fs::write(&path, b"x").unwrap();

    let file = unsafe { hostio_file_open(c_path(&path).as_ptr(), HOSTIO_FILE_READ) }.unwrap();
    assert!(hostio_aio_open(Some(&*file)).is_none());
    assert_eq!(hostio_last_error(), ErrorKind::InvalidArgument.code());
    hostio_close(Some(file));
}

#[test]
fn wrong_handle_class_is_an_invalid_handle() {
    let null = hostio_file_open_null();
    assert_eq!(
        unsafe { hostio_aio_status(Some(&*null), ptr::null_mut()) },
        hostio_aio_status_t::HOSTIO_AIO_ERROR
    );
    assert_eq!(hostio_last_error(), ErrorKind::InvalidHandle.code());
    assert_eq!(
        unsafe { hostio_watch_get_result(Some(&*null), ptr::null_mut(), 0) },
        -1
    );
    assert_eq!(hostio_last_error(), ErrorKind::InvalidHandle.code());
    assert!(hostio_snapshot_root(Some(&*null)).is_none());
    hostio_close(Some(null));

    assert_eq!(hostio_aio_cancel(None), -1);
    assert_eq!(hostio_last_error(), ErrorKind::InvalidHandle.code());
}

#[test]
fn missing_file_sets_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent");
    assert!(unsafe { hostio_file_open(c_path(&path).as_ptr(), HOSTIO_FILE_READ) }.is_none());
    assert_eq!(hostio_last_error(), ErrorKind::FileNotFound.code());
    assert!(!last_message().is_empty());

    let message = unsafe { CStr::from_ptr(hostio_strerror(hostio_last_error())) };
    assert!(!message.to_bytes().is_empty());

    assert!(unsafe { hostio_file_open(c"".as_ptr(), HOSTIO_FILE_READ) }.is_none());
    assert_eq!(hostio_last_error(), ErrorKind::InvalidPath.code());
}

// The polling backend sees a rename as a Remove and an Add.
#[cfg(any(target_os = "linux", target_os = "android", windows))]
mod native {
    use hostio_watch::{WatchEvent, WatchEventKind};
    use pretty_assertions::assert_eq;

    use super::*;

    fn next_event(watch: &hostio_handle_t) -> WatchEvent {
        assert_eq!(
            hostio_timedwait(Some(watch), 5_000),
            hostio_wait_result_t::HOSTIO_WAIT_SIGNALED
        );
        let size = unsafe { hostio_watch_get_result(Some(watch), ptr::null_mut(), 0) };
        assert!(size > 0);

        let mut small = vec![0u8; size as usize - 1];
        assert_eq!(
            unsafe { hostio_watch_get_result(Some(watch), small.as_mut_ptr(), small.len()) },
            -1
        );
        assert_eq!(hostio_last_error(), ErrorKind::BufferTooSmall.code());

        let mut buf = vec![0u8; size as usize];
        assert_eq!(
            unsafe { hostio_watch_get_result(Some(watch), buf.as_mut_ptr(), buf.len()) },
            size
        );
        WatchEvent::decode(&buf).unwrap()
    }

    #[test]
    fn watch_events_use_the_two_call_convention() {
        let dir = tempfile::tempdir().unwrap();
        let watch = unsafe {
            hostio_watch_dir(c_path(dir.path()).as_ptr(), HOSTIO_WATCH_EVENTS_ONLY)
        }
        .unwrap();
        assert_eq!(
            unsafe { hostio_watch_get_result(Some(&*watch), ptr::null_mut(), 0) },
            0
        );

        std::fs::write(dir.path().join("a"), b"").unwrap();
        let event = next_event(&watch);
        assert_eq!(event.kind.code(), HOSTIO_EVENT_ADD);
        assert_eq!(event, WatchEvent::new(WatchEventKind::Add, "a"));

        std::fs::rename(dir.path().join("a"), dir.path().join("b")).unwrap();
        let event = next_event(&watch);
        assert_eq!(event.kind.code(), HOSTIO_EVENT_RENAME);
        assert_eq!(event, WatchEvent::rename("a", "b"));

        hostio_close(Some(watch));
    }
}

#[test]
fn watching_a_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain");
    std::fs::write(&path, b"").unwrap();
    assert!(unsafe { hostio_watch_dir(c_path(&path).as_ptr(), 0) }.is_none());
    assert_eq!(hostio_last_error(), ErrorKind::PathNotFound.code());
}

fn read_name(view: &hostio_snapshot_t) -> String {
    let size = unsafe { hostio_snapshot_name(Some(view), ptr::null_mut(), 0) };
    let mut buf = vec![0 as c_char; size as usize];
    assert_eq!(
        unsafe { hostio_snapshot_name(Some(view), buf.as_mut_ptr(), buf.len()) },
        size
    );
    unsafe { CStr::from_ptr(buf.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

unsafe extern "C" fn collect(path: *const c_char, event: hostio_snapshot_event_t, user_data: *mut c_void) {
    let events = unsafe { &mut *user_data.cast::<Vec<(PathBuf, hostio_snapshot_event_t)>>() };
    let path = unsafe { CStr::from_ptr(path) }.to_str().unwrap();
    events.push((PathBuf::from(path), event));
}

#[test]
fn snapshot_walk_and_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path().join("d");
    std::fs::create_dir_all(d.join("sub")).unwrap();
    std::fs::write(d.join("a.txt"), b"four").unwrap();

    let mut snapshot = unsafe { hostio_snapshot_dir(c_path(&d).as_ptr(), 0, -1) }.unwrap();
    let root = hostio_snapshot_root(Some(&*snapshot)).unwrap();
    assert_eq!(read_name(root), "d");

    let mut cursor = SnapshotCursor::default();
    let mut names = Vec::new();
    while let Some(child) = hostio_snapshot_enumerate(Some(root), Some(&mut cursor)) {
        names.push(read_name(child));
    }
    assert_eq!(names, ["a.txt", "sub"]);
    assert_eq!(hostio_last_error(), ErrorKind::NoMoreFiles.code());

    let a = unsafe { hostio_snapshot_lookup(Some(root), c"a.txt".as_ptr()) }.unwrap();
    let mut stat = hostio_stat_t::from(&hostio_core::fs::stat(&d).unwrap());
    assert_eq!(hostio_snapshot_stat(Some(a), Some(&mut stat)), 0);
    assert_eq!(stat.file_type, hostio_file_type_t::HOSTIO_TYPE_FILE);
    assert_eq!(stat.size, 4);
    assert_eq!(hostio_snapshot_stat(Some(a), None), -1);
    assert_eq!(hostio_last_error(), ErrorKind::InvalidArgument.code());

    let size = unsafe { hostio_snapshot_path(Some(a), ptr::null_mut(), 0) };
    let mut buf = vec![0 as c_char; size as usize];
    assert_eq!(
        unsafe { hostio_snapshot_path(Some(a), buf.as_mut_ptr(), buf.len()) },
        size
    );
    let a_path = PathBuf::from(unsafe { CStr::from_ptr(buf.as_ptr()) }.to_str().unwrap());
    assert!(a_path.is_absolute());
    assert!(a_path.ends_with("d/a.txt"));

    let same = unsafe { hostio_snapshot_lookup(Some(root), c"".as_ptr()) }.unwrap();
    assert_eq!(read_name(same), "d");
    assert!(unsafe { hostio_snapshot_lookup(Some(root), c"missing".as_ptr()) }.is_none());
    assert_eq!(hostio_last_error(), ErrorKind::NotFound.code());

    std::fs::write(d.join("b.txt"), b"b").unwrap();
    let mut events: Vec<(PathBuf, hostio_snapshot_event_t)> = Vec::new();
    assert_eq!(
        unsafe {
            hostio_snapshot_refresh(
                Some(&mut *snapshot),
                -1,
                Some(collect),
                (&mut events as *mut Vec<_>).cast(),
            )
        },
        0
    );
    assert_eq!(events.len(), 1);
    assert!(events[0].0.ends_with("d/b.txt"));
    assert_eq!(events[0].1, hostio_snapshot_event_t::HOSTIO_SNAPSHOT_ADD);

    let root = hostio_snapshot_root(Some(&*snapshot)).unwrap();
    assert!(unsafe { hostio_snapshot_lookup(Some(root), c"b.txt".as_ptr()) }.is_some());

    drop(dir);
    assert_eq!(
        unsafe { hostio_snapshot_refresh(Some(&mut *snapshot), -1, None, ptr::null_mut()) },
        -1
    );
    assert!(ErrorKind::from_code(hostio_last_error()).unwrap().is_not_found());
    hostio_close(Some(snapshot));
}
