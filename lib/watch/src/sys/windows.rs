use std::ffi::OsString;
use std::fmt;
use std::io;
use std::os::windows::ffi::{OsStrExt, OsStringExt};
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle, RawHandle};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::Arc;
use std::thread::JoinHandle;

use hostio_core::errno::win32_to_kind;
use hostio_core::{Error, ErrorKind, Result, fs};
use tracing::{debug, trace, warn};
use windows_sys::Win32::Foundation::{
    ERROR_IO_PENDING, FALSE, GetLastError, HANDLE, INVALID_HANDLE_VALUE, TRUE, WAIT_OBJECT_0,
    WAIT_TIMEOUT,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, FILE_ACTION_ADDED, FILE_ACTION_MODIFIED, FILE_ACTION_REMOVED,
    FILE_ACTION_RENAMED_NEW_NAME, FILE_ACTION_RENAMED_OLD_NAME, FILE_FLAG_BACKUP_SEMANTICS,
    FILE_FLAG_OVERLAPPED, FILE_LIST_DIRECTORY, FILE_NOTIFY_CHANGE_ATTRIBUTES,
    FILE_NOTIFY_CHANGE_CREATION, FILE_NOTIFY_CHANGE_DIR_NAME, FILE_NOTIFY_CHANGE_FILE_NAME,
    FILE_NOTIFY_CHANGE_LAST_WRITE, FILE_NOTIFY_CHANGE_SIZE, FILE_SHARE_DELETE, FILE_SHARE_READ,
    FILE_SHARE_WRITE, OPEN_EXISTING, ReadDirectoryChangesW,
};
use windows_sys::Win32::System::IO::{CancelIoEx, GetOverlappedResult, OVERLAPPED};
use windows_sys::Win32::System::Threading::{
    CreateEventW, INFINITE, SetEvent, WaitForMultipleObjects,
};

use crate::event::{WatchEvent, WatchEventKind};
use crate::options::WatchOptions;
use crate::watch::EventSink;

pub(crate) const NAME: &str = "ReadDirectoryChangesW";

const NOTIFY_FILTER: u32 = FILE_NOTIFY_CHANGE_FILE_NAME
    | FILE_NOTIFY_CHANGE_DIR_NAME
    | FILE_NOTIFY_CHANGE_ATTRIBUTES
    | FILE_NOTIFY_CHANGE_LAST_WRITE
    | FILE_NOTIFY_CHANGE_CREATION
    | FILE_NOTIFY_CHANGE_SIZE;

/// `NextEntryOffset`, `Action` and `FileNameLength` of a
/// `FILE_NOTIFY_INFORMATION` record.
const RECORD_HEADER: usize = 12;
const MIN_BUFFER: usize = 4096;

/// How long an old name left at the end of a buffer waits for its new name
/// in the next one before it is reported as a removal.
const RENAME_GRACE_MS: u32 = 20;

pub(crate) struct Watcher {
    cancel: Arc<OwnedHandle>,
    thread: Option<JoinHandle<()>>,
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("running", &self.thread.is_some())
            .finish()
    }
}

impl Watcher {
    pub(crate) fn start(root: &Path, options: &WatchOptions, sink: EventSink) -> Result<Watcher> {
        let directory = open_directory(root)?;
        let change = create_event()?;
        let cancel = Arc::new(create_event()?);
        // FILE_NOTIFY_INFORMATION records are DWORD aligned.
        let words = options.get_buffer_size().max(MIN_BUFFER).div_ceil(4);

        let mut reader = Reader {
            directory,
            change,
            cancel: cancel.clone(),
            overlapped: Box::new(unsafe { std::mem::zeroed() }),
            armed: false,
            buffer: vec![0u32; words],
            root: root.to_path_buf(),
            recursive: options.is_recursive(),
            pending_rename: None,
            sink,
        };
        // The first read is queued before open returns.
        reader
            .arm()
            .map_err(|code| win32_error("watch.open", code))?;

        let thread = std::thread::Builder::new()
            .name("hostio-watch".to_string())
            .spawn(move || reader.run())
            .map_err(|err| Error::from_io("watch.open", err))?;
        Ok(Watcher {
            cancel,
            thread: Some(thread),
        })
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if unsafe { SetEvent(self.cancel.as_raw_handle() as HANDLE) } == FALSE {
            warn!(error = %io::Error::last_os_error(), "could not wake the watch thread");
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("watch thread panicked");
            }
        }
    }
}

struct Reader {
    directory: OwnedHandle,
    change: OwnedHandle,
    cancel: Arc<OwnedHandle>,
    overlapped: Box<OVERLAPPED>,
    /// A read is queued and the kernel owns `overlapped` and `buffer`.
    armed: bool,
    buffer: Vec<u32>,
    root: PathBuf,
    recursive: bool,
    pending_rename: Option<PathBuf>,
    sink: EventSink,
}

// The OVERLAPPED only points at the reader's own event handle.
unsafe impl Send for Reader {}

impl Reader {
    fn arm(&mut self) -> std::result::Result<(), u32> {
        *self.overlapped = unsafe { std::mem::zeroed() };
        self.overlapped.hEvent = self.change.as_raw_handle() as HANDLE;
        let ok = unsafe {
            ReadDirectoryChangesW(
                self.directory.as_raw_handle() as HANDLE,
                self.buffer.as_mut_ptr().cast(),
                (self.buffer.len() * 4) as u32,
                if self.recursive { TRUE } else { FALSE },
                NOTIFY_FILTER,
                ptr::null_mut(),
                &mut *self.overlapped,
                None,
            )
        };
        if ok == FALSE {
            let code = unsafe { GetLastError() };
            if code != ERROR_IO_PENDING {
                return Err(code);
            }
        }
        self.armed = true;
        Ok(())
    }

    fn run(mut self) {
        loop {
            let handles = [
                self.change.as_raw_handle() as HANDLE,
                self.cancel.as_raw_handle() as HANDLE,
            ];
            let timeout = if self.pending_rename.is_some() {
                RENAME_GRACE_MS
            } else {
                INFINITE
            };
            let rc = unsafe { WaitForMultipleObjects(2, handles.as_ptr(), FALSE, timeout) };
            if rc == WAIT_OBJECT_0 + 1 {
                break;
            }
            if rc == WAIT_TIMEOUT {
                self.flush_rename();
                continue;
            }
            if rc != WAIT_OBJECT_0 {
                self.fail(unsafe { GetLastError() });
                break;
            }

            let mut transferred = 0u32;
            let ok = unsafe {
                GetOverlappedResult(
                    self.directory.as_raw_handle() as HANDLE,
                    &*self.overlapped,
                    &mut transferred,
                    FALSE,
                )
            };
            self.armed = false;
            if ok == FALSE {
                self.fail(unsafe { GetLastError() });
                break;
            }
            if transferred == 0 {
                // The kernel buffer overflowed and its records are lost.
                // Only a vanished root ends the watch.
                self.flush_rename();
                if self.root_gone() {
                    self.sink.fail(ErrorKind::PathNotFound);
                    break;
                }
                debug!(root = %self.root.display(), "change buffer overflowed");
            } else {
                self.dispatch(transferred as usize);
            }
            if self.sink.is_failed() {
                break;
            }
            if let Err(code) = self.arm() {
                self.fail(code);
                break;
            }
        }
        debug!(root = %self.root.display(), "watch thread stopped");
    }

    fn dispatch(&mut self, len: usize) {
        let records = {
            let bytes = unsafe {
                std::slice::from_raw_parts(
                    self.buffer.as_ptr().cast::<u8>(),
                    len.min(self.buffer.len() * 4),
                )
            };
            parse_records(bytes)
        };
        for event in translate(&mut self.pending_rename, records) {
            self.sink.push(event);
        }
    }

    /// An old name without its new half left the tree.
    fn flush_rename(&mut self) {
        if let Some(old) = self.pending_rename.take() {
            self.sink.push(WatchEvent::new(WatchEventKind::Remove, old));
        }
    }

    fn root_gone(&self) -> bool {
        fs::stat(&self.root).is_err()
    }

    fn fail(&self, code: u32) {
        let kind = if self.root_gone() {
            ErrorKind::PathNotFound
        } else {
            win32_to_kind(code)
        };
        self.sink.fail(kind);
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        if self.armed {
            let directory = self.directory.as_raw_handle() as HANDLE;
            let mut transferred = 0u32;
            unsafe {
                CancelIoEx(directory, &*self.overlapped);
                GetOverlappedResult(directory, &*self.overlapped, &mut transferred, TRUE);
            }
        }
    }
}

/// Turn raw records into events. An old name still waiting for its new name
/// when the records run out stays in `pending`, so a pair split across two
/// buffers is still a rename.
fn translate(pending: &mut Option<PathBuf>, records: Vec<(u32, PathBuf)>) -> Vec<WatchEvent> {
    let mut events = Vec::with_capacity(records.len());
    for (action, name) in records {
        trace!(action, name = %name.display(), "directory change record");
        if action == FILE_ACTION_RENAMED_NEW_NAME {
            events.push(match pending.take() {
                Some(old) => WatchEvent::rename(old, name),
                None => WatchEvent::new(WatchEventKind::Add, name),
            });
            continue;
        }
        if let Some(old) = pending.take() {
            events.push(WatchEvent::new(WatchEventKind::Remove, old));
        }
        match action {
            FILE_ACTION_ADDED => events.push(WatchEvent::new(WatchEventKind::Add, name)),
            FILE_ACTION_REMOVED => events.push(WatchEvent::new(WatchEventKind::Remove, name)),
            FILE_ACTION_MODIFIED => events.push(WatchEvent::new(WatchEventKind::Modify, name)),
            FILE_ACTION_RENAMED_OLD_NAME => *pending = Some(name),
            _ => {}
        }
    }
    events
}

fn parse_records(bytes: &[u8]) -> Vec<(u32, PathBuf)> {
    let mut records = Vec::new();
    let mut at = 0;
    while at + RECORD_HEADER <= bytes.len() {
        let next = read_u32(bytes, at) as usize;
        let action = read_u32(bytes, at + 4);
        let name_len = read_u32(bytes, at + 8) as usize;
        let start = at + RECORD_HEADER;
        let end = (start + name_len).min(bytes.len());
        let wide: Vec<u16> = bytes[start..end]
            .chunks_exact(2)
            .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
            .collect();
        records.push((action, PathBuf::from(OsString::from_wide(&wide))));
        if next == 0 {
            break;
        }
        at += next;
    }
    records
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_ne_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn win32_error(context: &'static str, code: u32) -> Error {
    Error::from_io(context, io::Error::from_raw_os_error(code as i32))
}

fn open_directory(path: &Path) -> Result<OwnedHandle> {
    let mut wide: Vec<u16> = path.as_os_str().encode_wide().collect();
    wide.push(0);
    let handle = unsafe {
        CreateFileW(
            wide.as_ptr(),
            FILE_LIST_DIRECTORY,
            FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
            ptr::null(),
            OPEN_EXISTING,
            FILE_FLAG_BACKUP_SEMANTICS | FILE_FLAG_OVERLAPPED,
            ptr::null_mut(),
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(Error::last_os_error("watch.open"));
    }
    Ok(unsafe { OwnedHandle::from_raw_handle(handle as RawHandle) })
}

fn create_event() -> Result<OwnedHandle> {
    let handle = unsafe { CreateEventW(ptr::null(), TRUE, FALSE, ptr::null()) };
    if handle.is_null() {
        return Err(Error::last_os_error("watch.open"));
    }
    Ok(unsafe { OwnedHandle::from_raw_handle(handle as RawHandle) })
}
