use std::collections::HashMap;
use std::ffi::{CString, OsStr};
use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use hostio_core::errno::io_error_kind;
use hostio_core::{Error, ErrorKind, FileType, Result, fs};
use tracing::{debug, trace, warn};

use crate::event::{WatchEvent, WatchEventKind};
use crate::options::WatchOptions;
use crate::watch::EventSink;

pub(crate) const NAME: &str = "inotify";

const WATCH_MASK: u32 = libc::IN_CREATE
    | libc::IN_DELETE
    | libc::IN_MODIFY
    | libc::IN_ATTRIB
    | libc::IN_MOVED_FROM
    | libc::IN_MOVED_TO
    | libc::IN_DELETE_SELF
    | libc::IN_MOVE_SELF
    | libc::IN_ONLYDIR;

/// How long an unpaired `IN_MOVED_FROM` waits for its `IN_MOVED_TO` before
/// it is reported as a removal.
const MOVE_GRACE_MS: libc::c_int = 20;

const RECORD_HEADER: usize = std::mem::size_of::<libc::inotify_event>();

/// Owns the reader thread. Dropping it wakes the thread through a pipe and
/// joins it; the inotify descriptor closes with the reader.
pub(crate) struct Watcher {
    wake: OwnedFd,
    thread: Option<JoinHandle<()>>,
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("wake", &self.wake)
            .field("running", &self.thread.is_some())
            .finish()
    }
}

impl Watcher {
    pub(crate) fn start(root: &Path, options: &WatchOptions, sink: EventSink) -> Result<Watcher> {
        let fd = unsafe { libc::inotify_init1(libc::IN_NONBLOCK | libc::IN_CLOEXEC) };
        if fd < 0 {
            return Err(Error::last_os_error("watch.open"));
        }
        let inotify = unsafe { OwnedFd::from_raw_fd(fd) };

        let mut pipe = [0; 2];
        if unsafe { libc::pipe2(pipe.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) } < 0 {
            return Err(Error::last_os_error("watch.open"));
        }
        let (wake_read, wake_write) =
            unsafe { (OwnedFd::from_raw_fd(pipe[0]), OwnedFd::from_raw_fd(pipe[1])) };

        let mut reader = Reader {
            inotify,
            wake: wake_read,
            root: root.to_path_buf(),
            recursive: options.is_recursive(),
            watches: HashMap::new(),
            root_wd: -1,
            pending_move: None,
            sink,
            buffer_size: options
                .get_buffer_size()
                .max(RECORD_HEADER + libc::FILENAME_MAX as usize + 1),
        };
        // The root watch is in place before open returns.
        reader.add_tree(Path::new(""), false)?;
        reader.root_wd = reader
            .watches
            .iter()
            .find(|(_, rel)| rel.as_os_str().is_empty())
            .map(|(wd, _)| *wd)
            .unwrap_or(-1);

        let thread = std::thread::Builder::new()
            .name("hostio-watch".to_string())
            .spawn(move || reader.run())
            .map_err(|err| Error::from_io("watch.open", err))?;
        Ok(Watcher {
            wake: wake_write,
            thread: Some(thread),
        })
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        let byte = 1u8;
        let written = unsafe { libc::write(self.wake.as_raw_fd(), (&byte as *const u8).cast(), 1) };
        if written != 1 {
            warn!(error = %io::Error::last_os_error(), "could not wake the watch thread");
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("watch thread panicked");
            }
        }
    }
}

#[derive(Debug)]
struct PendingMove {
    cookie: u32,
    name: PathBuf,
    is_dir: bool,
}

#[derive(Debug)]
struct Record {
    wd: i32,
    mask: u32,
    cookie: u32,
    name: PathBuf,
}

struct Reader {
    inotify: OwnedFd,
    wake: OwnedFd,
    root: PathBuf,
    recursive: bool,
    /// Watch descriptor to directory, relative to the root.
    watches: HashMap<i32, PathBuf>,
    root_wd: i32,
    pending_move: Option<PendingMove>,
    sink: EventSink,
    buffer_size: usize,
}

impl Reader {
    fn add_watch(&mut self, rel: &Path) -> Result<()> {
        let path = CString::new(self.root.join(rel).into_os_string().into_vec())
            .map_err(|_| Error::new(ErrorKind::InvalidPath, "watch.add"))?;
        let wd = unsafe { libc::inotify_add_watch(self.inotify.as_raw_fd(), path.as_ptr(), WATCH_MASK) };
        if wd < 0 {
            return Err(Error::last_os_error("watch.add"));
        }
        trace!(wd, dir = %rel.display(), "inotify watch added");
        self.watches.insert(wd, rel.to_path_buf());
        Ok(())
    }

    /// Watch `rel` and, in recursive mode, every directory below it. With
    /// `report`, `rel` and everything found below it are queued as adds,
    /// each directory only once its own watch is in place.
    fn add_tree(&mut self, rel: &Path, report: bool) -> Result<()> {
        let watched = self.add_watch(rel);
        if report {
            self.sink.push(WatchEvent::new(WatchEventKind::Add, rel));
        }
        watched?;
        if !self.recursive {
            return Ok(());
        }
        for entry in fs::read_dir(self.root.join(rel))? {
            let child = rel.join(&entry.name);
            if entry.file_type == FileType::Directory {
                if let Err(err) = self.add_tree(&child, report) {
                    debug!(dir = %child.display(), error = %err, "directory not watched");
                }
            } else if report {
                self.sink.push(WatchEvent::new(WatchEventKind::Add, child));
            }
        }
        Ok(())
    }

    fn run(mut self) {
        let mut buf = vec![0u8; self.buffer_size];
        loop {
            let mut fds = [
                libc::pollfd {
                    fd: self.inotify.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: self.wake.as_raw_fd(),
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];
            let timeout = if self.pending_move.is_some() { MOVE_GRACE_MS } else { -1 };
            let ready = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout) };
            if ready < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                self.sink.fail(io_error_kind(&err));
                break;
            }
            if fds[1].revents != 0 {
                break;
            }
            if ready == 0 {
                self.flush_move();
            } else if fds[0].revents & libc::POLLIN != 0 {
                self.drain(&mut buf);
            } else if fds[0].revents != 0 {
                self.sink.fail(ErrorKind::IoError);
            }
            if self.sink.is_failed() {
                break;
            }
        }
        debug!(root = %self.root.display(), watches = self.watches.len(), "watch thread stopped");
    }

    /// Read and dispatch every queued record.
    fn drain(&mut self, buf: &mut [u8]) {
        loop {
            let read = unsafe { libc::read(self.inotify.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
            if read < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::WouldBlock => return,
                    io::ErrorKind::Interrupted => continue,
                    _ => {
                        self.sink.fail(io_error_kind(&err));
                        return;
                    }
                }
            }
            let filled = read as usize;
            if filled == 0 {
                return;
            }
            let mut at = 0;
            while at + RECORD_HEADER <= filled {
                let len = read_u32(buf, at + 12) as usize;
                let start = at + RECORD_HEADER;
                let raw = &buf[start..(start + len).min(filled)];
                let name = match raw.iter().position(|b| *b == 0) {
                    Some(end) => &raw[..end],
                    None => raw,
                };
                let record = Record {
                    wd: read_u32(buf, at) as i32,
                    mask: read_u32(buf, at + 4),
                    cookie: read_u32(buf, at + 8),
                    name: PathBuf::from(OsStr::from_bytes(name)),
                };
                at = start + len;
                self.handle(record);
            }
        }
    }

    fn handle(&mut self, record: Record) {
        trace!(?record, "inotify record");
        if record.mask & libc::IN_Q_OVERFLOW != 0 {
            self.sink.fail(ErrorKind::BufferTooSmall);
            return;
        }
        let Some(dir) = self.watches.get(&record.wd).cloned() else {
            return;
        };
        let is_root = record.wd == self.root_wd;
        if record.mask & libc::IN_IGNORED != 0 {
            self.watches.remove(&record.wd);
            if is_root {
                self.sink.fail(ErrorKind::PathNotFound);
            }
            return;
        }
        if record.mask & (libc::IN_DELETE_SELF | libc::IN_MOVE_SELF) != 0 {
            // A subdirectory going away is reported by its parent.
            if is_root {
                self.sink.fail(ErrorKind::PathNotFound);
            }
            return;
        }
        if record.name.as_os_str().is_empty() {
            return;
        }

        let rel = dir.join(&record.name);
        let is_dir = record.mask & libc::IN_ISDIR != 0;
        if record.mask & libc::IN_MOVED_TO != 0 {
            match self.pending_move.take() {
                Some(from) if from.cookie == record.cookie => {
                    if from.is_dir {
                        self.rename_watches(&from.name, &rel);
                    }
                    self.sink.push(WatchEvent::rename(from.name, rel));
                    return;
                }
                Some(other) => self.flush(other),
                None => {}
            }
            // Moved in from outside the watched tree.
            self.created(rel, is_dir);
            return;
        }

        self.flush_move();
        if record.mask & libc::IN_MOVED_FROM != 0 {
            self.pending_move = Some(PendingMove {
                cookie: record.cookie,
                name: rel,
                is_dir,
            });
        } else if record.mask & libc::IN_CREATE != 0 {
            self.created(rel, is_dir);
        } else if record.mask & libc::IN_DELETE != 0 {
            self.sink.push(WatchEvent::new(WatchEventKind::Remove, rel));
        } else if record.mask & (libc::IN_MODIFY | libc::IN_ATTRIB) != 0 {
            self.sink.push(WatchEvent::new(WatchEventKind::Modify, rel));
        }
    }

    fn created(&mut self, rel: PathBuf, is_dir: bool) {
        if is_dir && self.recursive {
            // Entries created before the new watch took effect are picked
            // up by the scan, so an entry may be reported twice.
            if let Err(err) = self.add_tree(&rel, true) {
                debug!(dir = %rel.display(), error = %err, "new directory not watched");
            }
        } else {
            self.sink.push(WatchEvent::new(WatchEventKind::Add, rel));
        }
    }

    fn flush_move(&mut self) {
        if let Some(pending) = self.pending_move.take() {
            self.flush(pending);
        }
    }

    /// The other half of the move never came: the entry left the tree.
    fn flush(&mut self, pending: PendingMove) {
        if pending.is_dir {
            self.forget_subtree(&pending.name);
        }
        self.sink.push(WatchEvent::new(WatchEventKind::Remove, pending.name));
    }

    fn forget_subtree(&mut self, rel: &Path) {
        let gone: Vec<i32> = self
            .watches
            .iter()
            .filter(|(_, dir)| dir.starts_with(rel))
            .map(|(wd, _)| *wd)
            .collect();
        for wd in gone {
            self.watches.remove(&wd);
            unsafe { libc::inotify_rm_watch(self.inotify.as_raw_fd(), wd) };
        }
    }

    fn rename_watches(&mut self, from: &Path, to: &Path) {
        for dir in self.watches.values_mut() {
            if let Ok(rest) = dir.strip_prefix(from) {
                *dir = if rest.as_os_str().is_empty() {
                    to.to_path_buf()
                } else {
                    to.join(rest)
                };
            }
        }
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_ne_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}
