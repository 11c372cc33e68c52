use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hostio_core::{
    Class, Error, ErrorKind, Payload, Result, Timeout, TypeBits, WaitStatus, fs,
};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::event::{WatchEvent, WatchEventKind};
use crate::options::{WatchFlags, WatchOptions};
use crate::sys::Backend;

pub static WATCH_CLASS: Class = Class::new(
    "watch",
    TypeBits::from_bits_truncate(TypeBits::WATCH.bits() | TypeBits::WAITABLE.bits()),
    std::mem::size_of::<Watch>(),
);

#[derive(Debug, Default)]
struct Queue {
    events: VecDeque<WatchEvent>,
    /// Set once; the watch never recovers.
    error: Option<ErrorKind>,
}

#[derive(Debug, Default)]
pub(crate) struct Shared {
    queue: Mutex<Queue>,
    condvar: Condvar,
}

/// The producer side of a watch's queue, owned by its backend.
#[derive(Clone, Debug)]
pub(crate) struct EventSink {
    shared: Arc<Shared>,
    events_only: bool,
}

impl EventSink {
    /// Queue an event. Returns `false` once the watch has failed, after which
    /// the backend should stop.
    pub(crate) fn push(&self, event: WatchEvent) -> bool {
        let mut queue = self.shared.queue.lock();
        if queue.error.is_some() {
            return false;
        }
        if self.events_only && event.kind == WatchEventKind::Modify {
            return true;
        }
        trace!(kind = ?event.kind, name = %event.name.display(), "watch event queued");
        queue.events.push_back(event);
        self.shared.condvar.notify_all();
        true
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.shared.queue.lock().error.is_some()
    }

    /// Move the watch to its terminal failed state. The first error wins.
    pub(crate) fn fail(&self, kind: ErrorKind) {
        let mut queue = self.shared.queue.lock();
        if queue.error.is_none() {
            warn!(error = %kind, dropped = queue.events.len(), "watch failed");
            queue.error = Some(kind);
        }
        self.shared.condvar.notify_all();
    }
}

/// A recursive or single-level directory monitor.
///
/// A backend thread turns native change records into [`WatchEvent`]s and
/// appends them to a FIFO queue. Consumers pop them with
/// [`Watch::try_next`] or [`Watch::get_result`] and block with
/// [`Watch::wait`]. Any backend error is terminal: from then on every call
/// returns that error.
#[derive(Debug)]
pub struct Watch {
    root: PathBuf,
    options: WatchOptions,
    shared: Arc<Shared>,
    backend: Option<Backend>,
}

impl Watch {
    pub fn open<P: AsRef<Path>>(path: P, flags: WatchFlags) -> Result<Watch> {
        Self::with_options(path, &WatchOptions::from(flags))
    }

    pub fn with_options<P: AsRef<Path>>(path: P, options: &WatchOptions) -> Result<Watch> {
        let path = path.as_ref();
        if !fs::stat(path)?.is_dir() {
            return Err(Error::new(ErrorKind::PathNotFound, "watch.open"));
        }
        let root = fs::absolute(path)?;
        let shared = Arc::new(Shared::default());
        let sink = EventSink {
            shared: shared.clone(),
            events_only: options.get_flags().contains(WatchFlags::EVENTS_ONLY),
        };
        let backend = Backend::start(&root, options, sink)?;
        debug!(
            root = %root.display(),
            flags = ?options.get_flags(),
            backend = backend.name(),
            "watch opened"
        );
        Ok(Watch {
            root,
            options: options.clone(),
            shared,
            backend: Some(backend),
        })
    }

    /// Absolute path of the watched directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &WatchOptions {
        &self.options
    }

    /// The stored error, once the watch has failed.
    pub fn error(&self) -> Option<ErrorKind> {
        self.shared.queue.lock().error
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.shared.queue.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block until an event is queued or the watch fails.
    pub fn wait(&self, timeout: Timeout) -> Result<WaitStatus> {
        let deadline = timeout.deadline();
        let mut queue = self.shared.queue.lock();
        let mut timed_out = false;
        loop {
            if let Some(kind) = queue.error {
                return Err(Error::new(kind, "watch.wait"));
            }
            if !queue.events.is_empty() {
                return Ok(WaitStatus::Signaled);
            }
            if timed_out {
                return Ok(WaitStatus::TimedOut);
            }
            match deadline {
                None => self.shared.condvar.wait(&mut queue),
                Some(deadline) => {
                    timed_out = self.shared.condvar.wait_until(&mut queue, deadline).timed_out();
                }
            }
        }
    }

    /// Pop the front event without blocking.
    pub fn try_next(&self) -> Result<Option<WatchEvent>> {
        let mut queue = self.shared.queue.lock();
        if let Some(kind) = queue.error {
            return Err(Error::new(kind, "watch.next"));
        }
        Ok(queue.events.pop_front())
    }

    /// Encoded size of the front event, without removing it.
    pub fn next_event_size(&self) -> Result<Option<usize>> {
        let queue = self.shared.queue.lock();
        if let Some(kind) = queue.error {
            return Err(Error::new(kind, "watch.next_event_size"));
        }
        Ok(queue.events.front().map(WatchEvent::encoded_len))
    }

    /// Two-phase retrieval of the front event in its encoded form.
    ///
    /// With no buffer (or an empty one) this returns the size the front event
    /// needs and leaves it queued. With a large enough buffer the event is
    /// popped and written, and its size returned. `Ok(0)` means the queue is
    /// empty. A buffer that is too small fails with
    /// [`ErrorKind::BufferTooSmall`] and leaves the event queued.
    pub fn get_result(&self, buf: Option<&mut [u8]>) -> Result<usize> {
        let mut queue = self.shared.queue.lock();
        if let Some(kind) = queue.error {
            return Err(Error::new(kind, "watch.get_result"));
        }
        let Some(front) = queue.events.front() else {
            return Ok(0);
        };
        let size = front.encoded_len();
        match buf {
            Some(buf) if !buf.is_empty() => {
                if buf.len() < size {
                    return Err(Error::new(ErrorKind::BufferTooSmall, "watch.get_result"));
                }
                let written = front.encode(buf)?;
                queue.events.pop_front();
                Ok(written)
            }
            _ => Ok(size),
        }
    }
}

impl Payload for Watch {
    fn class(&self) -> &'static Class {
        &WATCH_CLASS
    }

    fn wait(&self, timeout: Timeout) -> Result<WaitStatus> {
        Watch::wait(self, timeout)
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        // Stops and joins the backend thread.
        drop(self.backend.take());
        debug!(root = %self.root.display(), unread = self.len(), "watch closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(events_only: bool) -> (Arc<Shared>, EventSink) {
        let shared = Arc::new(Shared::default());
        let sink = EventSink {
            shared: shared.clone(),
            events_only,
        };
        (shared, sink)
    }

    #[test]
    fn repeated_modify_is_kept_in_order() {
        let (shared, sink) = sink(false);
        assert!(sink.push(WatchEvent::new(WatchEventKind::Modify, "f")));
        assert!(sink.push(WatchEvent::new(WatchEventKind::Modify, "f")));
        assert!(sink.push(WatchEvent::new(WatchEventKind::Modify, "g")));
        assert!(sink.push(WatchEvent::new(WatchEventKind::Modify, "f")));
        let names: Vec<_> = shared
            .queue
            .lock()
            .events
            .iter()
            .map(|e| e.name.clone())
            .collect();
        assert_eq!(names, ["f", "f", "g", "f"].map(PathBuf::from));
    }

    #[test]
    fn events_only_drops_modify() {
        let (shared, sink) = sink(true);
        assert!(sink.push(WatchEvent::new(WatchEventKind::Modify, "f")));
        assert!(sink.push(WatchEvent::new(WatchEventKind::Add, "f")));
        let queue = shared.queue.lock();
        assert_eq!(queue.events.len(), 1);
        assert_eq!(queue.events[0].kind, WatchEventKind::Add);
    }

    #[test]
    fn failure_is_terminal() {
        let (shared, sink) = sink(false);
        sink.fail(ErrorKind::PathNotFound);
        sink.fail(ErrorKind::IoError);
        assert!(!sink.push(WatchEvent::new(WatchEventKind::Add, "late")));
        let queue = shared.queue.lock();
        assert_eq!(queue.error, Some(ErrorKind::PathNotFound));
        assert!(queue.events.is_empty());
    }
}
