//! Portable backend: rescan the tree with a [`Snapshot`] refresh on a timer
//! and turn its differences into events. Renames show up as a remove
//! followed by an add.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use hostio_core::{Error, ErrorKind, Result};
use hostio_snapshot::{MaxDepth, Snapshot, SnapshotEvent, SnapshotFlags};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::event::{WatchEvent, WatchEventKind};
use crate::options::WatchOptions;
use crate::watch::EventSink;

#[derive(Debug, Default)]
struct Stop {
    requested: Mutex<bool>,
    condvar: Condvar,
}

pub(crate) struct Poller {
    stop: Arc<Stop>,
    thread: Option<JoinHandle<()>>,
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("running", &self.thread.is_some())
            .finish()
    }
}

impl Poller {
    pub(crate) fn start(root: &Path, options: &WatchOptions, sink: EventSink) -> Result<Poller> {
        let depth = if options.is_recursive() {
            MaxDepth::Unbounded
        } else {
            MaxDepth::Levels(1)
        };
        let snapshot = Snapshot::capture(root, SnapshotFlags::empty(), depth)?;
        let interval = options.get_poll_interval();
        let stop = Arc::new(Stop::default());
        let thread = {
            let stop = stop.clone();
            std::thread::Builder::new()
                .name("hostio-watch".to_string())
                .spawn(move || run(snapshot, depth, interval, &sink, &stop))
                .map_err(|err| Error::from_io("watch.open", err))?
        };
        Ok(Poller {
            stop,
            thread: Some(thread),
        })
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        *self.stop.requested.lock() = true;
        self.stop.condvar.notify_all();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("watch polling thread panicked");
            }
        }
    }
}

fn run(mut snapshot: Snapshot, depth: MaxDepth, interval: Duration, sink: &EventSink, stop: &Stop) {
    let root = snapshot.path().to_path_buf();
    loop {
        {
            let mut requested = stop.requested.lock();
            if !*requested {
                stop.condvar.wait_for(&mut requested, interval);
            }
            if *requested {
                break;
            }
        }

        let mut alive = true;
        let result = snapshot.refresh(depth, |path, event| {
            // The root's own metadata is not reported.
            let Ok(name) = path.strip_prefix(&root) else {
                return;
            };
            if !alive || name.as_os_str().is_empty() {
                return;
            }
            let kind = match event {
                SnapshotEvent::Add => WatchEventKind::Add,
                SnapshotEvent::Remove => WatchEventKind::Remove,
                SnapshotEvent::Modify => WatchEventKind::Modify,
            };
            alive = sink.push(WatchEvent::new(kind, name));
        });
        if let Err(err) = result {
            let kind = if err.kind().is_not_found() {
                ErrorKind::PathNotFound
            } else {
                err.kind()
            };
            sink.fail(kind);
            break;
        }
        if !alive {
            break;
        }
    }
    debug!(root = %root.display(), "watch polling stopped");
}
