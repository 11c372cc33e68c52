//! hostio: a handle-based host OS abstraction.
//!
//! This crate re-exports the hostio workspace under one name:
//!
//! * [`core`](hostio_core): errors, handles and classes, events, threads and
//!   synchronous files,
//! * [`aio`]: one-operation-at-a-time asynchronous reads and writes,
//! * [`watch`]: queued change notifications for a directory tree,
//! * [`snapshot`]: captured directory trees with incremental refresh.
//!
//! ```no_run
//! use hostio::snapshot::{Snapshot, SnapshotFlags};
//! use hostio::watch::{Watch, WatchFlags};
//! use hostio::{Handle, Timeout, WaitStatus};
//!
//! # fn main() -> hostio::Result<()> {
//! let watch = Handle::new(Watch::open("/srv/inbox", WatchFlags::RECURSIVE)?);
//! let mut tree = Snapshot::capture("/srv/inbox", SnapshotFlags::empty(), -1)?;
//! if watch.wait(Timeout::from_millis(1_000))? == WaitStatus::Signaled {
//!     tree.refresh(-1, |path, event| println!("{event:?} {}", path.display()))?;
//! }
//! # Ok(())
//! # }
//! ```

pub use hostio_core::*;

pub use hostio_aio as aio;
pub use hostio_snapshot as snapshot;
pub use hostio_watch as watch;
