//! Directory change notification.
//!
//! A [`Watch`] monitors a directory (optionally its whole subtree) and
//! queues [`WatchEvent`]s in the order the backend observed them. Linux uses
//! inotify and Windows uses `ReadDirectoryChangesW`; everywhere else, or when
//! [`WatchOptions::force_polling`] is set, the tree is rescanned on a timer.
//!
//! ```no_run
//! use hostio_core::Timeout;
//! use hostio_watch::{Watch, WatchFlags};
//!
//! # fn main() -> hostio_core::Result<()> {
//! let watch = Watch::open("/srv/incoming", WatchFlags::RECURSIVE)?;
//! watch.wait(Timeout::Infinite)?;
//! while let Some(event) = watch.try_next()? {
//!     println!("{:?} {}", event.kind, event.name.display());
//! }
//! # Ok(())
//! # }
//! ```

mod event;
mod options;
mod sys;
mod watch;

pub use event::{EVENT_HEADER_SIZE, WatchEvent, WatchEventKind};
pub use options::{WatchFlags, WatchOptions};
pub use watch::{WATCH_CLASS, Watch};
