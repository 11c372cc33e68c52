//! Directory snapshots.
//!
//! A [`Snapshot`] is an owned, point-in-time copy of a directory tree's
//! structure and metadata. [`Snapshot::refresh`] diffs it against the live
//! filesystem and reports what changed.
//!
//! ```no_run
//! use hostio_snapshot::{Snapshot, SnapshotFlags};
//!
//! # fn main() -> hostio_core::Result<()> {
//! let mut snapshot = Snapshot::capture("assets", SnapshotFlags::empty(), -1)?;
//! // ... files change ...
//! snapshot.refresh(-1, |path, event| println!("{event:?} {}", path.display()))?;
//! # Ok(())
//! # }
//! ```

mod depth;
mod refresh;
mod snapshot;

pub use depth::MaxDepth;
pub use refresh::SnapshotEvent;
pub use snapshot::{SNAPSHOT_CLASS, Snapshot, SnapshotCursor, SnapshotFlags};
