use std::path::Path;

use hostio_core::{Error, ErrorKind, Result, Stat, fs};
use tracing::{debug, trace, warn};

use crate::MaxDepth;
use crate::snapshot::{Snapshot, stat_entry};

/// A structural change found by [`Snapshot::refresh`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SnapshotEvent {
    Add,
    Remove,
    Modify,
}

type Callback<'a> = dyn FnMut(&Path, SnapshotEvent) + 'a;

impl Snapshot {
    /// Bring the tree in line with the filesystem, reporting each difference
    /// as it is applied.
    ///
    /// Per directory, existing children are refreshed first (those that no
    /// longer stat are pruned and reported as [`SnapshotEvent::Remove`]), then
    /// new entries are captured and reported as [`SnapshotEvent::Add`], and
    /// finally the node itself is reported as [`SnapshotEvent::Modify`] if its
    /// metadata changed. A rename therefore shows up as a remove followed by
    /// an add. Nodes at the depth limit lose their children without any
    /// report.
    ///
    /// The callback only sees plain paths, so it cannot reach into the tree
    /// while it is being rewritten. If the root cannot be stat'ed the refresh
    /// fails; work already done on other nodes is kept.
    pub fn refresh<F>(&mut self, max_depth: impl Into<MaxDepth>, mut callback: F) -> Result<()>
    where
        F: FnMut(&Path, SnapshotEvent),
    {
        let max_depth = max_depth.into();
        let stat = fs::stat(&self.path)?;
        let mut ancestors = Vec::new();
        self.refresh_node(stat, max_depth, &mut ancestors, &mut callback)?;
        debug!(path = %self.path.display(), ?max_depth, nodes = self.count(), "snapshot refreshed");
        Ok(())
    }

    fn refresh_node(
        &mut self,
        stat: Stat,
        max_depth: MaxDepth,
        ancestors: &mut Vec<(u64, u64)>,
        callback: &mut Callback<'_>,
    ) -> Result<()> {
        let changed = self.stat.content_changed(&stat);
        self.stat = stat;
        match max_depth.descend() {
            Some(child_depth) if self.stat.is_dir() => {
                self.refresh_children(child_depth, ancestors, callback)?;
            }
            _ => self.children.clear(),
        }
        if changed {
            report(callback, &self.path, SnapshotEvent::Modify);
        }
        Ok(())
    }

    fn refresh_children(
        &mut self,
        child_depth: MaxDepth,
        ancestors: &mut Vec<(u64, u64)>,
        callback: &mut Callback<'_>,
    ) -> Result<()> {
        let identity = (self.stat.device, self.stat.inode);
        if self.stat.inode != 0 && ancestors.contains(&identity) {
            self.children.clear();
            return Ok(());
        }
        ancestors.push(identity);
        let result = self.diff_children(child_depth, ancestors, callback);
        ancestors.pop();
        result
    }

    fn diff_children(
        &mut self,
        child_depth: MaxDepth,
        ancestors: &mut Vec<(u64, u64)>,
        callback: &mut Callback<'_>,
    ) -> Result<()> {
        let flags = self.flags;
        let mut index = 0;
        while index < self.children.len() {
            let child = &mut self.children[index];
            // A child that no longer stats, for whatever reason, is gone.
            let outcome = match stat_entry(&child.path, flags) {
                Ok(stat) => child.refresh_node(stat, child_depth, ancestors, callback),
                Err(_) => Err(Error::new(ErrorKind::NotFound, "snapshot.refresh")),
            };
            match outcome {
                Ok(()) => index += 1,
                // Also covers a directory deleted between its stat and listing.
                Err(err) if err.kind().is_not_found() => {
                    let removed = self.children.remove(index);
                    report(callback, &removed.path, SnapshotEvent::Remove);
                }
                Err(err) => {
                    let path = &self.children[index].path;
                    warn!(path = %path.display(), error = %err, "child not refreshed");
                    index += 1;
                }
            }
        }

        let mut created = |path: &Path| report(callback, path, SnapshotEvent::Add);
        self.scan_entries(child_depth, ancestors, &mut created)
    }
}

fn report(callback: &mut Callback<'_>, path: &Path, event: SnapshotEvent) {
    trace!(path = %path.display(), ?event, "snapshot change");
    callback(path, event);
}
