use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf};

use bitflags::bitflags;
use hostio_core::{Class, Error, ErrorKind, Payload, Result, Stat, TypeBits, fs};
use tracing::{debug, warn};

use crate::MaxDepth;

pub static SNAPSHOT_CLASS: Class = Class::new(
    "snapshot",
    TypeBits::SNAPSHOT,
    std::mem::size_of::<Snapshot>(),
);

bitflags! {
    #[derive(Default)]
    pub struct SnapshotFlags: u32 {
        /// Stat through symlinks and descend into linked directories.
        const FOLLOW_SYMLINKS = 1 << 0;
        /// Leave out entries whose name starts with a dot.
        const SKIP_HIDDEN = 1 << 1;
    }
}

/// Position of an [`Snapshot::enumerate`] walk. Start from
/// `SnapshotCursor::default()`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(transparent)]
pub struct SnapshotCursor(usize);

/// A captured directory tree.
///
/// Each node owns its children outright. References handed out by
/// [`Snapshot::lookup`], [`Snapshot::enumerate`] and [`Snapshot::children`]
/// borrow the tree, so they cannot outlive the next
/// [`Snapshot::refresh`] of any ancestor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub(crate) path: PathBuf,
    pub(crate) name: OsString,
    pub(crate) stat: Stat,
    pub(crate) children: Vec<Snapshot>,
    pub(crate) flags: SnapshotFlags,
}

impl Snapshot {
    /// Capture `path` and up to `max_depth` levels below it.
    pub fn capture<P: AsRef<Path>>(
        path: P,
        flags: SnapshotFlags,
        max_depth: impl Into<MaxDepth>,
    ) -> Result<Snapshot> {
        let path = path.as_ref();
        let max_depth = max_depth.into();
        // The root is always resolved, even when links below it are not.
        let stat = fs::stat(path)?;
        let path = fs::absolute(path)?;
        let mut ancestors = Vec::new();
        let mut ignore = |_: &Path| {};
        let root = Self::build(path, stat, flags, max_depth, &mut ancestors, &mut ignore)?;
        debug!(
            path = %root.path.display(),
            ?max_depth,
            nodes = root.count(),
            "snapshot captured"
        );
        Ok(root)
    }

    /// Build a node whose stat is already known, reporting every node
    /// created to `created`.
    pub(crate) fn build(
        path: PathBuf,
        stat: Stat,
        flags: SnapshotFlags,
        max_depth: MaxDepth,
        ancestors: &mut Vec<(u64, u64)>,
        created: &mut dyn FnMut(&Path),
    ) -> Result<Snapshot> {
        let name = node_name(&path);
        let mut node = Snapshot {
            path,
            name,
            stat,
            children: Vec::new(),
            flags,
        };
        if let Some(child_depth) = max_depth.descend() {
            node.scan(child_depth, ancestors, created)?;
        }
        Ok(node)
    }

    /// Add every live entry that is not already a child.
    pub(crate) fn scan(
        &mut self,
        child_depth: MaxDepth,
        ancestors: &mut Vec<(u64, u64)>,
        created: &mut dyn FnMut(&Path),
    ) -> Result<()> {
        if !self.stat.is_dir() {
            return Ok(());
        }
        let identity = (self.stat.device, self.stat.inode);
        // With links followed the tree may loop back on itself. Nodes without
        // an inode number cannot be told apart and are not checked.
        if self.stat.inode != 0 && ancestors.contains(&identity) {
            return Ok(());
        }
        ancestors.push(identity);
        let result = self.scan_entries(child_depth, ancestors, created);
        ancestors.pop();
        result
    }

    /// Capture live entries that are not children yet. Only not-found
    /// errors escape; a directory that cannot be listed stays a leaf.
    pub(crate) fn scan_entries(
        &mut self,
        child_depth: MaxDepth,
        ancestors: &mut Vec<(u64, u64)>,
        created: &mut dyn FnMut(&Path),
    ) -> Result<()> {
        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(err) if err.kind().is_not_found() => return Err(err),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "directory not listed");
                return Ok(());
            }
        };
        let mut added = false;
        for entry in entries {
            if self.flags.contains(SnapshotFlags::SKIP_HIDDEN) && is_hidden(&entry.name) {
                continue;
            }
            if self.child_index(&entry.name).is_ok() {
                continue;
            }
            let path = self.path.join(&entry.name);
            // Entries that vanish between listing and stat are skipped.
            let Ok(stat) = stat_entry(&path, self.flags) else {
                continue;
            };
            created(&path);
            let child = match Self::build(path, stat, self.flags, child_depth, ancestors, created) {
                Ok(child) => child,
                Err(err) if err.kind().is_not_found() => continue,
                Err(err) => {
                    warn!(error = %err, "entry skipped");
                    continue;
                }
            };
            self.children.push(child);
            added = true;
        }
        if added {
            self.children.sort_by(|a, b| a.name.cmp(&b.name));
        }
        Ok(())
    }

    pub(crate) fn child_index(&self, name: &OsStr) -> std::result::Result<usize, usize> {
        self.children
            .binary_search_by(|child| child.name.as_os_str().cmp(name))
    }

    /// Absolute path of this node.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component. The root of a filesystem names itself.
    pub fn name(&self) -> &OsStr {
        &self.name
    }

    /// Metadata as of the last capture or refresh.
    pub fn stat(&self) -> &Stat {
        &self.stat
    }

    pub fn flags(&self) -> SnapshotFlags {
        self.flags
    }

    pub fn is_dir(&self) -> bool {
        self.stat.is_dir()
    }

    /// Immediate children, sorted by name.
    pub fn children(&self) -> std::slice::Iter<'_, Snapshot> {
        self.children.iter()
    }

    /// Cursor-driven walk over the immediate children.
    pub fn enumerate(&self, cursor: &mut SnapshotCursor) -> Option<&Snapshot> {
        let child = self.children.get(cursor.0)?;
        cursor.0 += 1;
        Some(child)
    }

    /// Find a descendant by a path relative to this node. An empty path
    /// returns the node itself.
    pub fn lookup<P: AsRef<Path>>(&self, relative: P) -> Result<&Snapshot> {
        let mut node = self;
        for component in relative.as_ref().components() {
            match component {
                Component::CurDir => {}
                Component::Normal(name) => {
                    let index = node
                        .child_index(name)
                        .map_err(|_| Error::new(ErrorKind::NotFound, "snapshot.lookup"))?;
                    node = &node.children[index];
                }
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(Error::new(ErrorKind::InvalidPath, "snapshot.lookup"));
                }
            }
        }
        Ok(node)
    }

    /// This node's path relative to `root`, if it lies inside it.
    pub fn relative_path(&self, root: &Snapshot) -> Option<&Path> {
        self.path.strip_prefix(&root.path).ok()
    }

    /// Number of nodes in the tree, this one included.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Snapshot::count).sum::<usize>()
    }
}

impl Payload for Snapshot {
    fn class(&self) -> &'static Class {
        &SNAPSHOT_CLASS
    }
}

pub(crate) fn stat_entry(path: &Path, flags: SnapshotFlags) -> Result<Stat> {
    if flags.contains(SnapshotFlags::FOLLOW_SYMLINKS) {
        fs::stat(path)
    } else {
        fs::lstat(path)
    }
}

fn node_name(path: &Path) -> OsString {
    path.file_name()
        .map_or_else(|| path.as_os_str().to_os_string(), OsStr::to_os_string)
}

fn is_hidden(name: &OsStr) -> bool {
    name.as_encoded_bytes().first() == Some(&b'.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/c.txt"), b"c").unwrap();
        std::fs::write(dir.path().join("top.txt"), b"top").unwrap();
        std::fs::write(dir.path().join(".hidden"), b"").unwrap();
        dir
    }

    #[test]
    fn depth_limits_capture() {
        let dir = tree();
        let shallow = Snapshot::capture(dir.path(), SnapshotFlags::empty(), 1).unwrap();
        assert_eq!(shallow.count(), 4);
        assert_eq!(shallow.lookup("a").unwrap().children().count(), 0);

        let none = Snapshot::capture(dir.path(), SnapshotFlags::empty(), 0).unwrap();
        assert_eq!(none.count(), 1);

        let full = Snapshot::capture(dir.path(), SnapshotFlags::empty(), -1).unwrap();
        assert_eq!(full.count(), 6);
    }

    #[test]
    fn skip_hidden() {
        let dir = tree();
        let snap = Snapshot::capture(dir.path(), SnapshotFlags::SKIP_HIDDEN, -1).unwrap();
        assert!(snap.lookup(".hidden").is_err());
        assert_eq!(snap.count(), 5);
    }

    #[test]
    fn lookup_rejects_escaping_paths() {
        let dir = tree();
        let snap = Snapshot::capture(dir.path(), SnapshotFlags::empty(), -1).unwrap();
        assert_eq!(snap.lookup("").unwrap().path(), snap.path());
        assert_eq!(snap.lookup("./a/b").unwrap().name(), "b");
        assert_eq!(
            snap.lookup("a/../top.txt").unwrap_err().kind(),
            ErrorKind::InvalidPath
        );
        assert_eq!(
            snap.lookup("a/missing").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn enumerate_walks_children_in_order() {
        let dir = tree();
        let snap = Snapshot::capture(dir.path(), SnapshotFlags::empty(), -1).unwrap();
        let mut cursor = SnapshotCursor::default();
        let mut names = Vec::new();
        while let Some(child) = snap.enumerate(&mut cursor) {
            names.push(child.name().to_os_string());
        }
        assert_eq!(names, vec![".hidden", "a", "top.txt"]);
        assert!(snap.enumerate(&mut cursor).is_none());
    }

    #[test]
    fn relative_paths() {
        let dir = tree();
        let snap = Snapshot::capture(dir.path(), SnapshotFlags::empty(), -1).unwrap();
        let c = snap.lookup("a/b/c.txt").unwrap();
        assert_eq!(c.relative_path(&snap).unwrap(), Path::new("a/b/c.txt"));
        assert!(snap.relative_path(c).is_none());
    }

    #[test]
    fn missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Snapshot::capture(dir.path().join("nope"), SnapshotFlags::empty(), -1)
            .unwrap_err();
        assert!(err.kind().is_not_found(), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn symlink_loops_terminate() {
        let dir = tree();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("a/loop")).unwrap();

        let plain = Snapshot::capture(dir.path(), SnapshotFlags::empty(), -1).unwrap();
        assert!(!plain.lookup("a/loop").unwrap().is_dir());

        let followed =
            Snapshot::capture(dir.path(), SnapshotFlags::FOLLOW_SYMLINKS, -1).unwrap();
        let looped = followed.lookup("a/loop").unwrap();
        assert!(looped.is_dir());
        assert_eq!(looped.children().count(), 0);
    }
}
