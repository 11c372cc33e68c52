use std::fs::Metadata;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileType {
    File,
    Directory,
    Symlink,
    Other,
}

impl From<std::fs::FileType> for FileType {
    fn from(ft: std::fs::FileType) -> Self {
        if ft.is_symlink() {
            FileType::Symlink
        } else if ft.is_dir() {
            FileType::Directory
        } else if ft.is_file() {
            FileType::File
        } else {
            FileType::Other
        }
    }
}

/// Seconds and nanoseconds relative to the Unix epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timespec {
    pub secs: i64,
    pub nanos: u32,
}

impl From<SystemTime> for Timespec {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => Timespec {
                secs: after.as_secs() as i64,
                nanos: after.subsec_nanos(),
            },
            Err(before) => {
                let before = before.duration();
                let mut secs = -(before.as_secs() as i64);
                let mut nanos = before.subsec_nanos();
                if nanos > 0 {
                    secs -= 1;
                    nanos = 1_000_000_000 - nanos;
                }
                Timespec { secs, nanos }
            }
        }
    }
}

/// Metadata captured by a stat call.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Stat {
    pub file_type: FileType,
    pub size: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub inode: u64,
    pub device: u64,
    pub accessed: Timespec,
    pub modified: Timespec,
    pub changed: Timespec,
}

impl Stat {
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    /// Whether the object itself changed between two captures.
    ///
    /// Directory size and mtime move whenever an entry is added or removed;
    /// those changes are structural and are not counted here.
    pub fn content_changed(&self, newer: &Stat) -> bool {
        if self.file_type != newer.file_type
            || self.mode != newer.mode
            || self.inode != newer.inode
        {
            return true;
        }
        if self.is_dir() {
            return false;
        }
        self.size != newer.size || self.modified != newer.modified
    }
}

#[cfg(unix)]
impl From<&Metadata> for Stat {
    fn from(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        let ts = |secs: i64, nanos: i64| Timespec {
            secs,
            nanos: nanos.clamp(0, 999_999_999) as u32,
        };
        Stat {
            file_type: meta.file_type().into(),
            size: meta.size(),
            mode: meta.mode(),
            nlink: meta.nlink(),
            uid: meta.uid(),
            gid: meta.gid(),
            inode: meta.ino(),
            device: meta.dev(),
            accessed: ts(meta.atime(), meta.atime_nsec()),
            modified: ts(meta.mtime(), meta.mtime_nsec()),
            changed: ts(meta.ctime(), meta.ctime_nsec()),
        }
    }
}

#[cfg(not(unix))]
impl From<&Metadata> for Stat {
    fn from(meta: &Metadata) -> Self {
        let file_type: FileType = meta.file_type().into();
        let mut mode = if meta.permissions().readonly() {
            0o444
        } else {
            0o666
        };
        if file_type == FileType::Directory {
            mode |= 0o111;
        }
        let time = |t: std::io::Result<SystemTime>| t.map(Timespec::from).unwrap_or_default();
        Stat {
            file_type,
            size: meta.len(),
            mode,
            nlink: 1,
            uid: 0,
            gid: 0,
            inode: 0,
            device: 0,
            accessed: time(meta.accessed()),
            modified: time(meta.modified()),
            changed: time(meta.created()),
        }
    }
}
