//! Synchronous file layer.
//!
//! Plain open/stat/readdir wrappers that the asynchronous engines build on.
//! A [`File`] opened with [`OpenOptions::asynchronous`] can be handed to the
//! AIO engine.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use bitflags::bitflags;
use tracing::debug;

use crate::error::io_result;
use crate::handle::{Class, Payload, TypeBits};
use crate::stat::{FileType, Stat};
use crate::{Error, ErrorKind, Result};

pub static FILE_CLASS: Class = Class::new(
    "file",
    TypeBits::from_bits_truncate(
        TypeBits::FILE.bits() | TypeBits::READABLE.bits() | TypeBits::WRITABLE.bits(),
    ),
    std::mem::size_of::<File>(),
);

bitflags! {
    /// Sharing mode requested at open time. Only enforced on Windows.
    pub struct Share: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const DELETE = 1 << 2;
    }
}

#[derive(Debug, Clone)]
pub struct OpenOptionsConfig {
    read: bool,
    write: bool,
    create_new: bool,
    create: bool,
    append: bool,
    truncate: bool,
    asynchronous: bool,
    share: Share,
}

impl OpenOptionsConfig {
    pub const fn read(&self) -> bool {
        self.read
    }

    pub const fn write(&self) -> bool {
        self.write
    }

    pub const fn create_new(&self) -> bool {
        self.create_new
    }

    pub const fn create(&self) -> bool {
        self.create
    }

    pub const fn append(&self) -> bool {
        self.append
    }

    pub const fn truncate(&self) -> bool {
        self.truncate
    }

    pub const fn asynchronous(&self) -> bool {
        self.asynchronous
    }

    pub const fn share(&self) -> Share {
        self.share
    }
}

#[derive(Debug, Clone)]
pub struct OpenOptions {
    conf: OpenOptionsConfig,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self {
            conf: OpenOptionsConfig {
                read: false,
                write: false,
                create_new: false,
                create: false,
                append: false,
                truncate: false,
                asynchronous: false,
                share: Share::READ | Share::WRITE,
            },
        }
    }

    pub fn read(&mut self, read: bool) -> &mut Self {
        self.conf.read = read;
        self
    }

    pub fn write(&mut self, write: bool) -> &mut Self {
        self.conf.write = write;
        self
    }

    pub fn append(&mut self, append: bool) -> &mut Self {
        self.conf.append = append;
        self
    }

    pub fn truncate(&mut self, truncate: bool) -> &mut Self {
        self.conf.truncate = truncate;
        self
    }

    pub fn create(&mut self, create: bool) -> &mut Self {
        self.conf.create = create;
        self
    }

    pub fn create_new(&mut self, create_new: bool) -> &mut Self {
        self.conf.create_new = create_new;
        self
    }

    /// Open the file so that it can back an asynchronous I/O request.
    pub fn asynchronous(&mut self, asynchronous: bool) -> &mut Self {
        self.conf.asynchronous = asynchronous;
        self
    }

    pub fn share(&mut self, share: Share) -> &mut Self {
        self.conf.share = share;
        self
    }

    pub fn config(&self) -> &OpenOptionsConfig {
        &self.conf
    }

    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<File> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::new(ErrorKind::InvalidPath, "file.open"));
        }
        let mut std_opts = std::fs::OpenOptions::new();
        std_opts
            .read(self.conf.read)
            .write(self.conf.write)
            .append(self.conf.append)
            .truncate(self.conf.truncate)
            .create(self.conf.create)
            .create_new(self.conf.create_new);
        self.apply_platform(&mut std_opts);

        let file = io_result("file.open", std_opts.open(path))?;
        debug!(path = %path.display(), asynchronous = self.conf.asynchronous, "file opened");
        Ok(File {
            inner: Some(file),
            path: Some(path.to_path_buf()),
            asynchronous: self.conf.asynchronous,
        })
    }

    #[cfg(windows)]
    fn apply_platform(&self, std_opts: &mut std::fs::OpenOptions) {
        use std::os::windows::fs::OpenOptionsExt;
        use windows_sys::Win32::Storage::FileSystem::{
            FILE_FLAG_OVERLAPPED, FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE,
        };

        let mut share = 0;
        if self.conf.share.contains(Share::READ) {
            share |= FILE_SHARE_READ;
        }
        if self.conf.share.contains(Share::WRITE) {
            share |= FILE_SHARE_WRITE;
        }
        if self.conf.share.contains(Share::DELETE) {
            share |= FILE_SHARE_DELETE;
        }
        std_opts.share_mode(share);
        if self.conf.asynchronous {
            std_opts.custom_flags(FILE_FLAG_OVERLAPPED);
        }
    }

    #[cfg(not(windows))]
    fn apply_platform(&self, _std_opts: &mut std::fs::OpenOptions) {}
}

/// An open file, or the null device.
///
/// The null device has no synchronous descriptor at all: reads see end of
/// file and writes are swallowed.
#[derive(Debug)]
pub struct File {
    inner: Option<std::fs::File>,
    path: Option<PathBuf>,
    asynchronous: bool,
}

impl File {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<File> {
        OpenOptions::new().read(true).open(path)
    }

    /// The null device, usable both synchronously and asynchronously.
    pub fn null() -> File {
        File {
            inner: None,
            path: None,
            asynchronous: true,
        }
    }

    pub fn is_null(&self) -> bool {
        self.inner.is_none()
    }

    pub fn is_async(&self) -> bool {
        self.asynchronous
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The underlying std file, `None` for the null device.
    pub fn as_std(&self) -> Option<&std::fs::File> {
        self.inner.as_ref()
    }

    /// Duplicate the OS descriptor so that another object can own it.
    pub fn try_clone_std(&self) -> Result<Option<std::fs::File>> {
        match &self.inner {
            None => Ok(None),
            Some(file) => io_result("file.clone", file.try_clone()).map(Some),
        }
    }

    pub fn stat(&self) -> Result<Stat> {
        match &self.inner {
            None => Err(Error::new(ErrorKind::NotSupported, "file.stat")),
            Some(file) => {
                let meta = io_result("file.stat", file.metadata())?;
                Ok(Stat::from(&meta))
            }
        }
    }

    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let Some(file) = &self.inner else {
            return Ok(0);
        };
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            return io_result("file.read_at", file.read_at(buf, offset));
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            return io_result("file.read_at", file.seek_read(buf, offset));
        }
        #[cfg(not(any(unix, windows)))]
        {
            let _ = (file, offset, buf);
            return Err(Error::new(ErrorKind::NotSupported, "file.read_at"));
        }
    }

    pub fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize> {
        let Some(file) = &self.inner else {
            return Ok(buf.len());
        };
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            return io_result("file.write_at", file.write_at(buf, offset));
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            return io_result("file.write_at", file.seek_write(buf, offset));
        }
        #[cfg(not(any(unix, windows)))]
        {
            let _ = (file, offset, buf);
            return Err(Error::new(ErrorKind::NotSupported, "file.write_at"));
        }
    }
}

impl Payload for File {
    fn class(&self) -> &'static Class {
        &FILE_CLASS
    }
}

/// One directory entry as reported by [`read_dir`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
    pub file_type: FileType,
    pub size: u64,
}

/// Stat following symlinks.
pub fn stat<P: AsRef<Path>>(path: P) -> Result<Stat> {
    let meta = io_result("fs.stat", std::fs::metadata(path))?;
    Ok(Stat::from(&meta))
}

/// Stat without following a final symlink.
pub fn lstat<P: AsRef<Path>>(path: P) -> Result<Stat> {
    let meta = io_result("fs.lstat", std::fs::symlink_metadata(path))?;
    Ok(Stat::from(&meta))
}

/// List a directory, sorted by name. Entries that vanish while being listed
/// are skipped.
pub fn read_dir<P: AsRef<Path>>(path: P) -> Result<Vec<DirEntry>> {
    let mut entries = Vec::new();
    for entry in io_result("fs.read_dir", std::fs::read_dir(path))? {
        let entry = io_result("fs.read_dir", entry)?;
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let size = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
        entries.push(DirEntry {
            name: entry.file_name(),
            file_type: file_type.into(),
            size,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Resolve a path to an absolute one without requiring it to be canonical.
pub fn absolute<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    match std::fs::canonicalize(path) {
        Ok(path) => Ok(path),
        Err(_) if path.is_absolute() => Ok(path.to_path_buf()),
        Err(_) => {
            let cwd = io_result("fs.absolute", std::env::current_dir())?;
            Ok(cwd.join(path))
        }
    }
}
