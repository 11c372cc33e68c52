use std::path::{Path, PathBuf};

use hostio_core::{Error, ErrorKind, Result};

/// Size of the fixed part of an encoded event.
pub const EVENT_HEADER_SIZE: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum WatchEventKind {
    Add = 1,
    Remove = 2,
    Modify = 3,
    Rename = 4,
}

impl WatchEventKind {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<WatchEventKind> {
        Some(match code {
            1 => WatchEventKind::Add,
            2 => WatchEventKind::Remove,
            3 => WatchEventKind::Modify,
            4 => WatchEventKind::Rename,
            _ => return None,
        })
    }
}

/// One change below a watched directory. Names are relative to the watched
/// root.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub name: PathBuf,
    /// The previous name, for [`WatchEventKind::Rename`] only.
    pub old_name: Option<PathBuf>,
}

impl WatchEvent {
    pub fn new(kind: WatchEventKind, name: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            name: name.into(),
            old_name: None,
        }
    }

    pub fn rename(old_name: impl Into<PathBuf>, name: impl Into<PathBuf>) -> Self {
        Self {
            kind: WatchEventKind::Rename,
            name: name.into(),
            old_name: Some(old_name.into()),
        }
    }

    /// Bytes needed by [`WatchEvent::encode`].
    pub fn encoded_len(&self) -> usize {
        let mut len = EVENT_HEADER_SIZE + name_bytes(&self.name).len() + 1;
        if let Some(old) = &self.old_name {
            len += name_bytes(old).len() + 1;
        }
        len
    }

    /// Write the event as `kind: u32 LE`, `old_offset: u32 LE`, `name\0` and,
    /// for renames, `old_name\0`. `old_offset` counts from the first name
    /// byte and is 0 when there is no old name.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let len = self.encoded_len();
        if buf.len() < len {
            return Err(Error::new(ErrorKind::BufferTooSmall, "watch.encode"));
        }
        let name = name_bytes(&self.name);
        let old_offset = match &self.old_name {
            Some(_) => name.len() + 1,
            None => 0,
        };
        let old_offset = u32::try_from(old_offset)
            .map_err(|_| Error::new(ErrorKind::OutOfRange, "watch.encode"))?;

        buf[..4].copy_from_slice(&self.kind.code().to_le_bytes());
        buf[4..8].copy_from_slice(&old_offset.to_le_bytes());
        let mut at = EVENT_HEADER_SIZE;
        for part in std::iter::once(name).chain(self.old_name.as_deref().map(name_bytes)) {
            buf[at..at + part.len()].copy_from_slice(part);
            at += part.len();
            buf[at] = 0;
            at += 1;
        }
        Ok(len)
    }

    /// Parse an event written by [`WatchEvent::encode`].
    pub fn decode(buf: &[u8]) -> Result<WatchEvent> {
        let invalid = || Error::new(ErrorKind::InvalidArgument, "watch.decode");
        if buf.len() < EVENT_HEADER_SIZE {
            return Err(invalid());
        }
        let word = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let kind = WatchEventKind::from_code(word(0)).ok_or_else(invalid)?;
        let old_offset = word(4) as usize;
        let names = &buf[EVENT_HEADER_SIZE..];

        let name = until_nul(names).ok_or_else(invalid)?;
        let old_name = match old_offset {
            0 => None,
            at => Some(until_nul(names.get(at..).ok_or_else(invalid)?).ok_or_else(invalid)?),
        };
        Ok(WatchEvent {
            kind,
            name: path_from_bytes(name),
            old_name: old_name.map(path_from_bytes),
        })
    }
}

fn until_nul(bytes: &[u8]) -> Option<&[u8]> {
    let end = bytes.iter().position(|b| *b == 0)?;
    Some(&bytes[..end])
}

fn name_bytes(path: &Path) -> &[u8] {
    path.as_os_str().as_encoded_bytes()
}

#[cfg(unix)]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    PathBuf::from(OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}
