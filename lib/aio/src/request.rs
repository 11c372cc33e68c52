use std::sync::Arc;
use std::time::Instant;

use hostio_core::{
    Class, Error, ErrorKind, File, Payload, Result, Timeout, TypeBits, WaitStatus,
};
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::buffer::AioBuffer;
use crate::sys;

pub static AIO_REQUEST_CLASS: Class = Class::new(
    "aio_request",
    TypeBits::from_bits_truncate(TypeBits::AIO_REQUEST.bits() | TypeBits::WAITABLE.bits()),
    std::mem::size_of::<AioRequest>(),
);

/// Where a request's current (or last) operation stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AioStatus {
    /// No operation has been issued yet.
    Idle,
    Pending,
    /// Finished; carries the number of bytes transferred.
    Completed(usize),
    Canceled,
    Failed(ErrorKind),
}

impl AioStatus {
    pub fn is_pending(self) -> bool {
        self == AioStatus::Pending
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AioStatus::Completed(_) | AioStatus::Canceled | AioStatus::Failed(_)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OpKind {
    Read,
    Write,
}

#[derive(Debug)]
pub(crate) struct Inner {
    status: AioStatus,
    kind: Option<OpKind>,
    buffer: Option<AioBuffer>,
    op: Option<sys::Op>,
}

/// State shared between a request and whatever observes native completion.
#[derive(Debug)]
pub(crate) struct Shared {
    inner: Mutex<Inner>,
    condvar: Condvar,
}

impl Shared {
    /// Record the terminal outcome of the in-flight operation and wake every
    /// waiter.
    pub(crate) fn publish(&self, outcome: AioStatus) {
        let mut inner = self.inner.lock();
        if inner.status.is_pending() {
            trace!(?outcome, "aio operation settled");
            inner.status = outcome;
        }
        self.condvar.notify_all();
    }
}

/// One asynchronous read or write at a time against a bound file.
///
/// The request owns a duplicate of the file's descriptor, so the file it was
/// opened from may be closed independently.
#[derive(Debug)]
pub struct AioRequest {
    file: Option<std::fs::File>,
    shared: Arc<Shared>,
}

impl AioRequest {
    /// Bind a request to a file opened with
    /// [`OpenOptions::asynchronous`](hostio_core::OpenOptions::asynchronous).
    pub fn open(file: &File) -> Result<AioRequest> {
        if !file.is_async() {
            return Err(Error::new(ErrorKind::InvalidArgument, "aio.open"));
        }
        let file = file.try_clone_std()?;
        debug!(null_device = file.is_none(), "aio request opened");
        Ok(AioRequest {
            file,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    status: AioStatus::Idle,
                    kind: None,
                    buffer: None,
                    op: None,
                }),
                condvar: Condvar::new(),
            }),
        })
    }

    /// Read `buf.len()` bytes at `offset` into `buf`. Get the buffer back with
    /// [`AioRequest::take_buffer`] once the operation is over.
    pub fn read(&self, offset: u64, buf: Vec<u8>) -> Result<()> {
        self.submit(OpKind::Read, offset, AioBuffer::Owned(buf))
    }

    /// Write all of `data` at `offset`.
    pub fn write(&self, offset: u64, data: Vec<u8>) -> Result<()> {
        self.submit(OpKind::Write, offset, AioBuffer::Owned(data))
    }

    /// Read into caller memory.
    ///
    /// # Safety
    ///
    /// `ptr..ptr + len` must stay valid for writes, and must not be touched by
    /// the caller, until [`AioRequest::status`] reports a terminal state.
    pub unsafe fn read_raw(&self, offset: u64, ptr: *mut u8, len: usize) -> Result<()> {
        self.submit(OpKind::Read, offset, AioBuffer::Raw { ptr, len })
    }

    /// Write from caller memory.
    ///
    /// # Safety
    ///
    /// `ptr..ptr + len` must stay valid, and unmodified, until
    /// [`AioRequest::status`] reports a terminal state.
    pub unsafe fn write_raw(&self, offset: u64, ptr: *const u8, len: usize) -> Result<()> {
        self.submit(
            OpKind::Write,
            offset,
            AioBuffer::Raw {
                ptr: ptr as *mut u8,
                len,
            },
        )
    }

    fn submit(&self, kind: OpKind, offset: u64, mut buffer: AioBuffer) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        Self::refresh(&mut inner);
        if inner.status.is_pending() {
            return Err(Error::new(ErrorKind::Busy, "aio.submit"));
        }
        // The previous operation is terminal, so its notifier (if any) has
        // already published and will not take the lock again.
        inner.op = None;
        inner.buffer = None;

        let Some(file) = &self.file else {
            let transferred = match kind {
                OpKind::Read => 0,
                OpKind::Write => buffer.len(),
            };
            inner.kind = Some(kind);
            inner.buffer = Some(buffer);
            inner.status = AioStatus::Completed(transferred);
            self.shared.condvar.notify_all();
            return Ok(());
        };

        let ptr = buffer.as_mut_ptr();
        let len = buffer.len();
        // Pending must be visible before the notifier can publish.
        inner.status = AioStatus::Pending;
        inner.kind = Some(kind);
        match sys::Op::submit(file, kind, offset, ptr, len, &self.shared) {
            Ok(op) => {
                trace!(?kind, offset, len, "aio operation queued");
                inner.buffer = Some(buffer);
                inner.op = Some(op);
                Ok(())
            }
            Err(err) => {
                inner.status = AioStatus::Failed(err.kind());
                Err(err)
            }
        }
    }

    /// Let backends that detect completion by polling do so.
    fn refresh(inner: &mut MutexGuard<'_, Inner>) {
        if !inner.status.is_pending() {
            return;
        }
        if let Some(outcome) = inner.op.as_mut().and_then(|op| op.poll()) {
            trace!(?outcome, "aio operation settled");
            inner.status = outcome;
        }
    }

    /// Non-blocking status query.
    pub fn status(&self) -> AioStatus {
        let mut inner = self.shared.inner.lock();
        Self::refresh(&mut inner);
        inner.status
    }

    /// Take back the buffer handed to [`AioRequest::read`] or
    /// [`AioRequest::write`], once the operation is terminal. Completed reads
    /// are truncated to the number of bytes transferred.
    pub fn take_buffer(&self) -> Option<Vec<u8>> {
        let mut inner = self.shared.inner.lock();
        Self::refresh(&mut inner);
        if !inner.status.is_terminal() {
            return None;
        }
        let mut buf = inner.buffer.take()?.into_owned()?;
        if let (Some(OpKind::Read), AioStatus::Completed(n)) = (inner.kind, inner.status) {
            buf.truncate(n);
        }
        Some(buf)
    }

    /// Ask the OS to abandon the in-flight operation. The request becomes
    /// [`AioStatus::Canceled`] once the OS acknowledges, which may be never if
    /// the operation completes first.
    pub fn cancel(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        Self::refresh(&mut inner);
        if !inner.status.is_pending() {
            return Ok(());
        }
        let (Some(file), Some(op)) = (&self.file, inner.op.as_mut()) else {
            return Ok(());
        };
        debug!("aio cancel requested");
        op.cancel(file)
    }

    fn block(&self, timeout: Timeout) -> Result<WaitStatus> {
        let deadline = timeout.deadline();
        let mut inner = self.shared.inner.lock();
        loop {
            Self::refresh(&mut inner);
            if !inner.status.is_pending() {
                return Ok(WaitStatus::Signaled);
            }
            let remaining = match deadline {
                None => Timeout::Infinite,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(WaitStatus::TimedOut);
                    }
                    Timeout::After(deadline - now)
                }
            };
            match inner.op.as_ref().and_then(|op| op.waiter()) {
                // The op cannot be replaced while pending, so its waiter stays
                // valid with the lock released.
                Some(waiter) => {
                    MutexGuard::unlocked(&mut inner, || waiter.wait(remaining))?;
                }
                None => match deadline {
                    None => self.shared.condvar.wait(&mut inner),
                    Some(deadline) => {
                        self.shared.condvar.wait_until(&mut inner, deadline);
                    }
                },
            }
        }
    }
}

impl Payload for AioRequest {
    fn class(&self) -> &'static Class {
        &AIO_REQUEST_CLASS
    }

    fn wait(&self, timeout: Timeout) -> Result<WaitStatus> {
        self.block(timeout)
    }
}

impl Drop for AioRequest {
    fn drop(&mut self) {
        if self.status().is_pending() {
            self.cancel().ok();
            self.block(Timeout::Infinite).ok();
        }
        // Dropped outside the lock: a notifier may still be publishing.
        let op = self.shared.inner.lock().op.take();
        drop(op);
        debug!("aio request closed");
    }
}
