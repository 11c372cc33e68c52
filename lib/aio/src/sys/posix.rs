use std::cell::UnsafeCell;
use std::fmt;
use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use hostio_core::errno::errno_to_kind;
use hostio_core::{Error, ErrorKind, Result, Timeout};
use tracing::warn;

use crate::request::{AioStatus, OpKind, Shared};

/// The kernel-visible control block. It must not move while the operation is
/// in flight, so it is only ever reached through an `Arc`.
struct ControlBlock {
    cb: UnsafeCell<libc::aiocb>,
    settled: AtomicBool,
}

// After submission the block is only handed to aio_* calls, which the C
// library synchronizes internally.
unsafe impl Send for ControlBlock {}
unsafe impl Sync for ControlBlock {}

impl ControlBlock {
    fn as_ptr(&self) -> *mut libc::aiocb {
        self.cb.get()
    }

    fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    /// Block until the operation leaves the in-progress state and collect its
    /// result. `aio_return` may be called only once, so only one caller may
    /// settle a block.
    fn settle(&self) -> AioStatus {
        let outcome = self.collect();
        self.settled.store(true, Ordering::Release);
        outcome
    }

    fn collect(&self) -> AioStatus {
        let list = [self.as_ptr() as *const libc::aiocb];
        loop {
            let err = unsafe { libc::aio_error(self.as_ptr()) };
            match err {
                libc::EINPROGRESS => {
                    // EINTR and EAGAIN both mean "look again".
                    unsafe { libc::aio_suspend(list.as_ptr(), 1, std::ptr::null()) };
                }
                -1 => {
                    let errno = std::io::Error::last_os_error()
                        .raw_os_error()
                        .unwrap_or(libc::EIO);
                    return AioStatus::Failed(errno_to_kind(errno));
                }
                0 => {
                    let transferred = unsafe { libc::aio_return(self.as_ptr()) };
                    return AioStatus::Completed(transferred.max(0) as usize);
                }
                libc::ECANCELED => {
                    unsafe { libc::aio_return(self.as_ptr()) };
                    return AioStatus::Canceled;
                }
                errno => {
                    unsafe { libc::aio_return(self.as_ptr()) };
                    return AioStatus::Failed(errno_to_kind(errno));
                }
            }
        }
    }
}

/// A queued `aio_read`/`aio_write` plus the thread that waits for it and
/// publishes the outcome.
pub(crate) struct Op {
    block: Arc<ControlBlock>,
    fd: libc::c_int,
    notifier: Option<JoinHandle<()>>,
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Op")
            .field("fd", &self.fd)
            .field("notifier", &self.notifier.is_some())
            .finish()
    }
}

/// POSIX completion is always observed by the notifier thread, so there is
/// nothing native to block on.
pub(crate) enum Waiter {}

impl Waiter {
    pub(crate) fn wait(&self, _timeout: Timeout) -> Result<()> {
        match *self {}
    }
}

impl Op {
    pub(crate) fn submit(
        file: &std::fs::File,
        kind: OpKind,
        offset: u64,
        ptr: *mut u8,
        len: usize,
        shared: &Arc<Shared>,
    ) -> Result<Op> {
        let offset = libc::off_t::try_from(offset)
            .map_err(|_| Error::new(ErrorKind::OutOfRange, "aio.submit"))?;
        let fd = file.as_raw_fd();

        let mut cb: libc::aiocb = unsafe { std::mem::zeroed() };
        cb.aio_fildes = fd;
        cb.aio_offset = offset;
        cb.aio_buf = ptr.cast();
        cb.aio_nbytes = len;
        cb.aio_sigevent.sigev_notify = libc::SIGEV_NONE;
        let block = Arc::new(ControlBlock {
            cb: UnsafeCell::new(cb),
            settled: AtomicBool::new(false),
        });

        let rc = match kind {
            OpKind::Read => unsafe { libc::aio_read(block.as_ptr()) },
            OpKind::Write => unsafe { libc::aio_write(block.as_ptr()) },
        };
        if rc != 0 {
            return Err(Error::last_os_error(match kind {
                OpKind::Read => "aio.read",
                OpKind::Write => "aio.write",
            }));
        }

        let spawned = {
            let block = block.clone();
            let shared = shared.clone();
            std::thread::Builder::new()
                .name("hostio-aio".to_string())
                .spawn(move || {
                    let outcome = block.settle();
                    shared.publish(outcome);
                })
        };
        match spawned {
            Ok(notifier) => Ok(Op {
                block,
                fd,
                notifier: Some(notifier),
            }),
            Err(err) => {
                // Nobody will observe completion, so the buffer cannot be
                // released until the operation is drained here.
                unsafe { libc::aio_cancel(fd, block.as_ptr()) };
                block.settle();
                Err(Error::from_io("aio.submit", err))
            }
        }
    }

    /// Completion is pushed by the notifier; there is nothing to pull.
    pub(crate) fn poll(&mut self) -> Option<AioStatus> {
        None
    }

    pub(crate) fn waiter(&self) -> Option<Waiter> {
        None
    }

    pub(crate) fn cancel(&mut self, _file: &std::fs::File) -> Result<()> {
        let rc = unsafe { libc::aio_cancel(self.fd, self.block.as_ptr()) };
        if rc == -1 {
            return Err(Error::last_os_error("aio.cancel"));
        }
        Ok(())
    }
}

impl Drop for Op {
    fn drop(&mut self) {
        if !self.block.is_settled() {
            unsafe { libc::aio_cancel(self.fd, self.block.as_ptr()) };
        }
        if let Some(notifier) = self.notifier.take() {
            if notifier.join().is_err() {
                warn!("aio notifier thread panicked");
            }
        }
    }
}
