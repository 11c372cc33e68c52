//! Targets without a native asynchronous file API run each transfer as a
//! positioned read or write on a helper thread.

use std::sync::Arc;
use std::thread::JoinHandle;

use hostio_core::errno::io_error_kind;
use hostio_core::{Error, ErrorKind, Result, Timeout};
use tracing::warn;

use crate::request::{AioStatus, OpKind, Shared};

struct RawBuf {
    ptr: *mut u8,
    len: usize,
}

// The request keeps the buffer alive until the helper has published.
unsafe impl Send for RawBuf {}

#[derive(Debug)]
pub(crate) struct Op {
    worker: Option<JoinHandle<()>>,
}

pub(crate) enum Waiter {}

impl Waiter {
    pub(crate) fn wait(&self, _timeout: Timeout) -> Result<()> {
        match *self {}
    }
}

#[cfg(unix)]
fn transfer(file: &std::fs::File, kind: OpKind, offset: u64, buf: RawBuf) -> AioStatus {
    use std::os::unix::fs::FileExt;

    let result = match kind {
        OpKind::Read => {
            let slice = unsafe { std::slice::from_raw_parts_mut(buf.ptr, buf.len) };
            file.read_at(slice, offset)
        }
        OpKind::Write => {
            let slice = unsafe { std::slice::from_raw_parts(buf.ptr, buf.len) };
            file.write_at(slice, offset)
        }
    };
    match result {
        Ok(n) => AioStatus::Completed(n),
        Err(err) => AioStatus::Failed(io_error_kind(&err)),
    }
}

#[cfg(not(unix))]
fn transfer(_file: &std::fs::File, _kind: OpKind, _offset: u64, _buf: RawBuf) -> AioStatus {
    let _ = io_error_kind;
    AioStatus::Failed(ErrorKind::NotSupported)
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
        let file = file
            .try_clone()
            .map_err(|err| Error::from_io("aio.submit", err))?;
        let buf = RawBuf { ptr, len };
        let shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name("hostio-aio".to_string())
            .spawn(move || {
                let outcome = transfer(&file, kind, offset, buf);
                shared.publish(outcome);
            })
            .map_err(|err| Error::from_io("aio.submit", err))?;
        Ok(Op {
            worker: Some(worker),
        })
    }

    pub(crate) fn poll(&mut self) -> Option<AioStatus> {
        None
    }

    pub(crate) fn waiter(&self) -> Option<Waiter> {
        None
    }

    /// A positioned transfer cannot be interrupted once started.
    pub(crate) fn cancel(&mut self, _file: &std::fs::File) -> Result<()> {
        Err(Error::new(ErrorKind::NotSupported, "aio.cancel"))
    }
}

impl Drop for Op {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("aio worker thread panicked");
            }
        }
    }
}
