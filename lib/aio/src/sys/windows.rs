use std::fmt;
use std::io;
use std::os::windows::io::AsRawHandle;
use std::sync::Arc;

use hostio_core::errno::win32_to_kind;
use hostio_core::{Error, ErrorKind, Result, Timeout};
use windows_sys::Win32::Foundation::{
    CloseHandle, ERROR_HANDLE_EOF, ERROR_IO_INCOMPLETE, ERROR_IO_PENDING, ERROR_NOT_FOUND,
    ERROR_OPERATION_ABORTED, FALSE, GetLastError, HANDLE, TRUE, WAIT_FAILED,
};
use windows_sys::Win32::Storage::FileSystem::{ReadFile, WriteFile};
use windows_sys::Win32::System::IO::{CancelIoEx, GetOverlappedResult, OVERLAPPED};
use windows_sys::Win32::System::Threading::{CreateEventW, WaitForSingleObject};

use crate::request::{AioStatus, OpKind, Shared};

/// An overlapped `ReadFile`/`WriteFile` with its own manual-reset event.
pub(crate) struct Op {
    file: HANDLE,
    event: HANDLE,
    overlapped: Box<OVERLAPPED>,
    settled: Option<AioStatus>,
}

// The raw handles are owned by this op (the event) or outlive it (the file).
unsafe impl Send for Op {}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Op")
            .field("event", &self.event)
            .field("settled", &self.settled)
            .finish()
    }
}

/// The op's completion event, waited on with the request lock released.
pub(crate) struct Waiter(HANDLE);

impl Waiter {
    pub(crate) fn wait(&self, timeout: Timeout) -> Result<()> {
        // WAIT_OBJECT_0 and WAIT_TIMEOUT both send the caller back to poll.
        let rc = unsafe { WaitForSingleObject(self.0, timeout.as_millis_u32()) };
        if rc == WAIT_FAILED {
            return Err(Error::last_os_error("aio.wait"));
        }
        Ok(())
    }
}

fn win32_error(context: &'static str, code: u32) -> Error {
    Error::from_io(context, io::Error::from_raw_os_error(code as i32))
}

impl Op {
    pub(crate) fn submit(
        file: &std::fs::File,
        kind: OpKind,
        offset: u64,
        ptr: *mut u8,
        len: usize,
        _shared: &Arc<Shared>,
    ) -> Result<Op> {
        let len =
            u32::try_from(len).map_err(|_| Error::new(ErrorKind::OutOfRange, "aio.submit"))?;
        let file = file.as_raw_handle() as HANDLE;

        let event = unsafe { CreateEventW(std::ptr::null(), TRUE, FALSE, std::ptr::null()) };
        if event.is_null() {
            return Err(Error::last_os_error("aio.submit"));
        }
        let mut overlapped: Box<OVERLAPPED> = Box::new(unsafe { std::mem::zeroed() });
        overlapped.Anonymous.Anonymous.Offset = offset as u32;
        overlapped.Anonymous.Anonymous.OffsetHigh = (offset >> 32) as u32;
        overlapped.hEvent = event;

        let mut op = Op {
            file,
            event,
            overlapped,
            settled: None,
        };
        let overlapped: *mut OVERLAPPED = &mut *op.overlapped;
        let ok = match kind {
            OpKind::Read => unsafe { ReadFile(file, ptr, len, std::ptr::null_mut(), overlapped) },
            OpKind::Write => unsafe { WriteFile(file, ptr, len, std::ptr::null_mut(), overlapped) },
        };
        if ok == FALSE {
            match unsafe { GetLastError() } {
                ERROR_IO_PENDING => {}
                ERROR_HANDLE_EOF => op.settled = Some(AioStatus::Completed(0)),
                code => {
                    // Nothing was queued, so there is nothing to drain.
                    op.settled = Some(AioStatus::Failed(win32_to_kind(code)));
                    return Err(win32_error(
                        match kind {
                            OpKind::Read => "aio.read",
                            OpKind::Write => "aio.write",
                        },
                        code,
                    ));
                }
            }
        }
        // A synchronous success still signals the event and fills the
        // overlapped result, so it goes through the same poll path.
        Ok(op)
    }

    pub(crate) fn poll(&mut self) -> Option<AioStatus> {
        if let Some(outcome) = self.settled {
            return Some(outcome);
        }
        let mut transferred = 0u32;
        let ok = unsafe {
            GetOverlappedResult(self.file, &*self.overlapped, &mut transferred, FALSE)
        };
        let outcome = if ok != FALSE {
            AioStatus::Completed(transferred as usize)
        } else {
            match unsafe { GetLastError() } {
                ERROR_IO_INCOMPLETE => return None,
                ERROR_OPERATION_ABORTED => AioStatus::Canceled,
                ERROR_HANDLE_EOF => AioStatus::Completed(0),
                code => AioStatus::Failed(win32_to_kind(code)),
            }
        };
        self.settled = Some(outcome);
        Some(outcome)
    }

    pub(crate) fn waiter(&self) -> Option<Waiter> {
        match self.settled {
            Some(_) => None,
            None => Some(Waiter(self.event)),
        }
    }

    pub(crate) fn cancel(&mut self, _file: &std::fs::File) -> Result<()> {
        if unsafe { CancelIoEx(self.file, &*self.overlapped) } == FALSE {
            let code = unsafe { GetLastError() };
            // Already finished.
            if code != ERROR_NOT_FOUND {
                return Err(win32_error("aio.cancel", code));
            }
        }
        Ok(())
    }
}

impl Drop for Op {
    fn drop(&mut self) {
        if self.settled.is_none() {
            // The kernel still owns the OVERLAPPED and the buffer.
            let mut transferred = 0u32;
            unsafe {
                CancelIoEx(self.file, &*self.overlapped);
                GetOverlappedResult(self.file, &*self.overlapped, &mut transferred, TRUE);
            }
        }
        unsafe { CloseHandle(self.event) };
    }
}
