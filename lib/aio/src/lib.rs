//! Asynchronous file I/O requests.
//!
//! An [`AioRequest`] is bound to a file opened for asynchronous access and
//! carries at most one read or write at a time. Completion is observed with
//! the non-blocking [`AioRequest::status`] or by waiting on the request's
//! handle:
//!
//! ```no_run
//! use hostio_aio::{AioRequest, AioStatus};
//! use hostio_core::{Handle, OpenOptions, Timeout};
//!
//! # fn main() -> hostio_core::Result<()> {
//! let file = OpenOptions::new().read(true).asynchronous(true).open("data.bin")?;
//! let request = AioRequest::open(&file)?;
//! request.read(0, vec![0; 4096])?;
//! let handle = Handle::new(request);
//! handle.wait(Timeout::Infinite)?;
//! let request = handle.downcast_ref::<AioRequest>()?;
//! if let AioStatus::Completed(n) = request.status() {
//!     println!("read {n} bytes");
//! }
//! # Ok(())
//! # }
//! ```

mod buffer;
mod request;
mod sys;

pub use request::{AIO_REQUEST_CLASS, AioRequest, AioStatus};
