//! Core of the hostio OS abstraction layer.
//!
//! This crate holds the pieces every other hostio crate builds on:
//!
//! * the shared error taxonomy ([`ErrorKind`]) and the native translation
//!   tables ([`errno`]),
//! * the handle/class registry ([`Handle`], [`Class`], [`Payload`]),
//! * the waitable [`Event`] and [`Thread`] classes,
//! * the synchronous file layer ([`fs`]) and cached metadata ([`Stat`]).

mod error;
pub mod errno;
mod event;
pub mod fs;
mod handle;
mod stat;
mod thread;
mod timeout;

pub use error::{Error, ErrorKind, Result};
pub use event::{EVENT_CLASS, Event};
pub use fs::{DirEntry, FILE_CLASS, File, OpenOptions, Share};
pub use handle::{Class, Handle, Object, Payload, PseudoHandle, TypeBits, Upcastable};
pub use stat::{FileType, Stat, Timespec};
pub use thread::{PANICKED_EXIT_CODE, THREAD_CLASS, Thread};
pub use timeout::{Timeout, WaitStatus};
