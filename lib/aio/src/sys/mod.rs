//! Native completion backends.
//!
//! Each backend provides an `Op` that owns one in-flight native operation.
//! `Op::waiter` hands out something the request can block on with its lock
//! released, when the backend has one.

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "macos", target_os = "freebsd"))] {
        mod posix;
        pub(crate) use self::posix::Op;
    } else if #[cfg(windows)] {
        mod windows;
        pub(crate) use self::windows::Op;
    } else {
        mod fallback;
        pub(crate) use self::fallback::Op;
    }
}
