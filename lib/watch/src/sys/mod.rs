//! Change-notification backends.

use std::path::Path;

use hostio_core::Result;

use crate::options::WatchOptions;
use crate::watch::EventSink;

mod polling;

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        mod inotify;
        use self::inotify as native;
    } else if #[cfg(windows)] {
        mod windows;
        use self::windows as native;
    }
}

/// A running backend. Dropping it stops and joins its thread.
// The variants are only held to be dropped.
#[allow(dead_code)]
#[derive(Debug)]
pub(crate) enum Backend {
    #[cfg(any(target_os = "linux", target_os = "android", windows))]
    Native(native::Watcher),
    Polling(polling::Poller),
}

impl Backend {
    pub(crate) fn start(root: &Path, options: &WatchOptions, sink: EventSink) -> Result<Backend> {
        #[cfg(any(target_os = "linux", target_os = "android", windows))]
        if !options.get_force_polling() {
            return native::Watcher::start(root, options, sink).map(Backend::Native);
        }
        polling::Poller::start(root, options, sink).map(Backend::Polling)
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            #[cfg(any(target_os = "linux", target_os = "android", windows))]
            Backend::Native(_) => native::NAME,
            Backend::Polling(_) => "polling",
        }
    }
}
