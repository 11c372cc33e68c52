use std::time::Duration;

use bitflags::bitflags;

bitflags! {
    #[derive(Default)]
    pub struct WatchFlags: u32 {
        /// Watch every directory below the root, including ones created
        /// later.
        const RECURSIVE = 1 << 0;
        /// Report structural changes only; content and attribute changes are
        /// dropped.
        const EVENTS_ONLY = 1 << 1;
    }
}

/// Settings for [`Watch::with_options`](crate::Watch::with_options).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchOptions {
    flags: WatchFlags,
    poll_interval: Duration,
    buffer_size: usize,
    force_polling: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchOptions {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
    pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

    pub fn new() -> Self {
        Self {
            flags: WatchFlags::empty(),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
            force_polling: false,
        }
    }

    pub fn flags(&mut self, flags: WatchFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// How often the polling backend rescans the tree.
    pub fn poll_interval(&mut self, interval: Duration) -> &mut Self {
        self.poll_interval = interval;
        self
    }

    /// Size of the buffer native change records are read into.
    pub fn buffer_size(&mut self, size: usize) -> &mut Self {
        self.buffer_size = size;
        self
    }

    /// Use the snapshot-polling backend even where a native one exists.
    pub fn force_polling(&mut self, force: bool) -> &mut Self {
        self.force_polling = force;
        self
    }

    pub fn get_flags(&self) -> WatchFlags {
        self.flags
    }

    pub fn get_poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn get_buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn get_force_polling(&self) -> bool {
        self.force_polling
    }

    pub fn is_recursive(&self) -> bool {
        self.flags.contains(WatchFlags::RECURSIVE)
    }
}

impl From<WatchFlags> for WatchOptions {
    fn from(flags: WatchFlags) -> Self {
        let mut options = WatchOptions::new();
        options.flags(flags);
        options
    }
}
