use std::time::{Duration, Instant};

/// How long a wait may block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Block until signaled.
    Infinite,
    /// Block at most this long; a zero duration polls without blocking.
    After(Duration),
}

impl Timeout {
    /// The millisecond value that means "infinite" on the C surface.
    pub const INFINITE_MS: u32 = u32::MAX;

    pub const fn poll() -> Self {
        Timeout::After(Duration::ZERO)
    }

    pub const fn from_millis(ms: u32) -> Self {
        if ms == Self::INFINITE_MS {
            Timeout::Infinite
        } else {
            Timeout::After(Duration::from_millis(ms as u64))
        }
    }

    /// Absolute deadline, `None` when infinite.
    pub fn deadline(self) -> Option<Instant> {
        match self {
            Timeout::Infinite => None,
            Timeout::After(duration) => Instant::now().checked_add(duration),
        }
    }

    /// Milliseconds in the form native waits take them, saturating just below
    /// the infinite sentinel.
    pub fn as_millis_u32(self) -> u32 {
        match self {
            Timeout::Infinite => Self::INFINITE_MS,
            Timeout::After(duration) => {
                u32::try_from(duration.as_millis()).unwrap_or(Self::INFINITE_MS - 1)
            }
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::After(duration)
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(duration: Option<Duration>) -> Self {
        duration.map_or(Timeout::Infinite, Timeout::After)
    }
}

/// Outcome of a successful wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WaitStatus {
    Signaled,
    TimedOut,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_sentinel() {
        assert_eq!(Timeout::from_millis(u32::MAX), Timeout::Infinite);
        assert_eq!(Timeout::from_millis(0), Timeout::poll());
        assert_eq!(Timeout::from_millis(15).as_millis_u32(), 15);
        assert_eq!(Timeout::Infinite.deadline(), None);
    }
}
