use parking_lot::{Condvar, Mutex};

use crate::handle::{Class, Payload, TypeBits};
use crate::{Result, Timeout, WaitStatus};

pub static EVENT_CLASS: Class = Class::new(
    "event",
    TypeBits::from_bits_truncate(TypeBits::EVENT.bits() | TypeBits::WAITABLE.bits()),
    std::mem::size_of::<Event>(),
);

/// A signalable flag with timed wait.
///
/// A manual-reset event stays signaled until [`Event::reset`]; an auto-reset
/// event releases a single waiter and clears itself.
#[derive(Debug, Default)]
pub struct Event {
    manual_reset: bool,
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl Event {
    pub fn new(manual_reset: bool, initially_signaled: bool) -> Self {
        Self {
            manual_reset,
            signaled: Mutex::new(initially_signaled),
            condvar: Condvar::new(),
        }
    }

    pub fn set(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        if self.manual_reset {
            self.condvar.notify_all();
        } else {
            self.condvar.notify_one();
        }
    }

    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.signaled.lock()
    }
}

impl Payload for Event {
    fn class(&self) -> &'static Class {
        &EVENT_CLASS
    }

    fn wait(&self, timeout: Timeout) -> Result<WaitStatus> {
        let deadline = timeout.deadline();
        let mut signaled = self.signaled.lock();
        while !*signaled {
            match (timeout, deadline) {
                (Timeout::Infinite, _) | (_, None) => self.condvar.wait(&mut signaled),
                (_, Some(deadline)) => {
                    if self.condvar.wait_until(&mut signaled, deadline).timed_out() && !*signaled {
                        return Ok(WaitStatus::TimedOut);
                    }
                }
            }
        }
        if !self.manual_reset {
            *signaled = false;
        }
        Ok(WaitStatus::Signaled)
    }
}
