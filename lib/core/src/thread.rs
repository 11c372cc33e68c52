use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::error::io_result;
use crate::handle::{Class, Payload, TypeBits};
use crate::{Result, Timeout, WaitStatus};

pub static THREAD_CLASS: Class = Class::new(
    "thread",
    TypeBits::from_bits_truncate(TypeBits::THREAD.bits() | TypeBits::WAITABLE.bits()),
    std::mem::size_of::<Thread>(),
);

/// Exit code reported for a thread whose body panicked.
pub const PANICKED_EXIT_CODE: i32 = -1;

#[derive(Debug, Default)]
struct ExitState {
    code: Mutex<Option<i32>>,
    condvar: Condvar,
}

/// An OS thread whose handle is signaled once the body returns.
///
/// Closing the handle detaches the thread; it does not stop it.
#[derive(Debug)]
pub struct Thread {
    exit: Arc<ExitState>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl Thread {
    pub fn spawn<F>(name: &str, body: F) -> Result<Thread>
    where
        F: FnOnce() -> i32 + Send + 'static,
    {
        let exit = Arc::new(ExitState::default());
        let join = {
            let exit = exit.clone();
            io_result(
                "thread.spawn",
                std::thread::Builder::new()
                    .name(name.to_string())
                    .spawn(move || {
                        let code = panic::catch_unwind(AssertUnwindSafe(body))
                            .unwrap_or(PANICKED_EXIT_CODE);
                        *exit.code.lock() = Some(code);
                        exit.condvar.notify_all();
                    }),
            )?
        };
        debug!(name, "thread spawned");
        Ok(Thread {
            exit,
            join: Mutex::new(Some(join)),
        })
    }

    /// The body's return value, once it has finished.
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit.code.lock()
    }

    /// Block until the body returns and reap the OS thread.
    pub fn join(&self) -> i32 {
        let code = {
            let mut code = self.exit.code.lock();
            loop {
                if let Some(code) = *code {
                    break code;
                }
                self.exit.condvar.wait(&mut code);
            }
        };
        if let Some(join) = self.join.lock().take() {
            // The body already returned, so this cannot block for long and the
            // panic payload has been turned into an exit code.
            join.join().ok();
        }
        code
    }
}

impl Payload for Thread {
    fn class(&self) -> &'static Class {
        &THREAD_CLASS
    }

    fn wait(&self, timeout: Timeout) -> Result<WaitStatus> {
        let deadline = timeout.deadline();
        let mut code = self.exit.code.lock();
        while code.is_none() {
            match deadline {
                None => self.exit.condvar.wait(&mut code),
                Some(deadline) => {
                    if self.exit.condvar.wait_until(&mut code, deadline).timed_out()
                        && code.is_none()
                    {
                        return Ok(WaitStatus::TimedOut);
                    }
                }
            }
        }
        Ok(WaitStatus::Signaled)
    }
}
