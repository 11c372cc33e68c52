use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hostio_core::{
    Class, ErrorKind, Event, File, Handle, Payload, THREAD_CLASS, Thread, Timeout, TypeBits,
    WaitStatus,
};

static COUNTED_CLASS: Class = Class::new(
    "counted",
    TypeBits::from_bits_truncate(TypeBits::IO_BUFFER.bits()),
    std::mem::size_of::<Counted>(),
);

#[derive(Debug)]
struct Counted {
    drops: Arc<AtomicUsize>,
}

impl Payload for Counted {
    fn class(&self) -> &'static Class {
        &COUNTED_CLASS
    }
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn close_releases_payload_exactly_once() {
    let drops = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..16)
        .map(|_| {
            Handle::new(Counted {
                drops: drops.clone(),
            })
        })
        .collect();
    assert_eq!(COUNTED_CLASS.live(), 16);

    for handle in handles {
        handle.close();
    }
    assert_eq!(COUNTED_CLASS.live(), 0);
    assert_eq!(drops.load(Ordering::SeqCst), 16);
}

#[test]
fn non_waitable_classes_refuse_wait() {
    let file = Handle::new(File::null());
    for timeout in [Timeout::poll(), Timeout::from_millis(5), Timeout::Infinite] {
        assert_eq!(file.wait(timeout).unwrap_err().kind(), ErrorKind::NotWaitable);
    }
    assert!(file.type_check(TypeBits::WAITABLE).is_err());
    file.type_check(TypeBits::FILE | TypeBits::READABLE).unwrap();
}

#[test]
fn generic_wait_dispatches_per_class() {
    let event = Handle::new(Event::new(true, true));
    let thread = Handle::new(Thread::spawn("quick", || 0).unwrap());
    let before = THREAD_CLASS.live();
    assert!(before >= 1);

    for handle in [&event, &thread] {
        handle.type_check(TypeBits::WAITABLE).unwrap();
        assert_eq!(handle.wait(Timeout::Infinite).unwrap(), WaitStatus::Signaled);
    }
    thread.close();
    assert_eq!(THREAD_CLASS.live(), before - 1);
}

#[test]
fn mutable_downcast_reaches_the_payload() {
    let mut event = Handle::new(Event::new(true, false));
    assert!(event.downcast_ref::<Event>().is_ok());
    event.downcast_mut::<Event>().unwrap().set();
    assert!(event.downcast_ref::<Event>().unwrap().is_set());
    assert_eq!(
        event.downcast_mut::<File>().unwrap_err().kind(),
        ErrorKind::InvalidHandle
    );

    let mut stdout = Handle::pseudo(hostio_core::PseudoHandle::Stdout);
    assert_eq!(
        stdout.downcast_mut::<Event>().unwrap_err().kind(),
        ErrorKind::InvalidHandle
    );
}

#[test]
#[tracing_test::traced_test]
fn object_lifetime_is_logged_at_debug() {
    let drops = Arc::new(AtomicUsize::new(0));
    let handle = Handle::new(Counted {
        drops: drops.clone(),
    });
    handle.close();
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    logs_assert(|lines: &[&str]| {
        for message in ["handle created", "handle closed"] {
            let found = lines.iter().any(|line| {
                line.contains(message) && line.contains("DEBUG") && line.contains("counted")
            });
            if !found {
                return Err(format!("no DEBUG line for {message:?}"));
            }
        }
        Ok(())
    });
}
