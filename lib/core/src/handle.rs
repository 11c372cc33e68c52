//! Handle/class registry.
//!
//! Every kind of object is a [`Payload`] described by one static [`Class`].
//! A [`Handle`] is either a pseudo-handle that never owns memory, or an
//! [`Object`] that owns exactly one payload and destroys it on close.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use bitflags::bitflags;
use tracing::debug;

use crate::{Error, ErrorKind, Result, Timeout, WaitStatus};

bitflags! {
    /// Class type id: one kind bit plus capability bits.
    pub struct TypeBits: u32 {
        const FILE = 1 << 0;
        const PIPE = 1 << 1;
        const LOCK = 1 << 2;
        const CONDITION = 1 << 3;
        const THREAD = 1 << 4;
        const PROCESS = 1 << 5;
        const EVENT = 1 << 6;
        const WATCH = 1 << 7;
        const TLS = 1 << 8;
        const PERF_MONITOR = 1 << 9;
        const SNAPSHOT = 1 << 10;
        const AIO_REQUEST = 1 << 11;
        const SOCKET = 1 << 12;
        const SERVER = 1 << 13;
        const FIBER = 1 << 14;
        const IO_BUFFER = 1 << 15;

        const WAITABLE = 1 << 24;
        const READABLE = 1 << 25;
        const WRITABLE = 1 << 26;

        /// Set only on pseudo-handles.
        const PSEUDO = 1 << 31;

        const KIND_MASK = 0x00ff_ffff;
        const CAPABILITY_MASK = Self::WAITABLE.bits | Self::READABLE.bits | Self::WRITABLE.bits;
    }
}

/// Immutable descriptor shared by all instances of one object kind.
///
/// Classes live in statics; the only mutable part is the live-instance
/// counter used to check that closing a handle releases its payload.
pub struct Class {
    name: &'static str,
    type_bits: TypeBits,
    payload_size: usize,
    live: AtomicUsize,
}

impl Class {
    pub const fn new(name: &'static str, type_bits: TypeBits, payload_size: usize) -> Self {
        Self {
            name,
            type_bits,
            payload_size,
            live: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_bits(&self) -> TypeBits {
        self.type_bits
    }

    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    pub fn is_waitable(&self) -> bool {
        self.type_bits.contains(TypeBits::WAITABLE)
    }

    /// Number of payloads of this class that have been created and not yet
    /// closed.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Bitmask test: every capability bit requested must be present, and if
    /// kind bits are requested at least one of them must match.
    fn matches(&self, expected: TypeBits) -> bool {
        let kind = expected & TypeBits::KIND_MASK;
        let caps = expected & TypeBits::CAPABILITY_MASK;
        if expected.contains(TypeBits::PSEUDO) {
            return false;
        }
        (kind.is_empty() || self.type_bits.intersects(kind)) && self.type_bits.contains(caps)
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("type_bits", &self.type_bits)
            .field("payload_size", &self.payload_size)
            .finish()
    }
}

/// Trait needed to get downcasting from `dyn Payload` to work.
pub trait Upcastable {
    fn upcast_any_ref(&'_ self) -> &'_ dyn Any;
    fn upcast_any_mut(&'_ mut self) -> &'_ mut dyn Any;
}

impl<T: Any + fmt::Debug + 'static> Upcastable for T {
    #[inline]
    fn upcast_any_ref(&'_ self) -> &'_ dyn Any {
        self
    }
    #[inline]
    fn upcast_any_mut(&'_ mut self) -> &'_ mut dyn Any {
        self
    }
}

/// The per-kind part of a handle. Destruction is `Drop`.
pub trait Payload: fmt::Debug + Send + Sync + Upcastable + 'static {
    fn class(&self) -> &'static Class;

    /// Block until the object is signaled. Only called when the class is
    /// [`TypeBits::WAITABLE`].
    fn wait(&self, _timeout: Timeout) -> Result<WaitStatus> {
        Err(Error::new(ErrorKind::NotWaitable, "handle.wait"))
    }
}

/// A class instance: class pointer, creation flags and the owned payload.
pub struct Object {
    class: &'static Class,
    flags: u32,
    payload: Box<dyn Payload>,
}

impl Object {
    fn new(payload: Box<dyn Payload>, flags: u32) -> Self {
        let class = payload.class();
        class.live.fetch_add(1, Ordering::AcqRel);
        debug!(class = class.name, flags, "handle created");
        Self {
            class,
            flags,
            payload,
        }
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        debug!(class = self.class.name, "handle closed");
        self.class.live.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.class.name)
            .field("flags", &self.flags)
            .field("payload", &self.payload)
            .finish()
    }
}

/// Reserved handles that never resolve to an allocated payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PseudoHandle {
    CurrentProcess,
    Stdin,
    Stdout,
    Stderr,
}

impl PseudoHandle {
    pub const fn type_bits(self) -> TypeBits {
        let bits = match self {
            PseudoHandle::CurrentProcess => TypeBits::PROCESS.bits(),
            PseudoHandle::Stdin => TypeBits::FILE.bits() | TypeBits::READABLE.bits(),
            PseudoHandle::Stdout | PseudoHandle::Stderr => {
                TypeBits::FILE.bits() | TypeBits::WRITABLE.bits()
            }
        };
        TypeBits::from_bits_truncate(bits | TypeBits::PSEUDO.bits())
    }
}

/// Opaque reference to a class instance.
#[derive(Debug)]
pub enum Handle {
    Pseudo(PseudoHandle),
    Object(Object),
}

impl Handle {
    pub fn new<P: Payload>(payload: P) -> Handle {
        Self::with_flags(payload, 0)
    }

    pub fn with_flags<P: Payload>(payload: P, flags: u32) -> Handle {
        Handle::Object(Object::new(Box::new(payload), flags))
    }

    /// Allocate a zero-initialized payload of class `P`.
    pub fn create<P: Payload + Default>(flags: u32) -> Handle {
        Self::with_flags(P::default(), flags)
    }

    pub const fn pseudo(kind: PseudoHandle) -> Handle {
        Handle::Pseudo(kind)
    }

    pub fn is_pseudo(&self) -> bool {
        matches!(self, Handle::Pseudo(_))
    }

    pub fn class(&self) -> Option<&'static Class> {
        match self {
            Handle::Pseudo(_) => None,
            Handle::Object(object) => Some(object.class),
        }
    }

    pub fn type_bits(&self) -> TypeBits {
        match self {
            Handle::Pseudo(kind) => kind.type_bits(),
            Handle::Object(object) => object.class.type_bits,
        }
    }

    pub fn flags(&self) -> u32 {
        match self {
            Handle::Pseudo(_) => 0,
            Handle::Object(object) => object.flags,
        }
    }

    /// Check the handle against a type mask. Pseudo-handles only match their
    /// own exact bits; a capability-only mask such as
    /// [`TypeBits::WAITABLE`] matches objects of any kind.
    pub fn type_check(&self, expected: TypeBits) -> Result<()> {
        let ok = match self {
            Handle::Pseudo(kind) => kind.type_bits() == expected,
            Handle::Object(object) => object.class.matches(expected),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::InvalidHandle, "handle.type_check"))
        }
    }

    /// Dispatch to the class's wait function.
    pub fn wait(&self, timeout: Timeout) -> Result<WaitStatus> {
        match self {
            Handle::Pseudo(_) => Err(Error::new(ErrorKind::NotWaitable, "handle.wait")),
            Handle::Object(object) if !object.class.is_waitable() => {
                Err(Error::new(ErrorKind::NotWaitable, "handle.wait"))
            }
            Handle::Object(object) => object.payload.wait(timeout),
        }
    }

    pub fn payload(&self) -> Result<&dyn Payload> {
        match self {
            Handle::Pseudo(_) => Err(Error::new(ErrorKind::InvalidHandle, "handle.payload")),
            Handle::Object(object) => Ok(object.payload.as_ref()),
        }
    }

    pub fn downcast_ref<P: Payload>(&self) -> Result<&P> {
        self.payload()?
            .upcast_any_ref()
            .downcast_ref::<P>()
            .ok_or_else(|| Error::new(ErrorKind::InvalidHandle, "handle.downcast"))
    }

    pub fn downcast_mut<P: Payload>(&mut self) -> Result<&mut P> {
        match self {
            Handle::Pseudo(_) => Err(Error::new(ErrorKind::InvalidHandle, "handle.downcast")),
            Handle::Object(object) => object
                .payload
                .as_mut()
                .upcast_any_mut()
                .downcast_mut::<P>()
                .ok_or_else(|| Error::new(ErrorKind::InvalidHandle, "handle.downcast")),
        }
    }

    /// Destroy the handle. A no-op for pseudo-handles.
    pub fn close(self) {
        drop(self)
    }
}
