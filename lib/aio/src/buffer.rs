/// Memory an in-flight operation reads into or writes from.
///
/// `Owned` buffers are held by the request until the caller takes them
/// back; `Raw` buffers belong to the caller, who must keep them alive and
/// untouched until the operation reaches a terminal state.
#[derive(Debug)]
pub(crate) enum AioBuffer {
    Owned(Vec<u8>),
    Raw { ptr: *mut u8, len: usize },
}

// The raw variant is only ever dereferenced by the OS while the operation is
// in flight, under the caller's validity contract.
unsafe impl Send for AioBuffer {}

impl AioBuffer {
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        match self {
            AioBuffer::Owned(vec) => vec.as_mut_ptr(),
            AioBuffer::Raw { ptr, .. } => *ptr,
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            AioBuffer::Owned(vec) => vec.len(),
            AioBuffer::Raw { len, .. } => *len,
        }
    }

    pub(crate) fn into_owned(self) -> Option<Vec<u8>> {
        match self {
            AioBuffer::Owned(vec) => Some(vec),
            AioBuffer::Raw { .. } => None,
        }
    }
}
