use std::{
    convert::TryFrom,
    fmt, io,
    ops::{Deref, DerefMut},
    ptr::NonNull,
    slice,
    sync::Arc,
};

use tracing::warn;

use crate::device::Device;

/// Memory used for buffer exchange
#[allow(clippy::unreadable_literal)]
#[rustfmt::skip]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Memory {
    Mmap        = 1,
    UserPtr     = 2,
}

impl TryFrom<u32> for Memory {
    type Error = ();

    fn try_from(repr: u32) -> Result<Self, Self::Error> {
        match repr {
            1 => Ok(Memory::Mmap),
            2 => Ok(Memory::UserPtr),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Memory::Mmap => write!(f, "memory-mapped"),
            Memory::UserPtr => write!(f, "user pointer"),
        }
    }
}

/// Memory-mapped region
///
/// The backing memory is owned by the driver and mapped into our address space so frames can be
/// read without copying. The region may only be read while the buffer is dequeued.
///
/// The destructor automatically unmaps the memory.
pub struct Mmap<D: Device> {
    handle: Arc<D>,
    ptr: NonNull<u8>,
    len: usize,
}

impl<D: Device> Mmap<D> {
    /// Maps the driver buffer found at `offset`
    ///
    /// # Arguments
    ///
    /// * `handle` - Device the buffer belongs to
    /// * `length` - Buffer length as reported by `VIDIOC_QUERYBUF`
    /// * `offset` - Buffer offset as reported by `VIDIOC_QUERYBUF`
    pub fn new(handle: Arc<D>, length: usize, offset: u32) -> io::Result<Self> {
        let ptr = handle.map(length, offset)?;
        Ok(Mmap {
            handle,
            ptr,
            len: length,
        })
    }
}

impl<D: Device> Drop for Mmap<D> {
    fn drop(&mut self) {
        if let Err(e) = unsafe { self.handle.unmap(self.ptr, self.len) } {
            warn!(error = %e, len = self.len, "munmap failed");
        }
    }
}

impl<D: Device> Deref for Mmap<D> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

/// Userspace memory
///
/// This memory type can be used to directly make the camera hardware write its data into the
/// user-provided buffer (which lives in userspace).
pub struct UserPtr(pub Vec<u8>);

impl UserPtr {
    /// Allocates a zeroed buffer of `len` bytes
    pub fn new(len: usize) -> Self {
        UserPtr(vec![0u8; len])
    }
}

impl Deref for UserPtr {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for UserPtr {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
