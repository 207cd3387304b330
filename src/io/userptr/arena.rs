use std::{io, sync::Arc};

use tracing::{debug, error, warn};

use crate::device::Device;
use crate::error::{Error, Result};
use crate::memory::{Memory, UserPtr};

/// Manage user allocated buffers
///
/// All buffers are released in the Drop impl.
pub struct Arena<D: Device> {
    handle: Arc<D>,
    bufs: Vec<UserPtr>,
    requested: bool,
}

impl<D: Device> Arena<D> {
    /// Returns a new buffer manager instance
    ///
    /// # Arguments
    ///
    /// * `handle` - Device the buffers are announced to
    pub fn new(handle: Arc<D>) -> Self {
        Arena {
            handle,
            bufs: Vec::new(),
            requested: false,
        }
    }

    /// Switches the driver to user pointer i/o and allocates `count` buffers of `size` bytes
    ///
    /// The driver reply only tells whether user pointers are supported. We always allocate the
    /// number of buffers we asked for.
    pub fn allocate(&mut self, count: u32, size: usize) -> Result<u32> {
        let granted = self
            .handle
            .request_buffers(Memory::UserPtr, count)
            .map_err(|e| {
                if e.raw_os_error() == Some(libc::EINVAL) {
                    error!("device does not support user pointer i/o");
                }
                Error::BufferInitFailed {
                    op: "VIDIOC_REQBUFS",
                    source: e,
                }
            })?;
        self.requested = true;

        if granted != count {
            debug!(count, granted, "driver reported a different buffer count");
        }

        if size == 0 {
            return Err(Error::BufferInitFailed {
                op: "malloc",
                source: io::Error::new(io::ErrorKind::InvalidInput, "frame size is zero"),
            });
        }

        self.bufs = (0..count).map(|_| UserPtr::new(size)).collect();
        debug!(count, size, "allocated user buffers");
        Ok(count)
    }

    /// Frees the buffers, after telling the driver to let go of them
    pub fn release(&mut self) -> io::Result<()> {
        let res = if self.requested {
            self.requested = false;
            self.handle.request_buffers(Memory::UserPtr, 0).map(|_| ())
        } else {
            Ok(())
        };

        self.bufs.clear();
        res
    }

    pub fn len(&self) -> usize {
        self.bufs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bufs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&UserPtr> {
        self.bufs.get(index)
    }

    /// Finds the buffer starting at `userptr` with a length of `length` bytes
    pub fn find(&self, userptr: usize, length: usize) -> Option<&UserPtr> {
        self.bufs
            .iter()
            .find(|buf| buf.as_ptr() as usize == userptr && buf.len() == length)
    }
}

impl<D: Device> Drop for Arena<D> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            if e.raw_os_error() != Some(libc::ENODEV) {
                warn!(error = %e, "failed to free user buffers");
            }
        }
    }
}
