use std::{io, sync::Arc};

use tracing::{debug, error, warn};

use crate::device::Device;
use crate::error::{Error, Result};
use crate::memory::{Memory, Mmap};

/// Fewest mapped buffers streaming can work with
pub const MIN_BUFFERS: u32 = 2;

/// Manage mapped buffers
///
/// Buffers whose mapping failed keep their slot so indices reported by the driver still line
/// up; they are queued like the others but never read.
///
/// All buffers are unmapped and returned to the driver in the Drop impl.
pub struct Arena<D: Device> {
    handle: Arc<D>,
    bufs: Vec<Option<Mmap<D>>>,
    requested: bool,
}

impl<D: Device> Arena<D> {
    /// Returns a new buffer manager instance
    ///
    /// # Arguments
    ///
    /// * `handle` - Device the buffers are requested from
    pub fn new(handle: Arc<D>) -> Self {
        Arena {
            handle,
            bufs: Vec::new(),
            requested: false,
        }
    }

    /// Requests, queries and maps driver buffers
    ///
    /// Returns the number of buffers as reported by the driver.
    ///
    /// # Arguments
    ///
    /// * `count` - Desired number of buffers
    pub fn allocate(&mut self, count: u32) -> Result<u32> {
        let granted = self
            .handle
            .request_buffers(Memory::Mmap, count)
            .map_err(|e| {
                if e.raw_os_error() == Some(libc::EINVAL) {
                    error!("device does not support memory mapping");
                }
                Error::BufferInitFailed {
                    op: "VIDIOC_REQBUFS",
                    source: e,
                }
            })?;
        self.requested = true;

        if granted < MIN_BUFFERS {
            return Err(Error::InsufficientBuffers {
                granted,
                required: MIN_BUFFERS,
            });
        }

        for index in 0..granted {
            let desc = self
                .handle
                .query_buffer(Memory::Mmap, index)
                .map_err(Error::buffer_init("VIDIOC_QUERYBUF"))?;

            let buf = match Mmap::new(self.handle.clone(), desc.length as usize, desc.offset) {
                Ok(buf) => Some(buf),
                Err(e) => {
                    warn!(index, error = %e, "mmap failed, buffer will not be read");
                    None
                }
            };
            self.bufs.push(buf);
        }

        let mapped = self.mapped() as u32;
        if mapped < MIN_BUFFERS {
            return Err(Error::InsufficientBuffers {
                granted: mapped,
                required: MIN_BUFFERS,
            });
        }

        debug!(granted, mapped, "mapped driver buffers");
        Ok(granted)
    }

    /// Unmaps all buffers and frees them in the driver by requesting 0
    pub fn release(&mut self) -> io::Result<()> {
        // regions are unmapped as they are dropped
        self.bufs.clear();

        if self.requested {
            self.requested = false;
            self.handle.request_buffers(Memory::Mmap, 0)?;
        }
        Ok(())
    }

    /// Number of buffer slots, mapped or not
    pub fn len(&self) -> usize {
        self.bufs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bufs.is_empty()
    }

    /// Number of successfully mapped buffers
    pub fn mapped(&self) -> usize {
        self.bufs.iter().filter(|buf| buf.is_some()).count()
    }

    /// Access a single mapped buffer
    ///
    /// Returns `None` for out of range indices and for buffers that could not be mapped.
    pub fn get(&self, index: usize) -> Option<&Mmap<D>> {
        self.bufs.get(index)?.as_ref()
    }
}

impl<D: Device> Drop for Arena<D> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            // ENODEV means the device was unplugged, the kernel already dropped the buffers
            if e.raw_os_error() != Some(libc::ENODEV) {
                warn!(error = %e, "failed to free mapped buffers");
            }
        }
    }
}
