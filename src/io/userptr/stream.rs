use std::{io, sync::Arc};

use tracing::warn;

use crate::buffer::{Descriptor, Metadata};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::io::userptr::Arena;
use crate::io::{Mode, Transport};
use crate::memory::Memory;

/// Stream of user buffers
///
/// An arena instance is used internally for buffer handling.
pub struct Stream<D: Device> {
    handle: Arc<D>,
    arena: Arena<D>,

    active: bool,
}

impl<D: Device> Stream<D> {
    /// Returns a stream for frame capturing with the default number of buffers
    ///
    /// # Arguments
    ///
    /// * `handle` - Device to capture from
    /// * `size` - Size of each buffer in bytes
    pub fn new(handle: Arc<D>, size: usize) -> Result<Self> {
        Self::with_buffers(handle, crate::io::BUFFER_COUNT, size)
    }

    /// Returns a stream for frame capturing with `count` buffers of `size` bytes
    pub fn with_buffers(handle: Arc<D>, count: u32, size: usize) -> Result<Self> {
        let mut arena = Arena::new(handle.clone());
        arena.allocate(count, size)?;

        Ok(Stream {
            handle,
            arena,
            active: false,
        })
    }

    /// Queues every buffer
    fn enqueue(&self) -> Result<()> {
        for index in 0..self.arena.len() {
            let buf = match self.arena.get(index) {
                Some(buf) => buf,
                None => break,
            };
            let desc = Descriptor {
                userptr: buf.as_ptr() as usize,
                length: buf.len() as u32,
                ..Descriptor::with_index(Memory::UserPtr, index as u32)
            };
            self.handle
                .queue(&desc)
                .map_err(Error::stream_on("VIDIOC_QBUF"))?;
        }
        Ok(())
    }

    /// Whether the driver is currently streaming
    pub fn active(&self) -> bool {
        self.active
    }
}

impl<D: Device> Drop for Stream<D> {
    fn drop(&mut self) {
        // the driver must not write into buffers the arena is about to free
        if let Err(e) = self.stop() {
            warn!(error = %e, "VIDIOC_STREAMOFF failed");
        }
    }
}

impl<D: Device> Transport for Stream<D> {
    fn mode(&self) -> Mode {
        Mode::UserPtr
    }

    fn len(&self) -> usize {
        self.arena.len()
    }

    fn start(&mut self) -> Result<()> {
        let res = self.enqueue().and_then(|()| {
            self.handle
                .stream_on()
                .map_err(Error::stream_on("VIDIOC_STREAMON"))
        });
        if let Err(e) = res {
            // STREAMOFF hands every queued buffer back, so releasing them later is safe
            if let Err(off) = self.handle.stream_off() {
                warn!(error = %off, "VIDIOC_STREAMOFF failed");
            }
            return Err(e);
        }

        self.active = true;
        Ok(())
    }

    fn stop(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }

        self.active = false;
        self.handle.stream_off()
    }

    fn acquire(&mut self, visit: &mut dyn FnMut(&[u8], &Metadata)) -> Result<()> {
        let desc = self
            .handle
            .dequeue(Memory::UserPtr)
            .map_err(|e| Error::acquire("VIDIOC_DQBUF", e))?;

        let delivered = match self.arena.find(desc.userptr, desc.length as usize) {
            Some(buf) => {
                let used = (desc.bytesused as usize).min(buf.len());
                visit(&buf[..used], &desc.meta());
                true
            }
            None => false,
        };

        self.handle
            .queue(&desc)
            .map_err(|source| Error::AcquireFatal {
                op: "VIDIOC_QBUF",
                source,
            })?;

        if !delivered {
            return Err(Error::AcquireFatal {
                op: "VIDIOC_DQBUF",
                source: io::Error::new(
                    io::ErrorKind::Other,
                    format!(
                        "driver returned unknown buffer {:#x} ({} bytes)",
                        desc.userptr, desc.length
                    ),
                ),
            });
        }
        Ok(())
    }

    fn release(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "VIDIOC_STREAMOFF failed");
        }
        if let Err(e) = self.arena.release() {
            warn!(error = %e, "failed to free user buffers");
        }
    }
}
