use std::{io, sync::Arc};

use tracing::{debug, trace};

use crate::buffer::Metadata;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::io::{Mode, Transport};

/// Frames read(2) into a single host buffer
///
/// No driver buffers are involved, so starting and stopping are no-ops.
pub struct Stream<D: Device> {
    handle: Arc<D>,
    buf: Vec<u8>,
}

impl<D: Device> Stream<D> {
    /// Allocates the frame buffer
    ///
    /// # Arguments
    ///
    /// * `handle` - Device to read from
    /// * `size` - Frame size in bytes of the negotiated format
    pub fn new(handle: Arc<D>, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::BufferInitFailed {
                op: "malloc",
                source: io::Error::new(io::ErrorKind::InvalidInput, "frame size is zero"),
            });
        }

        debug!(size, "allocated read buffer");
        Ok(Stream {
            handle,
            buf: vec![0u8; size],
        })
    }
}

impl<D: Device> Transport for Stream<D> {
    fn mode(&self) -> Mode {
        Mode::Read
    }

    fn len(&self) -> usize {
        if self.buf.is_empty() {
            0
        } else {
            1
        }
    }

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn acquire(&mut self, visit: &mut dyn FnMut(&[u8], &Metadata)) -> Result<()> {
        let n = self
            .handle
            .read(&mut self.buf)
            .map_err(|e| Error::acquire("read", e))?;
        if n < self.buf.len() {
            // short reads are passed on as complete frames
            trace!(read = n, expected = self.buf.len(), "short read");
        }

        let meta = Metadata {
            bytesused: n as u32,
            ..Metadata::default()
        };
        visit(&self.buf, &meta);
        Ok(())
    }

    fn release(&mut self) {
        self.buf = Vec::new();
    }
}
