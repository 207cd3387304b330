//! Transport strategies moving frame data from the driver to the caller
//!
//! Each [`Mode`] has its own stream type which owns the buffers for that mode:
//!
//! * [`read::Stream`] copies frames into one host buffer with read(2)
//! * [`mmap::Stream`] maps driver buffers into our address space
//! * [`userptr::Stream`] lets the driver fill buffers we allocated ourselves
//!
//! The session only talks to them through the [`Transport`] trait.

pub mod mmap;
pub mod read;
pub mod userptr;

use std::{fmt, io, str, sync::Arc};

use crate::buffer::Metadata;
use crate::device::Device;
use crate::error::Result;
use crate::format::Format;

/// Number of buffers requested from the driver in the streaming modes
pub const BUFFER_COUNT: u32 = 4;

/// Buffer ownership strategy
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// read(2) into a single host buffer
    #[default]
    Read,
    /// driver buffers mapped into our address space
    Mmap,
    /// host buffers handed to the driver by address
    UserPtr,
}

impl Mode {
    /// Canonical configuration name, e.g. `IO_METHOD_MMAP`
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Read => "IO_METHOD_READ",
            Mode::Mmap => "IO_METHOD_MMAP",
            Mode::UserPtr => "IO_METHOD_USERPTR",
        }
    }

    /// Whether the mode needs the driver's streaming interface
    pub fn streaming(&self) -> bool {
        !matches!(self, Mode::Read)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Read => write!(f, "read"),
            Mode::Mmap => write!(f, "memory-mapped"),
            Mode::UserPtr => write!(f, "user pointer"),
        }
    }
}

impl str::FromStr for Mode {
    type Err = String;

    /// Parses the configuration names, ignoring case
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IO_METHOD_READ" => Ok(Mode::Read),
            "IO_METHOD_MMAP" => Ok(Mode::Mmap),
            "IO_METHOD_USERPTR" => Ok(Mode::UserPtr),
            _ => Err(format!("unknown i/o method: {:?}", s)),
        }
    }
}

/// Per-mode buffer setup, frame acquisition and teardown
///
/// Implementations own their buffers. Dropping a transport releases everything it holds, so a
/// failed connect never leaks driver buffers or mappings; [`Transport::release`] does the same
/// explicitly so teardown happens in a defined order.
pub trait Transport {
    /// Mode this transport implements
    fn mode(&self) -> Mode;

    /// Number of live buffers
    fn len(&self) -> usize;

    /// Whether no buffers are allocated
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queues all buffers and starts streaming
    fn start(&mut self) -> Result<()>;

    /// Stops streaming
    ///
    /// Buffers stay allocated so streaming can be started again.
    fn stop(&mut self) -> io::Result<()>;

    /// Fetches one frame and passes it to `visit`
    ///
    /// In the streaming modes the buffer is handed back to the driver after `visit` returns, so
    /// the frame data must not be retained.
    fn acquire(&mut self, visit: &mut dyn FnMut(&[u8], &Metadata)) -> Result<()>;

    /// Stops streaming if needed and frees all buffers
    fn release(&mut self);
}

/// Sets up the transport for `mode` on an opened and configured device
///
/// # Arguments
///
/// * `mode` - Buffer ownership strategy
/// * `handle` - Device the buffers belong to
/// * `format` - Negotiated format, determines the size of host allocated buffers
pub fn init<D: Device + 'static>(
    mode: Mode,
    handle: Arc<D>,
    format: &Format,
) -> Result<Box<dyn Transport>> {
    let size = format.frame_size();
    Ok(match mode {
        Mode::Read => Box::new(read::Stream::new(handle, size)?),
        Mode::Mmap => Box::new(mmap::Stream::with_buffers(handle, BUFFER_COUNT)?),
        Mode::UserPtr => Box::new(userptr::Stream::with_buffers(handle, BUFFER_COUNT, size)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_names_parse_back() {
        for mode in [Mode::Read, Mode::Mmap, Mode::UserPtr] {
            assert_eq!(mode.name().parse::<Mode>(), Ok(mode));
        }
    }

    #[test]
    fn mode_parsing_ignores_case() {
        assert_eq!("io_method_mmap".parse::<Mode>(), Ok(Mode::Mmap));
        assert_eq!("IO_Method_UserPtr".parse::<Mode>(), Ok(Mode::UserPtr));
        assert!("IO_METHOD_DMABUF".parse::<Mode>().is_err());
    }

    #[test]
    fn mode_parsing_requires_the_full_name() {
        assert!("mmap".parse::<Mode>().is_err());
        assert!("userptr".parse::<Mode>().is_err());
        assert!("read".parse::<Mode>().is_err());
    }
}
