use bitflags::bitflags;
use std::{fmt, mem};

use crate::memory::Memory;
use crate::v4l2::videodev::{v4l2_buffer, V4L2_BUF_TYPE_VIDEO_CAPTURE};
use crate::Timestamp;

bitflags! {
    #[allow(clippy::unreadable_literal)]
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u32 {
        /// Buffer is mapped
        const MAPPED                = 0x00000001;
        /// Buffer is queued for processing
        const QUEUED                = 0x00000002;
        /// Buffer is ready
        const DONE                  = 0x00000004;
        /// Image is a keyframe (I-frame)
        const KEYFRAME              = 0x00000008;
        /// Image is a P-frame
        const PFRAME                = 0x00000010;
        /// Image is a B-frame
        const BFRAME                = 0x00000020;
        /// Buffer is ready, but the data contained within is corrupted
        const ERROR                 = 0x00000040;
        /// Timecode field is valid
        const TIMECODE              = 0x00000100;
        /// Timestamp type
        const TIMESTAMP_MASK        = 0x0000e000;
        const TIMESTAMP_MONOTONIC   = 0x00002000;
        const TIMESTAMP_COPY        = 0x00004000;
        /// Timestamp sources
        const TSTAMP_SRC_MASK       = 0x00070000;
        const TSTAMP_SRC_SOE        = 0x00010000;
    }
}

impl From<u32> for Flags {
    fn from(flags: u32) -> Flags {
        Flags::from_bits_retain(flags)
    }
}

impl From<Flags> for u32 {
    fn from(flags: Flags) -> Self {
        flags.bits()
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Buffer metadata, mostly used not to convolute the main buffer structs
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Number of bytes occupied by the data in the buffer
    pub bytesused: u32,
    /// Buffer flags
    pub flags: Flags,
    /// Time of capture (usually set by the driver)
    pub timestamp: Timestamp,
    /// Sequence number, counting the frames
    pub sequence: u32,
}

/// Describes one driver buffer as exchanged through `VIDIOC_QUERYBUF`, `VIDIOC_QBUF` and
/// `VIDIOC_DQBUF`.
///
/// Only one of `offset` and `userptr` is meaningful, depending on `memory`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub index: u32,
    pub memory: Memory,
    pub bytesused: u32,
    pub flags: Flags,
    pub field: u32,
    pub timestamp: Timestamp,
    pub sequence: u32,
    /// Offset to pass to mmap(2), set by the driver for [`Memory::Mmap`]
    pub offset: u32,
    /// Address of the user buffer for [`Memory::UserPtr`]
    pub userptr: usize,
    /// Size of the buffer (not the payload) in bytes
    pub length: u32,
}

impl Descriptor {
    /// Returns an empty descriptor, e.g. to be filled by `VIDIOC_DQBUF`
    pub fn new(memory: Memory) -> Self {
        Self::with_index(memory, 0)
    }

    /// Returns a descriptor addressing the buffer at `index`
    pub fn with_index(memory: Memory, index: u32) -> Self {
        Descriptor {
            index,
            memory,
            bytesused: 0,
            flags: Flags::empty(),
            field: 0,
            timestamp: Timestamp::default(),
            sequence: 0,
            offset: 0,
            userptr: 0,
            length: 0,
        }
    }

    /// Metadata as reported by the driver on dequeue
    pub fn meta(&self) -> Metadata {
        Metadata {
            bytesused: self.bytesused,
            flags: self.flags,
            timestamp: self.timestamp,
            sequence: self.sequence,
        }
    }
}

impl From<&Descriptor> for v4l2_buffer {
    fn from(desc: &Descriptor) -> Self {
        let mut buf: v4l2_buffer = unsafe { mem::zeroed() };
        buf.index = desc.index;
        buf.type_ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        buf.memory = desc.memory as u32;
        buf.bytesused = desc.bytesused;
        buf.flags = desc.flags.into();
        buf.field = desc.field;
        buf.length = desc.length;
        match desc.memory {
            Memory::Mmap => buf.m.offset = desc.offset,
            Memory::UserPtr => buf.m.userptr = desc.userptr as std::os::raw::c_ulong,
        }
        buf
    }
}

impl From<&v4l2_buffer> for Descriptor {
    fn from(buf: &v4l2_buffer) -> Self {
        let memory = Memory::try_from(buf.memory).unwrap_or(Memory::Mmap);
        let mut desc = Descriptor {
            bytesused: buf.bytesused,
            flags: buf.flags.into(),
            field: buf.field,
            timestamp: buf.timestamp.into(),
            sequence: buf.sequence,
            length: buf.length,
            ..Descriptor::with_index(memory, buf.index)
        };
        unsafe {
            match memory {
                Memory::Mmap => desc.offset = buf.m.offset,
                Memory::UserPtr => desc.userptr = buf.m.userptr as usize,
            }
        }
        desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn userptr_descriptor_survives_the_raw_struct() {
        let desc = Descriptor {
            userptr: 0xdead_b000,
            length: 614_400,
            ..Descriptor::with_index(Memory::UserPtr, 3)
        };

        let raw = v4l2_buffer::from(&desc);
        assert_eq!(raw.type_, V4L2_BUF_TYPE_VIDEO_CAPTURE);
        assert_eq!(raw.memory, 2);

        assert_eq!(Descriptor::from(&raw), desc);
    }

    #[test]
    fn mmap_descriptor_carries_the_offset() {
        let mut raw = v4l2_buffer::from(&Descriptor::with_index(Memory::Mmap, 1));
        raw.m.offset = 4096;
        raw.bytesused = 100;
        raw.sequence = 7;

        let desc = Descriptor::from(&raw);
        assert_eq!(desc.offset, 4096);
        assert_eq!(desc.meta().bytesused, 100);
        assert_eq!(desc.meta().sequence, 7);
    }
}
