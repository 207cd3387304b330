//! Simulated capture device
//!
//! Implements [`Device`] and [`Open`] on top of shared state, so tests can script the driver's
//! behavior and inspect every call the capture code made.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::{Arc, Mutex, MutexGuard};
use std::{io, time::Duration};

use v4l_capture::buffer::{Descriptor, Flags};
use v4l_capture::device::Rect;
use v4l_capture::memory::Memory;
use v4l_capture::{Capabilities, CapabilityFlags, Device, FieldOrder, Format, FourCC, Open};

/// Distance between the mmap offsets the fake driver hands out
pub const OFFSET_STEP: u32 = 0x1000;

/// Outcome of the next wait for readability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Ready,
    Timeout,
    Fail(i32),
}

#[derive(Debug)]
pub struct State {
    pub exists: bool,
    pub caps: Capabilities,
    pub crop: io::Result<Rect>,

    /// Format currently in effect
    pub format: Format,
    /// Size the driver falls back to on `VIDIOC_S_FMT`
    pub adjust: Option<(u32, u32)>,
    pub set_format_calls: usize,

    /// Buffer count granted on `VIDIOC_REQBUFS`, the requested count if `None`
    pub grant: Option<u32>,
    /// Buffers currently allocated in the driver
    pub buffers: u32,
    pub buffer_len: u32,
    /// Buffer indices whose mapping fails
    pub fail_map: Vec<u32>,
    /// addr -> (offset, len)
    pub mappings: HashMap<usize, (u32, usize)>,

    pub incoming: VecDeque<Descriptor>,
    pub streaming: bool,
    pub queued: usize,
    pub dequeued: usize,
    /// Buffers queued while already queued
    pub double_queued: usize,
    pub sequence: u32,

    /// errno returned by `VIDIOC_QBUF` for this buffer index
    pub fail_queue: Option<(u32, i32)>,
    /// errno returned by `VIDIOC_STREAMON`
    pub fail_stream_on: Option<i32>,
    /// errno returned by `VIDIOC_STREAMOFF`; the driver still stops
    pub fail_stream_off: Option<i32>,
    /// errno returned by `VIDIOC_S_CROP`
    pub fail_set_crop: Option<i32>,
    /// errno returned by close(2); the descriptor is gone either way
    pub fail_close: Option<i32>,
    /// Regions unmapped while their buffer was still queued
    pub unmapped_while_queued: usize,

    pub waits: VecDeque<Wait>,
    /// Number of upcoming dequeue/read calls failing with `EAGAIN`
    pub eagain: usize,
    pub short_read: Option<usize>,
    pub reads: usize,
    pub fill: u8,

    pub opened: usize,
    pub closed: bool,
    /// Every kernel call in order
    pub log: Vec<String>,
}

impl Default for State {
    fn default() -> Self {
        let format = Format {
            field_order: FieldOrder::Progressive,
            stride: 1280,
            size: 614_400,
            ..Format::new(640, 480, FourCC::YUYV)
        };

        State {
            exists: true,
            caps: Capabilities::new(
                CapabilityFlags::VIDEO_CAPTURE
                    | CapabilityFlags::READ_WRITE
                    | CapabilityFlags::STREAMING,
            ),
            crop: Err(io::Error::from_raw_os_error(libc::EINVAL)),
            format,
            adjust: None,
            set_format_calls: 0,
            grant: None,
            buffers: 0,
            buffer_len: 614_400,
            fail_map: Vec::new(),
            mappings: HashMap::new(),
            incoming: VecDeque::new(),
            streaming: false,
            queued: 0,
            dequeued: 0,
            double_queued: 0,
            sequence: 0,
            fail_queue: None,
            fail_stream_on: None,
            fail_stream_off: None,
            fail_set_crop: None,
            fail_close: None,
            unmapped_while_queued: 0,
            waits: VecDeque::new(),
            eagain: 0,
            short_read: None,
            reads: 0,
            fill: 0xa5,
            opened: 0,
            closed: false,
            log: Vec::new(),
        }
    }
}

impl State {
    /// Position of the first log entry starting with `prefix`
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.log.iter().position(|entry| entry.starts_with(prefix))
    }
}

fn errno(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

/// Opens [`FakeDevice`]s sharing one [`State`]
#[derive(Debug, Clone, Default)]
pub struct FakeSystem {
    pub state: Arc<Mutex<State>>,
}

impl FakeSystem {
    pub fn new(state: State) -> Self {
        FakeSystem {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

impl Open for FakeSystem {
    type Device = FakeDevice;

    fn check(&self, path: &Path) -> io::Result<()> {
        if self.state().exists {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            ))
        }
    }

    fn open(&self, _path: &Path) -> io::Result<FakeDevice> {
        let mut state = self.state();
        state.opened += 1;
        state.closed = false;
        Ok(FakeDevice {
            state: self.state.clone(),
        })
    }
}

#[derive(Debug)]
pub struct FakeDevice {
    state: Arc<Mutex<State>>,
}

impl FakeDevice {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
        }
    }
}

impl Device for FakeDevice {
    fn query_caps(&self) -> io::Result<Capabilities> {
        let mut state = self.state();
        state.log.push("QUERYCAP".into());
        Ok(state.caps.clone())
    }

    fn crop_default(&self) -> io::Result<Rect> {
        let state = self.state();
        match &state.crop {
            Ok(rect) => Ok(*rect),
            Err(e) => Err(errno(e.raw_os_error().unwrap_or(libc::EIO))),
        }
    }

    fn set_crop(&self, _rect: Rect) -> io::Result<()> {
        let mut state = self.state();
        state.log.push("S_CROP".into());
        match state.fail_set_crop {
            Some(code) => Err(errno(code)),
            None => Ok(()),
        }
    }

    fn format(&self) -> io::Result<Format> {
        Ok(self.state().format)
    }

    fn set_format(&self, fmt: &Format) -> io::Result<Format> {
        let mut state = self.state();
        state.set_format_calls += 1;

        let mut actual = *fmt;
        if let Some((width, height)) = state.adjust {
            actual.width = width;
            actual.height = height;
        }
        actual.stride = actual.width * 2;
        actual.size = actual.stride * actual.height;
        state.format = actual;
        state.log.push("S_FMT".into());
        Ok(actual)
    }

    fn request_buffers(&self, memory: Memory, count: u32) -> io::Result<u32> {
        let mut state = self.state();
        state.log.push(format!("REQBUFS({})", count));
        if state.streaming {
            return Err(errno(libc::EBUSY));
        }
        if count == 0 {
            state.buffers = 0;
            state.incoming.clear();
            return Ok(0);
        }

        if memory == Memory::Mmap && !state.mappings.is_empty() {
            return Err(errno(libc::EBUSY));
        }

        let granted = state.grant.unwrap_or(count);
        state.buffers = granted;
        Ok(granted)
    }

    fn query_buffer(&self, memory: Memory, index: u32) -> io::Result<Descriptor> {
        let state = self.state();
        if index >= state.buffers {
            return Err(errno(libc::EINVAL));
        }
        Ok(Descriptor {
            offset: index * OFFSET_STEP,
            length: state.buffer_len,
            ..Descriptor::with_index(memory, index)
        })
    }

    fn queue(&self, desc: &Descriptor) -> io::Result<()> {
        let mut state = self.state();
        if desc.index >= state.buffers {
            return Err(errno(libc::EINVAL));
        }
        if let Some((index, code)) = state.fail_queue {
            if index == desc.index {
                return Err(errno(code));
            }
        }
        if state.incoming.iter().any(|queued| queued.index == desc.index) {
            state.double_queued += 1;
        }
        state.queued += 1;
        state.incoming.push_back(*desc);
        Ok(())
    }

    fn dequeue(&self, memory: Memory) -> io::Result<Descriptor> {
        let mut state = self.state();
        if state.eagain > 0 {
            state.eagain -= 1;
            return Err(errno(libc::EAGAIN));
        }
        if !state.streaming {
            return Err(errno(libc::EINVAL));
        }
        let mut desc = match state.incoming.pop_front() {
            Some(desc) => desc,
            None => return Err(errno(libc::EAGAIN)),
        };
        assert_eq!(desc.memory, memory);

        state.sequence += 1;
        state.dequeued += 1;
        desc.sequence = state.sequence;
        desc.flags = Flags::DONE;
        match memory {
            Memory::Mmap => {
                desc.bytesused = state.buffer_len;
                let offset = desc.index * OFFSET_STEP;
                let fill = state.fill;
                for (addr, (off, len)) in state.mappings.iter() {
                    if *off == offset {
                        unsafe { ptr::write_bytes(*addr as *mut u8, fill, *len) };
                    }
                }
            }
            Memory::UserPtr => desc.bytesused = desc.length,
        }
        Ok(desc)
    }

    fn stream_on(&self) -> io::Result<()> {
        let mut state = self.state();
        state.log.push("STREAMON".into());
        if let Some(code) = state.fail_stream_on {
            return Err(errno(code));
        }
        state.streaming = true;
        Ok(())
    }

    fn stream_off(&self) -> io::Result<()> {
        let mut state = self.state();
        state.log.push("STREAMOFF".into());
        state.streaming = false;
        state.incoming.clear();
        match state.fail_stream_off {
            Some(code) => Err(errno(code)),
            None => Ok(()),
        }
    }

    fn map(&self, length: usize, offset: u32) -> io::Result<NonNull<u8>> {
        let mut state = self.state();
        if state.fail_map.contains(&(offset / OFFSET_STEP)) {
            return Err(errno(libc::ENOMEM));
        }

        let region = Box::into_raw(vec![0u8; length].into_boxed_slice()) as *mut u8;
        state.mappings.insert(region as usize, (offset, length));
        state.log.push(format!("MMAP({:#x})", offset));
        NonNull::new(region).ok_or_else(|| errno(libc::ENOMEM))
    }

    unsafe fn unmap(&self, ptr: NonNull<u8>, length: usize) -> io::Result<()> {
        let mut state = self.state();
        match state.mappings.remove(&(ptr.as_ptr() as usize)) {
            Some((offset, len)) if len == length => {
                let index = offset / OFFSET_STEP;
                if state.incoming.iter().any(|queued| queued.index == index) {
                    state.unmapped_while_queued += 1;
                }
                drop(Box::from_raw(ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len)));
                state.log.push(format!("MUNMAP({:#x})", offset));
                Ok(())
            }
            _ => Err(errno(libc::EINVAL)),
        }
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        if state.eagain > 0 {
            state.eagain -= 1;
            return Err(errno(libc::EAGAIN));
        }

        let n = state.short_read.unwrap_or(buf.len()).min(buf.len());
        buf[..n].fill(state.fill);
        state.reads += 1;
        Ok(n)
    }

    fn wait_readable(&self, _timeout: Duration) -> io::Result<bool> {
        match self.state().waits.pop_front().unwrap_or(Wait::Ready) {
            Wait::Ready => Ok(true),
            Wait::Timeout => Ok(false),
            Wait::Fail(code) => Err(errno(code)),
        }
    }

    fn close(self) -> io::Result<()> {
        let mut state = self.state();
        state.log.push("CLOSE".into());
        state.closed = true;
        match state.fail_close {
            Some(code) => Err(errno(code)),
            None => Ok(()),
        }
    }
}
