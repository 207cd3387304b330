use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::{fs, io, mem, time::Duration};

use crate::buffer::Descriptor;
use crate::memory::Memory;
use crate::v4l2;
use crate::v4l2::videodev::*;
use crate::{pselect, Capabilities, Format};

/// Rectangle in device pixel coordinates, used for cropping
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl From<v4l2_rect> for Rect {
    fn from(rect: v4l2_rect) -> Self {
        Rect {
            left: rect.left,
            top: rect.top,
            width: rect.width,
            height: rect.height,
        }
    }
}

impl From<Rect> for v4l2_rect {
    fn from(rect: Rect) -> Self {
        v4l2_rect {
            left: rect.left,
            top: rect.top,
            width: rect.width,
            height: rect.height,
        }
    }
}

/// Kernel operations the capture core performs on an opened video capture node
///
/// All methods take `&self`; the driver serializes them. [`Node`] implements this trait on top
/// of the raw ioctl interface.
pub trait Device {
    /// Query for device capabilities (`VIDIOC_QUERYCAP`)
    fn query_caps(&self) -> io::Result<Capabilities>;

    /// Returns the default cropping rectangle (`VIDIOC_CROPCAP`)
    fn crop_default(&self) -> io::Result<Rect>;

    /// Sets the cropping rectangle (`VIDIOC_S_CROP`)
    fn set_crop(&self, rect: Rect) -> io::Result<()>;

    /// Returns the format currently in use (`VIDIOC_G_FMT`)
    fn format(&self) -> io::Result<Format>;

    /// Modifies the capture format and returns the actual format (`VIDIOC_S_FMT`)
    ///
    /// The driver tries to match the format parameters on a best effort basis.
    /// Thus, if the combination of format properties cannot be achieved, the closest possible
    /// settings are used and reported back.
    fn set_format(&self, fmt: &Format) -> io::Result<Format>;

    /// Requests `count` buffers of the given memory type (`VIDIOC_REQBUFS`)
    ///
    /// Returns the number of buffers granted by the driver. A count of zero frees all buffers.
    fn request_buffers(&self, memory: Memory, count: u32) -> io::Result<u32>;

    /// Queries length and offset of a buffer (`VIDIOC_QUERYBUF`)
    fn query_buffer(&self, memory: Memory, index: u32) -> io::Result<Descriptor>;

    /// Inserts a buffer into the drivers' incoming queue (`VIDIOC_QBUF`)
    fn queue(&self, desc: &Descriptor) -> io::Result<()>;

    /// Removes a filled buffer from the drivers' outgoing queue (`VIDIOC_DQBUF`)
    ///
    /// Fails with `EAGAIN` if no buffer is ready yet.
    fn dequeue(&self, memory: Memory) -> io::Result<Descriptor>;

    /// Starts streaming (`VIDIOC_STREAMON`)
    fn stream_on(&self) -> io::Result<()>;

    /// Stops streaming and returns all buffers to userspace (`VIDIOC_STREAMOFF`)
    fn stream_off(&self) -> io::Result<()>;

    /// Maps a driver buffer read/write and shared
    fn map(&self, length: usize, offset: u32) -> io::Result<NonNull<u8>>;

    /// Unmaps a region returned by [`Device::map`]
    ///
    /// # Safety
    ///
    /// `ptr` and `length` must come from a successful [`Device::map`] call on this device, and
    /// the region must not be accessed afterwards.
    unsafe fn unmap(&self, ptr: NonNull<u8>, length: usize) -> io::Result<()>;

    /// Reads one frame with read(2), returning the number of bytes read
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Waits up to `timeout` for the device to become readable
    ///
    /// Returns `false` if the timeout elapsed.
    fn wait_readable(&self, timeout: Duration) -> io::Result<bool>;

    /// Closes the device
    fn close(self) -> io::Result<()>
    where
        Self: Sized;
}

/// Locates and opens capture devices
pub trait Open {
    type Device: Device;

    /// Verifies that `path` names a character device
    fn check(&self, path: &Path) -> io::Result<()>;

    /// Opens the device read/write in non-blocking mode
    fn open(&self, path: &Path) -> io::Result<Self::Device>;
}

/// Opens real device nodes below /dev
#[derive(Debug, Default, Clone, Copy)]
pub struct System;

impl Open for System {
    type Device = Node;

    fn check(&self, path: &Path) -> io::Result<()> {
        let meta = fs::metadata(path)?;
        if !meta.file_type().is_char_device() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a character device",
            ));
        }
        Ok(())
    }

    fn open(&self, path: &Path) -> io::Result<Node> {
        Node::open(path)
    }
}

/// Represents an opened video4linux device node
///
/// The file descriptor is closed on drop unless [`Device::close`] was called.
#[derive(Debug)]
pub struct Node {
    /// File descriptor, -1 once closed
    fd: RawFd,
    /// Device node path
    path: PathBuf,
}

impl Node {
    /// Opens a device node read/write in non-blocking mode
    ///
    /// # Arguments
    ///
    /// * `path` - Node path (usually a character device such as /dev/video0)
    ///
    /// # Example
    ///
    /// ```no_run
    /// use v4l_capture::device::Node;
    /// let node = Node::open("/dev/video0");
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let fd = v4l2::open(path, libc::O_RDWR | libc::O_NONBLOCK)?;

        Ok(Node {
            fd,
            path: PathBuf::from(path),
        })
    }

    /// Returns the raw fd of the device
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Returns the path of the device node
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ioctl<T>(&self, request: v4l2::vidioc::_IOC_TYPE, arg: &mut T) -> io::Result<()> {
        unsafe { v4l2::ioctl(self.fd, request, arg as *mut T as *mut std::os::raw::c_void) }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if self.fd != -1 {
            // nothing sensible to do with an error here
            let _ = v4l2::close(self.fd);
        }
    }
}

impl Device for Node {
    fn query_caps(&self) -> io::Result<Capabilities> {
        let mut v4l2_caps: v4l2_capability = unsafe { mem::zeroed() };
        self.ioctl(v4l2::vidioc::VIDIOC_QUERYCAP, &mut v4l2_caps)?;
        Ok(Capabilities::from(v4l2_caps))
    }

    fn crop_default(&self) -> io::Result<Rect> {
        let mut cropcap = v4l2_cropcap {
            type_: V4L2_BUF_TYPE_VIDEO_CAPTURE,
            ..Default::default()
        };
        self.ioctl(v4l2::vidioc::VIDIOC_CROPCAP, &mut cropcap)?;
        Ok(Rect::from(cropcap.defrect))
    }

    fn set_crop(&self, rect: Rect) -> io::Result<()> {
        let mut crop = v4l2_crop {
            type_: V4L2_BUF_TYPE_VIDEO_CAPTURE,
            c: rect.into(),
        };
        self.ioctl(v4l2::vidioc::VIDIOC_S_CROP, &mut crop)
    }

    fn format(&self) -> io::Result<Format> {
        let mut v4l2_fmt = v4l2_format {
            type_: V4L2_BUF_TYPE_VIDEO_CAPTURE,
            ..unsafe { mem::zeroed() }
        };
        self.ioctl(v4l2::vidioc::VIDIOC_G_FMT, &mut v4l2_fmt)?;
        Ok(Format::from(unsafe { v4l2_fmt.fmt.pix }))
    }

    fn set_format(&self, fmt: &Format) -> io::Result<Format> {
        // start from the active format so fields we do not model keep their values
        let mut v4l2_fmt = v4l2_format {
            type_: V4L2_BUF_TYPE_VIDEO_CAPTURE,
            ..unsafe { mem::zeroed() }
        };
        self.ioctl(v4l2::vidioc::VIDIOC_G_FMT, &mut v4l2_fmt)?;

        unsafe {
            v4l2_fmt.fmt.pix.width = fmt.width;
            v4l2_fmt.fmt.pix.height = fmt.height;
            v4l2_fmt.fmt.pix.pixelformat = fmt.fourcc.into();
            v4l2_fmt.fmt.pix.field = fmt.field_order as u32;
        }
        self.ioctl(v4l2::vidioc::VIDIOC_S_FMT, &mut v4l2_fmt)?;
        Ok(Format::from(unsafe { v4l2_fmt.fmt.pix }))
    }

    fn request_buffers(&self, memory: Memory, count: u32) -> io::Result<u32> {
        let mut v4l2_reqbufs = v4l2_requestbuffers {
            count,
            type_: V4L2_BUF_TYPE_VIDEO_CAPTURE,
            memory: memory as u32,
            ..Default::default()
        };
        self.ioctl(v4l2::vidioc::VIDIOC_REQBUFS, &mut v4l2_reqbufs)?;
        Ok(v4l2_reqbufs.count)
    }

    fn query_buffer(&self, memory: Memory, index: u32) -> io::Result<Descriptor> {
        let mut v4l2_buf = v4l2_buffer::from(&Descriptor::with_index(memory, index));
        self.ioctl(v4l2::vidioc::VIDIOC_QUERYBUF, &mut v4l2_buf)?;
        Ok(Descriptor::from(&v4l2_buf))
    }

    fn queue(&self, desc: &Descriptor) -> io::Result<()> {
        let mut v4l2_buf = v4l2_buffer::from(desc);
        self.ioctl(v4l2::vidioc::VIDIOC_QBUF, &mut v4l2_buf)
    }

    fn dequeue(&self, memory: Memory) -> io::Result<Descriptor> {
        let mut v4l2_buf = v4l2_buffer::from(&Descriptor::new(memory));
        self.ioctl(v4l2::vidioc::VIDIOC_DQBUF, &mut v4l2_buf)?;
        Ok(Descriptor::from(&v4l2_buf))
    }

    fn stream_on(&self) -> io::Result<()> {
        let mut typ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        self.ioctl(v4l2::vidioc::VIDIOC_STREAMON, &mut typ)
    }

    fn stream_off(&self) -> io::Result<()> {
        let mut typ = V4L2_BUF_TYPE_VIDEO_CAPTURE;
        self.ioctl(v4l2::vidioc::VIDIOC_STREAMOFF, &mut typ)
    }

    fn map(&self, length: usize, offset: u32) -> io::Result<NonNull<u8>> {
        let ptr = unsafe { v4l2::mmap(length, self.fd, offset as libc::off_t)? };
        NonNull::new(ptr as *mut u8)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned NULL"))
    }

    unsafe fn unmap(&self, ptr: NonNull<u8>, length: usize) -> io::Result<()> {
        v4l2::munmap(ptr.as_ptr() as *mut std::os::raw::c_void, length)
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        v4l2::read(self.fd, buf)
    }

    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        pselect::wait_readable(self.fd, timeout)
    }

    fn close(mut self) -> io::Result<()> {
        let fd = mem::replace(&mut self.fd, -1);
        v4l2::close(fd)
    }
}
