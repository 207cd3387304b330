use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::{io, path::Path};

pub mod videodev;
pub mod vidioc;

/// A convenience wrapper around open(2).
///
/// Returns the file descriptor on success.
/// In case of errors, the last OS error will be reported, aka errno on Linux.
///
/// # Arguments
///
/// * `path` - Path to the device node
/// * `flags` - Open flags
///
/// # Example
///
/// ```no_run
/// use v4l_capture::v4l2;
///
/// let fd = v4l2::open("/dev/video0", libc::O_RDWR | libc::O_NONBLOCK);
/// ```
pub fn open<P: AsRef<Path>>(path: P, flags: i32) -> io::Result<std::os::raw::c_int> {
    let c_path = CString::new(path.as_ref().as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let fd = unsafe { libc::open(c_path.as_ptr(), flags, 0) };
    if fd == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(fd)
    }
}

/// A convenience wrapper around close(2).
///
/// In case of errors, the last OS error will be reported, aka errno on Linux.
pub fn close(fd: std::os::raw::c_int) -> io::Result<()> {
    let ret = unsafe { libc::close(fd) };
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// A convenience wrapper around ioctl(2).
///
/// Calls interrupted by a signal (`EINTR`) are restarted transparently.
/// In case of other errors, the last OS error will be reported.
///
/// # Arguments
///
/// * `fd` - File descriptor
/// * `request` - IO control code (see [`vidioc`])
/// * `argp` - Pointer to memory region holding the argument type
///
/// # Safety
///
/// `argp` must point to a live value of the type `request` encodes.
pub unsafe fn ioctl(
    fd: std::os::raw::c_int,
    request: vidioc::_IOC_TYPE,
    argp: *mut std::os::raw::c_void,
) -> io::Result<()> {
    loop {
        /*
         * libc defines ioctl() with different, incompatible argument types on
         * different platforms. syscall() is a drop-in replacement that works
         * everywhere. Details: https://github.com/rust-lang/libc/issues/1036
         */
        let ret = libc::syscall(libc::SYS_ioctl, fd, request, argp) as std::os::raw::c_int;
        if ret != -1 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

/// A convenience wrapper around mmap(2).
///
/// # Arguments
///
/// * `length` - Length of the mapped region
/// * `fd` - File descriptor representing an opened device
/// * `offset` - Offset reported by the driver for the buffer
///
/// # Safety
///
/// The returned region aliases driver memory and must be released with [`munmap`].
pub unsafe fn mmap(
    length: usize,
    fd: std::os::raw::c_int,
    offset: libc::off_t,
) -> io::Result<*mut std::os::raw::c_void> {
    let ret = libc::mmap(
        std::ptr::null_mut(),
        length,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_SHARED,
        fd,
        offset,
    );
    if ret == libc::MAP_FAILED {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// A convenience wrapper around munmap(2).
///
/// # Safety
///
/// `start` and `length` must describe a region returned by [`mmap`].
pub unsafe fn munmap(start: *mut std::os::raw::c_void, length: usize) -> io::Result<()> {
    if libc::munmap(start, length) == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// A convenience wrapper around read(2).
///
/// Returns the number of bytes actually read.
pub fn read(fd: std::os::raw::c_int, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        let ret = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut std::os::raw::c_void, buf.len()) };
        if ret >= 0 {
            return Ok(ret as usize);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}
