use std::os::unix::io::RawFd;
use std::{io, mem, ptr, time};

#[derive(Clone, Copy)]
pub struct FdSet(libc::fd_set);

impl FdSet {
    pub fn new() -> FdSet {
        unsafe {
            let mut raw_fd_set = mem::MaybeUninit::<libc::fd_set>::uninit();
            libc::FD_ZERO(raw_fd_set.as_mut_ptr());
            FdSet(raw_fd_set.assume_init())
        }
    }

    pub fn set(&mut self, fd: RawFd) {
        unsafe {
            libc::FD_SET(fd, &mut self.0);
        }
    }

    pub fn is_set(&self, fd: RawFd) -> bool {
        unsafe { libc::FD_ISSET(fd, &self.0) }
    }
}

impl Default for FdSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits until one of the descriptors in `readfds` becomes readable
///
/// Returns the number of ready descriptors, zero on timeout.
pub fn pselect(
    nfds: libc::c_int,
    readfds: &mut FdSet,
    timeout: Option<&libc::timespec>,
) -> io::Result<usize> {
    let timeout = match timeout {
        Some(ts) => ts as *const libc::timespec,
        None => ptr::null(),
    };

    match unsafe {
        libc::pselect(
            nfds,
            &mut readfds.0,
            ptr::null_mut(),
            ptr::null_mut(),
            timeout,
            ptr::null(),
        )
    } {
        -1 => Err(io::Error::last_os_error()),
        res => Ok(res as usize),
    }
}

pub fn make_timespec(duration: time::Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: duration.as_secs() as libc::time_t,
        tv_nsec: duration.subsec_nanos() as libc::c_long,
    }
}

/// Waits up to `timeout` for `fd` to become readable
///
/// Returns `false` if the timeout elapsed first. Waits interrupted by a signal are restarted
/// with the full timeout.
pub fn wait_readable(fd: RawFd, timeout: time::Duration) -> io::Result<bool> {
    let ts = make_timespec(timeout);
    loop {
        let mut fds = FdSet::new();
        fds.set(fd);

        match pselect(fd + 1, &mut fds, Some(&ts)) {
            Ok(ready) => return Ok(ready > 0 && fds.is_set(fd)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timespec_splits_seconds() {
        let ts = make_timespec(time::Duration::from_millis(2500));
        assert_eq!(ts.tv_sec, 2);
        assert_eq!(ts.tv_nsec, 500_000_000);
    }

    #[test]
    fn pipe_becomes_readable() {
        let mut fds = [0 as libc::c_int; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let (rx, tx) = (fds[0], fds[1]);

        let timeout = time::Duration::from_millis(10);
        assert!(!wait_readable(rx, timeout).unwrap());

        let byte = [1u8];
        assert_eq!(unsafe { libc::write(tx, byte.as_ptr() as *const _, 1) }, 1);
        assert!(wait_readable(rx, timeout).unwrap());

        unsafe {
            libc::close(rx);
            libc::close(tx);
        }
    }
}
