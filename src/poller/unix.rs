//! POSIX platform layer.
//!
//! Thin wrappers over `libc` that turn `-1`/`errno` returns into
//! [`io::Result`], plus the two multiplexed waits the reader can use.

use super::common::{Deadline, Readiness};

use libc::{
    O_CLOEXEC, O_NONBLOCK, O_RDONLY, POLLERR, POLLHUP, POLLIN, POLLNVAL, c_int, close, nfds_t,
    open, poll, pollfd, read, write,
};
use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::{mem, ptr};

pub(crate) use std::os::fd::RawFd as RawHandle;

/// Standard input, adopted rather than owned.
pub(crate) const STDIN: RawHandle = libc::STDIN_FILENO;

/// Opens `path` read-only and close-on-exec.
pub(crate) fn sys_open(path: &Path) -> io::Result<RawHandle> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;

    let fd = unsafe { open(c_path.as_ptr(), O_RDONLY | O_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(fd)
}

/// Reads into `buffer`, retrying when interrupted by a signal.
pub(crate) fn sys_read(fd: RawHandle, buffer: &mut [u8]) -> io::Result<usize> {
    loop {
        let n = unsafe { read(fd, buffer.as_mut_ptr() as *mut _, buffer.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }

        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Writes `buffer`, retrying when interrupted by a signal.
pub(crate) fn sys_write(fd: RawHandle, buffer: &[u8]) -> io::Result<usize> {
    loop {
        let n = unsafe { write(fd, buffer.as_ptr() as *const _, buffer.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }

        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Closes a file descriptor.
///
/// Not retried on `EINTR`: the descriptor is released either way.
pub(crate) fn sys_close(fd: RawHandle) -> io::Result<()> {
    if unsafe { close(fd) } != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Creates a non-blocking, close-on-exec pipe as `[read, write]`.
#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
))]
pub(crate) fn sys_pipe() -> io::Result<[RawHandle; 2]> {
    let mut fds: [c_int; 2] = [-1; 2];

    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), O_CLOEXEC | O_NONBLOCK) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(fds)
}

/// Creates a non-blocking, close-on-exec pipe as `[read, write]`.
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
)))]
pub(crate) fn sys_pipe() -> io::Result<[RawHandle; 2]> {
    let mut fds: [c_int; 2] = [-1; 2];

    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    for fd in fds {
        let configured = set_flag(fd, libc::F_GETFL, libc::F_SETFL, O_NONBLOCK)
            .and_then(|()| set_flag(fd, libc::F_GETFD, libc::F_SETFD, libc::FD_CLOEXEC));

        if let Err(e) = configured {
            let _ = sys_close(fds[0]);
            let _ = sys_close(fds[1]);
            return Err(e);
        }
    }

    Ok(fds)
}

/// ORs `flag` into the descriptor flags read by `get` and written by `set`.
#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
)))]
fn set_flag(fd: RawHandle, get: c_int, set: c_int, flag: c_int) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, get) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let rc = unsafe { libc::fcntl(fd, set, flags | flag) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Waits on `input` and `wake` with `poll(2)`.
///
/// A wait interrupted by a signal is restarted with the time left.
pub(crate) fn wait_poll(
    input: RawHandle,
    wake: RawHandle,
    deadline: Deadline,
) -> io::Result<Readiness> {
    loop {
        let mut fds = [
            pollfd {
                fd: input,
                events: POLLIN,
                revents: 0,
            },
            pollfd {
                fd: wake,
                events: POLLIN,
                revents: 0,
            },
        ];

        let timeout_ms = deadline
            .remaining_millis()
            .map(|ms| ms.min(c_int::MAX as u64) as c_int)
            .unwrap_or(-1);

        let rc = unsafe { poll(fds.as_mut_ptr(), fds.len() as nfds_t, timeout_ms) };

        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }

        if rc == 0 {
            return Ok(Readiness::TimedOut);
        }

        if fds.iter().any(|fd| fd.revents & POLLNVAL != 0) {
            return Err(io::Error::from_raw_os_error(libc::EBADF));
        }

        if fds[0].revents & (POLLIN | POLLHUP | POLLERR) != 0 {
            return Ok(Readiness::Input);
        }

        if fds[1].revents & (POLLIN | POLLHUP | POLLERR) != 0 {
            return Ok(Readiness::Wake);
        }
    }
}

/// Returns `true` if `fd` fits in an `fd_set`.
pub(crate) fn fits_fd_set(fd: RawHandle) -> bool {
    fd >= 0 && (fd as usize) < libc::FD_SETSIZE as usize
}

/// Waits on `input` and `wake` with `select(2)`.
///
/// `max_fd` is the larger of the two descriptors; both must satisfy
/// [`fits_fd_set`].
pub(crate) fn wait_select(
    input: RawHandle,
    wake: RawHandle,
    max_fd: RawHandle,
    deadline: Deadline,
) -> io::Result<Readiness> {
    if !fits_fd_set(input) || !fits_fd_set(wake) {
        return Err(io::Error::from_raw_os_error(libc::EINVAL));
    }

    loop {
        let mut read_set: libc::fd_set = unsafe { mem::zeroed() };
        unsafe {
            libc::FD_ZERO(&mut read_set);
            libc::FD_SET(input, &mut read_set);
            libc::FD_SET(wake, &mut read_set);
        }

        let mut timeout = deadline.remaining().map(|left| libc::timeval {
            tv_sec: left.as_secs() as libc::time_t,
            tv_usec: left.subsec_micros() as libc::suseconds_t,
        });
        let timeout_ptr = timeout
            .as_mut()
            .map_or(ptr::null_mut(), |tv| tv as *mut libc::timeval);

        let rc = unsafe {
            libc::select(
                max_fd + 1,
                &mut read_set,
                ptr::null_mut(),
                ptr::null_mut(),
                timeout_ptr,
            )
        };

        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }

        if rc == 0 {
            return Ok(Readiness::TimedOut);
        }

        if unsafe { libc::FD_ISSET(input, &read_set) } {
            return Ok(Readiness::Input);
        }

        if unsafe { libc::FD_ISSET(wake, &read_set) } {
            return Ok(Readiness::Wake);
        }
    }
}
