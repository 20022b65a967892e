//! Linux `eventfd`-based wake channel.
//!
//! A single descriptor holding a 64-bit counter. Every wake adds one;
//! the counter is readable while non-zero, and one read resets it.

use super::common::Wake;
use super::platform::{RawHandle, sys_close, sys_read, sys_write};

use libc::{EFD_CLOEXEC, EFD_NONBLOCK, eventfd};
use std::io;

/// Wake channel backed by an `eventfd`.
pub(crate) struct EventFdWaker(RawHandle);

impl EventFdWaker {
    /// Creates a non-blocking, close-on-exec `eventfd`.
    pub(crate) fn new() -> io::Result<Self> {
        let fd = unsafe { eventfd(0, EFD_NONBLOCK | EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self(fd))
    }
}

impl Wake for EventFdWaker {
    /// Adds one to the counter with a single `write(2)`.
    ///
    /// `EAGAIN` only happens when the counter is saturated, which means a
    /// wake is pending anyway.
    fn wake(&self) -> io::Result<()> {
        let buf = 1u64.to_ne_bytes();

        match sys_write(self.0, &buf) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn drain(&self) -> io::Result<()> {
        let mut buf = [0u8; 8];

        match sys_read(self.0, &mut buf) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn watch_handle(&self) -> RawHandle {
        self.0
    }

    fn name(&self) -> &'static str {
        "eventfd"
    }

    fn close(&mut self) -> io::Result<()> {
        sys_close(self.0)
    }
}
