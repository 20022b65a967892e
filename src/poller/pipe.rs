//! Self-pipe wake channel.
//!
//! A non-blocking pipe whose read end is watched alongside the input.
//! Writing one byte to the write end makes the read end readable and
//! ends the wait. The byte carries no meaning.

use super::common::Wake;
use super::platform::{RawHandle, sys_close, sys_pipe, sys_read, sys_write};

use std::io;

/// Byte written on every wake.
const SENTINEL: [u8; 1] = [b' '];

/// Wake channel backed by a POSIX pipe.
pub(crate) struct PipeWaker {
    /// Watched end.
    read: RawHandle,

    /// Signalled end.
    write: RawHandle,
}

impl PipeWaker {
    /// Creates the pipe. Both ends are non-blocking and close-on-exec.
    pub(crate) fn new() -> io::Result<Self> {
        let [read, write] = sys_pipe()?;

        Ok(Self { read, write })
    }
}

impl Wake for PipeWaker {
    /// Writes the sentinel byte. A single `write(2)`, nothing else.
    ///
    /// A full pipe already holds a pending wake, so `EAGAIN` counts as
    /// success.
    fn wake(&self) -> io::Result<()> {
        match sys_write(self.write, &SENTINEL) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn drain(&self) -> io::Result<()> {
        let mut scratch = [0u8; 64];

        loop {
            match sys_read(self.read, &mut scratch) {
                Ok(0) => return Ok(()),
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    fn watch_handle(&self) -> RawHandle {
        self.read
    }

    fn name(&self) -> &'static str {
        "pipe"
    }

    fn close(&mut self) -> io::Result<()> {
        let read = sys_close(self.read);
        let write = sys_close(self.write);

        read.and(write)
    }
}
