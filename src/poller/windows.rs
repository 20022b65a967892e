//! Windows platform layer.
//!
//! This module mirrors the POSIX layer with Win32 primitives:
//! - standard input comes from `GetStdHandle`, paths from `CreateFileW`,
//! - the wake channel is an auto-reset event object,
//! - the multiplexed wait is `WaitForMultipleObjects`.
//!
//! Console and pipe inputs need extra care. A console is signalled on
//! every input record (mouse, focus, resize) but only key presses produce
//! bytes, so other records are discarded before reporting readiness.
//! Pipes are not waitable at all and are checked with `PeekNamedPipe`
//! between short waits on the wake event.
//!
//! Handles are stored as `usize` so the reader stays `Send + Sync`;
//! they are cast back to `HANDLE` at every call site.

use super::common::{Deadline, Readiness, Wake};

use std::io;
use std::iter;
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::ptr;
use std::time::Duration;

use windows_sys::Win32::Foundation::{
    CloseHandle, ERROR_BROKEN_PIPE, ERROR_INVALID_HANDLE, HANDLE, INVALID_HANDLE_VALUE,
    WAIT_FAILED, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, FILE_ATTRIBUTE_NORMAL, FILE_GENERIC_READ, FILE_SHARE_READ, FILE_SHARE_WRITE,
    FILE_TYPE_CHAR, FILE_TYPE_PIPE, GetFileType, OPEN_EXISTING, ReadFile,
};
use windows_sys::Win32::System::Console::{
    GetConsoleMode, GetStdHandle, INPUT_RECORD, KEY_EVENT, PeekConsoleInputW, ReadConsoleInputW,
    STD_INPUT_HANDLE,
};
use windows_sys::Win32::System::Pipes::PeekNamedPipe;
use windows_sys::Win32::System::Threading::{
    CreateEventW, INFINITE, SetEvent, WaitForMultipleObjects, WaitForSingleObject,
};

/// Longest single wait on the wake event while a pipe input is idle.
const PIPE_POLL_INTERVAL_MS: u32 = 10;

/// Raw handle type on Windows.
pub(crate) type RawHandle = usize;

/// Returns the process's standard input handle.
pub(crate) fn sys_stdin() -> io::Result<RawHandle> {
    let handle = unsafe { GetStdHandle(STD_INPUT_HANDLE) };

    if handle == INVALID_HANDLE_VALUE {
        return Err(io::Error::last_os_error());
    }
    if handle.is_null() {
        return Err(io::Error::from_raw_os_error(ERROR_INVALID_HANDLE as i32));
    }

    Ok(handle as RawHandle)
}

/// Opens `path` for reading.
pub(crate) fn sys_open(path: &Path) -> io::Result<RawHandle> {
    let wide: Vec<u16> = path
        .as_os_str()
        .encode_wide()
        .chain(iter::once(0))
        .collect();

    let handle = unsafe {
        CreateFileW(
            wide.as_ptr(),
            FILE_GENERIC_READ,
            FILE_SHARE_READ | FILE_SHARE_WRITE,
            ptr::null(),
            OPEN_EXISTING,
            FILE_ATTRIBUTE_NORMAL,
            ptr::null_mut(),
        )
    };

    if handle == INVALID_HANDLE_VALUE {
        return Err(io::Error::last_os_error());
    }

    Ok(handle as RawHandle)
}

/// Reads into `buffer`.
///
/// A pipe whose writer went away reports `ERROR_BROKEN_PIPE`; that is
/// end of input, not an error.
pub(crate) fn sys_read(handle: RawHandle, buffer: &mut [u8]) -> io::Result<usize> {
    let len = u32::try_from(buffer.len()).unwrap_or(u32::MAX);
    let mut read = 0u32;

    let ok = unsafe {
        ReadFile(
            handle as HANDLE,
            buffer.as_mut_ptr(),
            len,
            &mut read,
            ptr::null_mut(),
        )
    };

    if ok == 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(ERROR_BROKEN_PIPE as i32) {
            return Ok(0);
        }
        return Err(err);
    }

    Ok(read as usize)
}

/// Closes a handle.
pub(crate) fn sys_close(handle: RawHandle) -> io::Result<()> {
    if unsafe { CloseHandle(handle as HANDLE) } == 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// How an input handle reports readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    Console,
    Pipe,
    /// Waitable directly; disk files are always signalled.
    Other,
}

fn input_kind(handle: RawHandle) -> InputKind {
    match unsafe { GetFileType(handle as HANDLE) } {
        FILE_TYPE_CHAR => {
            let mut mode = 0;
            if unsafe { GetConsoleMode(handle as HANDLE, &mut mode) } != 0 {
                InputKind::Console
            } else {
                InputKind::Other
            }
        }
        FILE_TYPE_PIPE => InputKind::Pipe,
        _ => InputKind::Other,
    }
}

/// Waits on `input` and `wake`.
///
/// When both are ready the input is reported.
pub(crate) fn wait_multiple(
    input: RawHandle,
    wake: RawHandle,
    deadline: Deadline,
) -> io::Result<Readiness> {
    match input_kind(input) {
        InputKind::Console => loop {
            match wait_objects(input, wake, deadline)? {
                Readiness::Input if !console_key_pending(input)? => continue,
                readiness => return Ok(readiness),
            }
        },
        InputKind::Pipe => wait_pipe(input, wake, deadline),
        InputKind::Other => wait_objects(input, wake, deadline),
    }
}

fn wait_objects(input: RawHandle, wake: RawHandle, deadline: Deadline) -> io::Result<Readiness> {
    let handles: [HANDLE; 2] = [input as HANDLE, wake as HANDLE];

    let timeout_ms = deadline
        .remaining_millis()
        .map(|ms| ms.min(u64::from(INFINITE - 1)) as u32)
        .unwrap_or(INFINITE);

    let rc = unsafe { WaitForMultipleObjects(2, handles.as_ptr(), 0, timeout_ms) };

    match rc {
        WAIT_FAILED => Err(io::Error::last_os_error()),
        WAIT_TIMEOUT => Ok(Readiness::TimedOut),
        rc if rc == WAIT_OBJECT_0 => Ok(Readiness::Input),
        rc if rc == WAIT_OBJECT_0 + 1 => Ok(Readiness::Wake),
        other => Err(unexpected_wait(other)),
    }
}

/// Drops leading console records that `ReadFile` would not turn into
/// bytes. Returns `true` once a key press is at the front of the queue.
fn console_key_pending(input: RawHandle) -> io::Result<bool> {
    loop {
        let mut record: INPUT_RECORD = unsafe { mem::zeroed() };
        let mut count = 0u32;

        if unsafe { PeekConsoleInputW(input as HANDLE, &mut record, 1, &mut count) } == 0 {
            return Err(io::Error::last_os_error());
        }
        if count == 0 {
            return Ok(false);
        }
        if is_key_press(&record) {
            return Ok(true);
        }

        if unsafe { ReadConsoleInputW(input as HANDLE, &mut record, 1, &mut count) } == 0 {
            return Err(io::Error::last_os_error());
        }
    }
}

fn is_key_press(record: &INPUT_RECORD) -> bool {
    if record.EventType as u32 != KEY_EVENT as u32 {
        return false;
    }

    let key = unsafe { record.Event.KeyEvent };
    key.bKeyDown != 0 && unsafe { key.uChar.UnicodeChar } != 0
}

/// Alternates between checking the pipe and a short wait on the wake
/// event until one of them is ready or the deadline passes.
fn wait_pipe(input: RawHandle, wake: RawHandle, deadline: Deadline) -> io::Result<Readiness> {
    loop {
        if pipe_readable(input)? {
            return Ok(Readiness::Input);
        }

        let slice = deadline
            .remaining_millis()
            .map_or(PIPE_POLL_INTERVAL_MS, |ms| {
                ms.min(u64::from(PIPE_POLL_INTERVAL_MS)) as u32
            });

        match unsafe { WaitForSingleObject(wake as HANDLE, slice) } {
            WAIT_FAILED => return Err(io::Error::last_os_error()),
            WAIT_TIMEOUT if deadline.remaining() == Some(Duration::ZERO) => {
                return Ok(Readiness::TimedOut);
            }
            WAIT_TIMEOUT => continue,
            rc if rc == WAIT_OBJECT_0 => return Ok(Readiness::Wake),
            other => return Err(unexpected_wait(other)),
        }
    }
}

/// `true` when a read would not block: bytes are waiting or the writer
/// has gone away.
fn pipe_readable(input: RawHandle) -> io::Result<bool> {
    let mut available = 0u32;

    let ok = unsafe {
        PeekNamedPipe(
            input as HANDLE,
            ptr::null_mut(),
            0,
            ptr::null_mut(),
            &mut available,
            ptr::null_mut(),
        )
    };

    if ok == 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(ERROR_BROKEN_PIPE as i32) {
            return Ok(true);
        }
        return Err(err);
    }

    Ok(available > 0)
}

fn unexpected_wait(rc: u32) -> io::Error {
    io::Error::other(format!("unexpected wait result {rc:#x}"))
}

/// Wake channel backed by an auto-reset event object.
///
/// A successful wait on the event resets it, so [`Wake::drain`] has
/// nothing to do.
pub(crate) struct EventWaker(RawHandle);

impl EventWaker {
    pub(crate) fn new() -> io::Result<Self> {
        let handle = unsafe { CreateEventW(ptr::null(), 0, 0, ptr::null()) };

        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }

        Ok(Self(handle as RawHandle))
    }
}

impl Wake for EventWaker {
    /// Signals the event. Signalling an already signalled event is a no-op.
    fn wake(&self) -> io::Result<()> {
        if unsafe { SetEvent(self.0 as HANDLE) } == 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    fn drain(&self) -> io::Result<()> {
        Ok(())
    }

    fn watch_handle(&self) -> RawHandle {
        self.0
    }

    fn name(&self) -> &'static str {
        "event"
    }

    fn close(&mut self) -> io::Result<()> {
        sys_close(self.0)
    }
}
