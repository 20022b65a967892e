use crate::builder::ReaderBuilder;
#[cfg(unix)]
use crate::builder::Multiplexer;
use crate::error::{Error, Result};
use crate::poller::platform::{self, RawHandle};
use crate::poller::{Deadline, Readiness, Wake};

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Result of a successful read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were written to the front of the buffer. Never zero.
    Data(usize),

    /// Nothing was read: the wait timed out or was interrupted.
    NoData,

    /// The input is closed or exhausted.
    EndOfInput,
}

impl ReadOutcome {
    /// Flattens the outcome into a single count: the number of bytes read,
    /// `0` for [`NoData`](Self::NoData) and `-1` for
    /// [`EndOfInput`](Self::EndOfInput).
    pub fn count(self) -> isize {
        match self {
            ReadOutcome::Data(n) => n as isize,
            ReadOutcome::NoData => 0,
            ReadOutcome::EndOfInput => -1,
        }
    }

    /// Number of bytes read, `0` unless this is [`Data`](Self::Data).
    pub fn bytes(self) -> usize {
        match self {
            ReadOutcome::Data(n) => n,
            _ => 0,
        }
    }

    pub fn is_end_of_input(self) -> bool {
        self == ReadOutcome::EndOfInput
    }
}

/// The input handle and whether the reader is responsible for closing it.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Input {
    /// Supplied by the environment (standard input); left open on release.
    Adopted(RawHandle),

    /// Opened by, or handed over to, the reader; closed on release.
    Owned(RawHandle),
}

impl Input {
    pub(crate) fn handle(self) -> RawHandle {
        match self {
            Input::Adopted(handle) | Input::Owned(handle) => handle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    Released,
}

/// A blocking standard-input reader that other threads can interrupt.
///
/// One thread reads; any number of threads may call
/// [`interrupt`](Self::interrupt) at any time, including while the read is
/// blocked. The reader is `Send + Sync`, so share it by reference (for
/// example with [`std::thread::scope`]) or through an `Arc`.
///
/// Each read performs a single multiplexed wait over the input handle and
/// a private wake channel, so data, end of input, interrupts and timeouts
/// are all observed through one call.
///
/// Interrupts never touch the input handle; reading again after an
/// interrupt is always valid.
///
/// # Examples
///
/// ```rust,no_run
/// use interruptible_stdin::{ReadOutcome, StdinReader};
/// use std::time::Duration;
///
/// let reader = StdinReader::init(None)?;
/// let mut buffer = [0u8; 64];
///
/// std::thread::scope(|s| {
///     s.spawn(|| {
///         std::thread::sleep(Duration::from_secs(1));
///         reader.interrupt()
///     });
///
///     loop {
///         match reader.read(&mut buffer)? {
///             ReadOutcome::Data(n) => println!("{:?}", &buffer[..n]),
///             ReadOutcome::NoData | ReadOutcome::EndOfInput => break,
///         }
///     }
///     Ok::<(), interruptible_stdin::Error>(())
/// })?;
///
/// reader.release()?;
/// # Ok::<(), interruptible_stdin::Error>(())
/// ```
pub struct StdinReader {
    input: Input,

    waker: Box<dyn Wake>,

    /// Largest watched descriptor, the `select(2)` bound.
    #[cfg(unix)]
    max_fd: RawHandle,

    #[cfg(unix)]
    multiplexer: Multiplexer,

    state: State,

    /// Set while a read is in progress.
    reading: AtomicBool,
}

impl StdinReader {
    /// Creates a reader over `path`, or over standard input when `None`.
    ///
    /// Shorthand for [`ReaderBuilder`] with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resource`] if the wake channel cannot be created or
    /// the path cannot be opened.
    pub fn init(path: Option<&Path>) -> Result<Self> {
        let builder = ReaderBuilder::new();

        match path {
            Some(path) => builder.path(path).build(),
            None => builder.build(),
        }
    }

    /// Returns a builder for a custom configuration.
    pub fn builder() -> ReaderBuilder {
        ReaderBuilder::new()
    }

    #[cfg(unix)]
    pub(crate) fn new(
        input: Input,
        waker: Box<dyn Wake>,
        max_fd: RawHandle,
        multiplexer: Multiplexer,
    ) -> Self {
        tracing::debug!(
            input = input.handle(),
            owned = matches!(input, Input::Owned(_)),
            wake = waker.name(),
            ?multiplexer,
            "stdin reader ready"
        );

        Self {
            input,
            waker,
            max_fd,
            multiplexer,
            state: State::Ready,
            reading: AtomicBool::new(false),
        }
    }

    #[cfg(windows)]
    pub(crate) fn new(input: Input, waker: Box<dyn Wake>) -> Self {
        tracing::debug!(
            owned = matches!(input, Input::Owned(_)),
            wake = waker.name(),
            "stdin reader ready"
        );

        Self {
            input,
            waker,
            state: State::Ready,
            reading: AtomicBool::new(false),
        }
    }

    /// Blocks until input is available, the input ends, or another thread
    /// calls [`interrupt`](Self::interrupt).
    ///
    /// Reads at most `buffer.len()` bytes.
    pub fn read(&self, buffer: &mut [u8]) -> Result<ReadOutcome> {
        self.read_until(buffer, None)
    }

    /// Like [`read`](Self::read), but gives up after `timeout`.
    ///
    /// A timeout yields [`ReadOutcome::NoData`], the same as an interrupt.
    pub fn read_with_timeout(&self, buffer: &mut [u8], timeout: Duration) -> Result<ReadOutcome> {
        self.read_until(buffer, Some(timeout))
    }

    fn read_until(&self, buffer: &mut [u8], timeout: Option<Duration>) -> Result<ReadOutcome> {
        debug_assert_eq!(self.state, State::Ready);

        if buffer.is_empty() {
            return Ok(ReadOutcome::NoData);
        }

        let _guard = ReadGuard::enter(&self.reading);

        let readiness = self
            .wait(Deadline::after(timeout))
            .map_err(|e| Error::io("wait", e))?;

        match readiness {
            Readiness::Input => match platform::sys_read(self.input.handle(), buffer) {
                Ok(0) => {
                    tracing::trace!("end of input");
                    Ok(ReadOutcome::EndOfInput)
                }
                Ok(n) => Ok(ReadOutcome::Data(n)),
                // Readiness was spurious on a non-blocking input.
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadOutcome::NoData),
                Err(e) => Err(Error::io("read", e)),
            },
            Readiness::Wake => {
                self.waker
                    .drain()
                    .map_err(|e| Error::io("drain wake channel", e))?;
                tracing::trace!("read interrupted");
                Ok(ReadOutcome::NoData)
            }
            Readiness::TimedOut => {
                tracing::trace!(?timeout, "read timed out");
                Ok(ReadOutcome::NoData)
            }
        }
    }

    #[cfg(unix)]
    fn wait(&self, deadline: Deadline) -> io::Result<Readiness> {
        let input = self.input.handle();
        let wake = self.waker.watch_handle();

        match self.multiplexer {
            Multiplexer::Poll => platform::wait_poll(input, wake, deadline),
            Multiplexer::Select => platform::wait_select(input, wake, self.max_fd, deadline),
        }
    }

    #[cfg(windows)]
    fn wait(&self, deadline: Deadline) -> io::Result<Readiness> {
        platform::wait_multiple(self.input.handle(), self.waker.watch_handle(), deadline)
    }

    /// Wakes a blocked (or the next) read, which returns
    /// [`ReadOutcome::NoData`].
    ///
    /// Safe to call from any thread, any number of times. Never blocks:
    /// wakes that pile up before a read are coalesced into one. On Unix
    /// this is a single `write(2)` and may be called from a signal handler.
    pub fn interrupt(&self) -> Result<()> {
        self.waker.wake().map_err(|e| Error::io("interrupt", e))
    }

    /// Closes the wake channel and, if the reader owns it, the input.
    ///
    /// Standard input is left open. Every close is attempted even if an
    /// earlier one fails; the first failure is returned.
    pub fn release(mut self) -> Result<()> {
        let result = self.close_all();
        self.state = State::Released;

        tracing::debug!(ok = result.is_ok(), "stdin reader released");
        result
    }

    /// Returns `true` if the input handle is closed on release.
    pub fn owns_input(&self) -> bool {
        matches!(self.input, Input::Owned(_))
    }

    /// Name of the wake channel mechanism.
    pub fn wake_mechanism(&self) -> &'static str {
        self.waker.name()
    }

    /// Largest descriptor number the reader waits on.
    #[cfg(unix)]
    pub fn max_watched_descriptor(&self) -> RawHandle {
        self.max_fd
    }

    fn close_all(&mut self) -> Result<()> {
        let wake = self
            .waker
            .close()
            .map_err(|e| Error::io("close wake channel", e));

        let input = match self.input {
            Input::Owned(handle) => {
                platform::sys_close(handle).map_err(|e| Error::io("close input", e))
            }
            Input::Adopted(_) => Ok(()),
        };

        wake.and(input)
    }
}

#[cfg(unix)]
impl std::os::fd::AsRawFd for StdinReader {
    /// The input descriptor.
    fn as_raw_fd(&self) -> RawHandle {
        self.input.handle()
    }
}

impl Drop for StdinReader {
    fn drop(&mut self) {
        if self.state == State::Released {
            return;
        }

        tracing::debug!("stdin reader dropped without release");
        if let Err(e) = self.close_all() {
            tracing::warn!(error = %e, "implicit release failed");
        }
        self.state = State::Released;
    }
}

/// Marks a read in progress for its lifetime.
struct ReadGuard<'a>(&'a AtomicBool);

impl<'a> ReadGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        let busy = flag.swap(true, Ordering::Acquire);
        debug_assert!(!busy, "concurrent reads on one StdinReader");

        Self(flag)
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
