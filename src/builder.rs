use crate::error::{Error, Result};
use crate::poller::Wake;
use crate::poller::platform::{self, RawHandle};
use crate::reader::{Input, StdinReader};

#[cfg(unix)]
use std::os::fd::{IntoRawFd, OwnedFd};
use std::path::{Path, PathBuf};

/// Wait primitive used to multiplex the input and the wake channel.
///
/// The default is `select(2)` on Apple targets and `poll(2)` elsewhere.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplexer {
    /// `poll(2)`. No descriptor limit.
    ///
    /// On macOS `poll(2)` rejects device files with `POLLNVAL`, so a
    /// terminal input fails every read with `EBADF` there.
    Poll,

    /// `select(2)`, bounded by the largest watched descriptor.
    ///
    /// Descriptors at or above `FD_SETSIZE` are rejected when the reader
    /// is built.
    Select,
}

/// Mechanism behind the private wake channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeChannel {
    /// A non-blocking pipe; one byte per wake.
    #[cfg(unix)]
    Pipe,

    /// An `eventfd` counter; a single descriptor.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    EventFd,

    /// An auto-reset event object.
    #[cfg(windows)]
    Event,
}

#[cfg(unix)]
impl Default for Multiplexer {
    #[cfg(target_vendor = "apple")]
    fn default() -> Self {
        Multiplexer::Select
    }

    #[cfg(not(target_vendor = "apple"))]
    fn default() -> Self {
        Multiplexer::Poll
    }
}

impl Default for WakeChannel {
    #[cfg(unix)]
    fn default() -> Self {
        WakeChannel::Pipe
    }

    #[cfg(windows)]
    fn default() -> Self {
        WakeChannel::Event
    }
}

impl WakeChannel {
    fn open(self) -> std::io::Result<Box<dyn Wake>> {
        match self {
            #[cfg(unix)]
            WakeChannel::Pipe => Ok(Box::new(crate::poller::PipeWaker::new()?)),
            #[cfg(any(target_os = "linux", target_os = "android"))]
            WakeChannel::EventFd => Ok(Box::new(crate::poller::EventFdWaker::new()?)),
            #[cfg(windows)]
            WakeChannel::Event => Ok(Box::new(crate::poller::EventWaker::new()?)),
        }
    }
}

/// Where the reader takes its input from.
enum Source {
    Stdin,
    Path(PathBuf),
    #[cfg(unix)]
    Fd(OwnedFd),
}

/// Builder for configuring and creating a [`StdinReader`].
///
/// By default the reader adopts the process's standard input, signals
/// wakes through a pipe (an event object on Windows) and waits with
/// `poll(2)` (`select(2)` on macOS and iOS).
///
/// # Examples
///
/// ```rust,no_run
/// use interruptible_stdin::ReaderBuilder;
///
/// let reader = ReaderBuilder::new()
///     .path("/dev/tty")
///     .build()?;
/// # Ok::<(), interruptible_stdin::Error>(())
/// ```
pub struct ReaderBuilder {
    source: Source,
    wake_channel: WakeChannel,
    #[cfg(unix)]
    multiplexer: Multiplexer,
}

impl ReaderBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            source: Source::Stdin,
            wake_channel: WakeChannel::default(),
            #[cfg(unix)]
            multiplexer: Multiplexer::default(),
        }
    }

    /// Reads from `path` instead of standard input.
    ///
    /// The handle is opened by [`build`](Self::build) and closed by
    /// [`StdinReader::release`].
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.source = Source::Path(path.as_ref().to_path_buf());
        self
    }

    /// Reads from an already open descriptor, taking ownership of it.
    #[cfg(unix)]
    pub fn input_fd(mut self, fd: OwnedFd) -> Self {
        self.source = Source::Fd(fd);
        self
    }

    /// Selects the wake channel mechanism.
    pub fn wake_channel(mut self, wake_channel: WakeChannel) -> Self {
        self.wake_channel = wake_channel;
        self
    }

    /// Selects the wait primitive.
    #[cfg(unix)]
    pub fn multiplexer(mut self, multiplexer: Multiplexer) -> Self {
        self.multiplexer = multiplexer;
        self
    }

    /// Acquires the wake channel and the input handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resource`] if either cannot be acquired. Whatever
    /// was acquired before the failure is closed first.
    pub fn build(self) -> Result<StdinReader> {
        let mut waker = self
            .wake_channel
            .open()
            .map_err(|e| Error::resource("wake channel", e))?;

        let input = match acquire(self.source) {
            Ok(input) => input,
            Err(e) => {
                discard(&mut *waker, None);
                return Err(Error::resource("input handle", e));
            }
        };

        #[cfg(unix)]
        let reader = {
            let max_fd = input.handle().max(waker.watch_handle());

            if self.multiplexer == Multiplexer::Select
                && !(platform::fits_fd_set(input.handle())
                    && platform::fits_fd_set(waker.watch_handle()))
            {
                discard(&mut *waker, Some(&input));
                return Err(Error::resource(
                    "select watch set",
                    std::io::Error::from_raw_os_error(libc::EINVAL),
                ));
            }

            StdinReader::new(input, waker, max_fd, self.multiplexer)
        };

        #[cfg(windows)]
        let reader = StdinReader::new(input, waker);

        Ok(reader)
    }
}

impl Default for ReaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn acquire(source: Source) -> std::io::Result<Input> {
    match source {
        Source::Stdin => Ok(Input::Adopted(stdin_handle()?)),
        Source::Path(path) => Ok(Input::Owned(platform::sys_open(&path)?)),
        #[cfg(unix)]
        Source::Fd(fd) => Ok(Input::Owned(fd.into_raw_fd())),
    }
}

#[cfg(unix)]
fn stdin_handle() -> std::io::Result<RawHandle> {
    Ok(platform::STDIN)
}

#[cfg(windows)]
fn stdin_handle() -> std::io::Result<RawHandle> {
    platform::sys_stdin()
}

/// Closes resources acquired by a failed build. The build error wins, so
/// close failures are only logged.
fn discard(waker: &mut dyn Wake, input: Option<&Input>) {
    if let Err(e) = waker.close() {
        tracing::warn!(error = %e, "closing wake channel after failed build");
    }

    if let Some(Input::Owned(handle)) = input {
        if let Err(e) = platform::sys_close(*handle) {
            tracing::warn!(error = %e, "closing input after failed build");
        }
    }
}
