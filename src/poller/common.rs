use super::platform::RawHandle;

use std::io;
use std::time::{Duration, Instant};

/// Outcome of a single multiplexed wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    /// The input handle is readable (data, end of input, or a pending error).
    Input,

    /// The wake channel was signalled.
    Wake,

    /// The timeout elapsed with nothing ready.
    TimedOut,
}

/// A private signalling channel that can interrupt a blocked wait.
///
/// The reader adds [`watch_handle`](Wake::watch_handle) to every wait.
/// Any thread may call [`wake`](Wake::wake); only the reader thread
/// calls [`drain`](Wake::drain).
pub(crate) trait Wake: Send + Sync {
    /// Signals the channel. Must never block the caller.
    ///
    /// Runs inside signal handlers on POSIX: no allocation, locking or
    /// logging.
    fn wake(&self) -> io::Result<()>;

    /// Consumes every pending signal.
    fn drain(&self) -> io::Result<()>;

    /// Handle that becomes ready when the channel is signalled.
    fn watch_handle(&self) -> RawHandle;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Closes every endpoint, reporting the first failure.
    ///
    /// Called exactly once.
    fn close(&mut self) -> io::Result<()>;
}

/// Absolute deadline derived from an optional timeout.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    /// A timeout too large to represent as an instant waits forever.
    pub(crate) fn after(timeout: Option<Duration>) -> Self {
        Deadline(timeout.and_then(|t| Instant::now().checked_add(t)))
    }

    /// Time left before the deadline, `None` when waiting forever.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.0
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Remaining time in whole milliseconds, rounded up.
    ///
    /// Returns `None` when waiting forever. Rounding up keeps a wait from
    /// returning before the deadline.
    pub(crate) fn remaining_millis(&self) -> Option<u64> {
        self.remaining().map(|left| {
            let nanos = left.as_nanos();
            let millis = nanos.div_ceil(1_000_000);
            u64::try_from(millis).unwrap_or(u64::MAX)
        })
    }
}

/// Runs `f` under a subscriber that records every event, returning the
/// formatted output.
#[cfg(test)]
pub(crate) fn captured_logs(f: impl FnOnce()) -> String {
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let capture = Capture::default();
    let writer = capture.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    tracing::subscriber::with_default(subscriber, f);

    let bytes = capture.0.lock().unwrap().clone();
    String::from_utf8_lossy(&bytes).into_owned()
}
