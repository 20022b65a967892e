//! # interruptible-stdin
//!
//! **interruptible-stdin** is a blocking standard-input reader that another
//! thread can wake up at any time, without closing or disturbing the input
//! stream.
//!
//! A read waits on two handles at once: the input, and a private wake
//! channel (the "self-pipe trick"). Writing to the wake channel from any
//! thread ends the wait. Every read reports exactly one of:
//!
//! - **data**: some bytes were read,
//! - **no data**: the read timed out or was interrupted,
//! - **end of input**: the stream is closed,
//!
//! and OS failures are reported separately as [`Error`]s carrying the raw
//! error code.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use interruptible_stdin::{ReadOutcome, StdinReader};
//! use std::time::Duration;
//!
//! let reader = StdinReader::init(None)?;
//! let mut buffer = [0u8; 256];
//!
//! match reader.read_with_timeout(&mut buffer, Duration::from_millis(500))? {
//!     ReadOutcome::Data(n) => println!("read {n} bytes"),
//!     ReadOutcome::NoData => println!("nothing yet"),
//!     ReadOutcome::EndOfInput => println!("stdin closed"),
//! }
//!
//! reader.release()?;
//! # Ok::<(), interruptible_stdin::Error>(())
//! ```
//!
//! ## Platforms
//!
//! - Unix: `poll(2)` or `select(2)`, with a pipe or (Linux) `eventfd` wake
//!   channel.
//! - Windows: `WaitForMultipleObjects` with an event object.

mod builder;
mod error;
mod poller;
mod reader;

#[cfg(unix)]
pub use builder::Multiplexer;
pub use builder::{ReaderBuilder, WakeChannel};
pub use error::{Error, Result};
pub use reader::{ReadOutcome, StdinReader};
