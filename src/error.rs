use std::io;

use thiserror::Error;

/// Errors reported by [`StdinReader`](crate::StdinReader).
///
/// End of input, timeouts and interrupts are not errors; they are
/// reported through [`ReadOutcome`](crate::ReadOutcome).
#[derive(Debug, Error)]
pub enum Error {
    /// An OS resource needed to build the reader could not be acquired.
    #[error("unable to create {resource}: {source}")]
    Resource {
        resource: &'static str,
        source: io::Error,
    },

    /// A wait, read, write or close failed on an initialized reader.
    #[error("{operation} failed: {source}")]
    Io {
        operation: &'static str,
        source: io::Error,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn resource(resource: &'static str, source: io::Error) -> Self {
        Error::Resource { resource, source }
    }

    pub(crate) fn io(operation: &'static str, source: io::Error) -> Self {
        Error::Io { operation, source }
    }

    /// Returns the underlying OS error code, untranslated.
    pub fn raw_os_error(&self) -> Option<i32> {
        self.source_io().raw_os_error()
    }

    /// Returns the error as a nonzero status code.
    ///
    /// This is the raw OS error code when one is available, `-1` otherwise.
    /// A status of `0` always means success to callers, so it is never
    /// produced here.
    pub fn code(&self) -> i32 {
        match self.raw_os_error() {
            Some(0) | None => -1,
            Some(code) => code,
        }
    }

    /// Returns `true` if the error happened while building the reader.
    pub fn is_resource(&self) -> bool {
        matches!(self, Error::Resource { .. })
    }

    /// Returns the underlying I/O error.
    pub fn source_io(&self) -> &io::Error {
        match self {
            Error::Resource { source, .. } | Error::Io { source, .. } => source,
        }
    }
}
