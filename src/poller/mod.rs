//! Platform-specific wait and wake primitives.
//!
//! This module provides a unified interface over the OS mechanisms the
//! reader multiplexes:
//! - a blocking wait over the input handle and a wake handle,
//! - a wake channel another thread can signal,
//! - thin error-returning wrappers over open/read/close.
//!
//! The concrete implementation is selected at compile time
//! depending on the target operating system.

pub(crate) mod common;

pub(crate) use common::{Deadline, Readiness, Wake};

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;

#[cfg(unix)]
mod pipe;

#[cfg(unix)]
pub(crate) use pipe::PipeWaker;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod eventfd;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) use eventfd::EventFdWaker;

#[cfg(windows)]
pub(crate) mod windows;

#[cfg(windows)]
pub(crate) use windows as platform;

#[cfg(windows)]
pub(crate) use windows::EventWaker;
