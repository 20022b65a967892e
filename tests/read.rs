#![cfg(unix)]

use interruptible_stdin::{Multiplexer, ReadOutcome, ReaderBuilder, StdinReader, WakeChannel};
use std::fs::File;
use std::io::Write;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::thread;
use std::time::{Duration, Instant};

/// Every multiplexer / wake channel pairing available on this target.
fn configurations() -> Vec<(Multiplexer, WakeChannel)> {
    let mut configs = vec![
        (Multiplexer::Poll, WakeChannel::Pipe),
        (Multiplexer::Select, WakeChannel::Pipe),
    ];

    #[cfg(any(target_os = "linux", target_os = "android"))]
    configs.extend([
        (Multiplexer::Poll, WakeChannel::EventFd),
        (Multiplexer::Select, WakeChannel::EventFd),
    ]);

    configs
}

/// A reader over the read end of a fresh pipe, plus the write end.
fn pipe_reader(multiplexer: Multiplexer, wake_channel: WakeChannel) -> (StdinReader, File) {
    let mut fds = [-1; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(rc, 0, "Failed to create pipe");

    let (rx, tx) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

    let reader = ReaderBuilder::new()
        .input_fd(rx)
        .multiplexer(multiplexer)
        .wake_channel(wake_channel)
        .build()
        .expect("Failed to build reader");

    (reader, File::from(tx))
}

#[test]
fn test_available_bytes_are_returned() {
    for (mux, wake) in configurations() {
        let (reader, mut writer) = pipe_reader(mux, wake);
        writer.write_all(b"hello").expect("Failed to write");

        let mut buffer = [0u8; 10];
        let outcome = reader.read(&mut buffer).expect("Failed to read");

        assert_eq!(outcome, ReadOutcome::Data(5), "{mux:?}/{wake:?}");
        assert_eq!(&buffer[..5], b"hello");

        reader.release().expect("Failed to release");
    }
}

#[test]
fn test_read_is_bounded_by_buffer_length() {
    let (reader, mut writer) = pipe_reader(Multiplexer::Poll, WakeChannel::Pipe);
    writer.write_all(b"abcdefgh").expect("Failed to write");

    let mut buffer = [0u8; 3];
    assert_eq!(reader.read(&mut buffer).unwrap(), ReadOutcome::Data(3));
    assert_eq!(&buffer, b"abc");

    let mut rest = [0u8; 16];
    assert_eq!(reader.read(&mut rest).unwrap(), ReadOutcome::Data(5));
    assert_eq!(&rest[..5], b"defgh");

    reader.release().unwrap();
}

#[test]
fn test_closed_input_is_end_of_input() {
    for (mux, wake) in configurations() {
        let (reader, writer) = pipe_reader(mux, wake);
        drop(writer);

        let mut buffer = [0u8; 10];
        let outcome = reader.read(&mut buffer).expect("Failed to read");

        assert_eq!(outcome, ReadOutcome::EndOfInput, "{mux:?}/{wake:?}");
        assert_eq!(outcome.count(), -1);

        reader.release().expect("Failed to release");
    }
}

#[test]
fn test_data_then_end_of_input() {
    let (reader, mut writer) = pipe_reader(Multiplexer::Poll, WakeChannel::Pipe);
    writer.write_all(b"bye").unwrap();
    drop(writer);

    let mut buffer = [0u8; 8];
    assert_eq!(reader.read(&mut buffer).unwrap(), ReadOutcome::Data(3));
    assert_eq!(reader.read(&mut buffer).unwrap(), ReadOutcome::EndOfInput);
    // End of input is sticky.
    assert_eq!(reader.read(&mut buffer).unwrap(), ReadOutcome::EndOfInput);

    reader.release().unwrap();
}

#[test]
fn test_interrupt_wakes_a_blocked_read() {
    for (mux, wake) in configurations() {
        let (reader, _writer) = pipe_reader(mux, wake);

        let (outcome, elapsed) = thread::scope(|s| {
            let handle = s.spawn(|| {
                let mut buffer = [0u8; 16];
                let start = Instant::now();
                let outcome = reader.read_with_timeout(&mut buffer, Duration::from_secs(5));
                (outcome, start.elapsed())
            });

            thread::sleep(Duration::from_millis(10));
            reader.interrupt().expect("Failed to interrupt");

            handle.join().expect("Reader thread panicked")
        });

        assert_eq!(outcome.unwrap(), ReadOutcome::NoData, "{mux:?}/{wake:?}");
        assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");

        reader.release().unwrap();
    }
}

#[test]
fn test_interrupt_wakes_an_unbounded_read() {
    let (reader, _writer) = pipe_reader(Multiplexer::Poll, WakeChannel::Pipe);

    let outcome = thread::scope(|s| {
        let handle = s.spawn(|| {
            let mut buffer = [0u8; 16];
            reader.read(&mut buffer)
        });

        thread::sleep(Duration::from_millis(10));
        reader.interrupt().expect("Failed to interrupt");

        handle.join().expect("Reader thread panicked")
    });

    assert_eq!(outcome.unwrap(), ReadOutcome::NoData);
    reader.release().unwrap();
}

#[test]
fn test_timeout_returns_no_data_after_deadline() {
    for (mux, wake) in configurations() {
        let (reader, _writer) = pipe_reader(mux, wake);
        let timeout = Duration::from_millis(100);

        let mut buffer = [0u8; 16];
        let start = Instant::now();
        let outcome = reader
            .read_with_timeout(&mut buffer, timeout)
            .expect("Failed to read");
        let elapsed = start.elapsed();

        assert_eq!(outcome, ReadOutcome::NoData, "{mux:?}/{wake:?}");
        assert_eq!(outcome.count(), 0);
        assert!(elapsed >= timeout, "returned early after {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");

        reader.release().unwrap();
    }
}

#[test]
fn test_zero_timeout_polls_once() {
    let (reader, mut writer) = pipe_reader(Multiplexer::Poll, WakeChannel::Pipe);
    let mut buffer = [0u8; 4];

    assert_eq!(
        reader.read_with_timeout(&mut buffer, Duration::ZERO).unwrap(),
        ReadOutcome::NoData
    );

    writer.write_all(b"k").unwrap();
    assert_eq!(
        reader.read_with_timeout(&mut buffer, Duration::ZERO).unwrap(),
        ReadOutcome::Data(1)
    );

    reader.release().unwrap();
}

#[test]
fn test_huge_timeout_waits_without_overflow() {
    for (mux, wake) in configurations() {
        let (reader, mut writer) = pipe_reader(mux, wake);
        let mut buffer = [0u8; 8];

        writer.write_all(b"abc").expect("Failed to write");
        assert_eq!(
            reader
                .read_with_timeout(&mut buffer, Duration::MAX)
                .expect("Failed to read"),
            ReadOutcome::Data(3),
            "{mux:?}/{wake:?}"
        );

        // Nothing pending: the wait is effectively unbounded until woken.
        reader.interrupt().expect("Failed to interrupt");
        assert_eq!(
            reader.read_with_timeout(&mut buffer, Duration::MAX).unwrap(),
            ReadOutcome::NoData
        );

        reader.release().unwrap();
    }
}

#[test]
fn test_early_interrupts_are_consumed_once() {
    for (mux, wake) in configurations() {
        let (reader, mut writer) = pipe_reader(mux, wake);
        let mut buffer = [0u8; 16];

        for _ in 0..3 {
            reader.interrupt().expect("Failed to interrupt");
        }

        let start = Instant::now();
        let first = reader
            .read_with_timeout(&mut buffer, Duration::from_secs(5))
            .unwrap();
        assert_eq!(first, ReadOutcome::NoData);
        assert!(start.elapsed() < Duration::from_secs(2));

        // The pending wakes are gone: this one runs to its timeout.
        let start = Instant::now();
        let second = reader
            .read_with_timeout(&mut buffer, Duration::from_millis(50))
            .unwrap();
        assert_eq!(second, ReadOutcome::NoData);
        assert!(start.elapsed() >= Duration::from_millis(50), "{mux:?}/{wake:?}");

        writer.write_all(b"ok").unwrap();
        assert_eq!(reader.read(&mut buffer).unwrap(), ReadOutcome::Data(2));

        reader.release().unwrap();
    }
}

#[test]
fn test_input_wins_over_pending_wake() {
    let (reader, mut writer) = pipe_reader(Multiplexer::Poll, WakeChannel::Pipe);
    let mut buffer = [0u8; 16];

    writer.write_all(b"x").unwrap();
    reader.interrupt().unwrap();

    assert_eq!(reader.read(&mut buffer).unwrap(), ReadOutcome::Data(1));
    assert_eq!(reader.read(&mut buffer).unwrap(), ReadOutcome::NoData);

    reader.release().unwrap();
}

#[test]
fn test_many_interrupts_never_block() {
    let (reader, _writer) = pipe_reader(Multiplexer::Poll, WakeChannel::Pipe);

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..50_000 {
                    reader.interrupt().expect("Failed to interrupt");
                }
            });
        }
    });

    let mut buffer = [0u8; 16];
    assert_eq!(reader.read(&mut buffer).unwrap(), ReadOutcome::NoData);
    assert_eq!(
        reader
            .read_with_timeout(&mut buffer, Duration::from_millis(20))
            .unwrap(),
        ReadOutcome::NoData
    );

    reader.release().unwrap();
}

#[test]
fn test_reader_loop_exits_on_interrupt() {
    let (reader, mut writer) = pipe_reader(Multiplexer::Poll, WakeChannel::Pipe);

    let received = thread::scope(|s| {
        let handle = s.spawn(|| {
            let mut received = Vec::new();
            let mut buffer = [0u8; 4];
            loop {
                match reader.read(&mut buffer).expect("Failed to read") {
                    ReadOutcome::Data(n) => received.extend_from_slice(&buffer[..n]),
                    ReadOutcome::NoData | ReadOutcome::EndOfInput => break received,
                }
            }
        });

        writer.write_all(b"stream").unwrap();
        thread::sleep(Duration::from_millis(50));
        reader.interrupt().unwrap();

        handle.join().expect("Reader thread panicked")
    });

    assert_eq!(received, b"stream");
    reader.release().unwrap();
}

#[test]
fn test_regular_file_path() {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(b"hello world").unwrap();
    file.flush().unwrap();

    let reader = StdinReader::init(Some(file.path())).expect("Failed to open path");
    assert!(reader.owns_input());

    let mut buffer = [0u8; 32];
    assert_eq!(reader.read(&mut buffer).unwrap(), ReadOutcome::Data(11));
    assert_eq!(&buffer[..11], b"hello world");
    assert_eq!(reader.read(&mut buffer).unwrap(), ReadOutcome::EndOfInput);

    reader.release().expect("Failed to release");
}

#[test]
fn test_missing_path_is_a_resource_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent");

    let err = StdinReader::init(Some(&missing))
        .err()
        .expect("Opening a missing path should fail");

    assert!(err.is_resource());
    assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    assert_eq!(err.code(), libc::ENOENT);
}

#[test]
fn test_stdin_is_adopted() {
    let reader = StdinReader::init(None).expect("Failed to adopt stdin");

    assert!(!reader.owns_input());
    assert_eq!(reader.as_raw_fd(), libc::STDIN_FILENO);
    assert_eq!(reader.wake_mechanism(), "pipe");
    assert!(reader.max_watched_descriptor() >= libc::STDIN_FILENO);

    reader.release().expect("Failed to release");
}

#[cfg(any(target_os = "linux", target_os = "android"))]
#[test]
fn test_eventfd_channel_is_selectable() {
    let reader = ReaderBuilder::new()
        .wake_channel(WakeChannel::EventFd)
        .build()
        .unwrap();

    assert_eq!(reader.wake_mechanism(), "eventfd");
    reader.release().unwrap();
}
