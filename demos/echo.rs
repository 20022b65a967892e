//! Echoes standard input as hex until interrupted.
//!
//! ```text
//! RUST_LOG=trace cargo run --example echo -- 3
//! ```
//!
//! The reader thread polls stdin with a short timeout; the main thread
//! interrupts it after the given number of seconds (default 5).

use interruptible_stdin::{ReadOutcome, StdinReader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let seconds: u64 = std::env::args()
        .nth(1)
        .map(|arg| arg.parse())
        .transpose()?
        .unwrap_or(5);

    let reader = StdinReader::init(None)?;
    let stop = AtomicBool::new(false);

    thread::scope(|s| {
        let echo = s.spawn(|| -> interruptible_stdin::Result<()> {
            let mut buffer = [0u8; 64];

            loop {
                match reader.read_with_timeout(&mut buffer, Duration::from_millis(250))? {
                    ReadOutcome::Data(n) => {
                        let hex: Vec<String> =
                            buffer[..n].iter().map(|b| format!("{b:02x}")).collect();
                        println!("{}", hex.join(" "));
                    }
                    ReadOutcome::EndOfInput => {
                        println!("<end of input>");
                        return Ok(());
                    }
                    ReadOutcome::NoData if stop.load(Ordering::Acquire) => {
                        println!("<interrupted>");
                        return Ok(());
                    }
                    ReadOutcome::NoData => {}
                }
            }
        });

        thread::sleep(Duration::from_secs(seconds));
        stop.store(true, Ordering::Release);
        reader.interrupt()?;

        echo.join().expect("echo thread panicked")
    })?;

    reader.release()?;
    Ok(())
}
