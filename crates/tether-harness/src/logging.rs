#![forbid(unsafe_code)]

//! `tracing` setup for tests.
//!
//! [`init_tracing`] installs a process-wide fmt subscriber routed through the
//! test writer. Filter directives come from `TETHER_LOG`, then `RUST_LOG`,
//! and default to `warn`. Setting `TETHER_LOG_JSON=1` switches to JSON lines.
//!
//! [`capture_logs`] runs a closure under a scoped subscriber and returns what
//! it logged, for assertions on log output.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::determinism::env_flag;

/// Install the global test subscriber. Repeated calls are no-ops.
pub fn init_tracing() {
    let builder = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(env_filter());
    let _ = if env_flag("TETHER_LOG_JSON") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("TETHER_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

#[derive(Clone, Default)]
struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl io::Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a thread-scoped subscriber at `level` and return its result
/// together with the plain-text log output.
pub fn capture_logs<R>(level: Level, f: impl FnOnce() -> R) -> (R, String) {
    let buffer = CaptureBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .without_time()
        .with_writer(move || writer.clone())
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, buffer.contents())
}
