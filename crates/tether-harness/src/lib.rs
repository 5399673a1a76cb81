#![forbid(unsafe_code)]

//! Test harness and reference fixtures for tether.
//!
//! - [`spy`]: recording observers with structural assertions on the
//!   open/close stream.
//! - [`source`]: a subscribe-counting wrapper for multicast checks.
//! - [`determinism`]: seeds, run ids and JSONL lines for reproducible runs.
//! - [`logging`]: `tracing` subscriber setup for tests.

pub mod determinism;
pub mod logging;
pub mod source;
pub mod spy;

pub use determinism::{DeterminismFixture, SplitMix64, TestJsonlLogger};
pub use logging::{capture_logs, init_tracing};
pub use source::CountingSource;
pub use spy::{Event, Spy};
