#![forbid(unsafe_code)]

//! Deterministic fixtures for randomized scenario tests.
//!
//! Centralizes seed selection, run ids and JSONL output so a failing
//! scenario can be replayed by exporting its seed:
//!
//! - `TETHER_TEST_SEED` / `E2E_SEED`: seed override.
//! - `TETHER_TEST_DETERMINISTIC` / `E2E_DETERMINISTIC`: stable run ids and
//!   counter timestamps instead of wall-clock ones.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};

/// Shared deterministic fixture for a test run.
#[derive(Debug)]
pub struct DeterminismFixture {
    seed: u64,
    deterministic: bool,
    run_id: String,
    ts_counter: AtomicU64,
}

impl DeterminismFixture {
    /// Create a fixture configured from the environment.
    pub fn new(prefix: &str, default_seed: u64) -> Self {
        Self::new_with(prefix, fixture_seed(default_seed), deterministic_mode())
    }

    /// Create a fixture with explicit configuration.
    pub fn new_with(prefix: &str, seed: u64, deterministic: bool) -> Self {
        let run_id = if deterministic {
            format!("{prefix}_seed{seed}")
        } else {
            format!("{prefix}_{}_{}", std::process::id(), unix_secs())
        };
        Self {
            seed,
            deterministic,
            run_id,
            ts_counter: AtomicU64::new(0),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn deterministic(&self) -> bool {
        self.deterministic
    }

    /// Stable run identifier for JSONL logs.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Counter timestamp in deterministic mode, wall time otherwise.
    pub fn timestamp(&self) -> String {
        if self.deterministic {
            let n = self.ts_counter.fetch_add(1, Ordering::Relaxed);
            format!("T{n:06}")
        } else {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default();
            format!("{}.{:03}", now.as_secs(), now.subsec_millis())
        }
    }

    /// A generator seeded from this fixture.
    pub fn rng(&self) -> SplitMix64 {
        SplitMix64::new(self.seed)
    }
}

/// Small deterministic PRNG for scenario generation.
#[derive(Debug, Clone)]
pub struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform-ish value in `0..bound`. `bound` of zero yields zero.
    pub fn below(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        self.next_u64() % bound
    }

    pub fn chance(&mut self, numerator: u64, denominator: u64) -> bool {
        self.below(denominator) < numerator
    }
}

/// Deterministic JSONL logger for scenario tests.
#[derive(Debug)]
pub struct TestJsonlLogger {
    fixture: DeterminismFixture,
    seq: AtomicU64,
}

impl TestJsonlLogger {
    pub fn new(prefix: &str, default_seed: u64) -> Self {
        Self::with_fixture(DeterminismFixture::new(prefix, default_seed))
    }

    pub fn with_fixture(fixture: DeterminismFixture) -> Self {
        Self {
            fixture,
            seq: AtomicU64::new(0),
        }
    }

    pub fn fixture(&self) -> &DeterminismFixture {
        &self.fixture
    }

    /// Build a JSONL line. Explicit `fields` override the default `run_id`
    /// and `seed` fields.
    pub fn emit_line(&self, event: &str, fields: &[(&str, Value)]) -> String {
        let mut line = Map::new();
        line.insert(
            "seq".into(),
            Value::from(self.seq.fetch_add(1, Ordering::Relaxed)),
        );
        line.insert("ts".into(), Value::from(self.fixture.timestamp()));
        line.insert("event".into(), Value::from(event));
        line.insert("run_id".into(), Value::from(self.fixture.run_id()));
        line.insert("seed".into(), Value::from(self.fixture.seed()));
        for (key, value) in fields {
            line.insert((*key).to_string(), value.clone());
        }
        Value::Object(line).to_string()
    }

    /// Emit a JSONL line to stderr.
    pub fn log(&self, event: &str, fields: &[(&str, Value)]) {
        eprintln!("{}", self.emit_line(event, fields));
    }
}

/// True when deterministic mode is enabled via environment.
pub fn deterministic_mode() -> bool {
    env_flag("TETHER_TEST_DETERMINISTIC") || env_flag("E2E_DETERMINISTIC")
}

/// Seed from the environment, or `default_seed`.
pub fn fixture_seed(default_seed: u64) -> u64 {
    env_u64("TETHER_TEST_SEED")
        .or_else(|| env_u64("E2E_SEED"))
        .unwrap_or(default_seed)
}

pub(crate) fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

pub(crate) fn env_flag(key: &str) -> bool {
    matches!(
        std::env::var(key).as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE")
    )
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
