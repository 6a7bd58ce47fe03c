use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Output goes to stderr so it never mixes with log files written to stdout.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Rolling counters describing what the pipeline wrote.
#[derive(Default, Debug)]
pub struct Telemetry {
    rounds_written: AtomicU64,
    rounds_missing: AtomicU64,
    round_start_suicides: AtomicU64,
    lines_written: AtomicU64,
    lines_filtered: AtomicU64,
}

impl Telemetry {
    pub fn record_round_written(&self, kept: u64, dropped: u64) {
        self.rounds_written.fetch_add(1, Ordering::Relaxed);
        self.lines_written.fetch_add(kept, Ordering::Relaxed);
        self.lines_filtered.fetch_add(dropped, Ordering::Relaxed);
    }

    pub fn record_round_missing(&self) {
        self.rounds_missing.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_round_start_suicide(&self) {
        self.round_start_suicides.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            rounds_written: self.rounds_written.load(Ordering::Relaxed),
            rounds_missing: self.rounds_missing.load(Ordering::Relaxed),
            round_start_suicides: self.round_start_suicides.load(Ordering::Relaxed),
            lines_written: self.lines_written.load(Ordering::Relaxed),
            lines_filtered: self.lines_filtered.load(Ordering::Relaxed),
        }
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written.load(Ordering::Relaxed)
    }

    pub fn rounds_missing(&self) -> u64 {
        self.rounds_missing.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub rounds_written: u64,
    pub rounds_missing: u64,
    pub round_start_suicides: u64,
    pub lines_written: u64,
    pub lines_filtered: u64,
}
