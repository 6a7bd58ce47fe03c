use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use bytes::Bytes;
use once_cell::sync::Lazy;
use roundlogs::{LineFilter, LogDownloader, RoundDescriptor, RoundListFuture};
use std::io::{BufRead, Write};
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// Unique path under the system temp dir; the caller removes it.
pub fn scratch_path(label: &str) -> PathBuf {
    let sequence = SCRATCH_COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "roundlogs-{label}-{}-{sequence}.log",
        std::process::id()
    ))
}

pub async fn read_output(path: &PathBuf) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    String::from_utf8(bytes).context("output is not UTF-8")
}

/// Downloader with a fixed round list and a substring filter.
pub struct ListDownloader {
    rounds: Vec<RoundDescriptor>,
    needle: Option<&'static [u8]>,
    credential: Option<String>,
    pub list_requests: usize,
}

impl ListDownloader {
    pub fn new(rounds: Vec<RoundDescriptor>) -> Self {
        Self {
            rounds,
            needle: None,
            credential: None,
            list_requests: 0,
        }
    }

    pub fn keeping(mut self, needle: &'static [u8]) -> Self {
        self.needle = Some(needle);
        self
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }
}

impl LineFilter for ListDownloader {
    fn filter_lines(&self, lines: Vec<Bytes>) -> Vec<Bytes> {
        match self.needle {
            Some(needle) => lines
                .into_iter()
                .filter(|line| line.windows(needle.len()).any(|window| window == needle))
                .collect(),
            None => lines,
        }
    }
}

impl LogDownloader for ListDownloader {
    fn update_round_list(&mut self) -> RoundListFuture<'_> {
        Box::pin(async move {
            self.list_requests += 1;
            Ok(self.rounds.clone())
        })
    }

    fn authenticate(&mut self) -> Result<Option<String>> {
        Ok(self.credential.clone())
    }

    fn interactive(_input: &mut dyn BufRead, _output: &mut dyn Write) -> Result<Self> {
        Ok(Self::new(Vec::new()))
    }
}
