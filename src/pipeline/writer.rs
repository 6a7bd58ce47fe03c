//! Drives the fetch coordinator and writes kept lines to the output sink.

use super::coordinator::{FetchCoordinator, OutcomeStream};
use super::progress::{Diagnostic, RoundProgress};
use super::round::{RoundDescriptor, RoundLog};
use crate::archive::client::RoundFetcher;
use crate::runtime::strategy::LineFilter;
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use bytes::Bytes;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Separator between the round tag and the unmodified log line.
pub const LINE_TAG_SEPARATOR: &[u8] = b" | ";

/// Formats `line` as `{server} {round_id} | {line}\n`.
pub fn format_line(round: &RoundDescriptor, line: &[u8]) -> Vec<u8> {
    let prefix = format!("{} {}", round.server, round.round_id);
    let mut formatted =
        Vec::with_capacity(prefix.len() + LINE_TAG_SEPARATOR.len() + line.len() + 1);
    formatted.extend_from_slice(prefix.as_bytes());
    formatted.extend_from_slice(LINE_TAG_SEPARATOR);
    formatted.extend_from_slice(line);
    formatted.push(b'\n');
    formatted
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressMode {
    #[default]
    Hidden,
    Stderr,
}

impl ProgressMode {
    fn build(self, total_rounds: usize) -> RoundProgress {
        match self {
            ProgressMode::Hidden => RoundProgress::hidden(total_rounds),
            ProgressMode::Stderr => RoundProgress::stderr(total_rounds),
        }
    }
}

/// What one drive produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriveSummary {
    pub rounds: usize,
    pub rounds_written: usize,
    pub lines_written: u64,
    pub lines_filtered: u64,
    pub diagnostics: Vec<Diagnostic>,
    pub interrupted: bool,
}

impl DriveSummary {
    fn new(rounds: usize) -> Self {
        Self {
            rounds,
            ..Self::default()
        }
    }

    pub fn missing_rounds(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|diagnostic| matches!(diagnostic, Diagnostic::Missing { .. }))
    }
}

pub struct PipelineDriver<F: RoundFetcher + 'static> {
    coordinator: FetchCoordinator<F>,
    telemetry: Arc<Telemetry>,
    progress_mode: ProgressMode,
}

impl<F: RoundFetcher + 'static> PipelineDriver<F> {
    pub fn new(coordinator: FetchCoordinator<F>) -> Self {
        Self {
            coordinator,
            telemetry: Arc::new(Telemetry::default()),
            progress_mode: ProgressMode::default(),
        }
    }

    pub fn with_progress(mut self, mode: ProgressMode) -> Self {
        self.progress_mode = mode;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Fetches `rounds` concurrently and writes the lines kept by `filter` to `sink` in
    /// round order.
    ///
    /// Missing rounds are reported and skipped. A sink error cancels and joins every
    /// in-flight fetch before it is returned. Cancelling `shutdown` stops the drive early
    /// and marks the summary as interrupted.
    pub async fn drive<I, L, W>(
        &self,
        rounds: I,
        filter: &L,
        sink: &mut W,
        shutdown: &CancellationToken,
    ) -> Result<DriveSummary>
    where
        I: IntoIterator<Item = RoundDescriptor>,
        L: LineFilter + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut stream = self.coordinator.run(rounds);
        let progress = self.progress_mode.build(stream.len());
        let mut summary = DriveSummary::new(stream.len());

        tracing::info!(rounds = summary.rounds, "downloading round logs");

        let written = self
            .write_outcomes(&mut stream, filter, sink, &progress, &mut summary, shutdown)
            .await;

        match written {
            Ok(()) if summary.interrupted => {
                stream.shutdown().await;
                progress.finish_with_message("interrupted");
                tracing::info!(
                    rounds_written = summary.rounds_written,
                    "round log download interrupted"
                );
                Ok(summary)
            }
            Ok(()) => {
                stream.finish().await;
                progress.finish_with_message("done");
                tracing::info!(
                    rounds_written = summary.rounds_written,
                    rounds_missing = summary.missing_rounds().count(),
                    lines_written = summary.lines_written,
                    "round log download complete"
                );
                Ok(summary)
            }
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "output sink failed; cancelling fetches");
                stream.shutdown().await;
                progress.finish_with_message("aborted");
                Err(err)
            }
        }
    }

    async fn write_outcomes<L, W>(
        &self,
        stream: &mut OutcomeStream,
        filter: &L,
        sink: &mut W,
        progress: &RoundProgress,
        summary: &mut DriveSummary,
        shutdown: &CancellationToken,
    ) -> Result<()>
    where
        L: LineFilter + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        loop {
            let outcome = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    summary.interrupted = true;
                    break;
                }
                next = stream.next() => match next {
                    Some(outcome) => outcome,
                    None => {
                        summary.interrupted = stream.remaining() > 0;
                        break;
                    }
                },
            };

            let (round, log) = outcome.into_parts();
            progress.start_round(&round);

            match log {
                RoundLog::Absent => {
                    self.telemetry.record_round_missing();
                    self.report(progress, summary, Diagnostic::missing(&round));
                }
                RoundLog::Present(lines) => {
                    if round.round_start_suicide {
                        self.telemetry.record_round_start_suicide();
                        self.report(progress, summary, Diagnostic::round_start_suicide(&round));
                    }
                    self.write_round(&round, lines, filter, sink, summary).await?;
                }
            }

            progress.finish_round();
        }

        sink.flush().await.context("failed to flush output")?;
        Ok(())
    }

    async fn write_round<L, W>(
        &self,
        round: &RoundDescriptor,
        lines: Vec<Bytes>,
        filter: &L,
        sink: &mut W,
        summary: &mut DriveSummary,
    ) -> Result<()>
    where
        L: LineFilter + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let total = lines.len() as u64;
        let kept = filter.filter_lines(lines);
        for line in &kept {
            sink.write_all(&format_line(round, line))
                .await
                .with_context(|| {
                    format!(
                        "failed to write output for round {} on {}",
                        round.round_id, round.server
                    )
                })?;
        }

        let kept_count = kept.len() as u64;
        let dropped = total.saturating_sub(kept_count);
        self.telemetry.record_round_written(kept_count, dropped);
        summary.rounds_written += 1;
        summary.lines_written += kept_count;
        summary.lines_filtered += dropped;
        Ok(())
    }

    fn report(&self, progress: &RoundProgress, summary: &mut DriveSummary, diagnostic: Diagnostic) {
        progress.report(&diagnostic);
        summary.diagnostics.push(diagnostic);
    }
}
