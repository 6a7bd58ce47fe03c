//! Fan-out of per-round fetch tasks with in-order delivery.
//!
//! `FetchCoordinator::run` spawns one task per round immediately. Every task parks its
//! outcome in an [`OutcomeBuffer`] under the round's submission index, and the returned
//! [`OutcomeStream`] takes them back strictly by index. Completion order therefore never
//! leaks into the consumer-visible order.

use super::outcome_buffer::{OutcomeBuffer, BYTES_PER_MEGABYTE};
use super::round::{FetchOutcome, RoundDescriptor, RoundLog};
use crate::archive::client::RoundFetcher;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_BUFFERED_MB: usize = 256;

pub struct FetchCoordinator<F: RoundFetcher + 'static> {
    fetcher: Arc<F>,
    max_buffered_bytes: usize,
    shutdown_root: CancellationToken,
}

impl<F: RoundFetcher + 'static> FetchCoordinator<F> {
    pub fn new(fetcher: Arc<F>) -> Self {
        Self::with_cancellation_token(fetcher, CancellationToken::new())
    }

    /// Tasks spawned by [`Self::run`] observe a child of `shutdown_root`.
    pub fn with_cancellation_token(fetcher: Arc<F>, shutdown_root: CancellationToken) -> Self {
        Self {
            fetcher,
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_MB.saturating_mul(BYTES_PER_MEGABYTE),
            shutdown_root,
        }
    }

    pub fn max_buffered_mb(mut self, megabytes: usize) -> Self {
        self.max_buffered_bytes = megabytes.max(1).saturating_mul(BYTES_PER_MEGABYTE);
        self
    }

    pub fn fetcher(&self) -> &Arc<F> {
        &self.fetcher
    }

    /// Launches one fetch task per round and returns the ordered, single-pass stream of
    /// their outcomes.
    ///
    /// Must be called from within a tokio runtime.
    pub fn run<I>(&self, rounds: I) -> OutcomeStream
    where
        I: IntoIterator<Item = RoundDescriptor>,
    {
        let rounds: Vec<RoundDescriptor> = rounds.into_iter().collect();
        let buffer = Arc::new(OutcomeBuffer::new(rounds.len(), self.max_buffered_bytes));
        let run_token = self.shutdown_root.child_token();
        let handles: Vec<JoinHandle<()>> = rounds
            .into_iter()
            .enumerate()
            .map(|(idx, round)| {
                spawn_fetch_task(
                    self.fetcher.clone(),
                    buffer.clone(),
                    run_token.clone(),
                    idx as u64,
                    round,
                )
            })
            .collect();

        tracing::debug!(rounds = handles.len(), "spawned round fetch tasks");

        OutcomeStream {
            buffer,
            handles,
            run_token,
        }
    }
}

fn spawn_fetch_task<F: RoundFetcher + 'static>(
    fetcher: Arc<F>,
    buffer: Arc<OutcomeBuffer>,
    run_token: CancellationToken,
    index: u64,
    round: RoundDescriptor,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let fetch = AssertUnwindSafe(fetcher.fetch_round(&round)).catch_unwind();
        let log = tokio::select! {
            _ = run_token.cancelled() => return,
            result = fetch => match result {
                Ok(log) => log,
                Err(panic) => {
                    tracing::error!(
                        server = %round.server,
                        round_id = round.round_id,
                        panic = %panic_message(panic.as_ref()),
                        "round fetch panicked; treating round as absent"
                    );
                    RoundLog::Absent
                }
            },
        };

        tokio::select! {
            _ = run_token.cancelled() => {}
            _ = buffer.park(index, FetchOutcome::new(round, log)) => {}
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Lazy, single-pass sequence of [`FetchOutcome`]s in submission order.
///
/// Call [`Self::finish`] after the last outcome, or [`Self::shutdown`] to stop early. A
/// stream dropped without either cancels and aborts whatever is still running.
pub struct OutcomeStream {
    buffer: Arc<OutcomeBuffer>,
    handles: Vec<JoinHandle<()>>,
    run_token: CancellationToken,
}

impl OutcomeStream {
    /// Number of rounds submitted to this run.
    pub fn len(&self) -> usize {
        self.buffer.total_rounds()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of outcomes not yet yielded.
    pub fn remaining(&self) -> usize {
        self.buffer.remaining()
    }

    /// Waits for the next round in submission order. Returns `None` once every round has
    /// been yielded or the run was cancelled.
    pub async fn next(&mut self) -> Option<FetchOutcome> {
        tokio::select! {
            biased;
            outcome = self.buffer.next_in_order() => outcome,
            _ = self.run_token.cancelled() => None,
        }
    }

    /// Joins every spawned task. Intended after the last outcome has been consumed; any
    /// rounds still unconsumed at this point are cancelled rather than awaited.
    pub async fn finish(mut self) {
        if self.remaining() > 0 {
            tracing::warn!(
                remaining = self.remaining(),
                "finishing round stream before every outcome was consumed"
            );
            self.run_token.cancel();
        }
        self.join_tasks().await;
        tracing::debug!(rounds = self.len(), "round fetch tasks drained");
    }

    /// Cancels in-flight tasks, waits for them to exit and drops buffered outcomes.
    pub async fn shutdown(mut self) {
        self.run_token.cancel();
        self.join_tasks().await;
        let dropped = self.buffer.discard_parked();
        if dropped > 0 {
            tracing::info!(
                dropped_outcomes = dropped,
                "dropped buffered round logs after shutdown"
            );
        }
    }

    async fn join_tasks(&mut self) {
        let handles = std::mem::take(&mut self.handles);
        let results = futures::future::join_all(handles).await;
        for (idx, result) in results.into_iter().enumerate() {
            if let Err(err) = result {
                if !err.is_cancelled() {
                    tracing::warn!(task = idx, error = %err, "round fetch task terminated unexpectedly");
                }
            }
        }
    }
}

impl Drop for OutcomeStream {
    fn drop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        self.run_token.cancel();
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}
