//! Reorder buffer between the fetch tasks and the writer.
//!
//! Fetch tasks finish in any order and park their [`FetchOutcome`] under the round's
//! submission index. The single consumer takes them back strictly by index and the buffer
//! keeps the delivery count, so it alone knows how many rounds are still owed.
//!
//! Parked outcomes are bounded by a byte budget. The round the consumer is waiting on is
//! always admitted, whatever the budget says, otherwise a large early round behind a full
//! buffer would stall the run.

use super::round::FetchOutcome;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

pub const BYTES_PER_MEGABYTE: usize = 1_048_576;

struct Parked {
    outcome: FetchOutcome,
    bytes: usize,
}

struct Slots {
    delivered: u64,
    parked: BTreeMap<u64, Parked>,
    parked_bytes: usize,
}

impl Slots {
    fn admits(&self, index: u64, bytes: usize, budget: usize) -> bool {
        index == self.delivered || self.parked_bytes.saturating_add(bytes) <= budget
    }
}

pub struct OutcomeBuffer {
    slots: Mutex<Slots>,
    outcome_parked: Notify,
    space_freed: Notify,
    total_rounds: u64,
    budget_bytes: usize,
}

impl OutcomeBuffer {
    pub fn new(total_rounds: usize, budget_bytes: usize) -> Self {
        Self {
            slots: Mutex::new(Slots {
                delivered: 0,
                parked: BTreeMap::new(),
                parked_bytes: 0,
            }),
            outcome_parked: Notify::new(),
            space_freed: Notify::new(),
            total_rounds: total_rounds as u64,
            budget_bytes: budget_bytes.max(1),
        }
    }

    pub fn total_rounds(&self) -> usize {
        self.total_rounds as usize
    }

    /// Rounds handed to the consumer so far.
    pub fn delivered(&self) -> usize {
        self.slots().delivered as usize
    }

    pub fn remaining(&self) -> usize {
        self.total_rounds.saturating_sub(self.slots().delivered) as usize
    }

    /// Parks the outcome of round `index`, waiting for budget unless the consumer is
    /// already waiting on exactly this round.
    pub async fn park(&self, index: u64, outcome: FetchOutcome) {
        let bytes = outcome.queue_bytes();
        let mut outcome = Some(outcome);
        loop {
            let space_freed = self.space_freed.notified();
            tokio::pin!(space_freed);
            space_freed.as_mut().enable();

            {
                let mut slots = self.slots();
                if slots.admits(index, bytes, self.budget_bytes) {
                    if let Some(outcome) = outcome.take() {
                        slots.parked_bytes = slots.parked_bytes.saturating_add(bytes);
                        slots.parked.insert(index, Parked { outcome, bytes });
                    }
                    drop(slots);
                    self.outcome_parked.notify_one();
                    return;
                }
            }

            space_freed.await;
        }
    }

    /// Returns the next round in submission order, waiting for its fetch if needed.
    /// `None` once every round has been delivered.
    pub async fn next_in_order(&self) -> Option<FetchOutcome> {
        loop {
            {
                let mut slots = self.slots();
                if slots.delivered >= self.total_rounds {
                    return None;
                }
                let wanted = slots.delivered;
                if let Some(parked) = slots.parked.remove(&wanted) {
                    slots.delivered += 1;
                    slots.parked_bytes = slots.parked_bytes.saturating_sub(parked.bytes);
                    drop(slots);
                    self.space_freed.notify_waiters();
                    return Some(parked.outcome);
                }
            }

            self.outcome_parked.notified().await;
        }
    }

    /// Drops every parked outcome and returns how many there were.
    pub fn discard_parked(&self) -> usize {
        let mut slots = self.slots();
        let dropped = slots.parked.len();
        slots.parked.clear();
        slots.parked_bytes = 0;
        drop(slots);
        self.space_freed.notify_waiters();
        dropped
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
