//! Concurrent fetching with ordered delivery, progress reporting, and the driver that
//! writes tagged lines to the output sink.

pub mod coordinator;
pub mod outcome_buffer;
pub mod progress;
pub mod round;
pub mod writer;
