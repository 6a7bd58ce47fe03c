//! Runtime glue that wires configs, downloader strategies, telemetry, and
//! runner orchestration.

pub mod config;
pub mod runner;
pub mod strategy;
pub mod telemetry;
