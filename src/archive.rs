//! Archive client plumbing: link resolution, session headers, metrics, and the
//! candidate walk that turns a round into its log lines.

pub mod auth;
pub mod client;
pub mod links;
pub mod metrics;
pub mod options;

pub use client::{ArchiveClient, ArchiveError, RoundFetcher};
pub use links::{archive_server_name, LinkResolver};
pub use metrics::ArchiveMetricsSnapshot;
pub use options::ArchiveClientOptions;
