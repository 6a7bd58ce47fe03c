pub mod archive;
pub mod pipeline;
pub mod runtime;

pub use archive::{ArchiveClient, ArchiveClientOptions, ArchiveError, LinkResolver, RoundFetcher};
pub use pipeline::coordinator::{FetchCoordinator, OutcomeStream};
pub use pipeline::outcome_buffer::OutcomeBuffer;
pub use pipeline::progress::{Diagnostic, RoundProgress};
pub use pipeline::round::{FetchOutcome, RoundDescriptor, RoundLog};
pub use pipeline::writer::{format_line, DriveSummary, PipelineDriver, ProgressMode};
pub use runtime::config::{DownloaderConfig, DownloaderConfigBuilder, DownloaderConfigParams};
pub use runtime::runner::Runner;
pub use runtime::strategy::{KeepAll, LineFilter, LogDownloader, RoundListFuture};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
