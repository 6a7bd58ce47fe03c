//! Archive client implementation and the `RoundFetcher` abstraction consumed by the
//! fetch coordinator. Houses the `ArchiveClient`, its candidate error types, and the
//! first-success candidate walk.

use crate::archive::auth::build_session_headers;
use crate::archive::links::{LinkResolver, DEFAULT_ARCHIVE_BASE_URL};
use crate::archive::metrics::{ArchiveMetrics, ArchiveMetricsSnapshot};
use crate::archive::options::ArchiveClientOptions;
use crate::pipeline::round::{split_lines, RoundDescriptor, RoundLog};
use crate::runtime::config::DownloaderConfig;
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tokio::time::{timeout, Instant};

#[derive(Debug)]
pub enum ArchiveError {
    Timeout,
    Status { status: StatusCode },
    EmptyBody,
}

impl std::fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveError::Timeout => write!(f, "archive request timed out"),
            ArchiveError::Status { status } => {
                write!(f, "archive responded with status {status}")
            }
            ArchiveError::EmptyBody => write!(f, "archive returned an empty log"),
        }
    }
}

impl std::error::Error for ArchiveError {}

/// Fetches the log of a single round. Implementations never fail: every problem is
/// folded into [`RoundLog::Absent`].
pub trait RoundFetcher: Send + Sync {
    fn fetch_round<'a>(&'a self, round: &'a RoundDescriptor) -> BoxFuture<'a, RoundLog>;
}

/// HTTP client for the round log archive. Cheap to clone; the session headers are
/// shared read-only by every concurrent fetch.
#[derive(Debug, Clone)]
pub struct ArchiveClient {
    client: Client,
    resolver: Arc<LinkResolver>,
    options: ArchiveClientOptions,
    metrics: Arc<ArchiveMetrics>,
}

impl RoundFetcher for ArchiveClient {
    fn fetch_round<'a>(&'a self, round: &'a RoundDescriptor) -> BoxFuture<'a, RoundLog> {
        Box::pin(self.fetch_round(round))
    }
}

impl ArchiveClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_options(base_url, ArchiveClientOptions::default())
    }

    pub fn with_options(base_url: impl Into<String>, options: ArchiveClientOptions) -> Result<Self> {
        let resolver = LinkResolver::new(base_url, options.is_authenticated());
        Self::with_resolver(resolver, options)
    }

    pub fn with_resolver(resolver: LinkResolver, options: ArchiveClientOptions) -> Result<Self> {
        options.validate()?;

        let headers =
            build_session_headers(&options.user_agent, options.session_credential.as_deref())?;
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .build()
            .map_err(|err| anyhow!("failed to build archive HTTP client: {err}"))?;

        Ok(Self {
            client,
            resolver: Arc::new(resolver),
            options,
            metrics: Arc::new(ArchiveMetrics::default()),
        })
    }

    pub fn from_config(config: &DownloaderConfig) -> Result<Self> {
        config.validate()?;
        let options = ArchiveClientOptions {
            request_timeout: config.request_timeout(),
            user_agent: config.user_agent().to_owned(),
            session_credential: config.session_credential().map(str::to_owned),
            ..ArchiveClientOptions::default()
        };
        let resolver = LinkResolver::with_templates(
            config.archive_base_url().to_owned(),
            config.plain_template().to_owned(),
            config.authenticated_template().to_owned(),
            options.is_authenticated(),
        );
        Self::with_resolver(resolver, options)
    }

    pub fn anonymous() -> Result<Self> {
        Self::new(DEFAULT_ARCHIVE_BASE_URL)
    }

    pub fn resolver(&self) -> &LinkResolver {
        &self.resolver
    }

    pub fn options(&self) -> &ArchiveClientOptions {
        &self.options
    }

    pub fn metrics(&self) -> ArchiveMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Tries the round's candidate URLs in order and returns the first usable log.
    pub async fn fetch_round(&self, round: &RoundDescriptor) -> RoundLog {
        let dated = match round.dated() {
            Ok(dated) => dated,
            Err(err) => {
                tracing::warn!(
                    server = %round.server,
                    round_id = round.round_id,
                    error = %format!("{err:#}"),
                    "skipping round with malformed metadata"
                );
                self.metrics.record_round(false);
                return RoundLog::Absent;
            }
        };

        for url in self.resolver.resolve(&dated) {
            match self.fetch_candidate(&url).await {
                Ok(body) => {
                    tracing::debug!(
                        server = %round.server,
                        round_id = round.round_id,
                        url = %url,
                        bytes = body.len(),
                        "fetched round log"
                    );
                    self.metrics.record_round(true);
                    return RoundLog::Present(split_lines(body));
                }
                Err(err) => {
                    tracing::debug!(
                        server = %round.server,
                        round_id = round.round_id,
                        url = %url,
                        error = %err,
                        "candidate failed; trying next"
                    );
                }
            }
        }

        self.metrics.record_round(false);
        RoundLog::Absent
    }

    async fn fetch_candidate(&self, url: &str) -> Result<Bytes> {
        let start = Instant::now();
        let result = timeout(self.options.request_timeout, self.get_body(url))
            .await
            .map_err(|_| anyhow::Error::from(ArchiveError::Timeout))
            .and_then(|inner| inner);

        let elapsed = start.elapsed();
        match &result {
            Ok(_) => self.metrics.record_success(elapsed),
            Err(err) if is_timeout(err) => self.metrics.record_timeout(elapsed),
            Err(_) => self.metrics.record_failure(elapsed),
        }
        result
    }

    async fn get_body(&self, url: &str) -> Result<Bytes> {
        let response = self.client.get(url).send().await.map_err(map_request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::Status { status }.into());
        }

        let body = response.bytes().await.map_err(map_request_error)?;
        if body.is_empty() {
            return Err(ArchiveError::EmptyBody.into());
        }
        Ok(body)
    }
}

fn map_request_error(err: reqwest::Error) -> anyhow::Error {
    if err.is_timeout() {
        return ArchiveError::Timeout.into();
    }
    anyhow!("archive request failed: {err}")
}

fn is_timeout(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<ArchiveError>(), Some(ArchiveError::Timeout))
}
