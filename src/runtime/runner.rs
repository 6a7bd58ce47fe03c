use crate::archive::client::ArchiveClient;
use crate::pipeline::coordinator::FetchCoordinator;
use crate::pipeline::round::RoundDescriptor;
use crate::pipeline::writer::{DriveSummary, PipelineDriver, ProgressMode};
use crate::runtime::config::DownloaderConfig;
use crate::runtime::strategy::LogDownloader;
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::BufWriter;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Wires a downloader to the archive client and output file, and handles OS signals
/// for graceful interruption.
pub struct Runner<D: LogDownloader> {
    config: DownloaderConfig,
    downloader: D,
    rounds: Option<Vec<RoundDescriptor>>,
    progress: ProgressMode,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
}

impl<D: LogDownloader> Runner<D> {
    pub fn new(config: DownloaderConfig, downloader: D) -> Self {
        Self {
            config,
            downloader,
            rounds: None,
            progress: ProgressMode::Hidden,
            telemetry: Arc::new(Telemetry::default()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Downloads exactly `rounds` instead of asking the downloader for its list.
    pub fn with_rounds(mut self, rounds: Vec<RoundDescriptor>) -> Self {
        self.rounds = Some(rounds);
        self
    }

    pub fn with_progress(mut self, progress: ProgressMode) -> Self {
        self.progress = progress;
        self
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    pub fn downloader(&self) -> &D {
        &self.downloader
    }

    pub fn downloader_mut(&mut self) -> &mut D {
        &mut self.downloader
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Runs the downloader's login prompt and, on success, switches the archive client
    /// to authenticated links. Returns whether a credential was obtained.
    pub fn authenticate_interactive(
        &mut self,
        input: &mut dyn BufRead,
        output: &mut dyn Write,
    ) -> Result<bool> {
        let credential = self
            .downloader
            .authenticate_interactive(input, output)
            .context("authentication failed")?;
        if credential.is_none() {
            return Ok(false);
        }
        self.config = self.config.with_session_credential(credential)?;
        Ok(self.config.session_credential().is_some())
    }

    /// Downloads every round and writes the kept lines to `output_path`, or to the
    /// configured path when `None`. The file is truncated before the first fetch starts.
    pub async fn process_and_write(&mut self, output_path: Option<&Path>) -> Result<DriveSummary> {
        let rounds = match &self.rounds {
            Some(rounds) => rounds.clone(),
            None => self
                .downloader
                .update_round_list()
                .await
                .context("failed to update round list")?,
        };

        let client = ArchiveClient::from_config(&self.config)?;
        let path = output_path.unwrap_or_else(|| self.config.output_path());
        let file = File::create(path)
            .await
            .with_context(|| format!("failed to open output file {}", path.display()))?;
        let mut sink = BufWriter::new(file);

        let coordinator =
            FetchCoordinator::with_cancellation_token(Arc::new(client), self.shutdown.clone())
                .max_buffered_mb(self.config.max_buffered_mb());
        let driver = PipelineDriver::new(coordinator)
            .with_progress(self.progress)
            .with_telemetry(self.telemetry.clone());

        tracing::info!(
            output = %path.display(),
            authenticated = self.config.session_credential().is_some(),
            "writing round logs"
        );
        let summary = driver
            .drive(rounds, &self.downloader, &mut sink, &self.shutdown)
            .await?;

        if summary.interrupted {
            self.reinitialize_shutdown_token();
        }
        Ok(summary)
    }

    /// Like [`Self::process_and_write`], but a Ctrl-C (SIGINT) interrupts the download.
    /// Lines written before the signal stay in the output file.
    pub async fn run_until_ctrl_c(&mut self, output_path: Option<&Path>) -> Result<DriveSummary> {
        let shutdown = self.shutdown.clone();
        let watcher = tokio::spawn(async move {
            tokio::select! {
                result = signal::ctrl_c() => {
                    if result.is_ok() {
                        tracing::info!("Ctrl-C received; interrupting download");
                        shutdown.cancel();
                    }
                }
                _ = shutdown.cancelled() => {}
            }
        });

        let result = self.process_and_write(output_path).await;
        watcher.abort();
        result
    }

    fn reinitialize_shutdown_token(&mut self) {
        self.shutdown = CancellationToken::new();
    }
}
