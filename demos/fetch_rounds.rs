use std::env;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use roundlogs::{
    DownloaderConfig, LineFilter, LogDownloader, ProgressMode, RoundDescriptor, RoundListFuture,
    Runner,
};
use roundlogs::runtime::strategy::prompt_line;

const DEFAULT_ROUND_FILE: &str = "rounds.json";
const DEFAULT_OUTPUT_PATH: &str = "logs.log";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BUFFER_MB: usize = 256;
const DEFAULT_LOG_DIRECTIVE: &str = "warn";

#[tokio::main]
async fn main() -> Result<()> {
    init_example_tracing();

    let args = ExampleArgs::from_env()?;
    let config = args.to_config()?;
    let downloader = JsonRoundFile::new(args.round_file.clone(), args.filter.clone());
    let mut runner = Runner::new(config, downloader).with_progress(ProgressMode::Stderr);

    if args.prompt_login {
        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        let mut output = std::io::stdout();
        runner.authenticate_interactive(&mut input, &mut output)?;
    }

    let summary = runner.run_until_ctrl_c(None).await?;
    let telemetry = runner.telemetry().snapshot();
    eprintln!(
        "{} of {} rounds written to {} ({} lines kept, {} filtered, {} missing){}",
        summary.rounds_written,
        summary.rounds,
        runner.config().output_path().display(),
        telemetry.lines_written,
        telemetry.lines_filtered,
        telemetry.rounds_missing,
        if summary.interrupted { ", interrupted" } else { "" },
    );
    Ok(())
}

fn init_example_tracing() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", DEFAULT_LOG_DIRECTIVE);
    }
    roundlogs::init_tracing();
}

/// Reads the round list from a JSON array of `{server, roundID, timestamp}` objects.
struct JsonRoundFile {
    path: PathBuf,
    filter: Option<String>,
}

impl JsonRoundFile {
    fn new(path: PathBuf, filter: Option<String>) -> Self {
        Self { path, filter }
    }
}

impl LineFilter for JsonRoundFile {
    fn filter_lines(&self, lines: Vec<Bytes>) -> Vec<Bytes> {
        let Some(needle) = self.filter.as_deref().map(str::as_bytes) else {
            return lines;
        };
        lines
            .into_iter()
            .filter(|line| line.windows(needle.len()).any(|window| window == needle))
            .collect()
    }
}

impl LogDownloader for JsonRoundFile {
    fn update_round_list(&mut self) -> RoundListFuture<'_> {
        Box::pin(async move {
            let raw = tokio::fs::read(&self.path)
                .await
                .with_context(|| format!("failed to read {}", self.path.display()))?;
            let rounds: Vec<RoundDescriptor> = serde_json::from_slice(&raw)
                .with_context(|| format!("failed to parse {}", self.path.display()))?;
            Ok(rounds)
        })
    }

    fn authenticate(&mut self) -> Result<Option<String>> {
        Ok(env::var("ROUNDLOGS_SESSION")
            .ok()
            .filter(|value| !value.trim().is_empty()))
    }

    fn interactive(input: &mut dyn BufRead, output: &mut dyn Write) -> Result<Self> {
        let path = prompt_line(input, output, "Round list file: ")?;
        let filter = prompt_line(input, output, "Keep lines containing: ")?;
        Ok(Self::new(
            PathBuf::from(path),
            Some(filter).filter(|value| !value.is_empty()),
        ))
    }
}

struct ExampleArgs {
    round_file: PathBuf,
    output_path: PathBuf,
    archive_url: Option<String>,
    filter: Option<String>,
    request_timeout: Duration,
    buffer_mb: usize,
    prompt_login: bool,
}

impl ExampleArgs {
    fn from_env() -> Result<Self> {
        let round_file = read_env_or_default("ROUNDLOGS_ROUND_FILE", DEFAULT_ROUND_FILE);
        let output_path = read_env_or_default("ROUNDLOGS_OUTPUT", DEFAULT_OUTPUT_PATH);
        let timeout_secs =
            parse_env_with_default::<u64>("ROUNDLOGS_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        let buffer_mb = parse_env_with_default::<usize>("ROUNDLOGS_BUFFER_MB", DEFAULT_BUFFER_MB)?;
        let prompt_login = parse_env_with_default::<bool>("ROUNDLOGS_PROMPT_LOGIN", false)?;

        Ok(Self {
            round_file: PathBuf::from(round_file),
            output_path: PathBuf::from(output_path),
            archive_url: env::var("ROUNDLOGS_ARCHIVE_URL").ok(),
            filter: env::var("ROUNDLOGS_FILTER")
                .ok()
                .filter(|value| !value.is_empty()),
            request_timeout: Duration::from_secs(timeout_secs),
            buffer_mb,
            prompt_login,
        })
    }

    fn to_config(&self) -> Result<DownloaderConfig> {
        let mut builder = DownloaderConfig::builder()
            .output_path(self.output_path.clone())
            .request_timeout(self.request_timeout)
            .max_buffered_mb(self.buffer_mb);
        if let Some(url) = &self.archive_url {
            builder = builder.archive_base_url(url.clone());
        }
        builder.build()
    }
}

fn read_env_or_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

fn parse_env_with_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("failed to parse {key}='{value}'")),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}
