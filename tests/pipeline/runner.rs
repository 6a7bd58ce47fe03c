use std::io::Cursor;
use std::time::Duration;

use crate::support::{
    helpers::{init_tracing, read_output, scratch_path, ListDownloader},
    mock_archive::{plain_log_path, raw_log_path, MockArchive, MockArchiveServer},
};
use anyhow::Result;
use roundlogs::{DownloaderConfig, RoundDescriptor, Runner};
use tokio::time::timeout;

const DAY: (i32, u32, u32) = (2021, 12, 24);
const TIMESTAMP: &str = "2021-12-24 20:15:00";

fn config(server: &MockArchiveServer) -> Result<DownloaderConfig> {
    DownloaderConfig::builder()
        .archive_base_url(server.url())
        .request_timeout(Duration::from_secs(5))
        .build()
}

fn seeded_archive() -> MockArchive {
    let archive = MockArchive::new();
    archive.serve_log(
        plain_log_path("manuel", DAY, 10),
        "ADMIN: banned someone\nSAY: hello\nADMIN: unbanned someone\n",
    );
    archive.serve_delayed(
        plain_log_path("terry", DAY, 11),
        "SAY: slow round\nADMIN: late action\n",
        Duration::from_millis(200),
    );
    archive
}

fn rounds() -> Vec<RoundDescriptor> {
    vec![
        RoundDescriptor::new("Manuel", 10, TIMESTAMP),
        RoundDescriptor::new("Terry", 11, TIMESTAMP),
        RoundDescriptor::new("Terry", 12, TIMESTAMP),
    ]
}

#[tokio::test]
async fn runner_writes_filtered_lines_to_file() -> Result<()> {
    init_tracing();
    let server = MockArchiveServer::start(seeded_archive()).await?;
    let output = scratch_path("filtered");

    let mut runner = Runner::new(
        config(&server)?,
        ListDownloader::new(rounds()).keeping(b"ADMIN"),
    );
    let summary = timeout(
        Duration::from_secs(10),
        runner.process_and_write(Some(output.as_path())),
    )
    .await??;

    assert_eq!(
        read_output(&output).await?,
        "Manuel 10 | ADMIN: banned someone\n\
         Manuel 10 | ADMIN: unbanned someone\n\
         Terry 11 | ADMIN: late action\n"
    );
    assert_eq!(summary.rounds, 3);
    assert_eq!(summary.rounds_written, 2);
    assert_eq!(summary.lines_written, 3);
    assert_eq!(summary.lines_filtered, 2);
    assert_eq!(summary.missing_rounds().count(), 1);
    assert_eq!(runner.downloader().list_requests, 1);
    assert_eq!(runner.telemetry().snapshot().lines_written, 3);

    let _ = tokio::fs::remove_file(&output).await;
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn rerunning_produces_identical_output() -> Result<()> {
    let server = MockArchiveServer::start(seeded_archive()).await?;
    let output = scratch_path("idempotent");

    let mut runner = Runner::new(config(&server)?, ListDownloader::new(rounds()));
    runner.process_and_write(Some(output.as_path())).await?;
    let first = read_output(&output).await?;
    runner.process_and_write(Some(output.as_path())).await?;
    let second = read_output(&output).await?;

    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert_eq!(runner.downloader().list_requests, 2);

    let _ = tokio::fs::remove_file(&output).await;
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn explicit_rounds_skip_the_round_list() -> Result<()> {
    let server = MockArchiveServer::start(seeded_archive()).await?;
    let output = scratch_path("explicit");

    let mut runner = Runner::new(config(&server)?, ListDownloader::new(rounds()))
        .with_rounds(vec![RoundDescriptor::new("Manuel", 10, TIMESTAMP)]);
    let summary = runner.process_and_write(Some(output.as_path())).await?;

    assert_eq!(summary.rounds, 1);
    assert_eq!(runner.downloader().list_requests, 0);
    assert!(read_output(&output).await?.starts_with("Manuel 10 | "));

    let _ = tokio::fs::remove_file(&output).await;
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn unopenable_output_fails_before_fetching() -> Result<()> {
    let archive = seeded_archive();
    let server = MockArchiveServer::start(archive.clone()).await?;
    let output = scratch_path("missing-dir").join("nested").join("out.log");

    let mut runner = Runner::new(config(&server)?, ListDownloader::new(rounds()));
    let err = runner
        .process_and_write(Some(output.as_path()))
        .await
        .unwrap_err();

    assert!(
        format!("{err:#}").contains("failed to open output file"),
        "unexpected error: {err:#}"
    );
    assert!(archive.requests().is_empty());

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn interactive_login_switches_to_raw_logs() -> Result<()> {
    let archive = MockArchive::new();
    archive.serve_log(raw_log_path("manuel", DAY, 10), "raw only\n");
    let server = MockArchiveServer::start(archive.clone()).await?;
    let output = scratch_path("login");

    let mut runner = Runner::new(
        config(&server)?,
        ListDownloader::new(rounds()).with_credential("sid-xyz"),
    )
    .with_rounds(vec![RoundDescriptor::new("Manuel", 10, TIMESTAMP)]);

    let mut prompt = Vec::<u8>::new();
    let logged_in = runner.authenticate_interactive(&mut Cursor::new(b"yes\n".as_slice()), &mut prompt)?;
    assert!(logged_in);
    assert_eq!(prompt, b"Would you like to log in? ");
    assert_eq!(runner.config().session_credential(), Some("sid-xyz"));

    runner.process_and_write(Some(output.as_path())).await?;
    assert_eq!(read_output(&output).await?, "Manuel 10 | raw only\n");
    assert_eq!(
        archive.requests()[0].cookie.as_deref(),
        Some("tgforums_sid=sid-xyz")
    );

    let _ = tokio::fs::remove_file(&output).await;
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn declined_login_stays_anonymous() -> Result<()> {
    let server = MockArchiveServer::start(MockArchive::new()).await?;
    let mut runner = Runner::new(
        config(&server)?,
        ListDownloader::new(Vec::new()).with_credential("unused"),
    );

    let logged_in =
        runner.authenticate_interactive(&mut Cursor::new(b"no\n".as_slice()), &mut Vec::<u8>::new())?;
    assert!(!logged_in);
    assert_eq!(runner.config().session_credential(), None);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn cancelled_token_interrupts_and_resets() -> Result<()> {
    let archive = MockArchive::new();
    archive.serve_delayed(
        plain_log_path("manuel", DAY, 10),
        "never written\n",
        Duration::from_secs(5),
    );
    let server = MockArchiveServer::start(archive).await?;
    let output = scratch_path("interrupted");

    let mut runner = Runner::new(config(&server)?, ListDownloader::new(rounds()));
    let token = runner.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let summary = timeout(
        Duration::from_secs(3),
        runner.process_and_write(Some(output.as_path())),
    )
    .await??;

    assert!(summary.interrupted);
    assert_eq!(read_output(&output).await?, "");
    assert!(!runner.cancellation_token().is_cancelled());

    let _ = tokio::fs::remove_file(&output).await;
    server.shutdown().await;
    Ok(())
}
