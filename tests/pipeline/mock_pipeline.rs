use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::init_tracing,
    mock_archive::{plain_log_path, raw_log_path, MockArchive, MockArchiveServer},
};
use anyhow::Result;
use hyper::StatusCode;
use roundlogs::{
    ArchiveClient, ArchiveClientOptions, Diagnostic, FetchCoordinator, KeepAll, PipelineDriver,
    RoundDescriptor, RoundLog,
};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const DAY: (i32, u32, u32) = (2023, 5, 17);
const TIMESTAMP: &str = "2023-05-17T12:30:00";

fn driver(client: ArchiveClient) -> PipelineDriver<ArchiveClient> {
    PipelineDriver::new(FetchCoordinator::new(Arc::new(client)))
}

#[tokio::test]
async fn slow_first_round_is_still_written_first() -> Result<()> {
    init_tracing();

    let archive = MockArchive::new();
    archive.serve_delayed(
        plain_log_path("servera", DAY, 100),
        "a1\na2\n",
        Duration::from_millis(300),
    );
    archive.serve_log(plain_log_path("serverb", DAY, 200), "b1\r\nb2\r\n");
    let server = MockArchiveServer::start(archive.clone()).await?;

    let rounds = vec![
        RoundDescriptor::new("serverA", 100, TIMESTAMP),
        RoundDescriptor::new("serverB", 200, TIMESTAMP),
    ];
    let mut sink = Vec::<u8>::new();
    let summary = timeout(
        Duration::from_secs(10),
        driver(ArchiveClient::new(server.url())?).drive(
            rounds,
            &KeepAll,
            &mut sink,
            &CancellationToken::new(),
        ),
    )
    .await??;

    assert_eq!(
        String::from_utf8(sink)?,
        "serverA 100 | a1\nserverA 100 | a2\nserverB 200 | b1\nserverB 200 | b2\n"
    );
    assert_eq!(summary.rounds_written, 2);
    assert!(summary.diagnostics.is_empty());

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn missing_round_yields_one_warning_and_no_lines() -> Result<()> {
    init_tracing();

    let archive = MockArchive::new();
    archive.serve_log(plain_log_path("box", DAY, 1), "first\n");
    archive.serve_status(plain_log_path("box", DAY, 2), StatusCode::NOT_FOUND);
    archive.serve_log(plain_log_path("box", DAY, 3), "third\n");
    let server = MockArchiveServer::start(archive.clone()).await?;

    let rounds = (1..=3)
        .map(|id| RoundDescriptor::new("Box", id, TIMESTAMP))
        .collect::<Vec<_>>();
    let mut sink = Vec::<u8>::new();
    let summary = driver(ArchiveClient::new(server.url())?)
        .drive(rounds, &KeepAll, &mut sink, &CancellationToken::new())
        .await?;

    assert_eq!(String::from_utf8(sink)?, "Box 1 | first\nBox 3 | third\n");
    assert_eq!(
        summary.diagnostics,
        vec![Diagnostic::Missing {
            server: "Box".into(),
            round_id: 2
        }]
    );
    assert_eq!(
        summary.diagnostics[0].to_string(),
        "WARNING: Could not find round 2 on Box"
    );
    assert_eq!(archive.request_count(&plain_log_path("box", DAY, 2)), 1);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn empty_body_counts_as_missing() -> Result<()> {
    let archive = MockArchive::new();
    archive.serve_log(plain_log_path("box", DAY, 9), "");
    let server = MockArchiveServer::start(archive).await?;

    let client = ArchiveClient::new(server.url())?;
    let round = RoundDescriptor::new("Box", 9, TIMESTAMP);
    assert_eq!(client.fetch_round(&round).await, RoundLog::Absent);
    assert_eq!(client.metrics().total_errors, 1);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn round_start_suicide_round_is_written_with_notice() -> Result<()> {
    let archive = MockArchive::new();
    archive.serve_log(plain_log_path("sybil", DAY, 77), "ghosted\n");
    let server = MockArchiveServer::start(archive).await?;

    let round = RoundDescriptor::new("Sybil", 77, TIMESTAMP).with_round_start_suicide(true);
    let mut sink = Vec::<u8>::new();
    let summary = driver(ArchiveClient::new(server.url())?)
        .drive(vec![round], &KeepAll, &mut sink, &CancellationToken::new())
        .await?;

    assert_eq!(sink, b"Sybil 77 | ghosted\n");
    assert_eq!(
        summary.diagnostics,
        vec![Diagnostic::RoundStartSuicide {
            server: "Sybil".into(),
            round_id: 77
        }]
    );

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn session_falls_back_to_public_log() -> Result<()> {
    let archive = MockArchive::new();
    archive.serve_status(raw_log_path("basil", DAY, 5), StatusCode::FORBIDDEN);
    archive.serve_log(plain_log_path("basil", DAY, 5), "public line\n");
    archive.serve_log(raw_log_path("basil", DAY, 6), "raw line\n");
    let server = MockArchiveServer::start(archive.clone()).await?;

    let options = ArchiveClientOptions {
        session_credential: Some("sid-123".into()),
        ..ArchiveClientOptions::default()
    };
    let client = ArchiveClient::with_options(server.url(), options)?;

    let fallback = client
        .fetch_round(&RoundDescriptor::new("Bagil", 5, TIMESTAMP))
        .await;
    assert_eq!(
        fallback,
        RoundLog::Present(vec![bytes::Bytes::from_static(b"public line")])
    );

    let preferred = client
        .fetch_round(&RoundDescriptor::new("Bagil", 6, TIMESTAMP))
        .await;
    assert_eq!(
        preferred,
        RoundLog::Present(vec![bytes::Bytes::from_static(b"raw line")])
    );
    assert_eq!(archive.request_count(&plain_log_path("basil", DAY, 6)), 0);

    let requests = archive.requests();
    assert!(requests
        .iter()
        .all(|request| request.cookie.as_deref() == Some("tgforums_sid=sid-123")));
    assert!(requests
        .iter()
        .all(|request| request.user_agent.as_deref().is_some_and(|ua| ua.starts_with("roundlogs/"))));

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn anonymous_client_sends_no_cookie() -> Result<()> {
    let archive = MockArchive::new();
    archive.serve_log(plain_log_path("box", DAY, 1), "line\n");
    let server = MockArchiveServer::start(archive.clone()).await?;

    let client = ArchiveClient::new(server.url())?;
    let log = client
        .fetch_round(&RoundDescriptor::new("Box", 1, TIMESTAMP))
        .await;
    assert!(!log.is_absent());

    let requests = archive.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].cookie, None);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn slow_candidate_times_out_as_missing() -> Result<()> {
    let archive = MockArchive::new();
    archive.serve_delayed(
        plain_log_path("box", DAY, 4),
        "too late\n",
        Duration::from_secs(5),
    );
    let server = MockArchiveServer::start(archive).await?;

    let options = ArchiveClientOptions {
        request_timeout: Duration::from_millis(200),
        ..ArchiveClientOptions::default()
    };
    let client = ArchiveClient::with_options(server.url(), options)?;
    let log = timeout(
        Duration::from_secs(3),
        client.fetch_round(&RoundDescriptor::new("Box", 4, TIMESTAMP)),
    )
    .await?;

    assert_eq!(log, RoundLog::Absent);
    assert_eq!(client.metrics().total_timeouts, 1);

    server.shutdown().await;
    Ok(())
}
