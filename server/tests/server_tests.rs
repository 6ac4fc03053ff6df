//! The assembled server on a real LMDB directory.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use kyc_client::HandoffClient;
use kyc_nullables::NullScorer;
use kyc_server::{KycServer, ServerConfig, ServerError};
use kyc_session::VerificationSubmission;
use kyc_types::{ArtifactKind, CaptureArtifact, ErrorCode, SessionStatus, VerificationResult};

const PHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) Mobile/15E148 Safari/604.1";

fn test_config(dir: &TempDir) -> ServerConfig {
    ServerConfig {
        data_dir: dir.path().join("data"),
        rpc_port: 0,
        websocket_port: 0,
        sweep_interval_secs: 1,
        ..ServerConfig::default()
    }
}

fn client(server: &KycServer) -> HandoffClient {
    let addr = server.rpc_addr().unwrap();
    HandoffClient::new(&format!("http://127.0.0.1:{}", addr.port()), Duration::from_secs(5)).unwrap()
}

fn phone(server: &KycServer) -> HandoffClient {
    let addr = server.rpc_addr().unwrap();
    HandoffClient::for_device(
        &format!("http://127.0.0.1:{}", addr.port()),
        Duration::from_secs(5),
        PHONE,
    )
    .unwrap()
}

fn submission() -> VerificationSubmission {
    VerificationSubmission::new(
        CaptureArtifact::new(ArtifactKind::DocumentScan, vec![0xFF, 0xD8, 0xFF, 0x01]),
        CaptureArtifact::new(ArtifactKind::FaceCapture, vec![0xFF, 0xD8, 0xFF, 0x02]),
        true,
    )
}

#[tokio::test]
async fn sessions_survive_a_restart() {
    let dir = TempDir::new().unwrap();

    let mut server = KycServer::new(test_config(&dir)).unwrap();
    server.start().await.unwrap();
    client(&server).health().await.unwrap();
    let created = client(&server).create_session("APP-3001", None).await.unwrap();
    assert!(created
        .locator_url
        .starts_with("http://localhost:7080/mobile-kyc/"));
    phone(&server).start(&created.session_id).await.unwrap();
    server.stop().await.unwrap();
    drop(server);

    let mut server = KycServer::new(test_config(&dir)).unwrap();
    server.start().await.unwrap();
    let status = client(&server).status(&created.session_id).await.unwrap();
    assert_eq!(status.status, SessionStatus::InProgress);
    assert_eq!(server.metrics().live_sessions.get(), 1);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn verification_without_a_scorer_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let mut server = KycServer::new(test_config(&dir)).unwrap();
    server.start().await.unwrap();

    let created = client(&server).create_session("APP-3002", None).await.unwrap();
    let device = phone(&server);
    device.start(&created.session_id).await.unwrap();
    let err = device
        .verify(&created.session_id, &submission())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::ScorerUnavailable));

    let status = client(&server).status(&created.session_id).await.unwrap();
    assert_eq!(status.status, SessionStatus::InProgress);
    server.stop().await.unwrap();
}

#[tokio::test]
async fn injected_scorer_completes_and_counts_transitions() {
    let dir = TempDir::new().unwrap();
    let scorer = Arc::new(NullScorer::returning(VerificationResult::new(true, 88.0)));
    let mut server = KycServer::new(test_config(&dir))
        .unwrap()
        .with_scorer(scorer.clone());
    server.start().await.unwrap();

    let created = client(&server).create_session("APP-3003", None).await.unwrap();
    let device = phone(&server);
    device.start(&created.session_id).await.unwrap();
    let verified = device
        .verify(&created.session_id, &submission())
        .await
        .unwrap();
    assert_eq!(verified.status, SessionStatus::Completed);
    assert_eq!(scorer.calls(), 1);

    // Transitions are counted off the event channel.
    let metrics = server.metrics().clone();
    tokio::time::timeout(Duration::from_secs(5), async {
        while metrics.sessions_completed.get() < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(metrics.sessions_started.get(), 1);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn websocket_listener_is_optional() {
    let dir = TempDir::new().unwrap();
    let mut server = KycServer::new(test_config(&dir)).unwrap();
    server.start().await.unwrap();
    assert!(server.ws_addr().is_none());
    server.stop().await.unwrap();

    let other = TempDir::new().unwrap();
    let mut server = KycServer::new(ServerConfig {
        enable_websocket: true,
        ..test_config(&other)
    })
    .unwrap();
    server.start().await.unwrap();
    assert!(server.ws_addr().is_some());
    server.stop().await.unwrap();
}

#[test]
fn invalid_config_is_rejected_before_opening_storage() {
    let dir = TempDir::new().unwrap();
    let config = ServerConfig {
        base_origin: "ftp://example.com".into(),
        ..test_config(&dir)
    };
    assert!(matches!(KycServer::new(config), Err(ServerError::Config(_))));
    assert!(!dir.path().join("data").exists());
}

#[test]
fn foreign_data_dir_is_refused() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(data.join("notes.txt"), "not a database").unwrap();
    assert!(matches!(
        KycServer::new(test_config(&dir)),
        Err(ServerError::DataDir(_))
    ));
}
