//! Expired session cleanup tests

mod helpers;

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use coldvault_core::models::SessionState;
use coldvault_db::{FileRecordRepository, UploadSessionRepository};
use coldvault_services::{CleanupReport, InitiateUpload, SessionCleanupService};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use helpers::{setup_archive, TestArchive};

async fn open_session(archive: &TestArchive, total_size: u64) -> (Uuid, Uuid) {
    let outcome = archive
        .chunked
        .initiate_upload(
            InitiateUpload {
                owner_id: Uuid::new_v4(),
                file_name: "clip.mp4".to_string(),
                mime_type: "video/mp4".to_string(),
                total_size,
                captured_at: Utc::now(),
                chunk_size: Some(1_000),
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    (outcome.session_id, outcome.file_id)
}

#[tokio::test]
async fn test_expired_session_and_placeholder_are_removed() {
    let archive = setup_archive();
    let (session_id, file_id) = open_session(&archive, 2_500).await;

    let status = archive
        .chunked
        .get_session_status(session_id, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.state, SessionState::Initiated);

    // Nothing has expired yet
    let report = archive.cleanup.run_once().await.unwrap();
    assert_eq!(report, CleanupReport::default());

    let report = archive
        .cleanup
        .run_once_at(Utc::now() + chrono::Duration::hours(25))
        .await
        .unwrap();
    assert_eq!(
        report,
        CleanupReport {
            sessions_deleted: 1,
            records_deleted: 1,
            failures: 0,
        }
    );
    assert!(archive.store.get_session(session_id).await.unwrap().is_none());
    assert!(archive.store.get_by_id(file_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_completed_session_is_kept() {
    let archive = setup_archive();
    let cancel = CancellationToken::new();
    let data = vec![42u8; 1_000];
    let (session_id, file_id) = open_session(&archive, 1_000).await;
    archive
        .chunked
        .upload_chunk(session_id, 0, &data, &cancel)
        .await
        .unwrap();
    archive
        .chunked
        .complete_upload(session_id, &mut Cursor::new(data), &cancel)
        .await
        .unwrap();

    let report = archive
        .cleanup
        .run_once_at(Utc::now() + chrono::Duration::hours(25))
        .await
        .unwrap();
    assert_eq!(report.sessions_deleted, 0);
    assert!(archive.store.get_session(session_id).await.unwrap().is_some());
    assert!(archive.store.get_by_id(file_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_expired_status_is_reported() {
    let archive = setup_archive();
    let (session_id, _) = open_session(&archive, 1_000).await;

    let session = archive
        .store
        .get_session(session_id)
        .await
        .unwrap()
        .unwrap();
    let status = session.status_at(Utc::now() + chrono::Duration::hours(25));
    assert_eq!(status.state, SessionState::Expired);
    assert!(status.is_expired);
}

#[tokio::test]
async fn test_background_loop_stops_on_shutdown() {
    let archive = setup_archive();
    let shutdown = CancellationToken::new();
    let service = Arc::new(
        SessionCleanupService::new(archive.store.clone(), Duration::from_millis(10))
            .with_batch_size(10),
    );

    let handle = service.start(shutdown.clone());
    tokio::time::sleep(Duration::from_millis(30)).await;
    shutdown.cancel();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("cleanup loop did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_zero_interval_does_not_kill_the_loop() {
    let archive = setup_archive();
    let shutdown = CancellationToken::new();
    let service = Arc::new(SessionCleanupService::new(
        archive.store.clone(),
        Duration::ZERO,
    ));

    let handle = service.start(shutdown.clone());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!handle.is_finished());
    shutdown.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("cleanup loop did not stop");
    assert!(result.is_ok());
}
