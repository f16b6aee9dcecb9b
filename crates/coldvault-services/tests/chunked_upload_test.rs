//! Chunked upload session tests

mod helpers;

use std::io::Cursor;

use chrono::Utc;
use coldvault_core::models::{SessionState, UploadState};
use coldvault_core::{AppError, UploadConfig};
use coldvault_db::{FileRecordRepository, UploadSessionRepository};
use coldvault_processing::digest_bytes;
use coldvault_services::{ChunkedUploadService, InitiateUpload, InitiateUploadOutcome};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use helpers::{photo_upload, setup_archive, TestArchive};

const MIB: u64 = 1024 * 1024;

fn video_upload(total_size: u64, chunk_size: Option<u64>) -> InitiateUpload {
    InitiateUpload {
        owner_id: Uuid::new_v4(),
        file_name: "holiday.mp4".to_string(),
        mime_type: "video/mp4".to_string(),
        total_size,
        captured_at: Utc::now(),
        chunk_size,
    }
}

fn content(len: u64, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 ^ seed).collect()
}

/// Send chunk `index` of `data` as the session expects it.
async fn send_chunk(
    archive: &TestArchive,
    session: &InitiateUploadOutcome,
    data: &[u8],
    index: u32,
) -> Result<coldvault_services::ChunkUploadOutcome, AppError> {
    let start = (u64::from(index) * session.chunk_size) as usize;
    let end = (start + session.chunk_size as usize).min(data.len());
    archive
        .chunked
        .upload_chunk(
            session.session_id,
            index,
            &data[start..end],
            &CancellationToken::new(),
        )
        .await
}

#[tokio::test]
async fn test_three_chunk_upload_completes_after_last_chunk() {
    let archive = setup_archive();
    let cancel = CancellationToken::new();
    let data = content(12_000_000, 1);

    let session = archive
        .chunked
        .initiate_upload(video_upload(12_000_000, None), &cancel)
        .await
        .unwrap();
    assert_eq!(session.chunk_size, 5 * MIB);
    assert_eq!(session.total_chunks, 3);

    let placeholder = archive
        .store
        .get_by_id(session.file_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(placeholder.state(), UploadState::Pending);
    assert!(placeholder.has_placeholder_digest());

    send_chunk(&archive, &session, &data, 0).await.unwrap();
    let second = send_chunk(&archive, &session, &data, 2).await.unwrap();
    assert_eq!(second.uploaded_chunks, 2);
    assert!((second.progress - 66.67).abs() < 0.01);
    assert!(!second.is_complete);

    let early = archive
        .chunked
        .complete_upload(session.session_id, &mut Cursor::new(data.clone()), &cancel)
        .await;
    assert!(matches!(
        early,
        Err(AppError::UploadIncomplete {
            uploaded: 2,
            total: 3
        })
    ));

    let last = send_chunk(&archive, &session, &data, 1).await.unwrap();
    assert!(last.is_complete);
    assert_eq!(last.progress, 100.0);

    let outcome = archive
        .chunked
        .complete_upload(session.session_id, &mut Cursor::new(data.clone()), &cancel)
        .await
        .unwrap();
    assert!(!outcome.is_duplicate);
    assert_eq!(outcome.file_id, session.file_id);
    assert_eq!(outcome.location.clone().unwrap().provider, "local");

    let record = archive
        .store
        .get_by_id(session.file_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.state(), UploadState::Archived);
    assert_eq!(record.digest(), digest_bytes(&data));
    assert!(!record.has_placeholder_digest());

    let status = archive
        .chunked
        .get_session_status(session.session_id, &cancel)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.state, SessionState::Complete);
    assert!(status.completed_at.is_some());
    assert!(status.missing_chunks.is_empty());
}

#[tokio::test]
async fn test_explicit_chunk_size_sets_chunk_count() {
    let archive = setup_archive();
    let session = archive
        .chunked
        .initiate_upload(
            video_upload(10 * MIB, Some(5 * MIB)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(session.total_chunks, 2);
    assert!(session.expires_at > Utc::now() + chrono::Duration::hours(23));
}

#[tokio::test]
async fn test_repeated_chunk_is_counted_once() {
    let archive = setup_archive();
    let data = content(3_000, 2);
    let session = archive
        .chunked
        .initiate_upload(video_upload(3_000, Some(1_000)), &CancellationToken::new())
        .await
        .unwrap();

    let first = send_chunk(&archive, &session, &data, 1).await.unwrap();
    let again = send_chunk(&archive, &session, &data, 1).await.unwrap();
    assert_eq!(first.uploaded_chunks, 1);
    assert_eq!(again.uploaded_chunks, 1);

    let stored = archive
        .store
        .get_session(session.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.uploaded_chunks().len(), 1);
}

#[tokio::test]
async fn test_invalid_chunk_leaves_session_untouched() {
    let archive = setup_archive();
    let cancel = CancellationToken::new();
    let session = archive
        .chunked
        .initiate_upload(video_upload(3_000, Some(1_000)), &cancel)
        .await
        .unwrap();
    let before = archive
        .store
        .get_session(session.session_id)
        .await
        .unwrap()
        .unwrap();

    let out_of_range = archive
        .chunked
        .upload_chunk(session.session_id, 3, &[0u8; 1_000], &cancel)
        .await;
    assert!(matches!(
        out_of_range,
        Err(AppError::InvalidChunkIndex {
            index: 3,
            total_chunks: 3
        })
    ));

    let short = archive
        .chunked
        .upload_chunk(session.session_id, 0, &[0u8; 999], &cancel)
        .await;
    assert!(matches!(short, Err(AppError::InvalidArgument(_))));

    let after = archive
        .store
        .get_session(session.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_size_mismatch_keeps_session_open() {
    let archive = setup_archive();
    let cancel = CancellationToken::new();
    let data = content(2_000, 3);
    let session = archive
        .chunked
        .initiate_upload(video_upload(2_000, Some(1_000)), &cancel)
        .await
        .unwrap();
    send_chunk(&archive, &session, &data, 0).await.unwrap();
    send_chunk(&archive, &session, &data, 1).await.unwrap();

    let result = archive
        .chunked
        .complete_upload(
            session.session_id,
            &mut Cursor::new(data[..1_500].to_vec()),
            &cancel,
        )
        .await;
    assert!(matches!(
        result,
        Err(AppError::SizeMismatch {
            expected: 2_000,
            actual: 1_500
        })
    ));

    let stored = archive
        .store
        .get_session(session.session_id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.completed_at().is_none());

    // The same session can still be finalized with the right content
    let outcome = archive
        .chunked
        .complete_upload(session.session_id, &mut Cursor::new(data), &cancel)
        .await
        .unwrap();
    assert!(!outcome.is_duplicate);
}

#[tokio::test]
async fn test_completed_session_rejects_more_work() {
    let archive = setup_archive();
    let cancel = CancellationToken::new();
    let data = content(1_000, 4);
    let session = archive
        .chunked
        .initiate_upload(video_upload(1_000, Some(1_000)), &cancel)
        .await
        .unwrap();
    send_chunk(&archive, &session, &data, 0).await.unwrap();
    archive
        .chunked
        .complete_upload(session.session_id, &mut Cursor::new(data.clone()), &cancel)
        .await
        .unwrap();

    let chunk = send_chunk(&archive, &session, &data, 0).await;
    assert!(matches!(chunk, Err(AppError::SessionAlreadyCompleted(_))));

    let again = archive
        .chunked
        .complete_upload(session.session_id, &mut Cursor::new(data), &cancel)
        .await;
    assert!(matches!(again, Err(AppError::SessionAlreadyCompleted(_))));
}

#[tokio::test]
async fn test_duplicate_content_removes_placeholder_record() {
    let archive = setup_archive();
    let cancel = CancellationToken::new();
    let data = content(1_500, 5);

    let mut request = photo_upload(Uuid::new_v4(), "first.mp4");
    request.mime_type = "video/mp4".to_string();
    let existing = archive
        .uploads
        .upload(request, &mut Cursor::new(data.clone()), &cancel)
        .await
        .unwrap();

    let session = archive
        .chunked
        .initiate_upload(video_upload(1_500, Some(1_000)), &cancel)
        .await
        .unwrap();
    assert_eq!(archive.store.file_count().await, 2);
    send_chunk(&archive, &session, &data, 0).await.unwrap();
    send_chunk(&archive, &session, &data, 1).await.unwrap();

    let outcome = archive
        .chunked
        .complete_upload(session.session_id, &mut Cursor::new(data), &cancel)
        .await
        .unwrap();

    assert!(outcome.is_duplicate);
    assert_eq!(outcome.file_id, existing.file_id);
    assert_eq!(archive.store.file_count().await, 1);
    assert!(archive
        .store
        .get_by_id(session.file_id)
        .await
        .unwrap()
        .is_none());
    assert_eq!(archive.local.upload_count(), 1);

    let stored = archive
        .store
        .get_session(session.session_id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.completed_at().is_some());

    // The finished session reports the record that holds the content
    let status = archive
        .chunked
        .get_session_status(session.session_id, &cancel)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.state, SessionState::Complete);
    assert_eq!(status.file_id, existing.file_id);
    assert!(archive
        .store
        .get_by_id(status.file_id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_unknown_session() {
    let archive = setup_archive();
    let cancel = CancellationToken::new();
    let missing = Uuid::new_v4();

    let chunk = archive
        .chunked
        .upload_chunk(missing, 0, &[1, 2, 3], &cancel)
        .await;
    assert!(matches!(chunk, Err(AppError::SessionNotFound(id)) if id == missing));

    let complete = archive
        .chunked
        .complete_upload(missing, &mut Cursor::new(Vec::new()), &cancel)
        .await;
    assert!(matches!(complete, Err(AppError::SessionNotFound(_))));

    assert!(archive
        .chunked
        .get_session_status(missing, &cancel)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_initiate_rejects_invalid_requests() {
    let archive = setup_archive();
    let cancel = CancellationToken::new();

    let empty = archive
        .chunked
        .initiate_upload(video_upload(0, None), &cancel)
        .await;
    assert!(matches!(empty, Err(AppError::InvalidArgument(_))));

    let too_large = archive
        .chunked
        .initiate_upload(video_upload(6 * 1024 * MIB, None), &cancel)
        .await;
    assert!(matches!(too_large, Err(AppError::InvalidFileSize { .. })));

    let mut unsupported = video_upload(1_000, None);
    unsupported.mime_type = "application/zip".to_string();
    let result = archive.chunked.initiate_upload(unsupported, &cancel).await;
    assert!(matches!(result, Err(AppError::UnsupportedMediaType(_))));

    assert_eq!(archive.store.file_count().await, 0);
    assert_eq!(archive.store.session_count().await, 0);
}

#[tokio::test]
async fn test_out_of_range_session_lifetime_is_rejected() {
    let archive = setup_archive();
    let chunked = ChunkedUploadService::new(
        archive.pipeline.clone(),
        UploadConfig {
            session_ttl_hours: 3_000_000_000,
            ..UploadConfig::default()
        },
    );

    let result = chunked
        .initiate_upload(video_upload(1_000, None), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(AppError::InvalidArgument(_))));
    assert_eq!(archive.store.file_count().await, 0);
    assert_eq!(archive.store.session_count().await, 0);
}
