//! In-process record store
//!
//! Used when no `DATABASE_URL` is configured and by the service tests. All data lives behind
//! one lock, so `save_changes` is trivially atomic: changes are applied to a copy of the state
//! which replaces the original only if every change succeeds.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coldvault_core::models::{FileRecord, FileRecordParts, UploadSession, UploadSessionParts};
use coldvault_core::AppError;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::repository::{
    ChangeSet, FileRecordRepository, FileSearch, Page, PageRequest, RecordChange, RecordStore,
    UploadSessionRepository,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    files: HashMap<Uuid, FileRecordParts>,
    sessions: HashMap<Uuid, UploadSessionParts>,
}

impl MemoryState {
    fn ensure_digest_free(&self, parts: &FileRecordParts) -> Result<(), AppError> {
        let digest = parts.metadata.digest();
        let taken = self
            .files
            .values()
            .any(|other| other.id != parts.id && other.metadata.digest() == digest);
        if taken {
            return Err(AppError::DuplicateDigest(digest.to_string()));
        }
        Ok(())
    }

    fn add_file(&mut self, parts: FileRecordParts) -> Result<(), AppError> {
        if self.files.contains_key(&parts.id) {
            return Err(AppError::Internal(format!(
                "File record {} already exists",
                parts.id
            )));
        }
        self.ensure_digest_free(&parts)?;
        self.files.insert(parts.id, parts);
        Ok(())
    }

    fn update_file(&mut self, mut parts: FileRecordParts) -> Result<(), AppError> {
        let stored = self
            .files
            .get(&parts.id)
            .ok_or(AppError::FileNotFound(parts.id))?;
        if stored.version != parts.version {
            return Err(AppError::ConcurrencyConflict(format!(
                "file record {} is at version {}, update was based on {}",
                parts.id, stored.version, parts.version
            )));
        }
        self.ensure_digest_free(&parts)?;
        parts.version += 1;
        self.files.insert(parts.id, parts);
        Ok(())
    }

    fn add_session(&mut self, parts: UploadSessionParts) -> Result<(), AppError> {
        if self.sessions.contains_key(&parts.id) {
            return Err(AppError::Internal(format!(
                "Upload session {} already exists",
                parts.id
            )));
        }
        self.sessions.insert(parts.id, parts);
        Ok(())
    }

    fn update_session(&mut self, mut parts: UploadSessionParts) -> Result<(), AppError> {
        let stored = self
            .sessions
            .get(&parts.id)
            .ok_or(AppError::SessionNotFound(parts.id))?;
        if stored.version != parts.version {
            return Err(AppError::ConcurrencyConflict(format!(
                "upload session {} is at version {}, update was based on {}",
                parts.id, stored.version, parts.version
            )));
        }
        parts.version += 1;
        self.sessions.insert(parts.id, parts);
        Ok(())
    }

    fn apply(&mut self, change: RecordChange) -> Result<(), AppError> {
        match change {
            RecordChange::AddFile(parts) => self.add_file(parts),
            RecordChange::UpdateFile(parts) => self.update_file(parts),
            RecordChange::DeleteFile(id) => {
                self.files.remove(&id);
                Ok(())
            }
            RecordChange::AddSession(parts) => self.add_session(parts),
            RecordChange::UpdateSession(parts) => self.update_session(parts),
            RecordChange::DeleteSession(id) => {
                self.sessions.remove(&id);
                Ok(())
            }
        }
    }
}

fn paginate(mut records: Vec<FileRecord>, page: PageRequest) -> Page<FileRecord> {
    records.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    let total = records.len() as u64;
    let items = records
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.per_page() as usize)
        .collect();
    Page {
        items,
        total,
        page: page.page(),
        per_page: page.per_page(),
    }
}

/// [`RecordStore`] kept entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    state: RwLock<MemoryState>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn file_count(&self) -> usize {
        self.state.read().await.files.len()
    }

    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }
}

#[async_trait]
impl FileRecordRepository for InMemoryRecordStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        let state = self.state.read().await;
        Ok(state.files.get(&id).cloned().map(FileRecord::from_parts))
    }

    async fn get_by_digest(&self, digest: &str) -> Result<Option<FileRecord>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .files
            .values()
            .find(|parts| parts.metadata.digest() == digest)
            .cloned()
            .map(FileRecord::from_parts))
    }

    async fn add(&self, record: &FileRecord) -> Result<(), AppError> {
        self.state.write().await.add_file(record.to_parts())
    }

    async fn update(&self, record: &FileRecord) -> Result<(), AppError> {
        self.state.write().await.update_file(record.to_parts())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.state.write().await.files.remove(&id).is_some())
    }

    async fn get_by_owner(
        &self,
        owner_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<FileRecord>, AppError> {
        let state = self.state.read().await;
        let records = state
            .files
            .values()
            .filter(|parts| parts.owner_id == owner_id)
            .cloned()
            .map(FileRecord::from_parts)
            .collect();
        Ok(paginate(records, page))
    }

    async fn search(&self, query: &FileSearch) -> Result<Page<FileRecord>, AppError> {
        let state = self.state.read().await;
        let records = state
            .files
            .values()
            .cloned()
            .map(FileRecord::from_parts)
            .filter(|record| query.matches(record))
            .collect();
        Ok(paginate(records, query.page))
    }
}

#[async_trait]
impl UploadSessionRepository for InMemoryRecordStore {
    async fn get_session(&self, id: Uuid) -> Result<Option<UploadSession>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .get(&id)
            .cloned()
            .map(UploadSession::from_parts))
    }

    async fn add_session(&self, session: &UploadSession) -> Result<(), AppError> {
        self.state.write().await.add_session(session.to_parts())
    }

    async fn update_session(&self, session: &UploadSession) -> Result<(), AppError> {
        self.state.write().await.update_session(session.to_parts())
    }

    async fn record_chunk(&self, id: Uuid, index: u32) -> Result<UploadSession, AppError> {
        let mut state = self.state.write().await;
        let parts = state
            .sessions
            .get_mut(&id)
            .ok_or(AppError::SessionNotFound(id))?;

        let mut session = UploadSession::from_parts(parts.clone());
        if session.mark_chunk(index)? {
            parts.uploaded_chunks.insert(index);
            parts.version += 1;
            session = UploadSession::from_parts(parts.clone());
        }
        Ok(session)
    }

    async fn expired_sessions(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<UploadSession>, AppError> {
        let state = self.state.read().await;
        let mut expired: Vec<UploadSessionParts> = state
            .sessions
            .values()
            .filter(|parts| parts.completed_at.is_none() && parts.expires_at < now)
            .cloned()
            .collect();
        expired.sort_by_key(|parts| parts.expires_at);
        Ok(expired
            .into_iter()
            .take(limit as usize)
            .map(UploadSession::from_parts)
            .collect())
    }

    async fn delete_session(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.state.write().await.sessions.remove(&id).is_some())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn save_changes(&self, changes: ChangeSet) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        for change in changes.into_changes() {
            next.apply(change)?;
        }
        *state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldvault_core::models::{ContentType, FileMetadata, FileSize};

    fn record(digest: &str) -> FileRecord {
        let metadata = FileMetadata::new("photo.jpg", digest, Utc::now()).unwrap();
        FileRecord::new(
            Uuid::new_v4(),
            metadata,
            FileSize::new(1_000).unwrap(),
            ContentType::new("image/jpeg").unwrap(),
        )
    }

    fn session() -> UploadSession {
        UploadSession::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            10_000_000,
            5_000_000,
            chrono::Duration::hours(24),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_add_and_lookup_by_digest() {
        let store = InMemoryRecordStore::new();
        let file = record("aaa");
        store.add(&file).await.unwrap();

        let found = store.get_by_digest("aaa").await.unwrap().unwrap();
        assert_eq!(found.id(), file.id());
        assert!(store.get_by_digest("bbb").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_digest_rejected() {
        let store = InMemoryRecordStore::new();
        store.add(&record("same")).await.unwrap();
        let result = store.add(&record("same")).await;
        assert!(matches!(result, Err(AppError::DuplicateDigest(_))));
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = InMemoryRecordStore::new();
        let mut file = record("v");
        store.add(&file).await.unwrap();

        file.set_progress(10).unwrap();
        store.update(&file).await.unwrap();

        // Same in-memory version again: the store has moved on
        file.set_progress(20).unwrap();
        let result = store.update(&file).await;
        assert!(matches!(result, Err(AppError::ConcurrencyConflict(_))));

        let stored = store.get_by_id(file.id()).await.unwrap().unwrap();
        assert_eq!(stored.progress(), 10);
        assert_eq!(stored.version(), 1);
    }

    #[tokio::test]
    async fn test_record_chunk_is_idempotent() {
        let store = InMemoryRecordStore::new();
        let session = session();
        store.add_session(&session).await.unwrap();

        let first = store.record_chunk(session.id(), 1).await.unwrap();
        let second = store.record_chunk(session.id(), 1).await.unwrap();
        assert_eq!(first.uploaded_chunks().len(), 1);
        assert_eq!(second.uploaded_chunks().len(), 1);
        assert_eq!(first.version(), second.version());
    }

    #[tokio::test]
    async fn test_record_chunk_rejects_out_of_range_index() {
        let store = InMemoryRecordStore::new();
        let session = session();
        store.add_session(&session).await.unwrap();

        let result = store.record_chunk(session.id(), 2).await;
        assert!(matches!(result, Err(AppError::InvalidChunkIndex { .. })));
        let stored = store.get_session(session.id()).await.unwrap().unwrap();
        assert!(stored.uploaded_chunks().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_chunks_are_all_recorded() {
        let store = std::sync::Arc::new(InMemoryRecordStore::new());
        let session = UploadSession::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            64,
            1,
            chrono::Duration::hours(1),
        )
        .unwrap();
        store.add_session(&session).await.unwrap();

        let handles: Vec<_> = (0..64u32)
            .map(|i| {
                let store = store.clone();
                let id = session.id();
                tokio::spawn(async move { store.record_chunk(id, i).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = store.get_session(session.id()).await.unwrap().unwrap();
        assert!(stored.is_complete());
    }

    #[tokio::test]
    async fn test_save_changes_is_all_or_nothing() {
        let store = InMemoryRecordStore::new();
        store.add(&record("taken")).await.unwrap();

        let fresh = record("fresh");
        let clash = record("taken");
        let changes = ChangeSet::new().add_file(&fresh).add_file(&clash);
        assert!(store.save_changes(changes).await.is_err());

        assert!(store.get_by_id(fresh.id()).await.unwrap().is_none());
        assert_eq!(store.file_count().await, 1);
    }

    #[tokio::test]
    async fn test_expired_sessions_skip_completed() {
        let store = InMemoryRecordStore::new();
        let open = session();
        let mut done = UploadSession::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            1,
            1,
            chrono::Duration::hours(1),
        )
        .unwrap();
        done.mark_chunk(0).unwrap();
        done.complete(Utc::now()).unwrap();
        store.add_session(&open).await.unwrap();
        store.add_session(&done).await.unwrap();

        let later = Utc::now() + chrono::Duration::hours(48);
        let expired = store.expired_sessions(later, 10).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id(), open.id());
    }

    #[tokio::test]
    async fn test_get_by_owner_paginates() {
        let store = InMemoryRecordStore::new();
        let owner = Uuid::new_v4();
        for i in 0..5 {
            let metadata = FileMetadata::new("p.jpg", format!("d{}", i), Utc::now()).unwrap();
            let file = FileRecord::new(
                owner,
                metadata,
                FileSize::new(1).unwrap(),
                ContentType::new("image/jpeg").unwrap(),
            );
            store.add(&file).await.unwrap();
        }
        store.add(&record("someone-else")).await.unwrap();

        let page = store
            .get_by_owner(owner, PageRequest::new(2, 2))
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total_pages(), 3);
    }
}
