//! Repository contracts
//!
//! File records and upload sessions are persisted through these traits. Updates use
//! optimistic concurrency: the stored `version` must equal the aggregate's version, and the
//! store bumps it on every successful write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coldvault_core::models::{
    ContentCategory, FileRecord, FileRecordParts, UploadSession, UploadSessionParts, UploadState,
};
use coldvault_core::AppError;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 100;

/// One-based page request. `per_page` is clamped to `1..=MAX_PAGE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        PageRequest {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest::new(1, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.per_page.max(1)))
    }
}

/// Filters for [`FileRecordRepository::search`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct FileSearch {
    pub owner_id: Option<Uuid>,
    pub category: Option<ContentCategory>,
    pub state: Option<UploadState>,
    /// Case-insensitive substring of the original file name.
    pub name_contains: Option<String>,
    pub tag: Option<String>,
    pub captured_after: Option<DateTime<Utc>>,
    pub captured_before: Option<DateTime<Utc>>,
    pub page: PageRequest,
}

impl FileSearch {
    pub fn matches(&self, record: &FileRecord) -> bool {
        let metadata = record.metadata();
        self.owner_id.is_none_or_eq(record.owner_id())
            && self.category.is_none_or_eq(record.content_type().category())
            && self.state.is_none_or_eq(record.state())
            && self.name_contains.as_ref().map_or(true, |needle| {
                metadata
                    .original_name()
                    .to_lowercase()
                    .contains(&needle.to_lowercase())
            })
            && self
                .tag
                .as_ref()
                .map_or(true, |tag| metadata.tags().iter().any(|t| t == tag))
            && self
                .captured_after
                .map_or(true, |after| metadata.captured_at() >= after)
            && self
                .captured_before
                .map_or(true, |before| metadata.captured_at() < before)
    }
}

trait OptionEq<T> {
    fn is_none_or_eq(&self, value: T) -> bool;
}

impl<T: PartialEq> OptionEq<T> for Option<T> {
    fn is_none_or_eq(&self, value: T) -> bool {
        self.as_ref().map_or(true, |expected| *expected == value)
    }
}

#[async_trait]
pub trait FileRecordRepository: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<FileRecord>, AppError>;

    /// Look up a record by content digest. Digests are unique across the store.
    async fn get_by_digest(&self, digest: &str) -> Result<Option<FileRecord>, AppError>;

    /// Insert a new record. Fails with `DuplicateDigest` if the digest is taken.
    async fn add(&self, record: &FileRecord) -> Result<(), AppError>;

    async fn update(&self, record: &FileRecord) -> Result<(), AppError>;

    /// Returns `false` when no record had this id.
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;

    /// Records of one owner, newest first.
    async fn get_by_owner(
        &self,
        owner_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<FileRecord>, AppError>;

    async fn search(&self, query: &FileSearch) -> Result<Page<FileRecord>, AppError>;
}

#[async_trait]
pub trait UploadSessionRepository: Send + Sync {
    async fn get_session(&self, id: Uuid) -> Result<Option<UploadSession>, AppError>;

    async fn add_session(&self, session: &UploadSession) -> Result<(), AppError>;

    async fn update_session(&self, session: &UploadSession) -> Result<(), AppError>;

    /// Atomically insert `index` into the session's uploaded set and return the session as
    /// stored afterwards. Recording an index twice leaves the set unchanged.
    async fn record_chunk(&self, id: Uuid, index: u32) -> Result<UploadSession, AppError>;

    /// Uncompleted sessions whose expiry is before `now`, oldest first.
    async fn expired_sessions(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<UploadSession>, AppError>;

    async fn delete_session(&self, id: Uuid) -> Result<bool, AppError>;
}

/// A single write inside a [`ChangeSet`].
#[derive(Debug, Clone)]
pub enum RecordChange {
    AddFile(FileRecordParts),
    UpdateFile(FileRecordParts),
    DeleteFile(Uuid),
    AddSession(UploadSessionParts),
    UpdateSession(UploadSessionParts),
    DeleteSession(Uuid),
}

/// Writes applied together by [`RecordStore::save_changes`], in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changes: Vec<RecordChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(mut self, record: &FileRecord) -> Self {
        self.changes.push(RecordChange::AddFile(record.to_parts()));
        self
    }

    pub fn update_file(mut self, record: &FileRecord) -> Self {
        self.changes.push(RecordChange::UpdateFile(record.to_parts()));
        self
    }

    pub fn delete_file(mut self, id: Uuid) -> Self {
        self.changes.push(RecordChange::DeleteFile(id));
        self
    }

    pub fn add_session(mut self, session: &UploadSession) -> Self {
        self.changes.push(RecordChange::AddSession(session.to_parts()));
        self
    }

    pub fn update_session(mut self, session: &UploadSession) -> Self {
        self.changes
            .push(RecordChange::UpdateSession(session.to_parts()));
        self
    }

    pub fn delete_session(mut self, id: Uuid) -> Self {
        self.changes.push(RecordChange::DeleteSession(id));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn into_changes(self) -> Vec<RecordChange> {
        self.changes
    }
}

/// Full record store: both repositories plus grouped, all-or-nothing writes.
#[async_trait]
pub trait RecordStore: FileRecordRepository + UploadSessionRepository {
    async fn save_changes(&self, changes: ChangeSet) -> Result<(), AppError>;
}
