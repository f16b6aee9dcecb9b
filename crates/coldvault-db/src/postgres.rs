//! PostgreSQL record store
//!
//! Uses dynamic sqlx queries so the crate builds without `DATABASE_URL` or offline query
//! data. Each write helper takes a `&mut PgConnection`, which lets the same code run on a
//! pooled connection or inside the transaction opened by `save_changes`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coldvault_core::models::{FileRecord, FileRecordParts, UploadSession, UploadSessionParts};
use coldvault_core::AppError;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::repository::{
    ChangeSet, FileRecordRepository, FileSearch, Page, PageRequest, RecordChange, RecordStore,
    UploadSessionRepository,
};
use crate::rows::{to_bigint, FileRecordRow, UploadSessionRow, FILE_COLUMNS, SESSION_COLUMNS};

/// Maps a unique violation on the digest column to `DuplicateDigest`.
fn map_write_error(err: sqlx::Error, digest: &str) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() && db_err.constraint() == Some("file_records_digest_key")
        {
            return AppError::DuplicateDigest(digest.to_string());
        }
    }
    AppError::Database(err)
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

async fn insert_file(conn: &mut PgConnection, parts: &FileRecordParts) -> Result<(), AppError> {
    let metadata = &parts.metadata;
    let gps = metadata.gps();
    sqlx::query(
        r#"
        INSERT INTO file_records (
            id, owner_id, original_name, sanitized_name, digest, captured_at,
            description, tags, gps_latitude, gps_longitude, size_bytes, content_type,
            category, upload_state, status_changed_at, storage_provider, storage_path,
            thumbnail_provider, thumbnail_path, progress, created_at, updated_at, version
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22, $23)
        "#,
    )
    .bind(parts.id)
    .bind(parts.owner_id)
    .bind(metadata.original_name())
    .bind(metadata.sanitized_name())
    .bind(metadata.digest())
    .bind(metadata.captured_at())
    .bind(metadata.description())
    .bind(metadata.tags().to_vec())
    .bind(gps.map(|g| g.latitude))
    .bind(gps.map(|g| g.longitude))
    .bind(i64::from(parts.size))
    .bind(parts.content_type.mime_type())
    .bind(parts.content_type.category().as_str())
    .bind(parts.status.state().as_str())
    .bind(parts.status.changed_at())
    .bind(parts.location.as_ref().map(|l| l.provider.as_str()))
    .bind(parts.location.as_ref().map(|l| l.path.as_str()))
    .bind(parts.thumbnail.as_ref().map(|l| l.provider.as_str()))
    .bind(parts.thumbnail.as_ref().map(|l| l.path.as_str()))
    .bind(i16::from(parts.progress))
    .bind(parts.created_at)
    .bind(parts.updated_at)
    .bind(parts.version)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_write_error(e, metadata.digest()))?;

    Ok(())
}

async fn update_file(conn: &mut PgConnection, parts: &FileRecordParts) -> Result<(), AppError> {
    let metadata = &parts.metadata;
    let gps = metadata.gps();
    let result = sqlx::query(
        r#"
        UPDATE file_records
        SET digest = $3, description = $4, tags = $5, gps_latitude = $6, gps_longitude = $7,
            upload_state = $8, status_changed_at = $9, storage_provider = $10,
            storage_path = $11, thumbnail_provider = $12, thumbnail_path = $13,
            progress = $14, updated_at = $15, version = version + 1
        WHERE id = $1 AND version = $2
        "#,
    )
    .bind(parts.id)
    .bind(parts.version)
    .bind(metadata.digest())
    .bind(metadata.description())
    .bind(metadata.tags().to_vec())
    .bind(gps.map(|g| g.latitude))
    .bind(gps.map(|g| g.longitude))
    .bind(parts.status.state().as_str())
    .bind(parts.status.changed_at())
    .bind(parts.location.as_ref().map(|l| l.provider.as_str()))
    .bind(parts.location.as_ref().map(|l| l.path.as_str()))
    .bind(parts.thumbnail.as_ref().map(|l| l.provider.as_str()))
    .bind(parts.thumbnail.as_ref().map(|l| l.path.as_str()))
    .bind(i16::from(parts.progress))
    .bind(parts.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_write_error(e, metadata.digest()))?;

    if result.rows_affected() == 0 {
        let stored: Option<i64> =
            sqlx::query_scalar("SELECT version FROM file_records WHERE id = $1")
                .bind(parts.id)
                .fetch_optional(&mut *conn)
                .await?;
        return Err(match stored {
            None => AppError::FileNotFound(parts.id),
            Some(version) => AppError::ConcurrencyConflict(format!(
                "file record {} is at version {}, update was based on {}",
                parts.id, version, parts.version
            )),
        });
    }
    Ok(())
}

async fn delete_file(conn: &mut PgConnection, id: Uuid) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM file_records WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

async fn insert_session(
    conn: &mut PgConnection,
    parts: &UploadSessionParts,
) -> Result<(), AppError> {
    let chunks: Vec<i64> = parts.uploaded_chunks.iter().map(|&i| i64::from(i)).collect();
    sqlx::query(
        r#"
        INSERT INTO upload_sessions (
            id, file_id, owner_id, total_size, chunk_size, total_chunks, uploaded_chunks,
            created_at, expires_at, completed_at, version
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(parts.id)
    .bind(parts.file_id)
    .bind(parts.owner_id)
    .bind(to_bigint(parts.total_size)?)
    .bind(to_bigint(parts.chunk_size)?)
    .bind(i64::from(parts.total_chunks))
    .bind(chunks)
    .bind(parts.created_at)
    .bind(parts.expires_at)
    .bind(parts.completed_at)
    .bind(parts.version)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn update_session(
    conn: &mut PgConnection,
    parts: &UploadSessionParts,
) -> Result<(), AppError> {
    let chunks: Vec<i64> = parts.uploaded_chunks.iter().map(|&i| i64::from(i)).collect();
    let result = sqlx::query(
        r#"
        UPDATE upload_sessions
        SET uploaded_chunks = $3, completed_at = $4, file_id = $5, version = version + 1
        WHERE id = $1 AND version = $2
        "#,
    )
    .bind(parts.id)
    .bind(parts.version)
    .bind(chunks)
    .bind(parts.completed_at)
    .bind(parts.file_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let stored: Option<i64> =
            sqlx::query_scalar("SELECT version FROM upload_sessions WHERE id = $1")
                .bind(parts.id)
                .fetch_optional(&mut *conn)
                .await?;
        return Err(match stored {
            None => AppError::SessionNotFound(parts.id),
            Some(version) => AppError::ConcurrencyConflict(format!(
                "upload session {} is at version {}, update was based on {}",
                parts.id, version, parts.version
            )),
        });
    }
    Ok(())
}

async fn delete_session(conn: &mut PgConnection, id: Uuid) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM upload_sessions WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn push_search_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &FileSearch) {
    builder.push(" WHERE TRUE");
    if let Some(owner_id) = query.owner_id {
        builder.push(" AND owner_id = ").push_bind(owner_id);
    }
    if let Some(category) = query.category {
        builder.push(" AND category = ").push_bind(category.as_str());
    }
    if let Some(state) = query.state {
        builder.push(" AND upload_state = ").push_bind(state.as_str());
    }
    if let Some(name) = &query.name_contains {
        builder
            .push(" AND original_name ILIKE ")
            .push_bind(format!("%{}%", escape_like(name)));
    }
    if let Some(tag) = &query.tag {
        builder
            .push(" AND ")
            .push_bind(tag.clone())
            .push(" = ANY(tags)");
    }
    if let Some(after) = query.captured_after {
        builder.push(" AND captured_at >= ").push_bind(after);
    }
    if let Some(before) = query.captured_before {
        builder.push(" AND captured_at < ").push_bind(before);
    }
}

/// [`RecordStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_session(&self, id: Uuid) -> Result<Option<UploadSession>, AppError> {
        let row = sqlx::query_as::<_, UploadSessionRow>(&format!(
            "SELECT {} FROM upload_sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UploadSession::try_from).transpose()
    }
}

#[async_trait]
impl FileRecordRepository for PgRecordStore {
    #[tracing::instrument(skip(self), fields(db.table = "file_records", db.operation = "select"))]
    async fn get_by_id(&self, id: Uuid) -> Result<Option<FileRecord>, AppError> {
        let row = sqlx::query_as::<_, FileRecordRow>(&format!(
            "SELECT {} FROM file_records WHERE id = $1",
            FILE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FileRecord::try_from).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "file_records", db.operation = "select"))]
    async fn get_by_digest(&self, digest: &str) -> Result<Option<FileRecord>, AppError> {
        let row = sqlx::query_as::<_, FileRecordRow>(&format!(
            "SELECT {} FROM file_records WHERE digest = $1",
            FILE_COLUMNS
        ))
        .bind(digest)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FileRecord::try_from).transpose()
    }

    #[tracing::instrument(skip(self, record), fields(db.table = "file_records", db.operation = "insert", file_id = %record.id()))]
    async fn add(&self, record: &FileRecord) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        insert_file(&mut conn, &record.to_parts()).await
    }

    #[tracing::instrument(skip(self, record), fields(db.table = "file_records", db.operation = "update", file_id = %record.id()))]
    async fn update(&self, record: &FileRecord) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        update_file(&mut conn, &record.to_parts()).await
    }

    #[tracing::instrument(skip(self), fields(db.table = "file_records", db.operation = "delete"))]
    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let mut conn = self.pool.acquire().await?;
        delete_file(&mut conn, id).await
    }

    async fn get_by_owner(
        &self,
        owner_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<FileRecord>, AppError> {
        self.search(&FileSearch {
            owner_id: Some(owner_id),
            page,
            ..Default::default()
        })
        .await
    }

    #[tracing::instrument(skip(self, query), fields(db.table = "file_records", db.operation = "search"))]
    async fn search(&self, query: &FileSearch) -> Result<Page<FileRecord>, AppError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM file_records");
        push_search_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM file_records", FILE_COLUMNS));
        push_search_filters(&mut select, query);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(i64::from(query.page.per_page()))
            .push(" OFFSET ")
            .push_bind(to_bigint(query.page.offset())?);
        let rows: Vec<FileRecordRow> = select.build_query_as().fetch_all(&self.pool).await?;

        let items = rows
            .into_iter()
            .map(FileRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or(0),
            page: query.page.page(),
            per_page: query.page.per_page(),
        })
    }
}

#[async_trait]
impl UploadSessionRepository for PgRecordStore {
    #[tracing::instrument(skip(self), fields(db.table = "upload_sessions", db.operation = "select"))]
    async fn get_session(&self, id: Uuid) -> Result<Option<UploadSession>, AppError> {
        self.fetch_session(id).await
    }

    #[tracing::instrument(skip(self, session), fields(db.table = "upload_sessions", db.operation = "insert", session_id = %session.id()))]
    async fn add_session(&self, session: &UploadSession) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        insert_session(&mut conn, &session.to_parts()).await
    }

    #[tracing::instrument(skip(self, session), fields(db.table = "upload_sessions", db.operation = "update", session_id = %session.id()))]
    async fn update_session(&self, session: &UploadSession) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        update_session(&mut conn, &session.to_parts()).await
    }

    #[tracing::instrument(skip(self), fields(db.table = "upload_sessions", db.operation = "record_chunk"))]
    async fn record_chunk(&self, id: Uuid, index: u32) -> Result<UploadSession, AppError> {
        // Single-statement set insert; the row lock serializes concurrent chunks.
        let row = sqlx::query_as::<_, UploadSessionRow>(&format!(
            r#"
            UPDATE upload_sessions
            SET uploaded_chunks = array_append(uploaded_chunks, $2), version = version + 1
            WHERE id = $1
              AND completed_at IS NULL
              AND $2 < total_chunks
              AND NOT ($2 = ANY(uploaded_chunks))
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(id)
        .bind(i64::from(index))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return UploadSession::try_from(row);
        }

        // Nothing changed: either the index was already recorded or the chunk is not acceptable.
        let session = self
            .fetch_session(id)
            .await?
            .ok_or(AppError::SessionNotFound(id))?;
        session.clone().mark_chunk(index)?;
        Ok(session)
    }

    async fn expired_sessions(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<UploadSession>, AppError> {
        let rows = sqlx::query_as::<_, UploadSessionRow>(&format!(
            r#"
            SELECT {}
            FROM upload_sessions
            WHERE completed_at IS NULL AND expires_at < $1
            ORDER BY expires_at
            LIMIT $2
            "#,
            SESSION_COLUMNS
        ))
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UploadSession::try_from).collect()
    }

    async fn delete_session(&self, id: Uuid) -> Result<bool, AppError> {
        let mut conn = self.pool.acquire().await?;
        delete_session(&mut conn, id).await
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    #[tracing::instrument(skip(self, changes), fields(changes = changes.len()))]
    async fn save_changes(&self, changes: ChangeSet) -> Result<(), AppError> {
        if changes.is_empty() {
            return Ok(());
        }

        // Dropping the transaction on an early return rolls it back
        let mut tx = self.pool.begin().await?;
        for change in changes.into_changes() {
            match change {
                RecordChange::AddFile(parts) => insert_file(&mut tx, &parts).await?,
                RecordChange::UpdateFile(parts) => update_file(&mut tx, &parts).await?,
                RecordChange::DeleteFile(id) => {
                    delete_file(&mut tx, id).await?;
                }
                RecordChange::AddSession(parts) => insert_session(&mut tx, &parts).await?,
                RecordChange::UpdateSession(parts) => update_session(&mut tx, &parts).await?,
                RecordChange::DeleteSession(id) => {
                    delete_session(&mut tx, id).await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }
}
