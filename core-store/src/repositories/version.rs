//! Version repository trait and implementation

use crate::error::{Result, StoreError};
use crate::models::{NoteStatus, Version};
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

/// Version repository interface for data access operations
#[async_trait]
pub trait VersionRepository: Send + Sync {
    /// Find a version by its local ID
    async fn find_by_id(&self, id: &str) -> Result<Option<Version>>;

    /// Versions of a playlist that are not soft-removed, in playlist order
    async fn find_by_playlist(&self, playlist_id: &str) -> Result<Vec<Version>>;

    /// All versions of a playlist including soft-removed ones
    async fn find_by_playlist_with_removed(&self, playlist_id: &str) -> Result<Vec<Version>>;

    /// Insert a new version
    async fn insert(&self, version: &Version) -> Result<()>;

    /// Update an existing version
    async fn update(&self, version: &Version) -> Result<()>;

    /// Soft-remove a version. The row survives for the retention window so
    /// the pending-changes flow can show what was removed upstream.
    async fn mark_removed(&self, id: &str) -> Result<bool>;

    /// Update just the note status of a version
    async fn set_note_status(&self, id: &str, status: NoteStatus) -> Result<()>;

    /// Hard-delete a version and its notes/attachments
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// SQLite implementation of VersionRepository
pub struct SqliteVersionRepository {
    pool: SqlitePool,
}

impl SqliteVersionRepository {
    /// Create a new SqliteVersionRepository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VersionRepository for SqliteVersionRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Version>> {
        let version = query_as::<_, Version>("SELECT * FROM versions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(version)
    }

    async fn find_by_playlist(&self, playlist_id: &str) -> Result<Vec<Version>> {
        let versions = query_as::<_, Version>(
            r#"
            SELECT * FROM versions
            WHERE playlist_id = ? AND is_removed = 0
            ORDER BY added_at ASC, name ASC
            "#,
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(versions)
    }

    async fn find_by_playlist_with_removed(&self, playlist_id: &str) -> Result<Vec<Version>> {
        let versions = query_as::<_, Version>(
            "SELECT * FROM versions WHERE playlist_id = ? ORDER BY added_at ASC, name ASC",
        )
        .bind(playlist_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(versions)
    }

    async fn insert(&self, version: &Version) -> Result<()> {
        version.validate().map_err(|e| StoreError::InvalidInput {
            field: "Version".to_string(),
            message: e,
        })?;

        query(
            r#"
            INSERT INTO versions (
                id, playlist_id, external_version_id, name, number,
                thumbnail_ref, draft_content, label_id, note_status,
                manually_added, is_removed, added_at, last_modified
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&version.id)
        .bind(&version.playlist_id)
        .bind(&version.external_version_id)
        .bind(&version.name)
        .bind(version.number)
        .bind(&version.thumbnail_ref)
        .bind(&version.draft_content)
        .bind(&version.label_id)
        .bind(version.note_status)
        .bind(version.manually_added)
        .bind(version.is_removed)
        .bind(version.added_at)
        .bind(version.last_modified)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, version: &Version) -> Result<()> {
        version.validate().map_err(|e| StoreError::InvalidInput {
            field: "Version".to_string(),
            message: e,
        })?;

        let result = query(
            r#"
            UPDATE versions
            SET external_version_id = ?, name = ?, number = ?, thumbnail_ref = ?,
                draft_content = ?, label_id = ?, note_status = ?,
                manually_added = ?, is_removed = ?, last_modified = ?
            WHERE id = ?
            "#,
        )
        .bind(&version.external_version_id)
        .bind(&version.name)
        .bind(version.number)
        .bind(&version.thumbnail_ref)
        .bind(&version.draft_content)
        .bind(&version.label_id)
        .bind(version.note_status)
        .bind(version.manually_added)
        .bind(version.is_removed)
        .bind(version.last_modified)
        .bind(&version.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity_type: "Version".to_string(),
                id: version.id.clone(),
            });
        }

        Ok(())
    }

    async fn mark_removed(&self, id: &str) -> Result<bool> {
        let result = query(
            "UPDATE versions SET is_removed = 1, last_modified = ? WHERE id = ?",
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_note_status(&self, id: &str, status: NoteStatus) -> Result<()> {
        let result = query(
            "UPDATE versions SET note_status = ?, last_modified = ? WHERE id = ?",
        )
        .bind(status)
        .bind(chrono::Utc::now().timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity_type: "Version".to_string(),
                id: id.to_string(),
            });
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        // Foreign keys cascade notes -> attachments
        let result = query("DELETE FROM versions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
