//! Note repository trait and implementation

use crate::error::{Result, StoreError};
use crate::models::Note;
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

/// Note repository interface for data access operations
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Find a note by its ID
    async fn find_by_id(&self, id: &str) -> Result<Option<Note>>;

    /// All notes attached to a version, newest first
    async fn find_by_version(&self, version_id: &str) -> Result<Vec<Note>>;

    /// Insert a new note
    async fn insert(&self, note: &Note) -> Result<()>;

    /// Update an existing note
    async fn update(&self, note: &Note) -> Result<()>;

    /// Delete a note and its attachments
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// SQLite implementation of NoteRepository
pub struct SqliteNoteRepository {
    pool: SqlitePool,
}

impl SqliteNoteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NoteRepository for SqliteNoteRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Note>> {
        let note = query_as::<_, Note>("SELECT * FROM notes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(note)
    }

    async fn find_by_version(&self, version_id: &str) -> Result<Vec<Note>> {
        let notes = query_as::<_, Note>(
            "SELECT * FROM notes WHERE version_id = ? ORDER BY created_at DESC",
        )
        .bind(version_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(notes)
    }

    async fn insert(&self, note: &Note) -> Result<()> {
        note.validate().map_err(|e| StoreError::InvalidInput {
            field: "Note".to_string(),
            message: e,
        })?;

        query(
            r#"
            INSERT INTO notes (id, version_id, content, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&note.id)
        .bind(&note.version_id)
        .bind(&note.content)
        .bind(&note.status)
        .bind(note.created_at)
        .bind(note.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, note: &Note) -> Result<()> {
        note.validate().map_err(|e| StoreError::InvalidInput {
            field: "Note".to_string(),
            message: e,
        })?;

        let result = query(
            "UPDATE notes SET content = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&note.content)
        .bind(&note.status)
        .bind(note.updated_at)
        .bind(&note.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity_type: "Note".to_string(),
                id: note.id.clone(),
            });
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = query("DELETE FROM notes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{Playlist, PlaylistKind, Version};
    use crate::repositories::{
        PlaylistRepository, SqlitePlaylistRepository, SqliteVersionRepository, VersionRepository,
    };

    async fn setup_version(pool: &SqlitePool) -> Version {
        let playlist = Playlist::new_local(
            "Dailies".to_string(),
            "proj-1".to_string(),
            PlaylistKind::Session,
        );
        SqlitePlaylistRepository::new(pool.clone())
            .insert(&playlist)
            .await
            .unwrap();

        let version = Version::new_manual(playlist.id, "shot_010".to_string(), 1);
        SqliteVersionRepository::new(pool.clone())
            .insert(&version)
            .await
            .unwrap();
        version
    }

    #[tokio::test]
    async fn test_insert_and_find_note() {
        let pool = create_test_pool().await.unwrap();
        let version = setup_version(&pool).await;
        let repo = SqliteNoteRepository::new(pool);

        let note = Note::new_draft(version.id.clone(), "camera drifts left".to_string());
        repo.insert(&note).await.unwrap();

        let found = repo.find_by_version(&version.id).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].content, "camera drifts left");
        assert_eq!(found[0].status, "draft");
    }

    #[tokio::test]
    async fn test_invalid_status_rejected() {
        let pool = create_test_pool().await.unwrap();
        let version = setup_version(&pool).await;
        let repo = SqliteNoteRepository::new(pool);

        let mut note = Note::new_draft(version.id, "looks good".to_string());
        note.status = "archived".to_string();

        let result = repo.insert(&note).await;
        assert!(matches!(result, Err(StoreError::InvalidInput { .. })));
    }
}
