//! Attachment repository trait and implementation

use crate::error::{Result, StoreError};
use crate::models::Attachment;
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

/// Attachment repository interface for data access operations
#[async_trait]
pub trait AttachmentRepository: Send + Sync {
    /// All attachments on a note, oldest first
    async fn find_by_note(&self, note_id: &str) -> Result<Vec<Attachment>>;

    /// Insert a new attachment
    async fn insert(&self, attachment: &Attachment) -> Result<()>;

    /// Delete an attachment
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// SQLite implementation of AttachmentRepository
pub struct SqliteAttachmentRepository {
    pool: SqlitePool,
}

impl SqliteAttachmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttachmentRepository for SqliteAttachmentRepository {
    async fn find_by_note(&self, note_id: &str) -> Result<Vec<Attachment>> {
        let attachments = query_as::<_, Attachment>(
            "SELECT * FROM attachments WHERE note_id = ? ORDER BY created_at ASC",
        )
        .bind(note_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(attachments)
    }

    async fn insert(&self, attachment: &Attachment) -> Result<()> {
        attachment
            .validate()
            .map_err(|e| StoreError::InvalidInput {
                field: "Attachment".to_string(),
                message: e,
            })?;

        query(
            r#"
            INSERT INTO attachments (id, note_id, file_name, media_ref, size_bytes, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&attachment.id)
        .bind(&attachment.note_id)
        .bind(&attachment.file_name)
        .bind(&attachment.media_ref)
        .bind(attachment.size_bytes)
        .bind(attachment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = query("DELETE FROM attachments WHERE id = ?")
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
    use crate::models::{Note, Playlist, PlaylistKind, Version};
    use crate::repositories::{
        NoteRepository, PlaylistRepository, SqliteNoteRepository, SqlitePlaylistRepository,
        SqliteVersionRepository, VersionRepository,
    };

    #[tokio::test]
    async fn test_insert_and_find_attachment() {
        let pool = create_test_pool().await.unwrap();

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

        let note = Note::new_draft(version.id, "see annotated frame".to_string());
        SqliteNoteRepository::new(pool.clone())
            .insert(&note)
            .await
            .unwrap();

        let repo = SqliteAttachmentRepository::new(pool);
        let attachment = Attachment::new(
            note.id.clone(),
            "frame_0142.png".to_string(),
            "media://annotations/frame_0142.png".to_string(),
        );
        repo.insert(&attachment).await.unwrap();

        let found = repo.find_by_note(&note.id).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_name, "frame_0142.png");
    }
}
