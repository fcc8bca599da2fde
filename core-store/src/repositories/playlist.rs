//! Playlist repository trait and implementation

use crate::error::{Result, StoreError};
use crate::models::Playlist;
use async_trait::async_trait;
use sqlx::{query, query_as, SqlitePool};

/// Playlist repository interface for data access operations
#[async_trait]
pub trait PlaylistRepository: Send + Sync {
    /// Find a playlist by its local ID
    ///
    /// # Returns
    /// - `Ok(Some(playlist))` if found
    /// - `Ok(None)` if not found
    /// - `Err` if database error occurs
    async fn find_by_id(&self, id: &str) -> Result<Option<Playlist>>;

    /// Find playlists referencing an external id, oldest first.
    ///
    /// May legitimately return more than one row: duplicate rows from
    /// historical check-then-insert races survive until the dedup pass
    /// repairs them.
    async fn find_by_external_id(&self, external_id: &str) -> Result<Vec<Playlist>>;

    /// All playlists belonging to a project, quick-notes first, then by name
    async fn find_by_project(&self, project_id: &str) -> Result<Vec<Playlist>>;

    /// All playlists holding a non-null external id, any project
    async fn find_remote_backed(&self) -> Result<Vec<Playlist>>;

    /// Playlists flagged as deleted on the remote side
    async fn find_deleted_remotely(&self) -> Result<Vec<Playlist>>;

    /// Insert a new playlist
    ///
    /// # Errors
    /// Returns error if a playlist with the same ID exists, validation
    /// fails, or a database error occurs
    async fn insert(&self, playlist: &Playlist) -> Result<()>;

    /// Update an existing playlist
    async fn update(&self, playlist: &Playlist) -> Result<()>;

    /// Delete a playlist by ID, cascading to versions, notes, attachments
    ///
    /// # Returns
    /// - `Ok(true)` if the playlist was deleted
    /// - `Ok(false)` if it was not found
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Count total playlists
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of PlaylistRepository
pub struct SqlitePlaylistRepository {
    pool: SqlitePool,
}

impl SqlitePlaylistRepository {
    /// Create a new SqlitePlaylistRepository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlaylistRepository for SqlitePlaylistRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Playlist>> {
        let playlist = query_as::<_, Playlist>("SELECT * FROM playlists WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(playlist)
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Vec<Playlist>> {
        let playlists = query_as::<_, Playlist>(
            "SELECT * FROM playlists WHERE external_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(external_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(playlists)
    }

    async fn find_by_project(&self, project_id: &str) -> Result<Vec<Playlist>> {
        let playlists = query_as::<_, Playlist>(
            r#"
            SELECT * FROM playlists
            WHERE project_id = ?
            ORDER BY CASE kind WHEN 'quick_notes' THEN 0 ELSE 1 END, name ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(playlists)
    }

    async fn find_remote_backed(&self) -> Result<Vec<Playlist>> {
        let playlists = query_as::<_, Playlist>(
            "SELECT * FROM playlists WHERE external_id IS NOT NULL ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(playlists)
    }

    async fn find_deleted_remotely(&self) -> Result<Vec<Playlist>> {
        let playlists = query_as::<_, Playlist>(
            "SELECT * FROM playlists WHERE deleted_remotely = 1 ORDER BY updated_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(playlists)
    }

    async fn insert(&self, playlist: &Playlist) -> Result<()> {
        playlist.validate().map_err(|e| StoreError::InvalidInput {
            field: "Playlist".to_string(),
            message: e,
        })?;

        query(
            r#"
            INSERT INTO playlists (
                id, external_id, project_id, name, kind, category_id,
                category_name, local_status, remote_sync_status,
                deleted_remotely, created_at, updated_at, synced_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&playlist.id)
        .bind(&playlist.external_id)
        .bind(&playlist.project_id)
        .bind(&playlist.name)
        .bind(playlist.kind)
        .bind(&playlist.category_id)
        .bind(&playlist.category_name)
        .bind(playlist.local_status)
        .bind(playlist.remote_sync_status)
        .bind(playlist.deleted_remotely)
        .bind(playlist.created_at)
        .bind(playlist.updated_at)
        .bind(playlist.synced_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, playlist: &Playlist) -> Result<()> {
        playlist.validate().map_err(|e| StoreError::InvalidInput {
            field: "Playlist".to_string(),
            message: e,
        })?;

        let result = query(
            r#"
            UPDATE playlists
            SET external_id = ?, project_id = ?, name = ?, kind = ?,
                category_id = ?, category_name = ?, local_status = ?,
                remote_sync_status = ?, deleted_remotely = ?,
                updated_at = ?, synced_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&playlist.external_id)
        .bind(&playlist.project_id)
        .bind(&playlist.name)
        .bind(playlist.kind)
        .bind(&playlist.category_id)
        .bind(&playlist.category_name)
        .bind(playlist.local_status)
        .bind(playlist.remote_sync_status)
        .bind(playlist.deleted_remotely)
        .bind(playlist.updated_at)
        .bind(playlist.synced_at)
        .bind(&playlist.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity_type: "Playlist".to_string(),
                id: playlist.id.clone(),
            });
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        // Foreign keys cascade versions -> notes -> attachments
        let result = query("DELETE FROM playlists WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) as count FROM playlists")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::PlaylistKind;
    use crate::repositories::VersionRepository;

    #[tokio::test]
    async fn test_insert_and_find_playlist() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqlitePlaylistRepository::new(pool);

        let playlist = Playlist::new_local(
            "Dailies".to_string(),
            "proj-1".to_string(),
            PlaylistKind::Session,
        );
        repo.insert(&playlist).await.unwrap();

        let found = repo.find_by_id(&playlist.id).await.unwrap();
        assert!(found.is_some());
        let found = found.unwrap();
        assert_eq!(found.name, "Dailies");
        assert_eq!(found.external_id, None);
        assert_eq!(found.kind, PlaylistKind::Session);
    }

    #[tokio::test]
    async fn test_find_by_external_id_returns_duplicates_oldest_first() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqlitePlaylistRepository::new(pool);

        let mut older = Playlist::new_local(
            "Dailies".to_string(),
            "proj-1".to_string(),
            PlaylistKind::Session,
        );
        older.external_id = Some("ext-A".to_string());
        older.created_at = 100;

        let mut newer = older.clone();
        newer.id = uuid::Uuid::new_v4().to_string();
        newer.created_at = 200;

        repo.insert(&newer).await.unwrap();
        repo.insert(&older).await.unwrap();

        let found = repo.find_by_external_id("ext-A").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, older.id, "oldest row should come first");
    }

    #[tokio::test]
    async fn test_find_by_project_puts_quick_notes_first() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqlitePlaylistRepository::new(pool);

        let regular = Playlist::new_local(
            "Animation Review".to_string(),
            "proj-1".to_string(),
            PlaylistKind::Session,
        );
        let quick_notes = Playlist::new_quick_notes("proj-1".to_string());

        repo.insert(&regular).await.unwrap();
        repo.insert(&quick_notes).await.unwrap();

        let found = repo.find_by_project("proj-1").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].kind, PlaylistKind::QuickNotes);
    }

    #[tokio::test]
    async fn test_update_playlist() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqlitePlaylistRepository::new(pool);

        let mut playlist = Playlist::new_local(
            "Original".to_string(),
            "proj-1".to_string(),
            PlaylistKind::Session,
        );
        repo.insert(&playlist).await.unwrap();

        playlist.name = "Renamed".to_string();
        playlist.updated_at += 1;
        repo.update(&playlist).await.unwrap();

        let found = repo.find_by_id(&playlist.id).await.unwrap().unwrap();
        assert_eq!(found.name, "Renamed");
    }

    #[tokio::test]
    async fn test_update_missing_playlist_is_not_found() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqlitePlaylistRepository::new(pool);

        let playlist = Playlist::new_local(
            "Ghost".to_string(),
            "proj-1".to_string(),
            PlaylistKind::Session,
        );

        let result = repo.update(&playlist).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_versions() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqlitePlaylistRepository::new(pool.clone());

        let playlist = Playlist::new_local(
            "Dailies".to_string(),
            "proj-1".to_string(),
            PlaylistKind::Session,
        );
        repo.insert(&playlist).await.unwrap();

        let version = crate::models::Version::new_manual(
            playlist.id.clone(),
            "shot_010".to_string(),
            1,
        );
        let version_repo = crate::repositories::SqliteVersionRepository::new(pool.clone());
        version_repo.insert(&version).await.unwrap();

        assert!(repo.delete(&playlist.id).await.unwrap());

        let remaining: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM versions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining.0, 0, "versions should cascade");
    }
}
