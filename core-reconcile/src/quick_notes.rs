//! Quick-notes playlist lifecycle
//!
//! Every project has exactly one permanent, local-only playlist for ad-hoc
//! note taking. Its id is derived from the project id, so callers can
//! reference it before the row exists and across restarts. It never gains
//! an external id and is invisible to every reconciliation pass.

use crate::error::Result;
use core_store::models::Playlist;
use sqlx::SqlitePool;
use tracing::debug;

pub struct QuickNotesManager {
    pool: SqlitePool,
}

impl QuickNotesManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The quick-notes playlist id for a project. Pure derivation, no
    /// storage access.
    pub fn quick_notes_id(project_id: &str) -> String {
        Playlist::quick_notes_id(project_id)
    }

    /// Ensure the quick-notes row exists for a project and return it.
    ///
    /// Idempotent. The deterministic primary key makes the insert safe
    /// against concurrent initialization: a second caller either sees the
    /// row or loses the insert race and re-reads.
    pub async fn initialize(&self, project_id: &str) -> Result<Playlist> {
        let id = Self::quick_notes_id(project_id);

        if let Some(existing) =
            sqlx::query_as::<_, Playlist>("SELECT * FROM playlists WHERE id = ?")
                .bind(&id)
                .fetch_optional(&self.pool)
                .await
                .map_err(core_store::StoreError::from)?
        {
            return Ok(existing);
        }

        let playlist = Playlist::new_quick_notes(project_id.to_string());

        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO playlists (
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
        .await
        .map_err(core_store::StoreError::from)?;

        if inserted.rows_affected() > 0 {
            debug!(project_id = %project_id, "Created quick-notes playlist");
            return Ok(playlist);
        }

        // Lost the insert race; the winner's row is authoritative.
        let row = sqlx::query_as::<_, Playlist>("SELECT * FROM playlists WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.pool)
            .await
            .map_err(core_store::StoreError::from)?;

        Ok(row)
    }
}
