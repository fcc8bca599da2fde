//! Transaction-scoped query helpers
//!
//! The reconciliation passes (dedup, orphan flag, purge, materialize) and
//! the sync-upload finalize step must apply several row mutations as one
//! unit: a crash mid-pass must not leave a half-migrated cache. These
//! helpers all take a `&mut SqliteConnection` so a caller can run any
//! number of them inside a single `pool.begin()` transaction.
//!
//! Identity resolution in particular depends on this shape: the
//! SELECT-by-external-id and the placeholder INSERT must share one
//! transaction, otherwise two overlapping refresh cycles can mint two
//! local ids for the same remote entity.

use crate::error::Result;
use crate::models::{Playlist, Version};
use sqlx::{query, query_as, SqliteConnection};

/// Oldest playlist row holding the given external id, if any.
pub async fn find_playlist_by_external_id(
    conn: &mut SqliteConnection,
    external_id: &str,
) -> Result<Option<Playlist>> {
    let playlist = query_as::<_, Playlist>(
        "SELECT * FROM playlists WHERE external_id = ? ORDER BY created_at ASC, id ASC LIMIT 1",
    )
    .bind(external_id)
    .fetch_optional(conn)
    .await?;

    Ok(playlist)
}

/// Insert a playlist row on the given transaction handle.
pub async fn insert_playlist(conn: &mut SqliteConnection, playlist: &Playlist) -> Result<()> {
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
    .execute(conn)
    .await?;

    Ok(())
}

/// Update every mutable playlist column on the given transaction handle.
pub async fn update_playlist(conn: &mut SqliteConnection, playlist: &Playlist) -> Result<()> {
    query(
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
    .execute(conn)
    .await?;

    Ok(())
}

/// Hard-delete a playlist row. Versions, notes, and attachments cascade
/// through the foreign keys.
pub async fn delete_playlist_cascade(conn: &mut SqliteConnection, id: &str) -> Result<bool> {
    let result = query("DELETE FROM playlists WHERE id = ?")
        .bind(id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Flag a playlist as deleted on the remote side.
///
/// Bumps `updated_at`, which starts the retention clock for the purge pass.
pub async fn flag_playlist_deleted_remotely(
    conn: &mut SqliteConnection,
    id: &str,
    now: i64,
) -> Result<()> {
    query("UPDATE playlists SET deleted_remotely = 1, updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(id)
        .execute(conn)
        .await?;

    Ok(())
}

/// All versions of a playlist, including soft-removed rows.
pub async fn find_versions_by_playlist(
    conn: &mut SqliteConnection,
    playlist_id: &str,
) -> Result<Vec<Version>> {
    let versions = query_as::<_, Version>(
        "SELECT * FROM versions WHERE playlist_id = ? ORDER BY added_at ASC, name ASC",
    )
    .bind(playlist_id)
    .fetch_all(conn)
    .await?;

    Ok(versions)
}

/// Insert a version row on the given transaction handle.
pub async fn insert_version(conn: &mut SqliteConnection, version: &Version) -> Result<()> {
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
    .execute(conn)
    .await?;

    Ok(())
}

/// Update a version row on the given transaction handle.
pub async fn update_version(conn: &mut SqliteConnection, version: &Version) -> Result<()> {
    query(
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
    .execute(conn)
    .await?;

    Ok(())
}

/// Soft-remove a version on the given transaction handle.
pub async fn mark_version_removed(
    conn: &mut SqliteConnection,
    id: &str,
    now: i64,
) -> Result<()> {
    query("UPDATE versions SET is_removed = 1, last_modified = ? WHERE id = ?")
        .bind(now)
        .bind(id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Clear the manually-added flag on every version of a playlist.
///
/// Runs after a successful sync upload: once versions exist remotely they
/// are canonical remote versions and lose their merge protection.
pub async fn clear_manually_added(
    conn: &mut SqliteConnection,
    playlist_id: &str,
    now: i64,
) -> Result<()> {
    query(
        r#"
        UPDATE versions SET manually_added = 0, last_modified = ?
        WHERE playlist_id = ? AND manually_added = 1
        "#,
    )
    .bind(now)
    .bind(playlist_id)
    .execute(conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{Playlist, PlaylistKind, Version};

    #[tokio::test]
    async fn test_rollback_leaves_no_rows() {
        let pool = create_test_pool().await.unwrap();

        let playlist = Playlist::new_local(
            "Dailies".to_string(),
            "proj-1".to_string(),
            PlaylistKind::Session,
        );

        let mut tx = pool.begin().await.unwrap();
        insert_playlist(&mut tx, &playlist).await.unwrap();
        tx.rollback().await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM playlists")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn test_resolve_then_insert_in_one_transaction() {
        let pool = create_test_pool().await.unwrap();

        let mut playlist = Playlist::new_local(
            "Dailies".to_string(),
            "proj-1".to_string(),
            PlaylistKind::Session,
        );
        playlist.external_id = Some("ext-A".to_string());

        let mut tx = pool.begin().await.unwrap();
        assert!(find_playlist_by_external_id(&mut tx, "ext-A")
            .await
            .unwrap()
            .is_none());
        insert_playlist(&mut tx, &playlist).await.unwrap();
        let found = find_playlist_by_external_id(&mut tx, "ext-A")
            .await
            .unwrap();
        assert_eq!(found.map(|p| p.id), Some(playlist.id.clone()));
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_manually_added_scoped_to_playlist() {
        let pool = create_test_pool().await.unwrap();

        let playlist_a = Playlist::new_local(
            "A".to_string(),
            "proj-1".to_string(),
            PlaylistKind::Session,
        );
        let playlist_b = Playlist::new_local(
            "B".to_string(),
            "proj-1".to_string(),
            PlaylistKind::Session,
        );

        let mut tx = pool.begin().await.unwrap();
        insert_playlist(&mut tx, &playlist_a).await.unwrap();
        insert_playlist(&mut tx, &playlist_b).await.unwrap();
        insert_version(
            &mut tx,
            &Version::new_manual(playlist_a.id.clone(), "shot_010".to_string(), 1),
        )
        .await
        .unwrap();
        insert_version(
            &mut tx,
            &Version::new_manual(playlist_b.id.clone(), "shot_020".to_string(), 1),
        )
        .await
        .unwrap();
        clear_manually_added(&mut tx, &playlist_a.id, 123).await.unwrap();
        tx.commit().await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let a_versions = find_versions_by_playlist(&mut conn, &playlist_a.id)
            .await
            .unwrap();
        assert!(!a_versions[0].manually_added);

        let b_versions = find_versions_by_playlist(&mut conn, &playlist_b.id)
            .await
            .unwrap();
        assert!(b_versions[0].manually_added);
    }
}
