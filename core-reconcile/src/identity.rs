//! Identity resolution for remote playlists
//!
//! Maps a remote external id to exactly one stable local id. The lookup and
//! the placeholder insert share the caller's transaction handle, so two
//! overlapping refresh cycles can never both miss the SELECT and both
//! insert, which is how duplicate cache rows were minted historically.
//! Local ids are never derived from external ids and never change once
//! assigned.

use crate::error::{ReconcileError, Result};
use core_store::models::{LocalStatus, Playlist, PlaylistKind, RemoteSyncStatus};
use core_store::tx;
use remote_traits::{RemotePlaylist, RemotePlaylistKind};
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

pub(crate) fn local_kind(kind: RemotePlaylistKind) -> PlaylistKind {
    match kind {
        RemotePlaylistKind::Session => PlaylistKind::Session,
        RemotePlaylistKind::List => PlaylistKind::List,
    }
}

pub struct IdentityResolver;

impl IdentityResolver {
    /// Resolve a remote playlist to its local cache row, creating the row
    /// if this is the first sighting.
    ///
    /// Must run on a transaction handle; see the module docs.
    pub async fn resolve_or_create(
        conn: &mut SqliteConnection,
        remote: &RemotePlaylist,
    ) -> Result<Playlist> {
        if let Some(existing) =
            tx::find_playlist_by_external_id(conn, &remote.external_id).await?
        {
            // The quick-notes playlist is local-only by invariant. A row of
            // that kind carrying an external id means the cache is corrupt,
            // not merely stale.
            if existing.kind == PlaylistKind::QuickNotes {
                return Err(ReconcileError::IdentityCollision {
                    external_id: remote.external_id.clone(),
                });
            }

            return Ok(existing);
        }

        let now = chrono::Utc::now().timestamp();
        let playlist = Playlist {
            id: Uuid::new_v4().to_string(),
            external_id: Some(remote.external_id.clone()),
            project_id: remote.project_id.clone(),
            name: remote.name.clone(),
            kind: local_kind(remote.kind),
            category_id: remote.category_id.clone(),
            category_name: remote.category_name.clone(),
            local_status: LocalStatus::Synced,
            remote_sync_status: RemoteSyncStatus::Synced,
            deleted_remotely: false,
            created_at: now,
            updated_at: now,
            synced_at: Some(now),
        };

        tx::insert_playlist(conn, &playlist).await?;
        debug!(
            external_id = %remote.external_id,
            local_id = %playlist.id,
            "Materialized remote playlist"
        );

        Ok(playlist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_store::create_test_pool;

    fn remote(external_id: &str) -> RemotePlaylist {
        RemotePlaylist {
            external_id: external_id.to_string(),
            name: "Dailies".to_string(),
            project_id: "proj-1".to_string(),
            kind: RemotePlaylistKind::Session,
            category_id: None,
            category_name: None,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn test_first_sighting_creates_row() {
        let pool = create_test_pool().await.unwrap();

        let mut tx_handle = pool.begin().await.unwrap();
        let created = IdentityResolver::resolve_or_create(&mut tx_handle, &remote("ext-A"))
            .await
            .unwrap();
        tx_handle.commit().await.unwrap();

        assert_eq!(created.external_id.as_deref(), Some("ext-A"));
        assert_ne!(created.id, "ext-A", "local id must not mirror the remote id");
        assert_eq!(created.local_status, LocalStatus::Synced);
    }

    #[tokio::test]
    async fn test_second_sighting_reuses_local_id() {
        let pool = create_test_pool().await.unwrap();

        let mut tx_handle = pool.begin().await.unwrap();
        let first = IdentityResolver::resolve_or_create(&mut tx_handle, &remote("ext-A"))
            .await
            .unwrap();
        tx_handle.commit().await.unwrap();

        let mut tx_handle = pool.begin().await.unwrap();
        let second = IdentityResolver::resolve_or_create(&mut tx_handle, &remote("ext-A"))
            .await
            .unwrap();
        tx_handle.commit().await.unwrap();

        assert_eq!(first.id, second.id);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM playlists")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_list_kind_carries_category() {
        let pool = create_test_pool().await.unwrap();

        let mut list = remote("ext-L");
        list.kind = RemotePlaylistKind::List;
        list.category_id = Some("cat-1".to_string());
        list.category_name = Some("Lighting".to_string());

        let mut tx_handle = pool.begin().await.unwrap();
        let created = IdentityResolver::resolve_or_create(&mut tx_handle, &list)
            .await
            .unwrap();
        tx_handle.commit().await.unwrap();

        assert_eq!(created.kind, PlaylistKind::List);
        assert_eq!(created.category_id.as_deref(), Some("cat-1"));
        assert_eq!(created.category_name.as_deref(), Some("Lighting"));
    }
}
