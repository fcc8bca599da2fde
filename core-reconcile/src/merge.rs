//! Version merging
//!
//! Reconciles a fresh remote version listing with the locally cached rows
//! of one playlist. The merge is field-aware: display fields (name, number,
//! thumbnail) always track the remote, while local-only review state
//! (draft notes, labels, note status) is never overwritten. Local versions
//! the user placed manually survive even when the remote listing does not
//! contain them.
//!
//! Merges for the same playlist are serialized; two concurrent merges of
//! one playlist would race on the same rows.

use crate::error::Result;
use core_store::models::Version;
use core_store::tx;
use remote_traits::RemoteVersion;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};

/// What a merge did, for logging and event payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: u64,
    pub updated: u64,
    pub removed: u64,
    pub restored: u64,
}

impl MergeStats {
    pub fn is_noop(&self) -> bool {
        *self == MergeStats::default()
    }
}

pub struct VersionMerger {
    pool: SqlitePool,
    locks: std::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl VersionMerger {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, playlist_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(playlist_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Merge a remote version listing into a playlist's cached rows.
    ///
    /// All row mutations happen in one transaction. Returns the merged,
    /// non-removed versions (remote listing order, then manual additions)
    /// along with the merge statistics. Running the same merge twice
    /// produces zero writes the second time.
    #[instrument(skip(self, remote_versions), fields(playlist_id = %playlist_id))]
    pub async fn merge(
        &self,
        playlist_id: &str,
        remote_versions: &[RemoteVersion],
    ) -> Result<(Vec<Version>, MergeStats)> {
        let lock = self.lock_for(playlist_id);
        let _guard = lock.lock().await;

        let now = chrono::Utc::now().timestamp();
        let mut stats = MergeStats::default();

        let mut tx_handle = self.pool.begin().await.map_err(core_store::StoreError::from)?;

        let locals = tx::find_versions_by_playlist(&mut tx_handle, playlist_id).await?;

        let mut by_external: HashMap<&str, &Version> = HashMap::new();
        for version in &locals {
            if let Some(external_id) = version.external_version_id.as_deref() {
                by_external.insert(external_id, version);
            }
        }

        let remote_ids: HashSet<&str> = remote_versions
            .iter()
            .map(|r| r.external_id.as_str())
            .collect();

        let mut merged: Vec<Version> = Vec::with_capacity(remote_versions.len());

        for remote in remote_versions {
            match by_external.get(remote.external_id.as_str()) {
                Some(local) => {
                    let mut updated = (*local).clone();
                    updated.name = remote.name.clone();
                    updated.number = remote.number;
                    updated.thumbnail_ref = remote.thumbnail_ref.clone();
                    if updated.is_removed {
                        updated.is_removed = false;
                        stats.restored += 1;
                    }

                    let changed = updated.name != local.name
                        || updated.number != local.number
                        || updated.thumbnail_ref != local.thumbnail_ref
                        || updated.is_removed != local.is_removed;

                    if changed {
                        updated.last_modified = now;
                        tx::update_version(&mut tx_handle, &updated).await?;
                        if updated.is_removed == local.is_removed {
                            stats.updated += 1;
                        }
                    }

                    merged.push(updated);
                }
                None => {
                    let mut version = Version::new_remote(
                        playlist_id.to_string(),
                        remote.external_id.clone(),
                        remote.name.clone(),
                        remote.number,
                    );
                    version.thumbnail_ref = remote.thumbnail_ref.clone();

                    tx::insert_version(&mut tx_handle, &version).await?;
                    stats.inserted += 1;
                    merged.push(version);
                }
            }
        }

        for local in &locals {
            let present_remotely = local
                .external_version_id
                .as_deref()
                .is_some_and(|id| remote_ids.contains(id));

            if present_remotely {
                continue;
            }

            if local.manually_added {
                if !local.is_removed {
                    merged.push(local.clone());
                }
                continue;
            }

            // Soft removal keeps the row for the retention window so the
            // pending-changes delta can still show what disappeared.
            if !local.is_removed {
                tx::mark_version_removed(&mut tx_handle, &local.id, now).await?;
                stats.removed += 1;
            }
        }

        tx_handle.commit().await.map_err(core_store::StoreError::from)?;

        if !stats.is_noop() {
            debug!(
                inserted = stats.inserted,
                updated = stats.updated,
                removed = stats.removed,
                restored = stats.restored,
                "Merged remote versions"
            );
        }

        Ok((merged, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_store::create_test_pool;
    use core_store::models::{NoteStatus, Playlist, PlaylistKind};
    use core_store::repositories::{PlaylistRepository, SqlitePlaylistRepository};

    fn remote(external_id: &str, name: &str, number: i64) -> RemoteVersion {
        RemoteVersion {
            external_id: external_id.to_string(),
            name: name.to_string(),
            number,
            thumbnail_ref: None,
            status: None,
        }
    }

    async fn setup_playlist(pool: &SqlitePool) -> Playlist {
        let mut playlist = Playlist::new_local(
            "Dailies".to_string(),
            "proj-1".to_string(),
            PlaylistKind::Session,
        );
        playlist.external_id = Some("ext-PL".to_string());
        SqlitePlaylistRepository::new(pool.clone())
            .insert(&playlist)
            .await
            .unwrap();
        playlist
    }

    #[tokio::test]
    async fn test_merge_is_idempotent() {
        let pool = create_test_pool().await.unwrap();
        let playlist = setup_playlist(&pool).await;
        let merger = VersionMerger::new(pool);

        let listing = vec![remote("v-1", "shot_010", 1), remote("v-2", "shot_020", 2)];

        let (_, first) = merger.merge(&playlist.id, &listing).await.unwrap();
        assert_eq!(first.inserted, 2);

        let (versions, second) = merger.merge(&playlist.id, &listing).await.unwrap();
        assert!(second.is_noop(), "unchanged listing must produce no writes");
        assert_eq!(versions.len(), 2);
    }

    #[tokio::test]
    async fn test_local_review_state_survives_merge() {
        let pool = create_test_pool().await.unwrap();
        let playlist = setup_playlist(&pool).await;
        let merger = VersionMerger::new(pool.clone());

        let (versions, _) = merger
            .merge(&playlist.id, &[remote("v-1", "shot_010", 1)])
            .await
            .unwrap();

        let mut annotated = versions[0].clone();
        annotated.draft_content = Some("fix the lighting".to_string());
        annotated.label_id = Some("label-1".to_string());
        annotated.note_status = NoteStatus::Draft;
        let mut conn = pool.acquire().await.unwrap();
        tx::update_version(&mut conn, &annotated).await.unwrap();
        drop(conn);

        // Remote renames the version; local review state must survive.
        let (versions, stats) = merger
            .merge(&playlist.id, &[remote("v-1", "shot_010_v2", 1)])
            .await
            .unwrap();

        assert_eq!(stats.updated, 1);
        assert_eq!(versions[0].name, "shot_010_v2");
        assert_eq!(versions[0].draft_content.as_deref(), Some("fix the lighting"));
        assert_eq!(versions[0].label_id.as_deref(), Some("label-1"));
        assert_eq!(versions[0].note_status, NoteStatus::Draft);
    }

    #[tokio::test]
    async fn test_manual_versions_survive_remote_absence() {
        let pool = create_test_pool().await.unwrap();
        let playlist = setup_playlist(&pool).await;
        let merger = VersionMerger::new(pool.clone());

        let manual = Version::new_manual(playlist.id.clone(), "ref_plate".to_string(), 1);
        let mut conn = pool.acquire().await.unwrap();
        tx::insert_version(&mut conn, &manual).await.unwrap();
        drop(conn);

        let (versions, stats) = merger
            .merge(&playlist.id, &[remote("v-1", "shot_010", 1)])
            .await
            .unwrap();

        assert_eq!(stats.removed, 0);
        assert_eq!(versions.len(), 2);
        assert!(versions.iter().any(|v| v.id == manual.id));
    }

    #[tokio::test]
    async fn test_remote_dropped_version_is_soft_removed() {
        let pool = create_test_pool().await.unwrap();
        let playlist = setup_playlist(&pool).await;
        let merger = VersionMerger::new(pool.clone());

        merger
            .merge(&playlist.id, &[remote("v-1", "shot_010", 1), remote("v-2", "shot_020", 1)])
            .await
            .unwrap();

        let (versions, stats) = merger
            .merge(&playlist.id, &[remote("v-1", "shot_010", 1)])
            .await
            .unwrap();

        assert_eq!(stats.removed, 1);
        assert_eq!(versions.len(), 1);

        // The row is retained in storage, just flagged.
        let mut conn = pool.acquire().await.unwrap();
        let all = tx::find_versions_by_playlist(&mut conn, &playlist.id)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|v| v.is_removed));
    }

    #[tokio::test]
    async fn test_removed_version_is_restored_when_remote_returns() {
        let pool = create_test_pool().await.unwrap();
        let playlist = setup_playlist(&pool).await;
        let merger = VersionMerger::new(pool);

        merger
            .merge(&playlist.id, &[remote("v-1", "shot_010", 1)])
            .await
            .unwrap();
        merger.merge(&playlist.id, &[]).await.unwrap();

        let (versions, stats) = merger
            .merge(&playlist.id, &[remote("v-1", "shot_010", 1)])
            .await
            .unwrap();

        assert_eq!(stats.restored, 1);
        assert_eq!(versions.len(), 1);
        assert!(!versions[0].is_removed);
    }
}
