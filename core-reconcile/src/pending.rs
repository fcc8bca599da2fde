//! Remote drift detection
//!
//! Between refreshes, the contents of an open playlist can drift on the
//! remote side. The tracker compares the current remote listing against
//! the cached rows and reports the delta without touching storage. Applying
//! is a separate, explicit step: the exact listing that produced the delta
//! is staged and merged on commit, so the rows the user approved are the
//! rows that land.

use crate::error::{ReconcileError, Result};
use crate::merge::{MergeStats, VersionMerger};
use core_runtime::events::{CoreEvent, EventBus, PlaylistEvent};
use core_store::models::{Playlist, Version};
use core_store::repositories::{
    PlaylistRepository, SqlitePlaylistRepository, SqliteVersionRepository, VersionRepository,
};
use core_store::StoreError;
use remote_traits::{RemoteSource, RemoteVersion};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Delta between a playlist's remote listing and its cached rows.
#[derive(Debug, Clone)]
pub struct PendingChanges {
    pub playlist_id: String,
    /// Remote versions the cache does not have yet.
    pub added: Vec<RemoteVersion>,
    /// Cached versions the remote listing no longer contains. Manual
    /// additions are exempt; they never count as drift.
    pub removed: Vec<Version>,
    pub detected_at: i64,
}

impl PendingChanges {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    fn empty(playlist_id: &str) -> Self {
        Self {
            playlist_id: playlist_id.to_string(),
            added: Vec::new(),
            removed: Vec::new(),
            detected_at: chrono::Utc::now().timestamp(),
        }
    }
}

struct StagedChanges {
    listing: Vec<RemoteVersion>,
    changes: PendingChanges,
}

pub struct PendingChangeTracker {
    remote: Arc<dyn RemoteSource>,
    pool: SqlitePool,
    event_bus: EventBus,
    merger: Arc<VersionMerger>,
    remote_timeout_secs: u64,
    poll_interval: Duration,
    playlists: SqlitePlaylistRepository,
    versions: SqliteVersionRepository,
    staged: std::sync::Mutex<HashMap<String, StagedChanges>>,
}

impl PendingChangeTracker {
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        pool: SqlitePool,
        event_bus: EventBus,
        merger: Arc<VersionMerger>,
        remote_timeout_secs: u64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            remote,
            event_bus,
            merger,
            remote_timeout_secs,
            poll_interval,
            playlists: SqlitePlaylistRepository::new(pool.clone()),
            versions: SqliteVersionRepository::new(pool.clone()),
            staged: std::sync::Mutex::new(HashMap::new()),
            pool,
        }
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = remote_traits::Result<T>>,
    {
        match timeout(Duration::from_secs(self.remote_timeout_secs), fut).await {
            Ok(result) => result.map_err(ReconcileError::from),
            Err(_) => Err(ReconcileError::Timeout(self.remote_timeout_secs)),
        }
    }

    /// Fetch the remote listing for a playlist, compute the drift delta,
    /// and stage it for a later [`commit`](Self::commit). Storage is not
    /// touched. Local drafts and quick-notes have nothing to drift from
    /// and always report an empty delta.
    #[instrument(skip(self))]
    pub async fn detect(&self, playlist_id: &str) -> Result<PendingChanges> {
        let playlist = self
            .playlists
            .find_by_id(playlist_id)
            .await?
            .ok_or_else(|| ReconcileError::PlaylistNotFound {
                id: playlist_id.to_string(),
            })?;

        let Some(external_id) = playlist.external_id.clone() else {
            return Ok(PendingChanges::empty(playlist_id));
        };

        let listing = self
            .with_timeout(self.remote.list_versions(&external_id))
            .await?;

        let locals = self.versions.find_by_playlist(playlist_id).await?;
        let local_ids: HashSet<&str> = locals
            .iter()
            .filter_map(|v| v.external_version_id.as_deref())
            .collect();
        let remote_ids: HashSet<&str> = listing.iter().map(|r| r.external_id.as_str()).collect();

        let added: Vec<RemoteVersion> = listing
            .iter()
            .filter(|r| !local_ids.contains(r.external_id.as_str()))
            .cloned()
            .collect();

        let removed: Vec<Version> = locals
            .into_iter()
            .filter(|v| {
                !v.manually_added
                    && v.external_version_id
                        .as_deref()
                        .is_some_and(|id| !remote_ids.contains(id))
            })
            .collect();

        let changes = PendingChanges {
            playlist_id: playlist_id.to_string(),
            added,
            removed,
            detected_at: chrono::Utc::now().timestamp(),
        };

        let mut staged = match self.staged.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if changes.has_changes() {
            staged.insert(
                playlist_id.to_string(),
                StagedChanges {
                    listing,
                    changes: changes.clone(),
                },
            );
        } else {
            // An older staged delta is obsolete once the drift is gone.
            staged.remove(playlist_id);
        }
        drop(staged);

        if changes.has_changes() {
            debug!(
                playlist_id = %playlist_id,
                added = changes.added.len(),
                removed = changes.removed.len(),
                "Remote drift detected"
            );
            self.event_bus
                .emit(CoreEvent::Playlist(PlaylistEvent::PendingChangesDetected {
                    playlist_id: playlist_id.to_string(),
                    added: changes.added.len() as u64,
                    removed: changes.removed.len() as u64,
                }))
                .ok();
        }

        Ok(changes)
    }

    /// Apply the staged delta by merging the exact listing that produced
    /// it into the cache.
    #[instrument(skip(self))]
    pub async fn commit(&self, playlist_id: &str) -> Result<MergeStats> {
        let staged = {
            let mut guard = match self.staged.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.remove(playlist_id)
        };

        let Some(staged) = staged else {
            return Err(ReconcileError::InvalidStateTransition {
                from: "idle".to_string(),
                to: "applying".to_string(),
                reason: "no staged changes for this playlist".to_string(),
            });
        };

        let (_, stats) = self.merger.merge(playlist_id, &staged.listing).await?;

        self.event_bus
            .emit(CoreEvent::Playlist(PlaylistEvent::Updated {
                playlist_id: playlist_id.to_string(),
                change_type: "versions_merged".to_string(),
            }))
            .ok();

        Ok(stats)
    }

    /// Drop a staged delta without applying it. Returns false when nothing
    /// was staged.
    pub fn discard(&self, playlist_id: &str) -> bool {
        let mut staged = match self.staged.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        staged.remove(playlist_id).is_some()
    }

    /// The staged delta for a playlist, if any.
    pub fn staged_changes(&self, playlist_id: &str) -> Option<PendingChanges> {
        let staged = match self.staged.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        staged.get(playlist_id).map(|s| s.changes.clone())
    }

    /// Poll every remote-backed playlist of a project for drift until the
    /// token is cancelled. Remote failures are logged and skipped; the
    /// poller never dies on a flaky network.
    pub fn spawn_poller(
        self: &Arc<Self>,
        project_id: String,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tracker.poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let candidates: Vec<Playlist> = match sqlx::query_as(
                    r#"
                    SELECT * FROM playlists
                    WHERE project_id = ? AND external_id IS NOT NULL AND deleted_remotely = 0
                    "#,
                )
                .bind(&project_id)
                .fetch_all(&tracker.pool)
                .await
                .map_err(StoreError::from)
                {
                    Ok(rows) => rows,
                    Err(error) => {
                        warn!(%error, "Drift poll could not list playlists");
                        continue;
                    }
                };

                for playlist in candidates {
                    if token.is_cancelled() {
                        return;
                    }
                    if let Err(error) = tracker.detect(&playlist.id).await {
                        warn!(playlist_id = %playlist.id, %error, "Drift poll failed");
                    }
                }
            }
        })
    }
}
