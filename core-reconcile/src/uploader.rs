//! Sync upload state machine
//!
//! Pushes a local draft playlist to the remote service: create the remote
//! playlist, attach the cached versions, then finalize the local row in
//! one transaction. The local id never changes; the row gains an external
//! id only after the remote confirms the create.
//!
//! A name conflict from the remote parks the upload: nothing local is
//! mutated, the conflict is recorded, and no further upload for that
//! playlist is accepted until the caller either renames and retries or
//! cancels. Cancellation mid-upload stops before the next step; a create
//! that already reached the remote cannot be rolled back from here, which
//! is why a late cancel carries a warning.

use crate::error::{ReconcileError, Result};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use core_store::models::{LocalStatus, Playlist, PlaylistKind, RemoteSyncStatus};
use core_store::repositories::{
    PlaylistRepository, SqlitePlaylistRepository, SqliteVersionRepository, VersionRepository,
};
use core_store::tx;
use core_store::StoreError;
use remote_traits::{RemoteError, RemotePlaylistKind, RemoteSource, VersionUpload};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// An upload parked on a remote name conflict, awaiting a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConflict {
    pub playlist_id: String,
    pub playlist_name: String,
    pub playlist_kind: PlaylistKind,
    pub project_id: String,
    pub message: String,
}

pub struct SyncUploader {
    remote: Arc<dyn RemoteSource>,
    pool: SqlitePool,
    event_bus: EventBus,
    remote_timeout_secs: u64,
    playlists: SqlitePlaylistRepository,
    versions: SqliteVersionRepository,
    active: std::sync::Mutex<HashMap<String, CancellationToken>>,
    conflicts: std::sync::Mutex<HashMap<String, SyncConflict>>,
}

impl SyncUploader {
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        pool: SqlitePool,
        event_bus: EventBus,
        remote_timeout_secs: u64,
    ) -> Self {
        Self {
            remote,
            event_bus,
            remote_timeout_secs,
            playlists: SqlitePlaylistRepository::new(pool.clone()),
            versions: SqliteVersionRepository::new(pool.clone()),
            active: std::sync::Mutex::new(HashMap::new()),
            conflicts: std::sync::Mutex::new(HashMap::new()),
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

    fn emit(&self, event: SyncEvent) {
        self.event_bus.emit(CoreEvent::Sync(event)).ok();
    }

    /// The unresolved conflict for a playlist, if any.
    pub fn pending_conflict(&self, playlist_id: &str) -> Option<SyncConflict> {
        match self.conflicts.lock() {
            Ok(guard) => guard.get(playlist_id).cloned(),
            Err(poisoned) => poisoned.into_inner().get(playlist_id).cloned(),
        }
    }

    /// Upload a local draft playlist to the remote service.
    #[instrument(skip(self))]
    pub async fn sync(&self, playlist_id: &str) -> Result<()> {
        if self.pending_conflict(playlist_id).is_some() {
            return Err(ReconcileError::ConflictPending {
                playlist_id: playlist_id.to_string(),
            });
        }

        let playlist = self
            .playlists
            .find_by_id(playlist_id)
            .await?
            .ok_or_else(|| ReconcileError::PlaylistNotFound {
                id: playlist_id.to_string(),
            })?;

        let kind = Self::remote_kind(&playlist)?;
        if playlist.external_id.is_some() {
            return Err(ReconcileError::InvalidStateTransition {
                from: "synced".to_string(),
                to: "uploading".to_string(),
                reason: "playlist already has a remote counterpart".to_string(),
            });
        }

        let token = CancellationToken::new();
        {
            let mut active = match self.active.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if active.contains_key(playlist_id) {
                return Err(ReconcileError::SyncInProgress {
                    playlist_id: playlist_id.to_string(),
                });
            }
            active.insert(playlist_id.to_string(), token.clone());
        }

        let result = self.run_upload(&playlist, kind, &token).await;

        match self.active.lock() {
            Ok(mut guard) => {
                guard.remove(playlist_id);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(playlist_id);
            }
        }

        result
    }

    fn remote_kind(playlist: &Playlist) -> Result<RemotePlaylistKind> {
        match playlist.kind {
            PlaylistKind::Session => Ok(RemotePlaylistKind::Session),
            PlaylistKind::List => Ok(RemotePlaylistKind::List),
            PlaylistKind::QuickNotes => Err(ReconcileError::InvalidStateTransition {
                from: "local_draft".to_string(),
                to: "uploading".to_string(),
                reason: "quick-notes playlists never sync".to_string(),
            }),
        }
    }

    async fn run_upload(
        &self,
        playlist: &Playlist,
        kind: RemotePlaylistKind,
        token: &CancellationToken,
    ) -> Result<()> {
        if token.is_cancelled() {
            self.emit(SyncEvent::Cancelled {
                playlist_id: playlist.id.clone(),
                warning: None,
            });
            return Err(ReconcileError::Cancelled);
        }

        self.emit(SyncEvent::Progress {
            playlist_id: playlist.id.clone(),
            phase: "creating playlist".to_string(),
        });

        let create = self
            .with_timeout(self.remote.create_playlist(
                &playlist.name,
                kind,
                &playlist.project_id,
                playlist.category_id.as_deref(),
            ))
            .await;

        let external_id = match create {
            Ok(id) => id,
            Err(ReconcileError::Remote(RemoteError::NameConflict { name })) => {
                let conflict = SyncConflict {
                    playlist_id: playlist.id.clone(),
                    playlist_name: playlist.name.clone(),
                    playlist_kind: playlist.kind,
                    project_id: playlist.project_id.clone(),
                    message: format!("Remote playlist name already taken: {}", name),
                };
                match self.conflicts.lock() {
                    Ok(mut guard) => {
                        guard.insert(playlist.id.clone(), conflict.clone());
                    }
                    Err(poisoned) => {
                        poisoned.into_inner().insert(playlist.id.clone(), conflict.clone());
                    }
                }

                warn!(playlist_id = %playlist.id, name = %name, "Upload parked on name conflict");
                self.emit(SyncEvent::NameConflictDetected {
                    playlist_id: playlist.id.clone(),
                    playlist_name: playlist.name.clone(),
                    project_id: playlist.project_id.clone(),
                    message: conflict.message,
                });

                return Err(ReconcileError::NameConflict {
                    playlist_id: playlist.id.clone(),
                    name,
                });
            }
            Err(error) => {
                self.emit(SyncEvent::Failed {
                    playlist_id: playlist.id.clone(),
                    message: error.to_string(),
                    recoverable: error.is_recoverable(),
                });
                return Err(error);
            }
        };

        if token.is_cancelled() {
            self.emit(SyncEvent::Cancelled {
                playlist_id: playlist.id.clone(),
                warning: Some(format!(
                    "Remote playlist {} was already created and needs manual cleanup",
                    external_id
                )),
            });
            return Err(ReconcileError::Cancelled);
        }

        self.emit(SyncEvent::Progress {
            playlist_id: playlist.id.clone(),
            phase: "uploading versions".to_string(),
        });

        let versions = self.versions.find_by_playlist(&playlist.id).await?;
        let uploads: Vec<VersionUpload> = versions
            .iter()
            .map(|v| VersionUpload {
                external_version_id: v.external_version_id.clone(),
                name: v.name.clone(),
                number: v.number,
            })
            .collect();

        if let Err(error) = self
            .with_timeout(self.remote.add_versions(&external_id, &uploads))
            .await
        {
            self.emit(SyncEvent::Failed {
                playlist_id: playlist.id.clone(),
                message: error.to_string(),
                recoverable: error.is_recoverable(),
            });
            return Err(error);
        }

        if token.is_cancelled() {
            self.emit(SyncEvent::Cancelled {
                playlist_id: playlist.id.clone(),
                warning: Some(format!(
                    "Remote playlist {} was already created and needs manual cleanup",
                    external_id
                )),
            });
            return Err(ReconcileError::Cancelled);
        }

        // Finalize in one transaction. The playlist keeps its local id and
        // gains the external id; manual flags drop because the versions now
        // exist remotely and future merges treat them as canonical.
        let now = chrono::Utc::now().timestamp();
        let mut finalized = playlist.clone();
        finalized.external_id = Some(external_id.clone());
        finalized.local_status = LocalStatus::Synced;
        finalized.remote_sync_status = RemoteSyncStatus::Synced;
        finalized.synced_at = Some(now);
        finalized.updated_at = now;

        let mut tx_handle = self.pool.begin().await.map_err(StoreError::from)?;
        tx::update_playlist(&mut tx_handle, &finalized).await?;
        tx::clear_manually_added(&mut tx_handle, &playlist.id, now).await?;
        tx_handle.commit().await.map_err(StoreError::from)?;

        info!(
            playlist_id = %playlist.id,
            external_id = %external_id,
            versions = uploads.len(),
            "Sync upload complete"
        );
        self.emit(SyncEvent::Completed {
            playlist_id: playlist.id.clone(),
            external_id,
            versions_uploaded: uploads.len() as u64,
        });

        Ok(())
    }

    /// Resolve a parked name conflict by renaming locally and retrying the
    /// upload under the new name.
    #[instrument(skip(self))]
    pub async fn resolve_conflict_and_retry(
        &self,
        playlist_id: &str,
        new_name: &str,
    ) -> Result<()> {
        let removed = match self.conflicts.lock() {
            Ok(mut guard) => guard.remove(playlist_id),
            Err(poisoned) => poisoned.into_inner().remove(playlist_id),
        };
        if removed.is_none() {
            return Err(ReconcileError::InvalidStateTransition {
                from: "local_draft".to_string(),
                to: "uploading".to_string(),
                reason: "no conflict is pending for this playlist".to_string(),
            });
        }

        let mut playlist = self
            .playlists
            .find_by_id(playlist_id)
            .await?
            .ok_or_else(|| ReconcileError::PlaylistNotFound {
                id: playlist_id.to_string(),
            })?;

        playlist.name = new_name.to_string();
        playlist.updated_at = chrono::Utc::now().timestamp();
        self.playlists.update(&playlist).await?;

        self.sync(playlist_id).await?;

        self.emit(SyncEvent::ConflictResolved {
            playlist_id: playlist_id.to_string(),
            new_name: new_name.to_string(),
        });

        Ok(())
    }

    /// Abandon a parked conflict. The playlist stays a local draft with its
    /// original name; nothing remote or local is mutated.
    pub fn cancel_sync_due_to_conflict(&self, playlist_id: &str) -> Result<()> {
        let removed = match self.conflicts.lock() {
            Ok(mut guard) => guard.remove(playlist_id),
            Err(poisoned) => poisoned.into_inner().remove(playlist_id),
        };
        if removed.is_none() {
            return Err(ReconcileError::InvalidStateTransition {
                from: "local_draft".to_string(),
                to: "local_draft".to_string(),
                reason: "no conflict is pending for this playlist".to_string(),
            });
        }

        self.emit(SyncEvent::Cancelled {
            playlist_id: playlist_id.to_string(),
            warning: None,
        });

        Ok(())
    }

    /// Request cancellation of an in-flight upload. Returns false when no
    /// upload is running for the playlist.
    pub fn cancel(&self, playlist_id: &str) -> bool {
        let active = match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match active.get(playlist_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}
