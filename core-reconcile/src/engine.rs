//! Reconciliation engine
//!
//! Owns the refresh cycle that keeps the local playlist cache consistent
//! with the remote tracking service. A refresh runs four passes, each in
//! its own transaction, always in the same order:
//!
//! 1. dedup: repair duplicate cache rows sharing one external id
//! 2. orphan: flag rows whose remote entity disappeared
//! 3. purge: hard-delete flagged rows past the retention window
//! 4. materialize: resolve every remote playlist to a local row and fold
//!    in the remote field values
//!
//! Transactions are never held across remote calls; all network fetching
//! happens before the first pass begins. When the remote is unreachable
//! the refresh degrades to the last cached state instead of failing.
//!
//! Concurrent refreshes of the same project coalesce: the first caller
//! does the work, latecomers wait and receive that caller's outcome.

use crate::cache::{EvictionPolicy, MemoryCache};
use crate::error::{ReconcileError, Result};
use crate::identity::{local_kind, IdentityResolver};
use crate::merge::VersionMerger;
use crate::quick_notes::QuickNotesManager;
use core_runtime::events::{CoreEvent, EventBus, PlaylistEvent};
use core_store::models::{Playlist, PlaylistKind, RemoteSyncStatus, Version};
use core_store::repositories::{
    PlaylistRepository, SqlitePlaylistRepository, SqliteVersionRepository, VersionRepository,
};
use core_store::tx;
use core_store::StoreError;
use remote_traits::{Category, RemotePlaylist, RemoteSource};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Tunables for the reconciliation engine.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// How long an orphaned row survives before the purge pass deletes it.
    pub retention_window: Duration,
    /// Rows younger than this are never purged, whatever their flags say.
    pub recent_draft_safety: Duration,
    /// Drift poller cadence.
    pub poll_interval: Duration,
    /// Per-call deadline for remote operations.
    pub remote_timeout_secs: u64,
    /// How long a fetched category listing stays fresh.
    pub category_ttl: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            retention_window: Duration::from_secs(7 * 24 * 3600),
            recent_draft_safety: Duration::from_secs(3600),
            poll_interval: Duration::from_secs(60),
            remote_timeout_secs: 30,
            category_ttl: Duration::from_secs(300),
        }
    }
}

// ============================================================================
// Outcome Types
// ============================================================================

/// A playlist together with its visible (non-removed) versions.
#[derive(Debug, Clone)]
pub struct PlaylistWithVersions {
    pub playlist: Playlist,
    pub versions: Vec<Version>,
}

/// A playlist the orphan pass flagged during this refresh.
#[derive(Debug, Clone)]
pub struct RemovedPlaylist {
    pub id: String,
    pub name: String,
}

/// Result of one refresh cycle.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// Live playlists in display order: quick-notes first, then by name.
    pub playlists: Vec<PlaylistWithVersions>,
    /// Playlists newly flagged as deleted remotely.
    pub removed: Vec<RemovedPlaylist>,
    /// True when the remote was unreachable and this is the cached state.
    pub stale: bool,
}

/// Result of opening a single playlist.
#[derive(Debug, Clone)]
pub struct OpenedPlaylist {
    pub playlist: Playlist,
    pub versions: Vec<Version>,
    /// True when the remote listing could not be fetched and the versions
    /// are the cached rows.
    pub stale: bool,
}

// ============================================================================
// Refresh Coalescing
// ============================================================================

/// Per-project coalescing slot. `generation` counts completed refreshes;
/// a caller that observed generation N before acquiring the lock and sees
/// N+1 after knows a full refresh ran while it waited.
struct RefreshSlot {
    lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    last_outcome: std::sync::Mutex<Option<RefreshOutcome>>,
}

impl RefreshSlot {
    fn new() -> Self {
        Self {
            lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            last_outcome: std::sync::Mutex::new(None),
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct ReconciliationEngine {
    config: ReconcileConfig,
    remote: Arc<dyn RemoteSource>,
    pool: SqlitePool,
    event_bus: EventBus,
    merger: Arc<VersionMerger>,
    quick_notes: QuickNotesManager,
    playlists: SqlitePlaylistRepository,
    versions: SqliteVersionRepository,
    slots: std::sync::Mutex<HashMap<String, Arc<RefreshSlot>>>,
    categories: MemoryCache<String, Vec<Category>>,
}

impl ReconciliationEngine {
    pub fn new(
        config: ReconcileConfig,
        remote: Arc<dyn RemoteSource>,
        pool: SqlitePool,
        event_bus: EventBus,
    ) -> Self {
        let categories = MemoryCache::new(EvictionPolicy::Ttl(config.category_ttl));
        Self {
            remote,
            event_bus,
            merger: Arc::new(VersionMerger::new(pool.clone())),
            quick_notes: QuickNotesManager::new(pool.clone()),
            playlists: SqlitePlaylistRepository::new(pool.clone()),
            versions: SqliteVersionRepository::new(pool.clone()),
            slots: std::sync::Mutex::new(HashMap::new()),
            categories,
            config,
            pool,
        }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// The version merger, shared so the drift tracker serializes its
    /// merges against refresh-driven ones.
    pub fn merger(&self) -> Arc<VersionMerger> {
        self.merger.clone()
    }

    fn slot_for(&self, key: &str) -> Arc<RefreshSlot> {
        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(RefreshSlot::new()))
            .clone()
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = remote_traits::Result<T>>,
    {
        let secs = self.config.remote_timeout_secs;
        match timeout(Duration::from_secs(secs), fut).await {
            Ok(result) => result.map_err(ReconcileError::from),
            Err(_) => Err(ReconcileError::Timeout(secs)),
        }
    }

    fn is_unreachable(error: &ReconcileError) -> bool {
        matches!(error, ReconcileError::Timeout(_))
            || matches!(error, ReconcileError::Remote(e) if e.is_unavailable())
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Run a full refresh cycle, optionally scoped to one project.
    ///
    /// Concurrent calls for the same scope coalesce into one remote fetch.
    #[instrument(skip(self))]
    pub async fn refresh(&self, project_id: Option<&str>) -> Result<RefreshOutcome> {
        let key = project_id.unwrap_or("");
        let slot = self.slot_for(key);

        let observed = slot.generation.load(Ordering::SeqCst);
        let _guard = slot.lock.lock().await;

        if slot.generation.load(Ordering::SeqCst) != observed {
            let cached = match slot.last_outcome.lock() {
                Ok(guard) => guard.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            };
            if let Some(outcome) = cached {
                debug!(project_id = ?project_id, "Coalesced into a refresh that just completed");
                return Ok(outcome);
            }
        }

        let outcome = self.run_refresh(project_id).await?;

        match slot.last_outcome.lock() {
            Ok(mut guard) => *guard = Some(outcome.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(outcome.clone()),
        }
        slot.generation.fetch_add(1, Ordering::SeqCst);

        Ok(outcome)
    }

    async fn run_refresh(&self, project_id: Option<&str>) -> Result<RefreshOutcome> {
        if let Some(project) = project_id {
            self.quick_notes.initialize(project).await?;
        }

        // All network traffic happens up front; the passes below only ever
        // touch local storage inside their own transactions.
        let listing = match self.fetch_remote_listing(project_id).await {
            Ok(listing) => listing,
            Err(error) if Self::is_unreachable(&error) => {
                warn!(project_id = ?project_id, %error, "Remote unreachable, serving cached state");
                let mut outcome = self.load_outcome(project_id).await?;
                outcome.stale = true;
                return Ok(outcome);
            }
            Err(error) => return Err(error),
        };

        self.dedup_pass().await?;
        let removed = self.orphan_pass(project_id, &listing).await?;
        let purged = self.purge_pass().await?;
        let materialized = self.materialize_pass(&listing).await?;

        info!(
            project_id = ?project_id,
            remote_playlists = listing.len(),
            flagged = removed.len(),
            purged,
            changed = materialized.len(),
            "Refresh cycle complete"
        );

        for removal in &removed {
            self.event_bus
                .emit(CoreEvent::Playlist(PlaylistEvent::Removed {
                    playlist_id: removal.id.clone(),
                    name: removal.name.clone(),
                }))
                .ok();
        }
        for (playlist_id, change_type) in materialized {
            self.event_bus
                .emit(CoreEvent::Playlist(PlaylistEvent::Updated {
                    playlist_id,
                    change_type,
                }))
                .ok();
        }

        let mut outcome = self.load_outcome(project_id).await?;
        outcome.removed = removed;
        Ok(outcome)
    }

    async fn fetch_remote_listing(
        &self,
        project_id: Option<&str>,
    ) -> Result<Vec<RemotePlaylist>> {
        let mut listing = self.with_timeout(self.remote.list_playlists(project_id)).await?;
        let lists = self.with_timeout(self.remote.list_lists(project_id)).await?;
        listing.extend(lists);
        Ok(listing)
    }

    // ========================================================================
    // Passes
    // ========================================================================

    /// Repair duplicate rows sharing one external id, keeping the oldest.
    /// Duplicates come from historical check-then-insert races; current
    /// identity resolution cannot mint them, so finding one is worth a
    /// warning.
    async fn dedup_pass(&self) -> Result<u64> {
        let mut tx_handle = self.pool.begin().await.map_err(StoreError::from)?;

        let duplicated: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT external_id FROM playlists
            WHERE external_id IS NOT NULL
            GROUP BY external_id HAVING COUNT(*) > 1
            "#,
        )
        .fetch_all(&mut *tx_handle)
        .await
        .map_err(StoreError::from)?;

        let mut deleted = 0u64;
        for (external_id,) in &duplicated {
            let rows: Vec<Playlist> = sqlx::query_as(
                "SELECT * FROM playlists WHERE external_id = ? ORDER BY created_at ASC, id ASC",
            )
            .bind(external_id)
            .fetch_all(&mut *tx_handle)
            .await
            .map_err(StoreError::from)?;

            for duplicate in rows.iter().skip(1) {
                tx::delete_playlist_cascade(&mut tx_handle, &duplicate.id).await?;
                deleted += 1;
            }

            warn!(
                external_id = %external_id,
                duplicates = rows.len() - 1,
                "Repaired duplicate cache rows"
            );
        }

        tx_handle.commit().await.map_err(StoreError::from)?;
        Ok(deleted)
    }

    /// Flag remote-backed rows whose external id no longer appears in the
    /// remote listing. Scoped to the refreshed project; rows of other
    /// projects are never judged against a listing that excluded them.
    async fn orphan_pass(
        &self,
        project_id: Option<&str>,
        listing: &[RemotePlaylist],
    ) -> Result<Vec<RemovedPlaylist>> {
        let remote_ids: HashSet<&str> = listing.iter().map(|p| p.external_id.as_str()).collect();
        let now = chrono::Utc::now().timestamp();

        let mut tx_handle = self.pool.begin().await.map_err(StoreError::from)?;

        let candidates: Vec<Playlist> = match project_id {
            Some(project) => sqlx::query_as(
                r#"
                SELECT * FROM playlists
                WHERE external_id IS NOT NULL AND deleted_remotely = 0 AND project_id = ?
                "#,
            )
            .bind(project)
            .fetch_all(&mut *tx_handle)
            .await
            .map_err(StoreError::from)?,
            None => sqlx::query_as(
                "SELECT * FROM playlists WHERE external_id IS NOT NULL AND deleted_remotely = 0",
            )
            .fetch_all(&mut *tx_handle)
            .await
            .map_err(StoreError::from)?,
        };

        let mut removed = Vec::new();
        for playlist in candidates {
            let gone = playlist
                .external_id
                .as_deref()
                .is_some_and(|id| !remote_ids.contains(id));

            if gone {
                tx::flag_playlist_deleted_remotely(&mut tx_handle, &playlist.id, now).await?;
                removed.push(RemovedPlaylist {
                    id: playlist.id,
                    name: playlist.name,
                });
            }
        }

        tx_handle.commit().await.map_err(StoreError::from)?;
        Ok(removed)
    }

    /// Hard-delete flagged rows whose retention window has elapsed.
    ///
    /// One transaction per row: a failure mid-purge loses at most one
    /// deletion, never leaves a row half-cascaded.
    async fn purge_pass(&self) -> Result<u64> {
        let now = chrono::Utc::now().timestamp();
        let retention_cutoff = now - self.config.retention_window.as_secs() as i64;
        let safety_cutoff = now - self.config.recent_draft_safety.as_secs() as i64;

        let expired: Vec<Playlist> = sqlx::query_as(
            r#"
            SELECT * FROM playlists
            WHERE deleted_remotely = 1 AND updated_at < ? AND created_at < ?
            "#,
        )
        .bind(retention_cutoff)
        .bind(safety_cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        let mut purged = 0u64;
        for playlist in expired {
            let mut tx_handle = self.pool.begin().await.map_err(StoreError::from)?;
            let deleted = tx::delete_playlist_cascade(&mut tx_handle, &playlist.id).await?;
            tx_handle.commit().await.map_err(StoreError::from)?;

            if deleted {
                purged += 1;
                info!(
                    playlist_id = %playlist.id,
                    name = %playlist.name,
                    "Purged playlist past retention window"
                );
            }
        }

        Ok(purged)
    }

    /// Resolve every remote playlist to a local row and fold the remote
    /// field values in. Unchanged rows see zero writes, so a second
    /// refresh against an unchanged remote is a no-op.
    async fn materialize_pass(
        &self,
        listing: &[RemotePlaylist],
    ) -> Result<Vec<(String, String)>> {
        let now = chrono::Utc::now().timestamp();
        let mut changed = Vec::new();

        let mut tx_handle = self.pool.begin().await.map_err(StoreError::from)?;

        for remote in listing {
            let existing = IdentityResolver::resolve_or_create(&mut tx_handle, remote).await?;

            let mut desired = existing.clone();
            desired.name = remote.name.clone();
            desired.kind = local_kind(remote.kind);
            desired.category_id = remote.category_id.clone();
            desired.category_name = remote.category_name.clone();
            desired.remote_sync_status = RemoteSyncStatus::Synced;
            desired.deleted_remotely = false;

            if desired != existing {
                let change_type = if existing.deleted_remotely {
                    "restored"
                } else {
                    "refreshed"
                };
                desired.updated_at = now;
                tx::update_playlist(&mut tx_handle, &desired).await?;
                changed.push((desired.id.clone(), change_type.to_string()));
            }
        }

        tx_handle.commit().await.map_err(StoreError::from)?;
        Ok(changed)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Assemble the display state from the cache alone.
    async fn load_outcome(&self, project_id: Option<&str>) -> Result<RefreshOutcome> {
        let rows = match project_id {
            Some(project) => self.playlists.find_by_project(project).await?,
            None => sqlx::query_as::<_, Playlist>(
                r#"
                SELECT * FROM playlists
                ORDER BY project_id,
                         CASE kind WHEN 'quick_notes' THEN 0 ELSE 1 END,
                         name ASC
                "#,
            )
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?,
        };

        let mut playlists = Vec::with_capacity(rows.len());
        for playlist in rows {
            if playlist.deleted_remotely {
                continue;
            }
            let versions = self.versions.find_by_playlist(&playlist.id).await?;
            playlists.push(PlaylistWithVersions { playlist, versions });
        }

        Ok(RefreshOutcome {
            playlists,
            removed: Vec::new(),
            stale: false,
        })
    }

    /// Open one playlist: fetch its remote version listing, merge it into
    /// the cached rows, and return the merged view.
    ///
    /// Quick-notes and local drafts have no remote counterpart and return
    /// straight from the cache. When the remote is unreachable the cached
    /// versions are served with `stale` set.
    #[instrument(skip(self))]
    pub async fn open_playlist(&self, playlist_id: &str) -> Result<OpenedPlaylist> {
        let playlist = self
            .playlists
            .find_by_id(playlist_id)
            .await?
            .ok_or_else(|| ReconcileError::PlaylistNotFound {
                id: playlist_id.to_string(),
            })?;

        let external_id = match playlist.external_id.clone() {
            Some(id) if playlist.kind != PlaylistKind::QuickNotes => id,
            _ => {
                // Quick-notes and local drafts have no remote counterpart.
                let versions = self.versions.find_by_playlist(playlist_id).await?;
                return Ok(OpenedPlaylist {
                    playlist,
                    versions,
                    stale: false,
                });
            }
        };

        match self.with_timeout(self.remote.list_versions(&external_id)).await {
            Ok(listing) => {
                let (versions, stats) = self.merger.merge(playlist_id, &listing).await?;
                if !stats.is_noop() {
                    self.event_bus
                        .emit(CoreEvent::Playlist(PlaylistEvent::Updated {
                            playlist_id: playlist_id.to_string(),
                            change_type: "versions_merged".to_string(),
                        }))
                        .ok();
                }
                Ok(OpenedPlaylist {
                    playlist,
                    versions,
                    stale: false,
                })
            }
            Err(error) if Self::is_unreachable(&error) => {
                warn!(playlist_id = %playlist_id, %error, "Remote unreachable, serving cached versions");
                let versions = self.versions.find_by_playlist(playlist_id).await?;
                Ok(OpenedPlaylist {
                    playlist,
                    versions,
                    stale: true,
                })
            }
            Err(error) => Err(error),
        }
    }

    /// Categories available for list-style playlists in a project.
    /// Read-through cached with the configured TTL.
    pub async fn categories(&self, project_id: &str) -> Result<Vec<Category>> {
        let key = project_id.to_string();
        if let Some(cached) = self.categories.get(&key) {
            return Ok(cached);
        }

        let fetched = self
            .with_timeout(self.remote.list_categories(project_id))
            .await?;
        self.categories.put(key, fetched.clone());
        Ok(fetched)
    }
}
