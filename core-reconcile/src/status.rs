//! Optimistic note-status edits
//!
//! A status change applies to the cache immediately so the UI reflects it,
//! then the remote push either commits the edit (the pending record is
//! dropped) or rolls it back to the recorded original. The pending record
//! is a tagged pair, so at any moment both the pre-edit and the in-flight
//! value are known.

use crate::error::{ReconcileError, Result};
use core_store::models::NoteStatus;
use core_store::repositories::{SqliteVersionRepository, VersionRepository};
use remote_traits::RemoteSource;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

/// An in-flight optimistic edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingStatus {
    /// Value before the edit, restored on rollback.
    pub original: NoteStatus,
    /// Value applied locally while the remote push is in flight.
    pub optimistic: NoteStatus,
}

pub struct StatusTracker {
    remote: Arc<dyn RemoteSource>,
    versions: SqliteVersionRepository,
    remote_timeout_secs: u64,
    pending: std::sync::Mutex<HashMap<String, PendingStatus>>,
}

impl StatusTracker {
    pub fn new(remote: Arc<dyn RemoteSource>, pool: SqlitePool, remote_timeout_secs: u64) -> Self {
        Self {
            remote,
            versions: SqliteVersionRepository::new(pool),
            remote_timeout_secs,
            pending: std::sync::Mutex::new(HashMap::new()),
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

    /// The in-flight edit for a version, if any.
    pub fn pending(&self, version_id: &str) -> Option<PendingStatus> {
        match self.pending.lock() {
            Ok(guard) => guard.get(version_id).copied(),
            Err(poisoned) => poisoned.into_inner().get(version_id).copied(),
        }
    }

    /// Change a version's note status, optimistically.
    ///
    /// The cache row is updated before the remote push. Versions without a
    /// remote counterpart commit locally with no push at all. A failed push
    /// restores the original value and surfaces the error.
    #[instrument(skip(self))]
    pub async fn set_note_status(&self, version_id: &str, status: NoteStatus) -> Result<()> {
        let version = self
            .versions
            .find_by_id(version_id)
            .await?
            .ok_or_else(|| ReconcileError::VersionNotFound {
                id: version_id.to_string(),
            })?;

        {
            let mut pending = match self.pending.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if pending.contains_key(version_id) {
                return Err(ReconcileError::InvalidStateTransition {
                    from: "pending".to_string(),
                    to: "pending".to_string(),
                    reason: "a status update is already in flight for this version".to_string(),
                });
            }
            pending.insert(
                version_id.to_string(),
                PendingStatus {
                    original: version.note_status,
                    optimistic: status,
                },
            );
        }

        self.versions.set_note_status(version_id, status).await?;

        let Some(external_version_id) = version.external_version_id.clone() else {
            // Local-only version, nothing to push.
            self.clear(version_id);
            return Ok(());
        };

        let push = self
            .with_timeout(
                self.remote
                    .update_version_status(&external_version_id, status.as_str()),
            )
            .await;

        match push {
            Ok(()) => {
                self.clear(version_id);
                debug!(version_id = %version_id, status = %status, "Note status committed");
                Ok(())
            }
            Err(error) => {
                warn!(
                    version_id = %version_id,
                    %error,
                    "Note status push failed, rolling back"
                );
                self.versions
                    .set_note_status(version_id, version.note_status)
                    .await?;
                self.clear(version_id);
                Err(error)
            }
        }
    }

    fn clear(&self, version_id: &str) {
        match self.pending.lock() {
            Ok(mut guard) => {
                guard.remove(version_id);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(version_id);
            }
        }
    }
}
