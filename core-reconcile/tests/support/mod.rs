//! Hand-rolled in-memory remote for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use remote_traits::{
    Category, RemoteError, RemotePlaylist, RemotePlaylistKind, RemoteSource, RemoteVersion,
    VersionUpload,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Scriptable `RemoteSource` double backed by plain collections.
#[derive(Default)]
pub struct InMemoryRemote {
    pub playlists: Mutex<Vec<RemotePlaylist>>,
    pub versions: Mutex<HashMap<String, Vec<RemoteVersion>>>,
    pub categories: Mutex<Vec<Category>>,
    /// Names that `create_playlist` rejects with a conflict.
    pub taken_names: Mutex<HashSet<String>>,
    /// When set, every call fails with `RemoteError::Unavailable`.
    pub unavailable: AtomicBool,
    /// When set, `add_versions` fails while creates still succeed.
    pub fail_add_versions: AtomicBool,
    /// When set, `update_version_status` fails.
    pub fail_status_push: AtomicBool,
    pub listing_calls: AtomicU64,
    pub status_pushes: Mutex<Vec<(String, String)>>,
    next_id: AtomicU64,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_session(&self, external_id: &str, name: &str, project_id: &str) {
        self.playlists.lock().unwrap().push(RemotePlaylist {
            external_id: external_id.to_string(),
            name: name.to_string(),
            project_id: project_id.to_string(),
            kind: RemotePlaylistKind::Session,
            category_id: None,
            category_name: None,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
        });
    }

    pub fn add_list(
        &self,
        external_id: &str,
        name: &str,
        project_id: &str,
        category_id: &str,
        category_name: &str,
    ) {
        self.playlists.lock().unwrap().push(RemotePlaylist {
            external_id: external_id.to_string(),
            name: name.to_string(),
            project_id: project_id.to_string(),
            kind: RemotePlaylistKind::List,
            category_id: Some(category_id.to_string()),
            category_name: Some(category_name.to_string()),
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
        });
    }

    pub fn set_versions(&self, external_playlist_id: &str, versions: Vec<RemoteVersion>) {
        self.versions
            .lock()
            .unwrap()
            .insert(external_playlist_id.to_string(), versions);
    }

    pub fn remove_playlist(&self, external_id: &str) {
        self.playlists
            .lock()
            .unwrap()
            .retain(|p| p.external_id != external_id);
    }

    pub fn take_name(&self, name: &str) {
        self.taken_names.lock().unwrap().insert(name.to_string());
    }

    pub fn set_unavailable(&self, value: bool) {
        self.unavailable.store(value, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<(), RemoteError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("scripted outage".to_string()));
        }
        Ok(())
    }

    fn filtered(&self, kind: RemotePlaylistKind, project_id: Option<&str>) -> Vec<RemotePlaylist> {
        self.playlists
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.kind == kind)
            .filter(|p| project_id.map_or(true, |project| p.project_id == project))
            .cloned()
            .collect()
    }
}

pub fn remote_version(external_id: &str, name: &str, number: i64) -> RemoteVersion {
    RemoteVersion {
        external_id: external_id.to_string(),
        name: name.to_string(),
        number,
        thumbnail_ref: None,
        status: None,
    }
}

#[async_trait]
impl RemoteSource for InMemoryRemote {
    async fn list_playlists(
        &self,
        project_id: Option<&str>,
    ) -> Result<Vec<RemotePlaylist>, RemoteError> {
        self.check_reachable()?;
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.filtered(RemotePlaylistKind::Session, project_id))
    }

    async fn list_lists(
        &self,
        project_id: Option<&str>,
    ) -> Result<Vec<RemotePlaylist>, RemoteError> {
        self.check_reachable()?;
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.filtered(RemotePlaylistKind::List, project_id))
    }

    async fn list_versions(
        &self,
        external_playlist_id: &str,
    ) -> Result<Vec<RemoteVersion>, RemoteError> {
        self.check_reachable()?;
        Ok(self
            .versions
            .lock()
            .unwrap()
            .get(external_playlist_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_playlist(
        &self,
        name: &str,
        kind: RemotePlaylistKind,
        project_id: &str,
        category_id: Option<&str>,
    ) -> Result<String, RemoteError> {
        self.check_reachable()?;

        if self.taken_names.lock().unwrap().contains(name) {
            return Err(RemoteError::NameConflict {
                name: name.to_string(),
            });
        }

        let external_id = format!("ext-created-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.playlists.lock().unwrap().push(RemotePlaylist {
            external_id: external_id.clone(),
            name: name.to_string(),
            project_id: project_id.to_string(),
            kind,
            category_id: category_id.map(str::to_string),
            category_name: None,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
        });
        self.taken_names.lock().unwrap().insert(name.to_string());

        Ok(external_id)
    }

    async fn add_versions(
        &self,
        external_playlist_id: &str,
        versions: &[VersionUpload],
    ) -> Result<(), RemoteError> {
        self.check_reachable()?;
        if self.fail_add_versions.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("scripted upload failure".to_string()));
        }

        let mut next = 0u64;
        let mut map = self.versions.lock().unwrap();
        let entry = map.entry(external_playlist_id.to_string()).or_default();
        for upload in versions {
            let external_id = upload.external_version_id.clone().unwrap_or_else(|| {
                next += 1;
                format!("{}-v{}", external_playlist_id, next)
            });
            entry.push(RemoteVersion {
                external_id,
                name: upload.name.clone(),
                number: upload.number,
                thumbnail_ref: None,
                status: None,
            });
        }

        Ok(())
    }

    async fn list_categories(&self, _project_id: &str) -> Result<Vec<Category>, RemoteError> {
        self.check_reachable()?;
        Ok(self.categories.lock().unwrap().clone())
    }

    async fn update_version_status(
        &self,
        external_version_id: &str,
        status: &str,
    ) -> Result<(), RemoteError> {
        self.check_reachable()?;
        if self.fail_status_push.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("scripted push failure".to_string()));
        }

        self.status_pushes
            .lock()
            .unwrap()
            .push((external_version_id.to_string(), status.to_string()));
        Ok(())
    }
}
