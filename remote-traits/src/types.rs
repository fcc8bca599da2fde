//! Value types crossing the remote boundary.
//!
//! These mirror what the tracking service reports, not what the local cache
//! stores. Field names are the remote's vocabulary; translation to cache
//! rows happens in the reconciliation engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of playlist on the remote side.
///
/// Sessions are ad-hoc review groupings; lists are long-lived, categorized
/// collections. Both reconcile into the same local table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemotePlaylistKind {
    Session,
    List,
}

impl RemotePlaylistKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemotePlaylistKind::Session => "session",
            RemotePlaylistKind::List => "list",
        }
    }
}

impl fmt::Display for RemotePlaylistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A playlist as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePlaylist {
    /// The remote's identifier. Stable on the remote side but never used as
    /// the local primary key; identity resolution maps it to a local id.
    pub external_id: String,
    pub name: String,
    pub project_id: String,
    pub kind: RemotePlaylistKind,
    /// Category, present for list-style playlists only.
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    /// Remote creation time (epoch seconds).
    pub created_at: i64,
    /// Remote last-modified time (epoch seconds).
    pub updated_at: i64,
}

/// A version (media item) as reported inside a remote playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVersion {
    pub external_id: String,
    pub name: String,
    pub number: i64,
    /// Opaque reference to the thumbnail asset.
    pub thumbnail_ref: Option<String>,
    /// Remote-side review status, when the service tracks one.
    pub status: Option<String>,
}

/// Payload for pushing a locally cached version to a freshly created
/// remote playlist during sync upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionUpload {
    /// External version id when the version itself already exists remotely.
    pub external_version_id: Option<String>,
    pub name: String,
    pub number: i64,
}

/// Category for list-style playlists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}
