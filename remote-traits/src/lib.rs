//! # Remote Source Abstraction
//!
//! Trait boundary between the reconciliation core and the production-tracking
//! service that owns the authoritative playlist data.
//!
//! ## Overview
//!
//! The core never speaks a wire protocol directly. Everything it needs from
//! the review-tracking backend is expressed by the [`RemoteSource`] trait:
//! listing session and list style playlists, listing the versions inside a
//! playlist, creating a playlist during sync upload, and pushing note-status
//! changes. Host applications supply a concrete implementation (HTTP, gRPC,
//! a test double); the core only sees the contract.
//!
//! ## Error taxonomy
//!
//! [`RemoteError`] keeps the failure modes the core must distinguish:
//! `NameConflict` drives the sync-conflict state machine, `Unavailable` and
//! `Timeout` make a refresh fall back to the cached result, everything else
//! is reported as-is.

pub mod error;
pub mod types;

pub use error::{RemoteError, Result};
pub use types::{Category, RemotePlaylist, RemotePlaylistKind, RemoteVersion, VersionUpload};

use async_trait::async_trait;

/// Contract with the remote production-tracking service.
///
/// All listing calls are read-only. `create_playlist` and `add_versions`
/// are the only mutating operations the core ever issues, and both happen
/// exclusively inside the sync-upload protocol.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// List session-style playlists, optionally scoped to one project.
    async fn list_playlists(&self, project_id: Option<&str>) -> Result<Vec<RemotePlaylist>>;

    /// List list-style (categorized) playlists, optionally scoped to one project.
    async fn list_lists(&self, project_id: Option<&str>) -> Result<Vec<RemotePlaylist>>;

    /// List the versions contained in a remote playlist.
    async fn list_versions(&self, external_playlist_id: &str) -> Result<Vec<RemoteVersion>>;

    /// Create a playlist on the remote side and return its external id.
    ///
    /// # Errors
    ///
    /// Fails with [`RemoteError::NameConflict`] when the remote already has a
    /// playlist with the same name in the project. Callers must not retry
    /// implicitly; the conflict requires an explicit rename decision.
    async fn create_playlist(
        &self,
        name: &str,
        kind: RemotePlaylistKind,
        project_id: &str,
        category_id: Option<&str>,
    ) -> Result<String>;

    /// Attach versions to a remote playlist created by `create_playlist`.
    async fn add_versions(
        &self,
        external_playlist_id: &str,
        versions: &[VersionUpload],
    ) -> Result<()>;

    /// List the categories available for list-style playlists in a project.
    async fn list_categories(&self, project_id: &str) -> Result<Vec<Category>>;

    /// Push a note-status change for a single version.
    async fn update_version_status(&self, external_version_id: &str, status: &str) -> Result<()>;
}
