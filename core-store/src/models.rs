//! Domain models for the review playlist cache
//!
//! Rich cache-row models with validation and database mapping. Ids are
//! UUID v4 strings except the quick-notes playlist, whose id is derived
//! deterministically from its project so it survives restarts without a
//! storage lookup.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// Status Enums
// =============================================================================

/// Kind of playlist in the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlaylistKind {
    /// Ad-hoc review session mirrored from the remote service
    Session,
    /// Long-lived, categorized list mirrored from the remote service
    List,
    /// The permanent, local-only notes playlist (one per project)
    QuickNotes,
}

impl PlaylistKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaylistKind::Session => "session",
            PlaylistKind::List => "list",
            PlaylistKind::QuickNotes => "quick_notes",
        }
    }
}

impl FromStr for PlaylistKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "session" => Ok(PlaylistKind::Session),
            "list" => Ok(PlaylistKind::List),
            "quick_notes" => Ok(PlaylistKind::QuickNotes),
            _ => Err(format!("Unknown playlist kind: {}", s)),
        }
    }
}

impl fmt::Display for PlaylistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Local lifecycle status of a playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LocalStatus {
    /// Created locally, not yet pushed to the remote service
    Draft,
    /// Backed by (or uploaded to) a remote playlist
    Synced,
}

/// Whether a playlist has a confirmed remote counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RemoteSyncStatus {
    NotSynced,
    Synced,
}

/// Review-note state of a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    Empty,
    Draft,
    Published,
    Reviewed,
}

impl NoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteStatus::Empty => "empty",
            NoteStatus::Draft => "draft",
            NoteStatus::Published => "published",
            NoteStatus::Reviewed => "reviewed",
        }
    }
}

impl fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Domain Models
// =============================================================================

/// A playlist row in the local cache.
///
/// Created either by local user action (`external_id` is `None`) or by
/// materializing a remote playlist on first sighting. Rows are mutated only
/// by refresh cycles, the sync uploader, and the purge pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Playlist {
    /// Stable local identifier. Never changes once assigned, even when the
    /// playlist is uploaded and gains an external id.
    pub id: String,
    /// Remote identifier, set once a remote counterpart exists
    pub external_id: Option<String>,
    /// Project this playlist belongs to
    pub project_id: String,
    /// Display name
    pub name: String,
    /// Playlist kind
    pub kind: PlaylistKind,
    /// Category reference (list-style playlists only)
    pub category_id: Option<String>,
    /// Category display name (list-style playlists only)
    pub category_name: Option<String>,
    /// Local lifecycle status
    pub local_status: LocalStatus,
    /// Remote counterpart status
    pub remote_sync_status: RemoteSyncStatus,
    /// Set by the orphan pass when the remote entity disappeared
    pub deleted_remotely: bool,
    /// Timestamps (epoch seconds)
    pub created_at: i64,
    pub updated_at: i64,
    /// When the playlist was last uploaded, if ever
    pub synced_at: Option<i64>,
}

impl Playlist {
    /// Create a local-only draft playlist.
    pub fn new_local(name: String, project_id: String, kind: PlaylistKind) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            external_id: None,
            project_id,
            name,
            kind,
            category_id: None,
            category_name: None,
            local_status: LocalStatus::Draft,
            remote_sync_status: RemoteSyncStatus::NotSynced,
            deleted_remotely: false,
            created_at: now,
            updated_at: now,
            synced_at: None,
        }
    }

    /// Deterministic id of the quick-notes playlist for a project.
    ///
    /// No storage lookup needed; the same project always maps to the same
    /// id, so UI references stay valid across restarts even before the row
    /// has been created.
    pub fn quick_notes_id(project_id: &str) -> String {
        format!("quick-notes-{}", project_id)
    }

    /// Create the quick-notes playlist row for a project.
    pub fn new_quick_notes(project_id: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Self::quick_notes_id(&project_id),
            external_id: None,
            project_id,
            name: "Quick Notes".to_string(),
            kind: PlaylistKind::QuickNotes,
            category_id: None,
            category_name: None,
            local_status: LocalStatus::Synced,
            remote_sync_status: RemoteSyncStatus::NotSynced,
            deleted_remotely: false,
            created_at: now,
            updated_at: now,
            synced_at: None,
        }
    }

    /// Validate playlist data.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Playlist name cannot be empty".to_string());
        }

        if self.project_id.trim().is_empty() {
            return Err("Playlist project cannot be empty".to_string());
        }

        if self.kind == PlaylistKind::QuickNotes && self.external_id.is_some() {
            return Err("Quick-notes playlist can never hold an external id".to_string());
        }

        if self.kind != PlaylistKind::List
            && (self.category_id.is_some() || self.category_name.is_some())
        {
            return Err(format!(
                "Category is only valid for list playlists, not {}",
                self.kind
            ));
        }

        Ok(())
    }

    /// Whether this playlist participates in remote reconciliation at all.
    pub fn is_remote_backed(&self) -> bool {
        self.external_id.is_some()
    }
}

/// A version (media item reference) inside a playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Version {
    pub id: String,
    pub playlist_id: String,
    /// Remote identifier, absent for manually added local versions
    pub external_version_id: Option<String>,
    pub name: String,
    pub number: i64,
    /// Opaque thumbnail asset reference
    pub thumbnail_ref: Option<String>,
    /// In-progress note draft, local only
    pub draft_content: Option<String>,
    /// Review label reference, local only
    pub label_id: Option<String>,
    /// Review-note state, local only
    pub note_status: NoteStatus,
    /// Placed here by local user action; protected from merge drops
    pub manually_added: bool,
    /// Soft-removal flag. Removed versions stay in storage for the
    /// retention window so pending-change deltas can show them.
    pub is_removed: bool,
    pub added_at: i64,
    pub last_modified: i64,
}

impl Version {
    /// Create a version materialized from a remote fetch.
    pub fn new_remote(
        playlist_id: String,
        external_version_id: String,
        name: String,
        number: i64,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            playlist_id,
            external_version_id: Some(external_version_id),
            name,
            number,
            thumbnail_ref: None,
            draft_content: None,
            label_id: None,
            note_status: NoteStatus::Empty,
            manually_added: false,
            is_removed: false,
            added_at: now,
            last_modified: now,
        }
    }

    /// Create a version added by local user action.
    pub fn new_manual(playlist_id: String, name: String, number: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            playlist_id,
            external_version_id: None,
            name,
            number,
            thumbnail_ref: None,
            draft_content: None,
            label_id: None,
            note_status: NoteStatus::Empty,
            manually_added: true,
            is_removed: false,
            added_at: now,
            last_modified: now,
        }
    }

    /// Validate version data.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Version name cannot be empty".to_string());
        }

        if self.number < 0 {
            return Err("Version number cannot be negative".to_string());
        }

        Ok(())
    }
}

/// A draft or published note attached to a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Note {
    pub id: String,
    pub version_id: String,
    pub content: String,
    /// "draft" or "published"
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Note {
    pub fn new_draft(version_id: String, content: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            version_id,
            content,
            status: "draft".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if !["draft", "published"].contains(&self.status.as_str()) {
            return Err(format!("Invalid note status: {}", self.status));
        }

        Ok(())
    }
}

/// A file attached to a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Attachment {
    pub id: String,
    pub note_id: String,
    pub file_name: String,
    /// Opaque reference to the stored media
    pub media_ref: String,
    pub size_bytes: Option<i64>,
    pub created_at: i64,
}

impl Attachment {
    pub fn new(note_id: String, file_name: String, media_ref: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            note_id,
            file_name,
            media_ref,
            size_bytes: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.file_name.trim().is_empty() {
            return Err("Attachment file name cannot be empty".to_string());
        }

        Ok(())
    }
}
