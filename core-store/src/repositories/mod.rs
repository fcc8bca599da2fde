//! # Repository Pattern Implementation
//!
//! Repository traits and SQLite implementations for the four cache tables.
//!
//! ## Architecture
//!
//! - Traits define the interface for each repository
//! - SQLite implementations use sqlx for async database access
//! - All operations return `Result<T>` for error handling
//! - Multi-row reconciliation passes do not go through these repositories;
//!   they use the transaction-scoped helpers in [`crate::tx`] so a whole
//!   pass commits or rolls back as one unit
//!
//! ## Available Repositories
//!
//! - `PlaylistRepository` - Cached playlists with external-id lookup
//! - `VersionRepository` - Versions inside playlists, with soft removal
//! - `NoteRepository` - Draft/published notes attached to versions
//! - `AttachmentRepository` - Files attached to notes

pub mod attachment;
pub mod note;
pub mod playlist;
pub mod version;

pub use attachment::{AttachmentRepository, SqliteAttachmentRepository};
pub use note::{NoteRepository, SqliteNoteRepository};
pub use playlist::{PlaylistRepository, SqlitePlaylistRepository};
pub use version::{SqliteVersionRepository, VersionRepository};
