//! # Reconciliation Module
//!
//! Keeps the local review playlist cache consistent with the remote
//! production-tracking service.
//!
//! ## Components
//!
//! - [`engine::ReconciliationEngine`]: the refresh cycle (dedup, orphan,
//!   purge, materialize passes) with per-project coalescing
//! - [`identity::IdentityResolver`]: maps remote external ids to stable
//!   local ids inside a single transaction
//! - [`merge::VersionMerger`]: folds remote version listings into cached
//!   rows without losing local review state or manual additions
//! - [`uploader::SyncUploader`]: pushes local drafts to the remote, with
//!   explicit name-conflict resolution
//! - [`pending::PendingChangeTracker`]: detects remote drift between
//!   refreshes and applies it only on explicit commit
//! - [`status::StatusTracker`]: optimistic note-status edits with rollback
//! - [`quick_notes::QuickNotesManager`]: the permanent local-only notes
//!   playlist, one per project

pub mod cache;
pub mod engine;
pub mod error;
pub mod identity;
pub mod merge;
pub mod pending;
pub mod quick_notes;
pub mod status;
pub mod uploader;

pub use cache::{Clock, EvictionPolicy, MemoryCache, SystemClock};
pub use engine::{
    OpenedPlaylist, PlaylistWithVersions, ReconcileConfig, ReconciliationEngine, RefreshOutcome,
    RemovedPlaylist,
};
pub use error::{ReconcileError, Result};
pub use identity::IdentityResolver;
pub use merge::{MergeStats, VersionMerger};
pub use pending::{PendingChangeTracker, PendingChanges};
pub use quick_notes::QuickNotesManager;
pub use status::{PendingStatus, StatusTracker};
pub use uploader::{SyncConflict, SyncUploader};
