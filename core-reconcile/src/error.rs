use remote_traits::RemoteError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Store error: {0}")]
    Store(#[from] core_store::StoreError),

    #[error("Playlist not found: {id}")]
    PlaylistNotFound { id: String },

    #[error("Version not found: {id}")]
    VersionNotFound { id: String },

    #[error("Playlist name already taken on the remote: {name}")]
    NameConflict { playlist_id: String, name: String },

    #[error("A sync upload is already running for playlist {playlist_id}")]
    SyncInProgress { playlist_id: String },

    #[error("An unresolved name conflict is pending for playlist {playlist_id}")]
    ConflictPending { playlist_id: String },

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Two cache rows share external id {external_id}")]
    IdentityCollision { external_id: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),
}

impl ReconcileError {
    /// Whether a retry of the same operation may succeed without any
    /// intervening user decision.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ReconcileError::Remote(e) => e.is_unavailable(),
            ReconcileError::Timeout(_) => true,
            ReconcileError::Store(_) => false,
            ReconcileError::NameConflict { .. } => false,
            ReconcileError::ConflictPending { .. } => false,
            ReconcileError::SyncInProgress { .. } => true,
            ReconcileError::Cancelled => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
