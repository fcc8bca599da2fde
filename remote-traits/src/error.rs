use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote service unavailable: {0}")]
    Unavailable(String),

    #[error("Remote playlist name already taken: {name}")]
    NameConflict { name: String },

    #[error("Remote call timed out after {0} seconds")]
    Timeout(u64),

    #[error("Remote entity not found: {0}")]
    NotFound(String),

    #[error("Invalid remote response: {0}")]
    Invalid(String),
}

impl RemoteError {
    /// Whether the error means the service could not be reached at all.
    ///
    /// Refresh treats these as "serve the cached result, mark it stale"
    /// rather than failing the caller.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_) | RemoteError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;
