use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote sync is disabled: client id or api key missing")]
    NotConfigured,
    #[error("not connected to remote storage")]
    NotConnected,
    #[error("a sync is already running")]
    AlreadySyncing,
    #[error("authorization rejected: {0}")]
    Unauthorized(String),
    #[error("remote storage returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl SyncError {
    /// Authorization problems end the session; everything else is per request.
    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Unauthorized(_))
    }
}
