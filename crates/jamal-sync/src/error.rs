use jamal_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("session file: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SyncError> for StoreError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Json(e) => StoreError::Json(e),
            other => StoreError::Other(other.to_string()),
        }
    }
}
