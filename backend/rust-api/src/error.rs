/// Failure taxonomy of the session layer.
///
/// Adapters (Redis, MongoDB) report `anyhow` errors; the store folds them into
/// `Cache` / `Persistence` so handlers can pick a status code without string
/// matching.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("service temporarily unavailable: write-back in progress")]
    TemporarilyUnavailable,

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("cache failure: {0}")]
    Cache(String),

    #[error("failed to (de)serialize session document: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    pub fn cache(err: anyhow::Error) -> Self {
        SessionError::Cache(format!("{:#}", err))
    }

    pub fn persistence(err: anyhow::Error) -> Self {
        SessionError::Persistence(format!("{:#}", err))
    }

    pub fn session_not_found(session_id: &str) -> Self {
        SessionError::NotFound(format!("session {} not found", session_id))
    }

    pub fn quiz_not_found(quiz_id: &str) -> Self {
        SessionError::NotFound(format!("quiz {} not found", quiz_id))
    }
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
