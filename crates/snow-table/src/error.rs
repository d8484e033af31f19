//! Error types for table record operations

use reqwest::StatusCode;

/// Errors from record CRUD and attachment operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] snow_auth::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("record does not exist")]
    NoResults,

    #[error("multiple records match")]
    MultipleResults,

    #[error("ServiceNow API returned {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    Http(String),

    #[error("unexpected response format: {0}")]
    UnexpectedResponse(String),

    #[error("attachment {0} not found")]
    AttachmentMissing(String),
}

/// Result alias for table operations.
pub type Result<T> = std::result::Result<T, Error>;
