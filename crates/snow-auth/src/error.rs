//! Error types for authentication and session establishment
//!
//! Every variant is fatal to the current invocation: nothing at this layer
//! retries or swallows a failure. `HttpCallFailed` preserves the status and
//! body of the offending response so the caller can report it verbatim.

use reqwest::StatusCode;

/// Errors from session establishment and token lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("required HTTP client capability unavailable: {0}")]
    DependencyMissing(String),

    #[error("invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("could not connect to ServiceNow: {0}")]
    ConnectionFailed(String),

    #[error("unable to generate a new token: {0}")]
    TokenCreationFailed(String),

    #[error("could not refresh token: {0}")]
    TokenRefreshFailed(String),

    #[error("token is missing")]
    TokenMissing,

    #[error("HTTP call failed with status {status}: {body}")]
    HttpCallFailed { status: StatusCode, body: String },
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
