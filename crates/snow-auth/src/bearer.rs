//! Bearer token request authenticator
//!
//! Wraps a static token as a per-request authenticator that injects
//! `Authorization: Bearer <token>` and touches nothing else. Construction
//! validates the token up front so a malformed value fails before the first
//! request rather than on it. The adapter performs no network I/O.

use common::Secret;
use reqwest::RequestBuilder;
use reqwest::header::{AUTHORIZATION, HeaderValue};

use crate::error::{Error, Result};

/// Per-request bearer authenticator.
#[derive(Debug, Clone)]
pub struct BearerAuth {
    header: HeaderValue,
}

impl BearerAuth {
    /// Build the authenticator from a token.
    ///
    /// Fails fast with `ConfigurationInvalid` if the token cannot form a
    /// valid header value (embedded control bytes and the like).
    pub fn new(token: &Secret<String>) -> Result<Self> {
        let mut header =
            HeaderValue::from_str(&format!("Bearer {}", token.expose())).map_err(|e| {
                Error::ConfigurationInvalid(format!("token is not a valid header value: {e}"))
            })?;
        header.set_sensitive(true);
        Ok(Self { header })
    }

    /// Attach the `Authorization` header to an outgoing request.
    ///
    /// The request is otherwise returned unchanged.
    pub fn decorate(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTHORIZATION, self.header.clone())
    }
}
