//! OAuth token lifecycle against the ServiceNow token endpoint
//!
//! Handles the two grant types the instance token endpoint supports:
//! 1. Password grant (initial token acquisition for the oauth flow)
//! 2. Refresh grant (exchanging a refresh token for a new access token)
//!
//! Both POST form-encoded bodies to `{base}/oauth_token.do`. The acquired
//! token lives in a [`TokenState`] that is scoped to one invocation and
//! mutated only through the [`TokenRefresher`] callback.

use std::sync::{Arc, Mutex};

use common::Secret;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Token material held for the lifetime of one invocation.
///
/// Never persisted: each invocation re-authenticates from scratch.
#[derive(Debug, Default)]
pub struct TokenState {
    pub access_token: Option<Secret<String>>,
    pub refresh_token: Option<Secret<String>>,
    pub id_token: Option<Secret<String>>,
    /// Seconds until expiry as reported by the token endpoint (delta,
    /// informational only — nothing at this layer schedules a refresh).
    pub expires_in: Option<u64>,
}

impl TokenState {
    pub fn has_access_token(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Response from the instance token endpoint for both grant types.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Acquire a token via the OAuth2 password grant.
///
/// Sends username/password together with the client pair, form-encoded.
/// A transport-level failure is `ConnectionFailed`; a rejection or an
/// unreadable body is `TokenCreationFailed` (the two are distinct so the
/// caller can tell "could not reach the instance" from "the instance said
/// no").
pub async fn request_token(
    client: &reqwest::Client,
    base_url: &str,
    client_id: &str,
    client_secret: &Secret<String>,
    username: &str,
    password: &Secret<String>,
) -> Result<TokenResponse> {
    let response = client
        .post(format!("{base_url}/oauth_token.do"))
        .form(&[
            ("grant_type", "password"),
            ("client_id", client_id),
            ("client_secret", client_secret.expose()),
            ("username", username),
            ("password", password.expose()),
        ])
        .send()
        .await
        .map_err(|e| Error::ConnectionFailed(format!("token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenCreationFailed(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    debug!("password grant accepted by token endpoint");
    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenCreationFailed(format!("invalid token response: {e}")))
}

/// Exchange a refresh token for a new access token.
pub async fn refresh_grant(
    client: &reqwest::Client,
    base_url: &str,
    client_id: &str,
    client_secret: &Secret<String>,
    refresh_token: &Secret<String>,
) -> Result<TokenResponse> {
    let response = client
        .post(format!("{base_url}/oauth_token.do"))
        .form(&[
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("client_secret", client_secret.expose()),
            ("refresh_token", refresh_token.expose()),
        ])
        .send()
        .await
        .map_err(|e| Error::ConnectionFailed(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenRefreshFailed(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenRefreshFailed(format!("invalid refresh response: {e}")))
}

/// Refresh callback for the oauth flow.
///
/// Owns copies of the client pair and base URL taken at construction time
/// (never stale references into the credential bundle) plus a shared handle
/// to the invocation's [`TokenState`]. Applying a new token replaces the
/// stored token in place; the session keeps reading through the same handle,
/// so no client rebuild is needed.
#[derive(Clone, Debug)]
pub struct TokenRefresher {
    pub(crate) client_id: String,
    pub(crate) client_secret: Secret<String>,
    pub(crate) base_url: String,
    state: Arc<Mutex<TokenState>>,
}

impl TokenRefresher {
    pub fn new(
        client_id: String,
        client_secret: Secret<String>,
        base_url: String,
        state: Arc<Mutex<TokenState>>,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            base_url,
            state,
        }
    }

    /// Install a freshly issued token into the store.
    ///
    /// An empty access token is `TokenMissing`; a poisoned store is
    /// `TokenRefreshFailed`. Both abort the invocation.
    pub fn apply(&self, response: TokenResponse) -> Result<()> {
        if response.access_token.is_empty() {
            return Err(Error::TokenMissing);
        }
        let mut state = self
            .state
            .lock()
            .map_err(|e| Error::TokenRefreshFailed(format!("token store unavailable: {e}")))?;
        state.access_token = Some(Secret::new(response.access_token));
        state.refresh_token = response.refresh_token.map(Secret::new);
        state.expires_in = response.expires_in;
        debug!("installed new access token");
        Ok(())
    }

    /// Run the refresh grant and install the result.
    pub async fn refresh(&self, client: &reqwest::Client) -> Result<()> {
        let refresh_token = {
            let state = self
                .state
                .lock()
                .map_err(|e| Error::TokenRefreshFailed(format!("token store unavailable: {e}")))?;
            state
                .refresh_token
                .as_ref()
                .cloned()
                .ok_or(Error::TokenMissing)?
        };
        let response = refresh_grant(
            client,
            &self.base_url,
            &self.client_id,
            &self.client_secret,
            &refresh_token,
        )
        .await?;
        self.apply(response)
    }

    pub fn state(&self) -> Arc<Mutex<TokenState>> {
        self.state.clone()
    }
}
