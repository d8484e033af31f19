//! Okta token exchange, introspection and user-info lookup
//!
//! The okta flow layers an OpenID token exchange on top of bearer auth: a
//! password grant against the Okta issuer yields an `id_token` that is then
//! used as the ServiceNow bearer token. Every response body is merged into
//! the invocation's [`Diagnostics`] so the caller can surface the raw Okta
//! payloads.

use common::Secret;
use tracing::debug;
use url::Url;

use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};

/// Scope requested when the configuration surface supplies none.
const DEFAULT_SCOPE: &str = "openid";

/// Endpoint URLs derived once from the Okta domain.
///
/// `base` is `https://{domain}/oauth2`, or `https://{domain}/oauth2/{server}`
/// when a custom authorization server is configured. The three operation
/// endpoints hang off `base + "/v1/..."`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OktaEndpoints {
    pub base: String,
    pub token: String,
    pub introspect: String,
    pub user: String,
}

impl OktaEndpoints {
    /// Compute the endpoint set from a domain and optional authorization
    /// server id.
    pub fn derive(domain: &str, server: Option<&str>) -> Result<Self> {
        let base = match server {
            Some(server) => format!("https://{domain}/oauth2/{server}"),
            None => format!("https://{domain}/oauth2"),
        };
        // Reject domains that do not form a parseable https URL before any
        // call is attempted.
        Url::parse(&base).map_err(|e| {
            Error::ConfigurationInvalid(format!("okta_domain {domain:?} is not usable: {e}"))
        })?;
        Ok(Self {
            token: format!("{base}/v1/token"),
            introspect: format!("{base}/v1/introspect"),
            user: format!("{base}/v1/userinfo"),
            base,
        })
    }
}

/// Client for the three Okta operations the okta flow composes.
pub struct OktaClient {
    http: reqwest::Client,
    endpoints: OktaEndpoints,
    client_id: String,
    client_secret: Secret<String>,
}

impl OktaClient {
    pub fn new(
        http: reqwest::Client,
        endpoints: OktaEndpoints,
        client_id: String,
        client_secret: Secret<String>,
    ) -> Self {
        Self {
            http,
            endpoints,
            client_id,
            client_secret,
        }
    }

    pub fn endpoints(&self) -> &OktaEndpoints {
        &self.endpoints
    }

    /// Password-grant token request.
    ///
    /// Authenticates with the client pair via basic auth, merges the
    /// response into `diagnostics` and returns the `id_token` field. A
    /// response without one is a `TokenCreationFailed`.
    pub async fn acquire_token(
        &self,
        username: &str,
        password: &Secret<String>,
        scope: &[String],
        diagnostics: &mut Diagnostics,
    ) -> Result<String> {
        let scope = if scope.is_empty() {
            DEFAULT_SCOPE.to_owned()
        } else {
            scope.join(" ")
        };
        let response = self
            .http
            .post(&self.endpoints.token)
            .basic_auth(&self.client_id, Some(self.client_secret.expose()))
            .form(&[
                ("grant_type", "password"),
                ("username", username),
                ("password", password.expose()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::ConnectionFailed(format!("okta token request failed: {e}")))?;

        let body = read_json(response).await?;
        diagnostics.merge(body);

        match diagnostics.get("id_token").and_then(|v| v.as_str()) {
            Some(id_token) => {
                debug!("okta password grant returned an id_token");
                Ok(id_token.to_owned())
            }
            None => Err(Error::TokenCreationFailed(
                "okta token response did not include an id_token".into(),
            )),
        }
    }

    /// Ask the issuer whether a token is currently active.
    ///
    /// The response is merged into `diagnostics`; the `active` field is
    /// accepted as either a JSON boolean or the string `"true"` (issuers
    /// disagree).
    pub async fn introspect(
        &self,
        token: &Secret<String>,
        diagnostics: &mut Diagnostics,
    ) -> Result<bool> {
        let response = self
            .http
            .post(&self.endpoints.introspect)
            .basic_auth(&self.client_id, Some(self.client_secret.expose()))
            .query(&[
                ("token", token.expose().as_str()),
                ("token_type_hint", "id_token"),
            ])
            .send()
            .await
            .map_err(|e| Error::ConnectionFailed(format!("okta introspection failed: {e}")))?;

        let body = read_json(response).await?;
        diagnostics.merge(body);

        let active = match diagnostics.get("active") {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        };
        debug!(active, "okta introspection completed");
        Ok(active)
    }

    /// Fetch user info with the access token from an earlier response.
    ///
    /// Skipped (without error) when no `access_token` key has accumulated
    /// in the diagnostics.
    pub async fn fetch_user_info(&self, diagnostics: &mut Diagnostics) -> Result<()> {
        let Some(access_token) = diagnostics
            .get("access_token")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
        else {
            return Ok(());
        };

        let response = self
            .http
            .post(&self.endpoints.user)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::ConnectionFailed(format!("okta user-info request failed: {e}")))?;

        let body = read_json(response).await?;
        diagnostics.merge(body);
        Ok(())
    }

    /// The full acquisition sub-flow: password grant, introspect the new
    /// token, fetch user info, return the `id_token`.
    pub async fn exchange(
        &self,
        username: &str,
        password: &Secret<String>,
        scope: &[String],
        diagnostics: &mut Diagnostics,
    ) -> Result<String> {
        let id_token = self
            .acquire_token(username, password, scope, diagnostics)
            .await?;
        self.introspect(&Secret::from(id_token.as_str()), diagnostics)
            .await?;
        self.fetch_user_info(diagnostics).await?;
        Ok(id_token)
    }
}

/// Raise on non-success status, otherwise parse the JSON body.
async fn read_json(response: reqwest::Response) -> Result<serde_json::Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::HttpCallFailed { status, body });
    }
    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| Error::HttpCallFailed {
            status,
            body: format!("unparseable response body: {e}"),
        })
}
