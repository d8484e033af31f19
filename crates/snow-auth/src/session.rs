//! Session establishment and auth flow dispatch
//!
//! One invocation runs exactly one flow: credentials are validated, the
//! selected strategy is dispatched, tokens are acquired where the flow
//! needs them, and a single authenticated [`Session`] comes out the other
//! end. A failure at any step terminates the invocation; nothing here
//! retries.
//!
//! The produced session is the only surface the record-operations layer
//! sees. It applies the per-request authenticator (basic credentials or a
//! bearer token) to every outgoing request and never re-authenticates.

use std::sync::{Arc, Mutex};

use common::Secret;
use reqwest::{Method, RequestBuilder};
use tracing::{debug, info};
use url::Url;

use crate::bearer::BearerAuth;
use crate::credentials::{AuthStrategy, Credentials};
use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::okta::{OktaClient, OktaEndpoints};
use crate::token::{self, TokenRefresher, TokenState};

/// Per-request authenticator attached to a session.
#[derive(Debug)]
enum RequestAuth {
    Basic {
        username: String,
        password: Secret<String>,
    },
    Bearer(BearerAuth),
    /// OAuth reads the current access token from the shared store on every
    /// request, so a refresh takes effect without rebuilding the session.
    OAuth {
        state: Arc<Mutex<TokenState>>,
        refresher: TokenRefresher,
    },
}

/// Authenticated HTTP client handle for one invocation.
///
/// Owns the transport, the instance base URL and the active per-request
/// authenticator. Created once per invocation and discarded at the end;
/// there is no pooling across invocations.
#[derive(Debug)]
pub struct Session {
    http: reqwest::Client,
    base_url: String,
    auth: RequestAuth,
}

impl Session {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start a request against an instance-relative path, with the
    /// session's authenticator applied.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = format!("{}{path}", self.base_url);
        let builder = self.http.request(method, url);
        match &self.auth {
            RequestAuth::Basic { username, password } => {
                Ok(builder.basic_auth(username, Some(password.expose())))
            }
            RequestAuth::Bearer(bearer) => Ok(bearer.decorate(builder)),
            RequestAuth::OAuth { state, .. } => {
                let state = state.lock().map_err(|e| {
                    Error::TokenRefreshFailed(format!("token store unavailable: {e}"))
                })?;
                let token = state.access_token.as_ref().ok_or(Error::TokenMissing)?;
                Ok(builder.bearer_auth(token.expose()))
            }
        }
    }

    pub fn get(&self, path: &str) -> Result<RequestBuilder> {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> Result<RequestBuilder> {
        self.request(Method::POST, path)
    }

    /// Refresh the oauth access token in place.
    ///
    /// Only meaningful for oauth sessions; other flows fail with
    /// `TokenRefreshFailed` since they have no refresh contract.
    pub async fn refresh_token(&self) -> Result<()> {
        match &self.auth {
            RequestAuth::OAuth { refresher, .. } => refresher.refresh(&self.http).await,
            _ => Err(Error::TokenRefreshFailed(
                "session does not use a refreshable token".into(),
            )),
        }
    }
}

/// Result of a successful login: the session plus whatever diagnostics the
/// flow accumulated (Okta payloads, mainly).
#[derive(Debug)]
pub struct Login {
    pub session: Session,
    pub diagnostics: Diagnostics,
}

/// Failed login: the error plus whatever diagnostics had accumulated
/// before the failing call.
///
/// The okta flow merges each response as it lands, so a failure halfway
/// through still carries the payloads of the calls that did succeed.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct EstablishError {
    pub error: Error,
    pub diagnostics: Diagnostics,
}

impl From<Error> for EstablishError {
    fn from(error: Error) -> Self {
        Self {
            error,
            diagnostics: Diagnostics::new(),
        }
    }
}

/// Flow dispatcher: validates a credential bundle and runs exactly one of
/// the four strategies to completion.
#[derive(Debug)]
pub struct Authenticator {
    credentials: Credentials,
    strategy: AuthStrategy,
    base_url: String,
    okta_endpoints: Option<OktaEndpoints>,
    http: reqwest::Client,
}

impl Authenticator {
    /// Validate the bundle for the strategy and prepare the transport.
    ///
    /// A transport that cannot be constructed at all (no TLS backend) is a
    /// `DependencyMissing`; that check happens here, not on first use.
    pub fn new(credentials: Credentials, strategy: AuthStrategy) -> Result<Self> {
        credentials.validate(strategy)?;
        let base_url = credentials.base_url()?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::DependencyMissing(format!("HTTP client: {e}")))?;
        Ok(Self {
            credentials,
            strategy,
            base_url,
            okta_endpoints: None,
            http,
        })
    }

    /// Override the instance base URL (reverse proxies, test harnesses).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the derived Okta endpoints (reverse proxies, test
    /// harnesses).
    pub fn with_okta_endpoints(mut self, endpoints: OktaEndpoints) -> Self {
        self.okta_endpoints = Some(endpoints);
        self
    }

    /// Run the selected flow to completion.
    ///
    /// On failure the returned [`EstablishError`] carries the diagnostics
    /// accumulated up to the failing call.
    pub async fn establish(self) -> std::result::Result<Login, EstablishError> {
        debug!(strategy = self.strategy.as_str(), base_url = %self.base_url, "establishing session");
        let login = match self.strategy {
            AuthStrategy::Basic => self.establish_basic()?,
            AuthStrategy::OAuth => self.establish_oauth().await?,
            AuthStrategy::Token => self.establish_token()?,
            AuthStrategy::Okta => self.establish_okta().await?,
        };
        info!("session established");
        Ok(login)
    }

    /// Basic flow: the session carries username/password on every request.
    /// No network call is made during construction.
    fn establish_basic(self) -> Result<Login> {
        let username = self
            .credentials
            .username
            .clone()
            .ok_or_else(|| Error::ConfigurationInvalid("username is required".into()))?;
        let password = self
            .credentials
            .password
            .clone()
            .ok_or_else(|| Error::ConfigurationInvalid("password is required".into()))?;
        Url::parse(&self.base_url)
            .map_err(|e| Error::ConnectionFailed(format!("invalid instance URL: {e}")))?;
        Ok(Login {
            session: Session {
                http: self.http,
                base_url: self.base_url,
                auth: RequestAuth::Basic { username, password },
            },
            diagnostics: Diagnostics::new(),
        })
    }

    /// Token flow: wrap the supplied static token as a bearer
    /// authenticator. No network call is made during construction.
    fn establish_token(self) -> Result<Login> {
        let token = self
            .credentials
            .token
            .clone()
            .ok_or(Error::TokenMissing)?;
        let session = self.session_with_bearer(&token)?;
        Ok(Login {
            session,
            diagnostics: Diagnostics::new(),
        })
    }

    fn session_with_bearer(self, token: &Secret<String>) -> Result<Session> {
        let bearer = BearerAuth::new(token)?;
        Url::parse(&self.base_url)
            .map_err(|e| Error::ConnectionFailed(format!("invalid instance URL: {e}")))?;
        Ok(Session {
            http: self.http,
            base_url: self.base_url,
            auth: RequestAuth::Bearer(bearer),
        })
    }

    /// OAuth flow: set up the refresher, run the password grant if no token
    /// is already held, and install the result before handing the session
    /// out.
    async fn establish_oauth(self) -> Result<Login> {
        let client_id = self
            .credentials
            .client_id
            .clone()
            .ok_or_else(|| Error::ConfigurationInvalid("client_id is required".into()))?;
        let client_secret = self
            .credentials
            .client_secret
            .clone()
            .ok_or_else(|| Error::ConfigurationInvalid("client_secret is required".into()))?;

        let state = Arc::new(Mutex::new(TokenState::default()));
        let refresher = TokenRefresher::new(
            client_id.clone(),
            client_secret.clone(),
            self.base_url.clone(),
            state.clone(),
        );

        if let Some(token) = &self.credentials.token {
            // A pre-issued token skips the grant entirely.
            let mut held = state
                .lock()
                .map_err(|e| Error::TokenRefreshFailed(format!("token store unavailable: {e}")))?;
            held.access_token = Some(token.clone());
        } else {
            let username = self
                .credentials
                .username
                .as_deref()
                .ok_or_else(|| Error::ConfigurationInvalid("username is required".into()))?;
            let password = self
                .credentials
                .password
                .clone()
                .ok_or_else(|| Error::ConfigurationInvalid("password is required".into()))?;
            let response = token::request_token(
                &self.http,
                &self.base_url,
                &client_id,
                &client_secret,
                username,
                &password,
            )
            .await?;
            refresher.apply(response)?;
        }

        Ok(Login {
            session: Session {
                http: self.http,
                base_url: self.base_url,
                auth: RequestAuth::OAuth { state, refresher },
            },
            diagnostics: Diagnostics::new(),
        })
    }

    /// Okta flow: make sure an active id_token is in hand (introspecting a
    /// supplied one, acquiring a fresh one when necessary), then finish as
    /// the token flow would. A failure keeps the diagnostics merged so far.
    async fn establish_okta(mut self) -> std::result::Result<Login, EstablishError> {
        let mut diagnostics = Diagnostics::new();
        let token = match self.okta_token(&mut diagnostics).await {
            Ok(token) => token,
            Err(error) => return Err(EstablishError { error, diagnostics }),
        };
        match self.session_with_bearer(&token) {
            Ok(session) => Ok(Login {
                session,
                diagnostics,
            }),
            Err(error) => Err(EstablishError { error, diagnostics }),
        }
    }

    async fn okta_token(&mut self, diagnostics: &mut Diagnostics) -> Result<Secret<String>> {
        let domain = self
            .credentials
            .okta_domain
            .clone()
            .ok_or_else(|| Error::ConfigurationInvalid("okta_domain is required".into()))?;
        let endpoints = match self.okta_endpoints.take() {
            Some(endpoints) => endpoints,
            None => OktaEndpoints::derive(&domain, self.credentials.okta_server.as_deref())?,
        };
        let client_id = self
            .credentials
            .client_id
            .clone()
            .ok_or_else(|| Error::ConfigurationInvalid("client_id is required".into()))?;
        let client_secret = self
            .credentials
            .client_secret
            .clone()
            .ok_or_else(|| Error::ConfigurationInvalid("client_secret is required".into()))?;
        let username = self
            .credentials
            .username
            .clone()
            .ok_or_else(|| Error::ConfigurationInvalid("username is required".into()))?;
        let password = self
            .credentials
            .password
            .clone()
            .ok_or_else(|| Error::ConfigurationInvalid("password is required".into()))?;

        let okta = OktaClient::new(
            self.http.clone(),
            endpoints,
            client_id,
            client_secret,
        );

        match self.credentials.token.clone() {
            Some(supplied) => {
                if okta.introspect(&supplied, diagnostics).await? {
                    debug!("supplied okta token is active, skipping acquisition");
                    Ok(supplied)
                } else {
                    debug!("supplied okta token is inactive, acquiring a fresh one");
                    let id_token = okta
                        .exchange(&username, &password, &self.credentials.okta_scope, diagnostics)
                        .await?;
                    Ok(Secret::new(id_token))
                }
            }
            None => {
                let id_token = okta
                    .exchange(&username, &password, &self.credentials.okta_scope, diagnostics)
                    .await?;
                Ok(Secret::new(id_token))
            }
        }
    }
}
