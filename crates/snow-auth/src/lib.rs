//! ServiceNow authentication and session establishment
//!
//! Mediates four mutually exclusive credential flows against a ServiceNow
//! instance and produces one authenticated HTTP session per invocation:
//!
//! 1. `basic` — username/password on every request
//! 2. `oauth` — OAuth2 password grant against the instance token endpoint,
//!    with an in-place refresh contract
//! 3. `token` — a pre-issued bearer token, no network calls to set up
//! 4. `okta` — OpenID token exchange against an Okta issuer, finishing as
//!    the token flow with the obtained `id_token`
//!
//! Typical use:
//! 1. Build [`Credentials`] from the configuration surface
//! 2. Pick a strategy via [`AuthStrategy::parse`]
//! 3. Run [`Authenticator::establish`] to obtain a [`Login`]
//! 4. Hand `login.session` to the record-operations layer; surface
//!    `login.diagnostics` in the result when the okta flow ran

pub mod bearer;
pub mod credentials;
pub mod diagnostics;
pub mod error;
pub mod okta;
pub mod session;
pub mod token;

pub use bearer::BearerAuth;
pub use credentials::{AuthStrategy, Credentials, LogLevel};
pub use diagnostics::Diagnostics;
pub use error::{Error, Result};
pub use okta::{OktaClient, OktaEndpoints};
pub use session::{Authenticator, EstablishError, Login, Session};
pub use token::{TokenRefresher, TokenResponse, TokenState};
