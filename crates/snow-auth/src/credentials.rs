//! Credential bundle and per-strategy validation
//!
//! Collects every identity input the configuration surface can supply and
//! validates the combination against the selected auth strategy before any
//! network call is made. Validation failures are `ConfigurationInvalid` and
//! never reach the wire.

use common::Secret;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Which of the four mutually exclusive credential flows to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStrategy {
    Basic,
    OAuth,
    Token,
    Okta,
}

impl AuthStrategy {
    /// Parse a strategy name from the configuration surface.
    ///
    /// Unknown names fail with `ConfigurationInvalid` naming the requested
    /// value, before any flow runs.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "basic" => Ok(Self::Basic),
            "oauth" => Ok(Self::OAuth),
            "token" => Ok(Self::Token),
            "okta" => Ok(Self::Okta),
            other => Err(Error::ConfigurationInvalid(format!(
                "auth method not implemented: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::OAuth => "oauth",
            Self::Token => "token",
            Self::Okta => "okta",
        }
    }
}

/// Diagnostic verbosity toggle. Affects what lands in the result map,
/// never control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Normal,
}

/// Normalized identity inputs for one session-establishment attempt.
///
/// Secrets are wrapped so they stay redacted in logs. Exactly one of
/// `instance`/`host` must be set; which of the remaining fields are required
/// depends on the strategy (see [`Credentials::validate`]).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    pub instance: Option<String>,
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<Secret<String>>,
    pub client_id: Option<String>,
    pub client_secret: Option<Secret<String>>,
    pub token: Option<Secret<String>>,
    pub okta_domain: Option<String>,
    pub okta_server: Option<String>,
    #[serde(default)]
    pub okta_scope: Vec<String>,
    #[serde(default)]
    pub log_level: LogLevel,
}

impl Credentials {
    /// Check that this bundle can drive the given strategy.
    ///
    /// The required-together sets mirror the flows: basic needs
    /// username/password, oauth needs those plus client_id/client_secret,
    /// token needs a static token, okta needs the oauth set plus a domain
    /// (a pre-issued token is optional there).
    pub fn validate(&self, strategy: AuthStrategy) -> Result<()> {
        match (&self.instance, &self.host) {
            (None, None) => {
                return Err(Error::ConfigurationInvalid(
                    "one of instance or host is required".into(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(Error::ConfigurationInvalid(
                    "instance and host are mutually exclusive".into(),
                ));
            }
            _ => {}
        }

        match strategy {
            AuthStrategy::Basic => self.require(&["username", "password"]),
            AuthStrategy::OAuth => {
                // All four jointly: the password grant needs the user
                // credentials and the client pair in the same request.
                self.require(&["username", "password", "client_id", "client_secret"])
            }
            AuthStrategy::Token => self.require(&["token"]),
            AuthStrategy::Okta => {
                self.require(&["username", "password", "client_id", "client_secret"])?;
                if self.okta_domain.is_none() {
                    return Err(Error::ConfigurationInvalid(
                        "okta_domain is required for okta auth".into(),
                    ));
                }
                Ok(())
            }
        }
    }

    fn require(&self, fields: &[&str]) -> Result<()> {
        for field in fields {
            let present = match *field {
                "username" => self.username.is_some(),
                "password" => self.password.is_some(),
                "client_id" => self.client_id.is_some(),
                "client_secret" => self.client_secret.is_some(),
                "token" => self.token.is_some(),
                _ => unreachable!("unknown credential field {field}"),
            };
            if !present {
                return Err(Error::ConfigurationInvalid(format!(
                    "{field} is required for this auth method"
                )));
            }
        }
        Ok(())
    }

    /// Base URL of the target instance.
    ///
    /// `instance` is a ServiceNow-hosted shortname; `host` is a full custom
    /// domain. `validate` guarantees exactly one is set.
    pub fn base_url(&self) -> Result<String> {
        if let Some(instance) = &self.instance {
            Ok(format!("https://{instance}.service-now.com"))
        } else if let Some(host) = &self.host {
            Ok(format!("https://{host}"))
        } else {
            Err(Error::ConfigurationInvalid(
                "one of instance or host is required".into(),
            ))
        }
    }
}
