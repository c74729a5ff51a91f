//! Credential sources
//!
//! A missing token is not an error: requests degrade to anonymous.

use smicrab_core::{AuthContext, BearerToken};

/// Environment variable read by [`EnvCredentials`]
pub const ENV_TOKEN: &str = "SMICRAB_TOKEN";

/// Supplies the auth context for outgoing requests
pub trait CredentialSource: Send + Sync {
    /// Current credentials
    fn auth_context(&self) -> AuthContext;
}

/// Fixed credentials
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(AuthContext);

impl StaticCredentials {
    /// No credentials
    #[must_use]
    pub fn anonymous() -> Self {
        Self(AuthContext::Anonymous)
    }

    /// Fixed bearer token
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self(AuthContext::Bearer(BearerToken::new(token)))
    }
}

impl CredentialSource for StaticCredentials {
    fn auth_context(&self) -> AuthContext {
        self.0.clone()
    }
}

/// Token read from an environment variable on every request
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    /// Read `SMICRAB_TOKEN`
    #[must_use]
    pub fn new() -> Self {
        Self::from_var(ENV_TOKEN)
    }

    /// Read a custom variable
    #[must_use]
    pub fn from_var(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialSource for EnvCredentials {
    fn auth_context(&self) -> AuthContext {
        AuthContext::from_token(std::env::var(&self.var).ok().as_deref())
    }
}
