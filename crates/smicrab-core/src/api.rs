//! Backend seams
//!
//! - `StatusSource`: the authoritative status read
//! - `AnalysisBackend`: status read plus the mutation endpoints
//! - `AuthContext`: optional bearer credential attached to requests

use crate::error::SyncError;
use crate::requests::{
    DeleteAnalysisResponse, RunAnalysisResponse, SaveParametersRequest, UserAnalyses,
};
use crate::types::{Analysis, AnalysisId, UserId};
use async_trait::async_trait;
use std::fmt;

/// Opaque bearer credential
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wrap a raw token
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token for the `Authorization` header
    #[inline]
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

/// Credentials a request is made with
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum AuthContext {
    /// No credential
    #[default]
    Anonymous,
    /// Bearer credential
    Bearer(BearerToken),
}

impl AuthContext {
    /// Context for a token, anonymous when the token is blank
    #[must_use]
    pub fn from_token(token: Option<&str>) -> Self {
        match token.map(str::trim) {
            Some(token) if !token.is_empty() => Self::Bearer(BearerToken::new(token)),
            _ => Self::Anonymous,
        }
    }

    /// Cache discriminator
    #[inline]
    #[must_use]
    pub fn scope(&self) -> AuthScope {
        match self {
            Self::Anonymous => AuthScope::Anonymous,
            Self::Bearer(_) => AuthScope::Authenticated,
        }
    }

    /// Token, if any
    #[inline]
    #[must_use]
    pub fn token(&self) -> Option<&BearerToken> {
        match self {
            Self::Anonymous => None,
            Self::Bearer(token) => Some(token),
        }
    }
}

/// Whether a snapshot was read with or without credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AuthScope {
    Anonymous,
    Authenticated,
}

impl fmt::Display for AuthScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Anonymous => "no-auth",
            Self::Authenticated => "auth",
        })
    }
}

/// Authoritative source of analysis status
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Current full state of an analysis
    ///
    /// # Errors
    /// `SyncError::NotFound` when the backend has no such analysis, any other
    /// variant for transport or protocol failures.
    async fn fetch_status(&self, id: &AnalysisId, auth: &AuthContext)
        -> Result<Analysis, SyncError>;
}

/// Full backend surface used by the mutation path
#[async_trait]
pub trait AnalysisBackend: StatusSource {
    /// Allocate a new pending analysis
    async fn create(&self, user: &UserId, auth: &AuthContext) -> Result<Analysis, SyncError>;

    /// All analyses owned by a user
    async fn list_for_user(&self, user: &UserId, auth: &AuthContext)
        -> Result<UserAnalyses, SyncError>;

    /// Store configuration parameters
    async fn save_parameters(
        &self,
        request: &SaveParametersRequest,
        auth: &AuthContext,
    ) -> Result<Analysis, SyncError>;

    /// Start or restart execution
    async fn run(&self, id: &AnalysisId, auth: &AuthContext)
        -> Result<RunAnalysisResponse, SyncError>;

    /// Delete an analysis and tear down its compute resources
    async fn delete(&self, id: &AnalysisId, auth: &AuthContext)
        -> Result<DeleteAnalysisResponse, SyncError>;
}

#[async_trait]
impl<T: StatusSource + ?Sized> StatusSource for std::sync::Arc<T> {
    async fn fetch_status(
        &self,
        id: &AnalysisId,
        auth: &AuthContext,
    ) -> Result<Analysis, SyncError> {
        (**self).fetch_status(id, auth).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_debug_is_redacted() {
        let auth = AuthContext::Bearer(BearerToken::new("s3cret"));
        let rendered = format!("{auth:?}");
        assert!(!rendered.contains("s3cret"));
        assert_eq!(auth.token().map(BearerToken::expose), Some("s3cret"));
    }

    #[test]
    fn test_blank_token_degrades_to_anonymous() {
        assert_eq!(AuthContext::from_token(None), AuthContext::Anonymous);
        assert_eq!(AuthContext::from_token(Some("  ")), AuthContext::Anonymous);
        assert_eq!(AuthContext::from_token(Some("t")).scope(), AuthScope::Authenticated);
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(AuthScope::Anonymous.to_string(), "no-auth");
        assert_eq!(AuthScope::Authenticated.to_string(), "auth");
    }
}
