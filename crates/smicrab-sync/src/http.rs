//! reqwest transport for the analysis backend
//!
//! Maps the REST surface onto `AnalysisBackend`:
//! - `GET    /analysis/{id}/status`
//! - `POST   /analysis/create`
//! - `GET    /analysis/user/{user_id}`
//! - `POST   /analysis/parameters`
//! - `POST   /analysis/run`
//! - `DELETE /analysis/{id}`

use crate::config::SyncConfig;
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use smicrab_core::{
    Analysis, AnalysisBackend, AnalysisId, ApiEnvelope, AuthContext, CreateAnalysisRequest,
    DeleteAnalysisResponse, RunAnalysisRequest, RunAnalysisResponse, SaveParametersRequest,
    StatusSource, SyncError, UserAnalyses, UserId,
};
use tracing::{debug, info};

/// HTTP implementation of the backend seams
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Build a client from configuration
    ///
    /// # Errors
    /// `SyncError::Config` if the HTTP client cannot be constructed.
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self::with_client(client, config.base_url()))
    }

    /// Wrap an existing client
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Base URL requests are made against
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        auth: &AuthContext,
    ) -> Result<T, SyncError> {
        let request = match auth.token() {
            Some(token) => request.bearer_auth(token.expose()),
            None => request,
        };

        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        if !status.is_success() {
            return Err(http_error(status, &body));
        }

        let envelope: ApiEnvelope<T> =
            serde_json::from_str(&body).map_err(|e| SyncError::Decode(e.to_string()))?;
        envelope.into_data()
    }
}

fn transport(error: reqwest::Error) -> SyncError {
    if error.is_decode() {
        SyncError::Decode(error.to_string())
    } else {
        SyncError::Transport(error.to_string())
    }
}

fn http_error(status: StatusCode, body: &str) -> SyncError {
    let message = serde_json::from_str::<ApiEnvelope<Value>>(body)
        .ok()
        .map(|envelope| envelope.message)
        .or_else(|| {
            // FastAPI-style `{"detail": "..."}`
            serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    SyncError::Http {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl StatusSource for HttpBackend {
    async fn fetch_status(
        &self,
        id: &AnalysisId,
        auth: &AuthContext,
    ) -> Result<Analysis, SyncError> {
        debug!(%id, "fetching analysis status");
        let request = self.client.get(self.url(&format!("/analysis/{id}/status")));
        match self.send(request, auth).await {
            Err(SyncError::Http { status: 404, .. }) => Err(SyncError::NotFound(*id)),
            other => other,
        }
    }
}

#[async_trait]
impl AnalysisBackend for HttpBackend {
    async fn create(&self, user: &UserId, auth: &AuthContext) -> Result<Analysis, SyncError> {
        info!(%user, "creating analysis");
        let body = CreateAnalysisRequest { user_id: *user };
        let request = self.client.post(self.url("/analysis/create")).json(&body);
        self.send(request, auth).await
    }

    async fn list_for_user(
        &self,
        user: &UserId,
        auth: &AuthContext,
    ) -> Result<UserAnalyses, SyncError> {
        let request = self.client.get(self.url(&format!("/analysis/user/{user}")));
        self.send(request, auth).await
    }

    async fn save_parameters(
        &self,
        request: &SaveParametersRequest,
        auth: &AuthContext,
    ) -> Result<Analysis, SyncError> {
        info!(id = %request.analysis_id, "saving analysis parameters");
        let builder = self.client.post(self.url("/analysis/parameters")).json(request);
        self.send(builder, auth).await
    }

    async fn run(
        &self,
        id: &AnalysisId,
        auth: &AuthContext,
    ) -> Result<RunAnalysisResponse, SyncError> {
        info!(%id, "starting analysis");
        let body = RunAnalysisRequest { analysis_id: *id };
        let request = self.client.post(self.url("/analysis/run")).json(&body);
        self.send(request, auth).await
    }

    async fn delete(
        &self,
        id: &AnalysisId,
        auth: &AuthContext,
    ) -> Result<DeleteAnalysisResponse, SyncError> {
        info!(%id, "deleting analysis");
        let request = self.client.delete(self.url(&format!("/analysis/{id}")));
        match self.send(request, auth).await {
            Err(SyncError::Http { status: 404, .. }) => Err(SyncError::NotFound(*id)),
            other => other,
        }
    }
}
