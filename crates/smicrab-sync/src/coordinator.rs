//! Mutation Coordinator
//!
//! Wraps every state-changing backend call so that:
//! - Failures come back as a structured `ActionResponse`, never a panic
//! - Cache entries for the affected analysis are invalidated only after success
//! - The caller is told what to re-fetch instead of trusting the response body

use crate::credentials::CredentialSource;
use smicrab_cache::{CacheTag, StatusCache};
use smicrab_core::{
    ActionResponse, Analysis, AnalysisBackend, AnalysisId, DeleteAnalysisResponse,
    RunAnalysisResponse, SaveParametersRequest, SyncError, UserId,
};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// What the caller should read again after a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refetch {
    /// Nothing changed
    Nothing,
    /// Re-read this analysis; the backend may keep changing it
    Analysis(AnalysisId),
    /// Re-read the analysis list
    AnalysisList,
}

/// Result of a coordinated mutation
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome<T> {
    pub response: ActionResponse<T>,
    pub refetch: Refetch,
}

impl<T> MutationOutcome<T> {
    fn failed(error: SyncError) -> Self {
        Self {
            response: error.into(),
            refetch: Refetch::Nothing,
        }
    }

    /// Whether the backend accepted the mutation
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.response.success
    }
}

/// Runs mutations and keeps the status cache honest
#[derive(Clone)]
pub struct MutationCoordinator {
    backend: Arc<dyn AnalysisBackend>,
    cache: StatusCache,
    credentials: Arc<dyn CredentialSource>,
}

impl fmt::Debug for MutationCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationCoordinator")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl MutationCoordinator {
    /// Create new coordinator sharing `cache` with the fetch path
    #[must_use]
    pub fn new(
        backend: Arc<dyn AnalysisBackend>,
        cache: StatusCache,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            backend,
            cache,
            credentials,
        }
    }

    /// Allocate a new pending analysis
    pub async fn create(&self, user: UserId) -> MutationOutcome<Analysis> {
        let auth = self.credentials.auth_context();
        match self.backend.create(&user, &auth).await {
            Ok(analysis) => {
                self.invalidate(&[CacheTag::AllAnalyses]).await;
                info!(id = %analysis.id, %user, "analysis created");
                MutationOutcome {
                    response: ActionResponse::ok(analysis, "Analysis created successfully"),
                    refetch: Refetch::AnalysisList,
                }
            }
            Err(error) => {
                warn!(%user, %error, "failed to create analysis");
                MutationOutcome::failed(error)
            }
        }
    }

    /// Validate and store configuration parameters.
    ///
    /// An invalid payload is never sent.
    pub async fn save_configuration(
        &self,
        request: &SaveParametersRequest,
    ) -> MutationOutcome<Analysis> {
        let id = request.analysis_id;
        if let Err(errors) = request.validate() {
            warn!(%id, %errors, "refusing invalid analysis parameters");
            return MutationOutcome::failed(errors.into());
        }

        let auth = self.credentials.auth_context();
        match self.backend.save_parameters(request, &auth).await {
            Ok(analysis) => {
                self.invalidate(&[CacheTag::Analysis(id)]).await;
                info!(%id, "analysis parameters saved");
                MutationOutcome {
                    response: ActionResponse::ok(analysis, "Analysis parameters saved successfully"),
                    refetch: Refetch::Analysis(id),
                }
            }
            Err(error) => {
                warn!(%id, %error, "failed to save analysis parameters");
                MutationOutcome::failed(error)
            }
        }
    }

    /// Start, or restart after a failure, an analysis run
    pub async fn run(&self, id: AnalysisId) -> MutationOutcome<RunAnalysisResponse> {
        let auth = self.credentials.auth_context();
        match self.backend.run(&id, &auth).await {
            Ok(started) => {
                self.invalidate(&[CacheTag::Analysis(id)]).await;
                info!(%id, execution_started = started.execution_started, "analysis run requested");
                let message = started.message.clone();
                MutationOutcome {
                    response: ActionResponse::ok(started, message),
                    refetch: Refetch::Analysis(id),
                }
            }
            Err(error) => {
                warn!(%id, %error, "failed to run analysis");
                MutationOutcome::failed(error)
            }
        }
    }

    /// Delete an analysis and drop every cached copy of it
    pub async fn delete(&self, id: AnalysisId) -> MutationOutcome<DeleteAnalysisResponse> {
        let auth = self.credentials.auth_context();
        match self.backend.delete(&id, &auth).await {
            Ok(deleted) => {
                self.invalidate(&[CacheTag::Analysis(id), CacheTag::AllAnalyses])
                    .await;
                info!(%id, container_stopped = deleted.container_stopped, "analysis deleted");
                let message = deleted.message.clone();
                MutationOutcome {
                    response: ActionResponse::ok(deleted, message),
                    refetch: Refetch::AnalysisList,
                }
            }
            Err(error) => {
                warn!(%id, %error, "failed to delete analysis");
                MutationOutcome::failed(error)
            }
        }
    }

    /// All analyses owned by `user`
    pub async fn list_for_user(&self, user: UserId) -> ActionResponse<Vec<Analysis>> {
        let auth = self.credentials.auth_context();
        match self.backend.list_for_user(&user, &auth).await {
            Ok(listing) => ActionResponse::ok(listing.analyses, "Analyses retrieved successfully"),
            Err(error) => {
                warn!(%user, %error, "failed to list analyses");
                error.into()
            }
        }
    }

    /// Drop cached copies of one analysis, or of all analyses.
    ///
    /// Observers call this when they see a status change the cache may not
    /// reflect yet.
    pub async fn revalidate(&self, id: Option<AnalysisId>) -> ActionResponse<usize> {
        let dropped = self.cache.revalidate(id).await;
        ActionResponse::ok(dropped, "Cache revalidated successfully")
    }

    async fn invalidate(&self, tags: &[CacheTag]) {
        for tag in tags {
            self.cache.invalidate_tag(tag).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentials;
    use smicrab_cache::CacheKey;
    use smicrab_core::{AnalyzeStatus, AuthScope};
    use smicrab_test_utils::{analysis_with_status, sample_parameters, ScriptedBackend};

    fn coordinator(backend: &ScriptedBackend, cache: &StatusCache) -> MutationCoordinator {
        MutationCoordinator::new(
            backend.shared(),
            cache.clone(),
            Arc::new(StaticCredentials::anonymous()),
        )
    }

    #[tokio::test]
    async fn test_invalid_parameters_are_not_sent() {
        let backend = ScriptedBackend::new();
        let cache = StatusCache::default();
        let request = sample_parameters(AnalysisId::new()).with_location(120.0, 11.2);

        let outcome = coordinator(&backend, &cache)
            .save_configuration(&request)
            .await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.response.errors[0].field, "user_latitude_choice");
        assert_eq!(outcome.refetch, Refetch::Nothing);
        assert_eq!(backend.save_calls(), 0);
    }

    #[tokio::test]
    async fn test_rejected_mutation_keeps_cache() {
        let completed = Arc::new(analysis_with_status(AnalyzeStatus::Completed));
        let backend = ScriptedBackend::new().with_analysis((*completed).clone());
        let cache = StatusCache::default();
        cache.insert(Arc::clone(&completed), AuthScope::Anonymous).await;
        backend.reject_next_mutation("Analysis is locked");

        let outcome = coordinator(&backend, &cache).delete(completed.id).await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.response.message.as_deref(), Some("Analysis is locked"));
        assert!(cache.contains(&CacheKey::new(completed.id, AuthScope::Anonymous)));
    }

    #[tokio::test]
    async fn test_delete_invalidates_every_scope() {
        let completed = Arc::new(analysis_with_status(AnalyzeStatus::Completed));
        let backend = ScriptedBackend::new().with_analysis((*completed).clone());
        let cache = StatusCache::default();
        cache.insert(Arc::clone(&completed), AuthScope::Anonymous).await;
        cache.insert(Arc::clone(&completed), AuthScope::Authenticated).await;

        let outcome = coordinator(&backend, &cache).delete(completed.id).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.refetch, Refetch::AnalysisList);
        assert!(!cache.contains(&CacheKey::new(completed.id, AuthScope::Anonymous)));
        assert!(!cache.contains(&CacheKey::new(completed.id, AuthScope::Authenticated)));
    }

    #[tokio::test]
    async fn test_list_and_create() {
        let backend = ScriptedBackend::new();
        let cache = StatusCache::default();
        let coordinator = coordinator(&backend, &cache);
        let user = UserId::new();

        let created = coordinator.create(user).await;
        assert!(created.is_success());
        assert_eq!(created.refetch, Refetch::AnalysisList);

        let listed = coordinator.list_for_user(user).await;
        assert_eq!(listed.data.map(|a| a.len()), Some(1));
        assert_eq!(coordinator.list_for_user(UserId::new()).await.data, Some(vec![]));
    }

    #[tokio::test]
    async fn test_run_unknown_analysis() {
        let backend = ScriptedBackend::new();
        let cache = StatusCache::default();

        let outcome = coordinator(&backend, &cache).run(AnalysisId::new()).await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.response.message.as_deref(), Some("Analysis not found"));
    }

    #[tokio::test]
    async fn test_revalidate_reports_dropped_entries() {
        let backend = ScriptedBackend::new();
        let cache = StatusCache::default();
        let completed = Arc::new(analysis_with_status(AnalyzeStatus::Completed));
        cache.insert(Arc::clone(&completed), AuthScope::Anonymous).await;

        let response = coordinator(&backend, &cache).revalidate(None).await;
        assert_eq!(response.data, Some(1));
    }
}
