//! Testing utilities for SMICRAB workspace
//!
//! Shared fixtures and an in-memory backend whose status progression can be
//! scripted per analysis.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use smicrab_core::{
    Analysis, AnalysisBackend, AnalysisId, AnalyzeStatus, AuthContext, Coordinates,
    DeleteAnalysisResponse, ModelConfig, ModuleName, RunAnalysisResponse, SaveParametersRequest,
    StatusSource, SyncError, UserAnalyses, UserId,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

fn sample_config() -> ModelConfig {
    let mut config = ModelConfig::new();
    config.insert("model_type".into(), "Model6_HSDPD_user".into());
    config.insert("summary_stat".into(), "mean".into());
    config
}

/// Analysis in `status` that satisfies the data-model invariants
pub fn analysis_with_status(status: AnalyzeStatus) -> Analysis {
    analysis_for(AnalysisId::new(), status)
}

/// Same as [`analysis_with_status`] with a fixed id
pub fn analysis_for(id: AnalysisId, status: AnalyzeStatus) -> Analysis {
    let mut analysis = Analysis::pending(id, UserId::new(), epoch());
    set_status(&mut analysis, status, "analysis failed");
    analysis
}

/// Copy of `analysis` with a different `updated_at`
pub fn at(analysis: &Analysis, seconds_after_epoch: i64) -> Analysis {
    let mut analysis = analysis.clone();
    analysis.updated_at = epoch() + ChronoDuration::seconds(seconds_after_epoch);
    analysis
}

/// Valid configuration payload for `id`
pub fn sample_parameters(id: AnalysisId) -> SaveParametersRequest {
    SaveParametersRequest::new(id)
}

fn set_status(analysis: &mut Analysis, status: AnalyzeStatus, error_message: &str) {
    analysis.status = status;
    analysis.error_message = None;
    match status {
        AnalyzeStatus::Pending => analysis.model_config_data = None,
        AnalyzeStatus::Error => {
            analysis.error_message = Some(error_message.to_string());
            analysis
                .model_config_data
                .get_or_insert_with(sample_config);
        }
        AnalyzeStatus::Configured | AnalyzeStatus::InProgress | AnalyzeStatus::Completed => {
            analysis
                .model_config_data
                .get_or_insert_with(sample_config);
        }
        AnalyzeStatus::Unknown => {}
    }
}

/// One scripted reaction of the backend to a status read
#[derive(Debug, Clone)]
pub enum Step {
    /// Leave the analysis unchanged
    Hold,
    /// Move the analysis to a status before answering
    Advance(AnalyzeStatus),
    /// Move to `module` while in progress
    Module(ModuleName),
    /// Fail the job with a message
    Fail(String),
    /// Answer with an error; stored state untouched
    Error(SyncError),
}

#[derive(Default)]
struct State {
    analyses: HashMap<AnalysisId, Analysis>,
    scripts: HashMap<AnalysisId, VecDeque<Step>>,
    delays: VecDeque<Duration>,
    reject_next: Option<String>,
}

#[derive(Default)]
struct Calls {
    status: AtomicUsize,
    create: AtomicUsize,
    list: AtomicUsize,
    save: AtomicUsize,
    run: AtomicUsize,
    delete: AtomicUsize,
    reads_in_flight: AtomicUsize,
    peak_reads_in_flight: AtomicUsize,
}

/// Counts a status read as outstanding until dropped, even if aborted
struct InFlight<'a>(&'a Calls);

impl<'a> InFlight<'a> {
    fn enter(calls: &'a Calls) -> Self {
        let outstanding = calls.reads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        calls
            .peak_reads_in_flight
            .fetch_max(outstanding, Ordering::SeqCst);
        Self(calls)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.reads_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory backend with scriptable status progression
///
/// Clones share state.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    state: Arc<Mutex<State>>,
    calls: Arc<Calls>,
    clock: Arc<AtomicI64>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend as the trait object the sync layer consumes
    pub fn shared(&self) -> Arc<dyn AnalysisBackend> {
        Arc::new(self.clone())
    }

    fn tick(&self) -> DateTime<Utc> {
        epoch() + ChronoDuration::seconds(self.clock.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Seed an analysis
    pub fn with_analysis(self, analysis: Analysis) -> Self {
        self.insert(analysis);
        self
    }

    pub fn insert(&self, analysis: Analysis) {
        self.state.lock().analyses.insert(analysis.id, analysis);
    }

    /// Queue reactions to upcoming status reads of `id`
    pub fn script(&self, id: AnalysisId, steps: impl IntoIterator<Item = Step>) {
        self.state
            .lock()
            .scripts
            .entry(id)
            .or_default()
            .extend(steps);
    }

    /// Delay responses to upcoming status reads, one duration per read
    pub fn delay_reads(&self, delays: impl IntoIterator<Item = Duration>) {
        self.state.lock().delays.extend(delays);
    }

    /// Make the next mutation answer `success: false`
    pub fn reject_next_mutation(&self, message: impl Into<String>) {
        self.state.lock().reject_next = Some(message.into());
    }

    /// Current stored state
    pub fn analysis(&self, id: &AnalysisId) -> Option<Analysis> {
        self.state.lock().analyses.get(id).cloned()
    }

    pub fn status_calls(&self) -> usize {
        self.calls.status.load(Ordering::SeqCst)
    }

    /// Most status reads that were ever outstanding at once
    pub fn peak_concurrent_reads(&self) -> usize {
        self.calls.peak_reads_in_flight.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.calls.create.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.calls.list.load(Ordering::SeqCst)
    }

    pub fn save_calls(&self) -> usize {
        self.calls.save.load(Ordering::SeqCst)
    }

    pub fn run_calls(&self) -> usize {
        self.calls.run.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.calls.delete.load(Ordering::SeqCst)
    }

    fn take_rejection(&self) -> Result<(), SyncError> {
        match self.state.lock().reject_next.take() {
            Some(message) => Err(SyncError::Rejected(message)),
            None => Ok(()),
        }
    }

    fn apply(&self, id: &AnalysisId) -> Result<Analysis, SyncError> {
        let now = self.tick();
        let mut state = self.state.lock();
        let step = state.scripts.get_mut(id).and_then(VecDeque::pop_front);
        let analysis = state
            .analyses
            .get_mut(id)
            .ok_or(SyncError::NotFound(*id))?;

        match step {
            None | Some(Step::Hold) => {}
            Some(Step::Advance(status)) => {
                set_status(analysis, status, "analysis failed");
                analysis.updated_at = now;
            }
            Some(Step::Module(module)) => {
                analysis.current_module = module;
                analysis.updated_at = now;
            }
            Some(Step::Fail(message)) => {
                set_status(analysis, AnalyzeStatus::Error, &message);
                analysis.updated_at = now;
            }
            Some(Step::Error(error)) => return Err(error),
        }
        Ok(analysis.clone())
    }
}

#[async_trait]
impl StatusSource for ScriptedBackend {
    async fn fetch_status(
        &self,
        id: &AnalysisId,
        _auth: &AuthContext,
    ) -> Result<Analysis, SyncError> {
        self.calls.status.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.calls);

        // State is read when the request arrives; the delay holds the response
        let result = self.apply(id);
        let delay = self.state.lock().delays.pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

#[async_trait]
impl AnalysisBackend for ScriptedBackend {
    async fn create(&self, user: &UserId, _auth: &AuthContext) -> Result<Analysis, SyncError> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        self.take_rejection()?;
        let analysis = Analysis::pending(AnalysisId::new(), *user, self.tick());
        self.insert(analysis.clone());
        Ok(analysis)
    }

    async fn list_for_user(
        &self,
        user: &UserId,
        _auth: &AuthContext,
    ) -> Result<UserAnalyses, SyncError> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        let mut analyses: Vec<_> = self
            .state
            .lock()
            .analyses
            .values()
            .filter(|a| a.user_id == *user)
            .cloned()
            .collect();
        analyses.sort_by_key(|a| a.created_at);
        Ok(UserAnalyses { analyses })
    }

    async fn save_parameters(
        &self,
        request: &SaveParametersRequest,
        _auth: &AuthContext,
    ) -> Result<Analysis, SyncError> {
        self.calls.save.fetch_add(1, Ordering::SeqCst);
        self.take_rejection()?;
        let now = self.tick();
        let config = match serde_json::to_value(request) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(_) => ModelConfig::new(),
            Err(e) => return Err(SyncError::Decode(e.to_string())),
        };

        let mut state = self.state.lock();
        let analysis = state
            .analyses
            .get_mut(&request.analysis_id)
            .ok_or(SyncError::NotFound(request.analysis_id))?;
        analysis.model_config_data = Some(config);
        analysis.model_type = Some(request.model_type);
        analysis.is_dynamic_output = Some(request.bool_dynamic);
        analysis.coordinates = Some(Coordinates {
            latitude: Some(request.user_latitude_choice),
            longitude: Some(request.user_longitude_choice),
        });
        set_status(analysis, AnalyzeStatus::Configured, "");
        analysis.updated_at = now;
        Ok(analysis.clone())
    }

    async fn run(
        &self,
        id: &AnalysisId,
        _auth: &AuthContext,
    ) -> Result<RunAnalysisResponse, SyncError> {
        self.calls.run.fetch_add(1, Ordering::SeqCst);
        self.take_rejection()?;
        let now = self.tick();

        let mut state = self.state.lock();
        let analysis = state.analyses.get_mut(id).ok_or(SyncError::NotFound(*id))?;
        if !matches!(
            analysis.status,
            AnalyzeStatus::Configured | AnalyzeStatus::Error
        ) {
            return Err(SyncError::Rejected(format!(
                "Analysis cannot be run in status {}",
                analysis.status
            )));
        }
        set_status(analysis, AnalyzeStatus::InProgress, "");
        analysis.current_module = ModuleName::LoadModule;
        analysis.updated_at = now;

        Ok(RunAnalysisResponse {
            analysis_id: *id,
            status: AnalyzeStatus::InProgress,
            execution_started: true,
            message: "Analysis execution started".to_string(),
        })
    }

    async fn delete(
        &self,
        id: &AnalysisId,
        _auth: &AuthContext,
    ) -> Result<DeleteAnalysisResponse, SyncError> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        self.take_rejection()?;
        let removed = self
            .state
            .lock()
            .analyses
            .remove(id)
            .ok_or(SyncError::NotFound(*id))?;

        Ok(DeleteAnalysisResponse {
            analysis_id: *id,
            deleted: true,
            container_stopped: removed.status == AnalyzeStatus::InProgress,
            message: "Analysis deleted".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_satisfy_invariants() {
        for status in [
            AnalyzeStatus::Pending,
            AnalyzeStatus::Configured,
            AnalyzeStatus::InProgress,
            AnalyzeStatus::Completed,
            AnalyzeStatus::Error,
        ] {
            assert!(analysis_with_status(status).check_invariants().is_ok());
        }
    }

    #[tokio::test]
    async fn script_drives_status_reads() {
        let analysis = analysis_with_status(AnalyzeStatus::InProgress);
        let id = analysis.id;
        let backend = ScriptedBackend::new().with_analysis(analysis);
        backend.script(id, [Step::Hold, Step::Advance(AnalyzeStatus::Completed)]);

        let auth = AuthContext::Anonymous;
        let first = backend.fetch_status(&id, &auth).await.unwrap();
        let second = backend.fetch_status(&id, &auth).await.unwrap();

        assert_eq!(first.status, AnalyzeStatus::InProgress);
        assert_eq!(second.status, AnalyzeStatus::Completed);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(backend.status_calls(), 2);
    }

    #[tokio::test]
    async fn run_requires_configured_or_error() {
        let backend = ScriptedBackend::new();
        let auth = AuthContext::Anonymous;
        let created = backend.create(&UserId::new(), &auth).await.unwrap();

        assert!(matches!(
            backend.run(&created.id, &auth).await,
            Err(SyncError::Rejected(_))
        ));

        backend
            .save_parameters(&sample_parameters(created.id), &auth)
            .await
            .unwrap();
        let started = backend.run(&created.id, &auth).await.unwrap();
        assert!(started.execution_started);
    }
}
