//! Live Analysis observer
//!
//! Keeps one analysis on screen and in sync: loads it through the cache,
//! polls while it can still change, and resolves racing snapshots by
//! `updated_at` so the displayed state never regresses.

use crate::coordinator::{MutationCoordinator, MutationOutcome, Refetch};
use crate::credentials::CredentialSource;
use crate::poller::{BackendFetcher, PollObserver, PollingController};
use parking_lot::Mutex;
use smicrab_core::{
    validate_transition, ActionResponse, Analysis, AnalysisId, RunAnalysisResponse, StatusView,
    SyncError, ViewState,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Whether an incoming snapshot replaced the displayed one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Accepted,
    /// Older than what is displayed; dropped
    Stale,
}

#[derive(Debug, Default)]
struct Shown {
    current: Option<Arc<Analysis>>,
    view_state: ViewState,
    notice: Option<String>,
}

struct LiveState {
    id: AnalysisId,
    shown: Mutex<Shown>,
    updates: watch::Sender<Option<Arc<Analysis>>>,
}

impl LiveState {
    fn apply(&self, incoming: Arc<Analysis>) -> Applied {
        let mut shown = self.shown.lock();
        if let Some(current) = &shown.current {
            if !incoming.supersedes(current) {
                debug!(
                    id = %self.id,
                    displayed = %current.updated_at,
                    incoming = %incoming.updated_at,
                    "dropping stale snapshot"
                );
                return Applied::Stale;
            }
            if current.status != incoming.status {
                if let Err(e) = validate_transition(current.status, incoming.status) {
                    warn!(id = %self.id, error = %e, "unexpected status transition");
                }
            }
        }

        shown.notice = None;
        shown.view_state = shown.view_state.after_snapshot(incoming.status);
        shown.current = Some(Arc::clone(&incoming));
        drop(shown);

        self.updates.send_replace(Some(incoming));
        Applied::Accepted
    }

    fn notify(&self, message: String) {
        self.shown.lock().notice = Some(message);
    }
}

impl PollObserver for LiveState {
    fn on_update(&self, analysis: &Arc<Analysis>) {
        self.apply(Arc::clone(analysis));
    }

    fn on_error(&self, error: &SyncError) {
        self.notify(error.user_message());
    }
}

/// One analysis kept in sync with the backend
pub struct LiveAnalysis {
    state: Arc<LiveState>,
    fetcher: BackendFetcher,
    coordinator: MutationCoordinator,
    credentials: Arc<dyn CredentialSource>,
    poller: PollingController,
    interval: Duration,
}

impl fmt::Debug for LiveAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveAnalysis")
            .field("id", &self.state.id)
            .field("interval", &self.interval)
            .field("poller", &self.poller)
            .finish_non_exhaustive()
    }
}

impl LiveAnalysis {
    /// Create new observer; nothing is fetched until [`load`](Self::load)
    #[must_use]
    pub fn new(
        id: AnalysisId,
        fetcher: BackendFetcher,
        coordinator: MutationCoordinator,
        credentials: Arc<dyn CredentialSource>,
        interval: Duration,
    ) -> Self {
        let (updates, _) = watch::channel(None);
        Self {
            state: Arc::new(LiveState {
                id,
                shown: Mutex::new(Shown::default()),
                updates,
            }),
            poller: PollingController::new(fetcher.clone()),
            fetcher,
            coordinator,
            credentials,
            interval,
        }
    }

    /// Analysis being observed
    #[inline]
    #[must_use]
    pub fn id(&self) -> AnalysisId {
        self.state.id
    }

    /// Initial cache-preferring load; starts polling if the analysis can
    /// still change
    pub async fn load(&self) -> ActionResponse<Arc<Analysis>> {
        let auth = self.credentials.auth_context();
        match self.fetcher.fetch(&self.state.id, &auth).await {
            Ok(analysis) => {
                self.state.apply(Arc::clone(&analysis));
                if analysis.should_poll() {
                    self.start_polling();
                }
                ActionResponse::ok(analysis, "Analysis status retrieved successfully")
            }
            Err(error) => self.fail(error),
        }
    }

    /// Bypass the cache and apply the fresh snapshot
    pub async fn refresh_now(&self) -> ActionResponse<Arc<Analysis>> {
        let auth = self.credentials.auth_context();
        match self.fetcher.fetch_bypass(&self.state.id, &auth).await {
            Ok(analysis) => {
                self.state.apply(Arc::clone(&analysis));
                ActionResponse::ok(analysis, "Real-time analysis status retrieved successfully")
            }
            Err(error) => self.fail(error),
        }
    }

    /// Re-run a failed analysis and resume polling
    pub async fn retry(&self) -> MutationOutcome<RunAnalysisResponse> {
        let configured = self
            .snapshot()
            .is_some_and(|analysis| analysis.model_type.is_some());
        if !configured {
            return MutationOutcome {
                response: ActionResponse::failure(
                    "Cannot retry: Analysis not properly configured",
                ),
                refetch: Refetch::Nothing,
            };
        }

        let outcome = self.coordinator.run(self.state.id).await;
        if outcome.is_success() {
            self.state.shown.lock().view_state = ViewState::Authoritative;
            self.start_polling();
        } else if let Some(message) = &outcome.response.message {
            self.state.notify(message.clone());
        }
        outcome
    }

    /// Show the configuration view without touching the remote status
    pub fn reconfigure(&self) -> Option<StatusView> {
        self.stop();
        self.state.shown.lock().view_state = ViewState::Reconfiguring;
        self.view()
    }

    /// Apply a snapshot obtained elsewhere
    pub fn apply_snapshot(&self, analysis: Arc<Analysis>) -> Applied {
        self.state.apply(analysis)
    }

    /// Panel to render, once something has been loaded
    #[must_use]
    pub fn view(&self) -> Option<StatusView> {
        let shown = self.state.shown.lock();
        shown
            .current
            .as_deref()
            .map(|analysis| shown.view_state.present(analysis))
    }

    /// Latest accepted snapshot
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<Analysis>> {
        self.state.shown.lock().current.clone()
    }

    /// Transient failure message, if one is showing
    #[must_use]
    pub fn notice(&self) -> Option<String> {
        self.state.shown.lock().notice.clone()
    }

    /// Hide the transient failure message
    pub fn dismiss_notice(&self) {
        self.state.shown.lock().notice = None;
    }

    /// Receive every accepted snapshot
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Analysis>>> {
        self.state.updates.subscribe()
    }

    /// Whether polling is active
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.poller.is_polling()
    }

    /// Stop polling; safe to call repeatedly
    pub fn stop(&self) {
        self.poller.stop();
    }

    fn start_polling(&self) {
        let observer: Arc<dyn PollObserver> = Arc::clone(&self.state) as Arc<dyn PollObserver>;
        self.poller.start(
            self.state.id,
            self.credentials.auth_context(),
            self.interval,
            observer,
        );
    }

    fn fail(&self, error: SyncError) -> ActionResponse<Arc<Analysis>> {
        if !error.is_not_found() {
            self.state.notify(error.user_message());
        }
        error.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentials;
    use smicrab_cache::{SmartFetcher, StatusCache};
    use smicrab_core::AnalyzeStatus;
    use smicrab_test_utils::{analysis_with_status, at, ScriptedBackend};

    fn live(backend: &ScriptedBackend, id: AnalysisId) -> LiveAnalysis {
        let cache = StatusCache::default();
        let credentials: Arc<dyn CredentialSource> = Arc::new(StaticCredentials::anonymous());
        LiveAnalysis::new(
            id,
            SmartFetcher::new(backend.shared(), cache.clone()),
            MutationCoordinator::new(backend.shared(), cache, Arc::clone(&credentials)),
            credentials,
            Duration::from_secs(10),
        )
    }

    #[test]
    fn test_older_snapshot_never_replaces_newer() {
        let base = analysis_with_status(AnalyzeStatus::InProgress);
        let live = live(&ScriptedBackend::new(), base.id);
        let older = Arc::new(at(&base, 10));
        let mut newer = at(&base, 20);
        newer.status = AnalyzeStatus::Completed;
        let newer = Arc::new(newer);

        assert_eq!(live.apply_snapshot(Arc::clone(&newer)), Applied::Accepted);
        assert_eq!(live.apply_snapshot(older), Applied::Stale);
        assert_eq!(live.snapshot(), Some(newer));
        assert_eq!(live.view(), Some(StatusView::Summary));
    }

    #[test]
    fn test_equal_timestamps_last_write_wins() {
        let base = analysis_with_status(AnalyzeStatus::InProgress);
        let live = live(&ScriptedBackend::new(), base.id);
        let first = Arc::new(at(&base, 10));
        let mut second = at(&base, 10);
        second.current_module = smicrab_core::ModuleName::ValidateModule;
        let second = Arc::new(second);

        live.apply_snapshot(first);
        assert_eq!(live.apply_snapshot(Arc::clone(&second)), Applied::Accepted);
        assert_eq!(live.snapshot(), Some(second));
    }

    #[test]
    fn test_stale_snapshot_keeps_notice() {
        let base = analysis_with_status(AnalyzeStatus::InProgress);
        let live = live(&ScriptedBackend::new(), base.id);
        live.apply_snapshot(Arc::new(at(&base, 20)));
        live.state.on_error(&SyncError::Transport("connection reset".into()));
        let notice = live.notice();
        assert!(notice.is_some());

        assert_eq!(live.apply_snapshot(Arc::new(at(&base, 5))), Applied::Stale);
        assert_eq!(live.notice(), notice);

        assert_eq!(live.apply_snapshot(Arc::new(at(&base, 30))), Applied::Accepted);
        assert!(live.notice().is_none());
    }

    #[test]
    fn test_subscribers_see_accepted_snapshots_only() {
        let base = analysis_with_status(AnalyzeStatus::InProgress);
        let live = live(&ScriptedBackend::new(), base.id);
        let rx = live.subscribe();
        let newer = Arc::new(at(&base, 20));

        live.apply_snapshot(Arc::clone(&newer));
        live.apply_snapshot(Arc::new(at(&base, 5)));

        assert_eq!(*rx.borrow(), Some(newer));
    }

    #[tokio::test]
    async fn test_retry_requires_model_type() {
        let pending = analysis_with_status(AnalyzeStatus::Pending);
        let backend = ScriptedBackend::new().with_analysis(pending.clone());
        let live = live(&backend, pending.id);
        live.load().await;

        let outcome = live.retry().await;
        assert_eq!(
            outcome.response.message.as_deref(),
            Some("Cannot retry: Analysis not properly configured")
        );
        assert_eq!(backend.run_calls(), 0);
        live.stop();
    }

    #[tokio::test]
    async fn test_reconfigure_is_local() {
        let mut failed = analysis_with_status(AnalyzeStatus::Error);
        failed.model_type = Some(smicrab_core::ModelType::Model1Simple);
        let backend = ScriptedBackend::new().with_analysis(failed.clone());
        let live = live(&backend, failed.id);
        live.load().await;

        assert_eq!(live.reconfigure(), Some(StatusView::Configure));
        // Remote status is untouched
        assert_eq!(live.snapshot().map(|a| a.status), Some(AnalyzeStatus::Error));
        assert_eq!(backend.save_calls() + backend.run_calls(), 0);

        // Still failed on the backend: the override holds
        live.refresh_now().await;
        assert_eq!(live.view(), Some(StatusView::Configure));
    }

    #[tokio::test]
    async fn test_missing_analysis_sets_no_notice() {
        let live = live(&ScriptedBackend::new(), AnalysisId::new());

        let response = live.load().await;
        assert!(!response.success);
        assert_eq!(response.message.as_deref(), Some("Analysis not found"));
        assert!(live.notice().is_none());
        assert!(!live.is_polling());
    }
}
