//! Polling Controller
//!
//! Drives repeated bypass fetches of one analysis on a fixed interval:
//! - One spawned task per polling session, owning a `tokio::time::interval`
//! - Ticks never overlap; a slow request skips the ticks it overran
//! - Self-terminates after delivering a terminal status
//! - No observer callback fires once `stop()` has returned

use parking_lot::{Mutex, ReentrantMutex};
use smicrab_cache::SmartFetcher;
use smicrab_core::{Analysis, AnalysisBackend, AnalysisId, AuthContext, SyncError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Fetcher over the full backend, as used throughout the sync layer
pub type BackendFetcher = SmartFetcher<dyn AnalysisBackend>;

/// Receives polling results
///
/// Callbacks run on the polling task while the delivery lock is held; they
/// may call [`PollingController::stop`] or [`PollingController::start`].
pub trait PollObserver: Send + Sync + 'static {
    /// A snapshot was fetched
    fn on_update(&self, analysis: &Arc<Analysis>);

    /// A fetch failed; polling continues
    fn on_error(&self, error: &SyncError);
}

/// Observer built from two closures
pub struct FnObserver<U, E> {
    on_update: U,
    on_error: E,
}

impl<U, E> FnObserver<U, E>
where
    U: Fn(&Arc<Analysis>) + Send + Sync + 'static,
    E: Fn(&SyncError) + Send + Sync + 'static,
{
    /// Create new observer
    pub fn new(on_update: U, on_error: E) -> Self {
        Self { on_update, on_error }
    }
}

impl<U, E> PollObserver for FnObserver<U, E>
where
    U: Fn(&Arc<Analysis>) + Send + Sync + 'static,
    E: Fn(&SyncError) + Send + Sync + 'static,
{
    fn on_update(&self, analysis: &Arc<Analysis>) {
        (self.on_update)(analysis);
    }

    fn on_error(&self, error: &SyncError) {
        (self.on_error)(error);
    }
}

/// Polling statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Polling sessions started
    pub sessions: u64,
    /// Fetches issued
    pub ticks: u64,
    /// Snapshots delivered
    pub updates: u64,
    /// Failures delivered
    pub errors: u64,
    /// Results dropped because polling stopped while they were in flight
    pub discarded: u64,
}

struct Shared {
    generation: AtomicU64,
    delivery: ReentrantMutex<()>,
    task: Mutex<Option<JoinHandle<()>>>,
    stats: Mutex<PollStats>,
}

impl Shared {
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Caller must hold the delivery lock
    fn cancel(&self) -> bool {
        self.generation.fetch_add(1, Ordering::AcqRel);
        match self.task.lock().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

enum Flow {
    Continue,
    Finished,
}

/// Interval-driven status poller with an explicit idle/polling state
pub struct PollingController {
    fetcher: BackendFetcher,
    shared: Arc<Shared>,
}

impl fmt::Debug for PollingController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingController")
            .field("polling", &self.is_polling())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl PollingController {
    /// Create new idle controller
    #[must_use]
    pub fn new(fetcher: BackendFetcher) -> Self {
        Self {
            fetcher,
            shared: Arc::new(Shared {
                generation: AtomicU64::new(0),
                delivery: ReentrantMutex::new(()),
                task: Mutex::new(None),
                stats: Mutex::new(PollStats::default()),
            }),
        }
    }

    /// Start polling `id`, replacing any running session.
    ///
    /// The first fetch happens immediately, then every `interval`. Must be
    /// called from within a tokio runtime.
    pub fn start(
        &self,
        id: AnalysisId,
        auth: AuthContext,
        interval: Duration,
        observer: Arc<dyn PollObserver>,
    ) {
        let _delivery = self.shared.delivery.lock();
        if self.shared.cancel() {
            debug!(%id, "restarting polling");
        }
        let generation = self.shared.generation();
        self.shared.stats.lock().sessions += 1;

        let session = Session {
            shared: Arc::clone(&self.shared),
            fetcher: self.fetcher.clone(),
            observer,
            id,
            auth,
            generation,
        };
        let mut task = self.shared.task.lock();
        *task = Some(tokio::spawn(session.run(interval)));
        info!(%id, interval = ?interval, "polling started");
    }

    /// Stop polling. Idempotent; a no-op when idle.
    ///
    /// Once this returns no observer callback from the stopped session
    /// will run.
    pub fn stop(&self) {
        let _delivery = self.shared.delivery.lock();
        if self.shared.cancel() {
            info!("polling stopped");
        }
    }

    /// Whether a polling session is active
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.shared
            .task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Get polling statistics
    #[must_use]
    pub fn stats(&self) -> PollStats {
        *self.shared.stats.lock()
    }
}

impl Drop for PollingController {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Session {
    shared: Arc<Shared>,
    fetcher: BackendFetcher,
    observer: Arc<dyn PollObserver>,
    id: AnalysisId,
    auth: AuthContext,
    generation: u64,
}

impl Session {
    fn is_current(&self) -> bool {
        self.shared.generation() == self.generation
    }

    async fn run(self, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if !self.is_current() {
                break;
            }
            self.shared.stats.lock().ticks += 1;

            let result = self.fetcher.fetch_bypass(&self.id, &self.auth).await;
            if let Flow::Finished = self.deliver(result) {
                break;
            }
        }
    }

    fn deliver(&self, result: Result<Arc<Analysis>, SyncError>) -> Flow {
        let _delivery = self.shared.delivery.lock();
        if !self.is_current() {
            self.shared.stats.lock().discarded += 1;
            debug!(id = %self.id, "discarding result of stopped polling session");
            return Flow::Finished;
        }

        match result {
            Ok(analysis) => {
                self.shared.stats.lock().updates += 1;
                self.observer.on_update(&analysis);

                if !self.is_current() {
                    return Flow::Finished;
                }
                if analysis.should_poll() {
                    return Flow::Continue;
                }

                // Terminal: retire this session unless a callback replaced it
                if self
                    .shared
                    .generation
                    .compare_exchange(
                        self.generation,
                        self.generation + 1,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.shared.task.lock().take();
                    info!(id = %self.id, status = %analysis.status, "polling finished");
                }
                Flow::Finished
            }
            Err(error) => {
                self.shared.stats.lock().errors += 1;
                warn!(id = %self.id, %error, "poll failed, will retry on next tick");
                self.observer.on_error(&error);
                if self.is_current() {
                    Flow::Continue
                } else {
                    Flow::Finished
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smicrab_cache::StatusCache;
    use smicrab_core::AnalyzeStatus;
    use smicrab_test_utils::{analysis_with_status, ScriptedBackend, Step};

    fn controller(backend: &ScriptedBackend) -> PollingController {
        PollingController::new(SmartFetcher::new(backend.shared(), StatusCache::default()))
    }

    fn counting_observer() -> (Arc<dyn PollObserver>, Arc<Mutex<Vec<AnalyzeStatus>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer = FnObserver::new(
            move |a: &Arc<Analysis>| sink.lock().push(a.status),
            |_: &SyncError| {},
        );
        (Arc::new(observer), seen)
    }

    #[test]
    fn stop_before_start_is_noop() {
        let backend = ScriptedBackend::new();
        let controller = controller(&backend);
        controller.stop();
        controller.stop();
        assert!(!controller.is_polling());
        assert_eq!(controller.stats(), PollStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn first_fetch_is_immediate() {
        let analysis = analysis_with_status(AnalyzeStatus::InProgress);
        let id = analysis.id;
        let backend = ScriptedBackend::new().with_analysis(analysis);
        let controller = controller(&backend);
        let (observer, seen) = counting_observer();

        controller.start(id, AuthContext::Anonymous, Duration::from_secs(5), observer);
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(backend.status_calls(), 1);
        assert_eq!(seen.lock().as_slice(), &[AnalyzeStatus::InProgress]);
        assert!(controller.is_polling());
        controller.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_running_session() {
        let analysis = analysis_with_status(AnalyzeStatus::InProgress);
        let id = analysis.id;
        let backend = ScriptedBackend::new().with_analysis(analysis);
        let controller = controller(&backend);
        let (observer, seen) = counting_observer();

        let interval = Duration::from_secs(5);
        controller.start(id, AuthContext::Anonymous, interval, Arc::clone(&observer));
        controller.start(id, AuthContext::Anonymous, interval, observer);
        tokio::time::sleep(Duration::from_millis(1)).await;

        // Only the second session ran its immediate fetch
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(controller.stats().sessions, 2);
        controller.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn errors_do_not_stop_polling() {
        let analysis = analysis_with_status(AnalyzeStatus::InProgress);
        let id = analysis.id;
        let backend = ScriptedBackend::new().with_analysis(analysis);
        backend.script(
            id,
            [
                Step::Error(SyncError::Transport("connection reset".into())),
                Step::Hold,
            ],
        );
        let controller = controller(&backend);
        let errors = Arc::new(Mutex::new(0_u32));
        let counter = Arc::clone(&errors);
        let observer = FnObserver::new(
            |_: &Arc<Analysis>| {},
            move |_: &SyncError| *counter.lock() += 1,
        );

        controller.start(id, AuthContext::Anonymous, Duration::from_secs(5), Arc::new(observer));
        tokio::time::sleep(Duration::from_millis(5_001)).await;

        assert_eq!(*errors.lock(), 1);
        assert_eq!(controller.stats().updates, 1);
        assert!(controller.is_polling());
        controller.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn callback_may_stop_reentrantly() {
        let analysis = analysis_with_status(AnalyzeStatus::InProgress);
        let id = analysis.id;
        let backend = ScriptedBackend::new().with_analysis(analysis);
        let controller = Arc::new(controller(&backend));
        let handle = Arc::downgrade(&controller);
        let observer = FnObserver::new(
            move |_: &Arc<Analysis>| {
                if let Some(controller) = handle.upgrade() {
                    controller.stop();
                }
            },
            |_: &SyncError| {},
        );

        controller.start(id, AuthContext::Anonymous, Duration::from_secs(5), Arc::new(observer));
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(backend.status_calls(), 1);
        assert!(!controller.is_polling());
    }
}
