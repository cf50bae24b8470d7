pub mod cache;

pub use cache::{CacheEntry, ResultCache};

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info_span, warn, Instrument};

use crate::backend::{AnalysisClient, BackendError};
use crate::pr::RequestKey;

/// Fills a [`ResultCache`] in the background with a fixed pool of workers.
///
/// A key is "in flight" from the moment it is queued until its analysis
/// finishes. Successful analyses are cached and bump the change version
/// observable through [`AnalysisScheduler::subscribe`]. Failures are
/// dropped: nothing is cached and the key may be scheduled again.
///
/// Workers are tokio tasks, so [`AnalysisScheduler::schedule`] must be
/// called from within a runtime. Started jobs always run to completion.
#[derive(Clone)]
pub struct AnalysisScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<dyn AnalysisClient>,
    workers: usize,
    state: Mutex<State>,
    /// Incremented on every successful insert
    version: watch::Sender<u64>,
    /// Number of keys queued or running
    pending: watch::Sender<usize>,
}

#[derive(Default)]
struct State {
    cache: ResultCache,
    in_flight: HashSet<RequestKey>,
    queue: VecDeque<RequestKey>,
    active_workers: usize,
    /// Bumped by `clear` so that jobs started earlier discard their results
    generation: u64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AnalysisScheduler {
    /// Create a scheduler running at most `workers` analyses at once
    /// (at least one).
    pub fn new(client: Arc<dyn AnalysisClient>, workers: usize) -> Self {
        let (version, _) = watch::channel(0);
        let (pending, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                client,
                workers: workers.max(1),
                state: Mutex::new(State::default()),
                version,
                pending,
            }),
        }
    }

    pub fn workers(&self) -> usize {
        self.inner.workers
    }

    /// Cached entry for `key`, if its analysis has completed.
    pub fn get(&self, key: &RequestKey) -> Option<CacheEntry> {
        self.inner.lock().cache.get(key).cloned()
    }

    /// Whether `key` is queued or being analyzed right now.
    pub fn is_pending(&self, key: &RequestKey) -> bool {
        self.inner.lock().in_flight.contains(key)
    }

    /// Number of cached results.
    pub fn len(&self) -> usize {
        self.inner.lock().cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receiver whose value changes whenever a new result lands in the cache.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }

    /// Queue every key that is neither cached nor in flight and start
    /// workers up to the pool size. Returns how many keys were queued.
    pub fn schedule<I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = RequestKey>,
    {
        let (queued, to_spawn) = {
            let mut state = self.inner.lock();
            let mut queued = 0;
            for key in keys {
                if state.cache.contains(&key) || state.in_flight.contains(&key) {
                    continue;
                }
                state.in_flight.insert(key.clone());
                state.queue.push_back(key);
                queued += 1;
            }
            let idle_slots = self.inner.workers - state.active_workers;
            let to_spawn = idle_slots.min(state.queue.len());
            state.active_workers += to_spawn;
            self.inner.pending.send_replace(state.in_flight.len());
            (queued, to_spawn)
        };

        if queued > 0 {
            debug!(queued, spawned = to_spawn, "scheduled analyses");
        }
        for id in 0..to_spawn {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(run_worker(inner).instrument(info_span!("analysis_worker", id)));
        }
        queued
    }

    /// Drop every cached result and queued key. Jobs already running finish
    /// but their results are discarded.
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.cache.clear();
        state.queue.clear();
        state.in_flight.clear();
        state.generation += 1;
        self.inner.pending.send_replace(0);
        debug!(generation = state.generation, "cleared analysis cache");
    }

    /// Resolve once nothing is queued or in flight.
    pub async fn wait_idle(&self) {
        let mut pending = self.inner.pending.subscribe();
        loop {
            if *pending.borrow_and_update() == 0 {
                return;
            }
            if pending.changed().await.is_err() {
                return;
            }
        }
    }
}

async fn run_worker(inner: Arc<Inner>) {
    loop {
        let (key, generation) = {
            let mut state = inner.lock();
            match state.queue.pop_front() {
                Some(key) => (key, state.generation),
                None => {
                    state.active_workers -= 1;
                    return;
                }
            }
        };

        // A panicking client must not leak the key or the pool slot
        let client = Arc::clone(&inner.client);
        let job_key = key.clone();
        let job = async move { client.analyze_risk(&job_key).await };
        let outcome = match tokio::spawn(job.in_current_span()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(pr = %key, error = %e, "analysis task aborted");
                Err(BackendError::Failed(format!("analysis task aborted: {}", e)))
            }
        };

        let mut state = inner.lock();
        if state.generation != generation {
            debug!(pr = %key, "discarding result from before cache clear");
            continue;
        }
        state.in_flight.remove(&key);
        match outcome {
            Ok(analysis) => {
                debug!(
                    pr = %key,
                    score = analysis.result.score,
                    level = %analysis.result.level,
                    "analysis cached"
                );
                state.cache.put(key, analysis.into());
                inner.version.send_modify(|version| *version += 1);
            }
            Err(e) => {
                debug!(pr = %key, error = %e, "analysis failed; key left uncached");
            }
        }
        inner.pending.send_replace(state.in_flight.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::AutomationConfig;
    use crate::backend::{MockBackend, MockPull, RiskAnalysis};
    use crate::pr::{PullSummary, RepoScope};
    use crate::risk::tests::test_pull_request;
    use crate::risk::{self, RiskConfig};
    use std::time::Duration;

    fn scope() -> RepoScope {
        RepoScope::new("acme", "widgets")
    }

    fn backend_with(latencies_ms: &[u64]) -> Arc<MockBackend> {
        let mut backend = MockBackend::new(AutomationConfig::default());
        for (i, ms) in latencies_ms.iter().enumerate() {
            backend = backend.with_pull(
                MockPull::new(i as u64 + 1, "Change", &[("src/lib.rs", 5, 1)])
                    .with_latency(Duration::from_millis(*ms)),
            );
        }
        Arc::new(backend)
    }

    fn keys(n: u64) -> Vec<RequestKey> {
        (1..=n).map(|i| scope().key(i)).collect()
    }

    #[tokio::test]
    async fn test_schedule_fills_cache_regardless_of_completion_order() {
        let backend = backend_with(&[50, 10, 30, 5, 20]);
        let scheduler = AnalysisScheduler::new(backend.clone(), 3);

        assert_eq!(scheduler.schedule(keys(5)), 5);
        scheduler.wait_idle().await;

        assert_eq!(scheduler.len(), 5);
        for key in keys(5) {
            assert!(scheduler.get(&key).is_some());
            assert!(!scheduler.is_pending(&key));
        }
        assert_eq!(backend.analysis_calls(), 5);
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_pool_size() {
        let backend = backend_with(&[20; 10]);
        let scheduler = AnalysisScheduler::new(backend.clone(), 3);

        scheduler.schedule(keys(10));
        scheduler.wait_idle().await;

        assert_eq!(backend.peak_in_flight(), 3);
        assert_eq!(scheduler.len(), 10);
    }

    #[tokio::test]
    async fn test_single_worker_is_serial() {
        let backend = backend_with(&[5; 4]);
        let scheduler = AnalysisScheduler::new(backend.clone(), 1);

        scheduler.schedule(keys(4));
        scheduler.wait_idle().await;

        assert_eq!(backend.peak_in_flight(), 1);
        assert_eq!(scheduler.len(), 4);
    }

    #[tokio::test]
    async fn test_rescheduling_issues_no_new_work() {
        let backend = backend_with(&[30, 30, 30]);
        let scheduler = AnalysisScheduler::new(backend.clone(), 3);

        assert_eq!(scheduler.schedule(keys(3)), 3);
        // still in flight
        assert_eq!(scheduler.schedule(keys(3)), 0);
        assert!(scheduler.is_pending(&scope().key(1)));
        scheduler.wait_idle().await;
        // now cached
        assert_eq!(scheduler.schedule(keys(3)), 0);
        scheduler.wait_idle().await;

        assert_eq!(backend.analysis_calls(), 3);
    }

    #[tokio::test]
    async fn test_failed_key_is_silent_and_retryable() {
        let backend = backend_with(&[5, 5, 5]);
        backend.set_analysis_failure(2, true);
        let scheduler = AnalysisScheduler::new(backend.clone(), 3);

        scheduler.schedule(keys(3));
        scheduler.wait_idle().await;
        assert_eq!(scheduler.len(), 2);
        assert!(scheduler.get(&scope().key(2)).is_none());
        assert!(!scheduler.is_pending(&scope().key(2)));

        backend.set_analysis_failure(2, false);
        assert_eq!(scheduler.schedule(keys(3)), 1);
        scheduler.wait_idle().await;
        assert!(scheduler.get(&scope().key(2)).is_some());
        assert_eq!(backend.analysis_calls(), 4);
    }

    #[tokio::test]
    async fn test_subscribers_see_each_insert() {
        let backend = backend_with(&[5, 5, 5]);
        backend.set_analysis_failure(3, true);
        let scheduler = AnalysisScheduler::new(backend, 2);
        let mut changes = scheduler.subscribe();

        scheduler.schedule(keys(3));
        scheduler.wait_idle().await;

        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), 2);
    }

    #[tokio::test]
    async fn test_clear_discards_results_of_running_jobs() {
        let backend = backend_with(&[40]);
        let scheduler = AnalysisScheduler::new(backend.clone(), 3);

        scheduler.schedule(keys(1));
        while backend.analysis_calls() == 0 {
            tokio::task::yield_now().await;
        }
        scheduler.clear();
        assert!(!scheduler.is_pending(&scope().key(1)));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(scheduler.is_empty());
        assert_eq!(backend.analysis_calls(), 1);
    }

    #[tokio::test]
    async fn test_reschedule_after_clear_runs_again() {
        let backend = backend_with(&[5, 5]);
        let scheduler = AnalysisScheduler::new(backend.clone(), 3);

        scheduler.schedule(keys(2));
        scheduler.wait_idle().await;
        scheduler.clear();
        assert_eq!(scheduler.schedule(keys(2)), 2);
        scheduler.wait_idle().await;

        assert_eq!(scheduler.len(), 2);
        assert_eq!(backend.analysis_calls(), 4);
    }

    /// Panics on PR 1, scores every other PR as an empty change.
    struct PanickingClient;

    #[async_trait::async_trait]
    impl AnalysisClient for PanickingClient {
        async fn analyze_risk(&self, key: &RequestKey) -> Result<RiskAnalysis, BackendError> {
            if key.pr_number == 1 {
                panic!("analyzer crashed on {}", key);
            }
            let pr = test_pull_request(key.pr_number, vec![]);
            Ok(risk::assess(&pr, &RiskConfig::default()).into())
        }

        async fn open_pull_requests(
            &self,
            _scope: &RepoScope,
        ) -> Result<Vec<PullSummary>, BackendError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_panicking_analysis_releases_worker() {
        let scheduler = AnalysisScheduler::new(Arc::new(PanickingClient), 1);

        assert_eq!(scheduler.schedule(keys(3)), 3);
        tokio::time::timeout(Duration::from_secs(5), scheduler.wait_idle())
            .await
            .expect("scheduler never went idle");

        assert_eq!(scheduler.len(), 2);
        assert!(scheduler.get(&scope().key(1)).is_none());
        assert!(!scheduler.is_pending(&scope().key(1)));
        // the single pool slot is still usable
        assert_eq!(scheduler.schedule(keys(4)), 2);
        tokio::time::timeout(Duration::from_secs(5), scheduler.wait_idle())
            .await
            .expect("scheduler never went idle");
        assert!(scheduler.get(&scope().key(4)).is_some());
    }

    #[test]
    fn test_zero_workers_is_clamped() {
        let scheduler = AnalysisScheduler::new(backend_with(&[]), 0);
        assert_eq!(scheduler.workers(), 1);
    }
}
