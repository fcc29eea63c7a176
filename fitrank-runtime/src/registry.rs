//! Job registry: accepted jobs, their cancel handles and background runs

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use fitrank_core::{CoreError, Job};
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{Orchestrator, RunRequest, RunSummary, SharedJob, ValidatedRun};

/// Requests cancellation of one job
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Idempotent
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed by the running job
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if the handle
    /// is dropped first
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelToken { rx })
}

struct JobEntry {
    job: SharedJob,
    cancel: CancelHandle,
}

/// Tracks every job accepted by this process
pub struct JobRegistry {
    orchestrator: Arc<Orchestrator>,
    jobs: DashMap<Uuid, JobEntry>,
}

impl JobRegistry {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            jobs: DashMap::new(),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Validate and register; nothing is registered on a validation error
    fn admit(&self, request: &RunRequest) -> Result<(ValidatedRun, SharedJob, CancelToken), CoreError> {
        let run = request.validate()?;
        self.evict_finished(Utc::now());
        let job = Arc::new(RwLock::new(Job::new(&run.free_text, Utc::now())));
        let (cancel, token) = cancel_pair();

        let id = job.read().id;
        self.jobs.insert(
            id,
            JobEntry {
                job: Arc::clone(&job),
                cancel,
            },
        );
        info!("Accepted job {}", id);

        Ok((run, job, token))
    }

    /// Run a job to completion in the caller's task
    pub async fn run(&self, request: &RunRequest) -> Result<RunSummary, CoreError> {
        let (run, job, token) = self.admit(request)?;
        Ok(self.orchestrator.run(job, run, token).await)
    }

    /// Start a job in the background and return its queued snapshot
    pub fn submit(&self, request: &RunRequest) -> Result<Job, CoreError> {
        let (run, job, token) = self.admit(request)?;
        let snapshot = job.read().clone();

        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move {
            orchestrator.run(job, run, token).await;
        });

        Ok(snapshot)
    }

    pub fn get(&self, id: &Uuid) -> Option<Job> {
        self.jobs.get(id).map(|entry| entry.job.read().clone())
    }

    /// Request cancellation. Terminal jobs are left untouched. The returned
    /// snapshot may still show the job running; poll for the terminal state.
    pub fn cancel(&self, id: &Uuid) -> Option<Job> {
        let entry = self.jobs.get(id)?;
        if !entry.job.read().status.is_terminal() {
            info!("Cancelling job {}", id);
            entry.cancel.cancel();
        }
        let snapshot = entry.job.read().clone();
        Some(snapshot)
    }

    /// Drop jobs that finished more than the retention window before `now`.
    /// Running jobs are always kept.
    pub fn evict_finished(&self, now: DateTime<Utc>) -> usize {
        let retention = TimeDelta::from_std(self.orchestrator.config().job_retention()).unwrap_or(TimeDelta::MAX);
        let mut evicted = 0;

        self.jobs.retain(|_, entry| {
            let job = entry.job.read();
            let expired = job.status.is_terminal()
                && job.completed_at.is_some_and(|done| now.signed_duration_since(done) >= retention);
            if expired {
                evicted += 1;
            }
            !expired
        });

        if evicted > 0 {
            debug!("Evicted {} finished jobs", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryStore, OrchestratorConfig};
    use async_trait::async_trait;
    use fitrank_classifier::{ClassificationCache, Classifier, ClassifierConfig};
    use fitrank_core::{ErrorCode, FitScorer, JobStatus, RawResult, ScoringConfig};
    use fitrank_search::{SearchConfig, SearchError, SearchOptions, SearchProvider};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSearch {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl SearchProvider for CountingSearch {
        fn name(&self) -> &str {
            "counting"
        }

        async fn search(&self, _query: &str, _options: &SearchOptions) -> Result<Vec<RawResult>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(vec![RawResult::new("Acme raises $20M Series B").with_company_hint("acme.com")])
        }
    }

    fn registry(delay: Duration) -> (JobRegistry, Arc<CountingSearch>) {
        registry_with(delay, OrchestratorConfig::default())
    }

    fn registry_with(delay: Duration, config: OrchestratorConfig) -> (JobRegistry, Arc<CountingSearch>) {
        let search = Arc::new(CountingSearch {
            calls: AtomicUsize::new(0),
            delay,
        });
        let classifier = Classifier::with_cache(
            None,
            ClassifierConfig::default(),
            Arc::new(ClassificationCache::new()),
        )
        .unwrap();
        let orchestrator = Orchestrator::new(
            Arc::new(classifier),
            Arc::new(InMemoryStore::new()),
            FitScorer::new(ScoringConfig::default()).unwrap(),
        )
        .with_search(Some(search.clone()), SearchConfig::default())
        .with_config(config);

        (JobRegistry::new(Arc::new(orchestrator)), search)
    }

    async fn wait_terminal(registry: &JobRegistry, id: &Uuid) -> Job {
        for _ in 0..200 {
            let job = registry.get(id).unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never finished", id);
    }

    #[tokio::test]
    async fn test_invalid_top_k_rejected_before_search() {
        let (registry, search) = registry(Duration::ZERO);

        let err = registry.run(&RunRequest::new("anything").with_top_k(0)).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_submit_then_poll() {
        let (registry, _search) = registry(Duration::ZERO);

        let queued = registry.submit(&RunRequest::new("series b")).unwrap();
        assert_eq!(queued.status, JobStatus::Pending);

        let done = wait_terminal(&registry, &queued.id).await;
        assert!(matches!(done.status, JobStatus::Completed | JobStatus::Partial));
        assert_eq!(done.results[0].company_id, "acme.com");
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_cancel_running_job() {
        let (registry, _search) = registry(Duration::from_secs(30));

        let queued = registry.submit(&RunRequest::new("series b")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.cancel(&queued.id).is_some());

        let done = wait_terminal(&registry, &queued.id).await;
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.error.unwrap().code, ErrorCode::ServiceUnavailable);

        // A second cancel leaves the terminal job alone
        let again = registry.cancel(&queued.id).unwrap();
        assert_eq!(again.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_finished_jobs_expire_after_retention() {
        let (registry, _search) = registry_with(
            Duration::ZERO,
            OrchestratorConfig {
                job_retention_ms: 60_000,
                ..OrchestratorConfig::default()
            },
        );

        let summary = registry.run(&RunRequest::new("series b")).await.unwrap();
        let id = summary.job.id;
        let done_at = summary.job.completed_at.unwrap();
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.evict_finished(done_at + chrono::Duration::seconds(30)), 0);
        assert!(registry.get(&id).is_some());

        assert_eq!(registry.evict_finished(done_at + chrono::Duration::seconds(61)), 1);
        assert!(registry.get(&id).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_running_jobs_are_never_evicted() {
        let (registry, _search) = registry(Duration::from_secs(30));

        let queued = registry.submit(&RunRequest::new("series b")).unwrap();
        let far_future = Utc::now() + chrono::Duration::days(365);
        assert_eq!(registry.evict_finished(far_future), 0);
        assert!(registry.get(&queued.id).is_some());

        registry.cancel(&queued.id);
        wait_terminal(&registry, &queued.id).await;
        assert_eq!(registry.evict_finished(far_future), 1);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let (registry, _search) = registry(Duration::ZERO);
        assert!(registry.get(&Uuid::new_v4()).is_none());
        assert!(registry.cancel(&Uuid::new_v4()).is_none());
    }

    #[tokio::test]
    async fn test_cancel_token() {
        let (handle, token) = cancel_pair();
        assert!(!token.is_cancelled());
        handle.cancel();
        handle.cancel();
        assert!(token.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), token.cancelled()).await.unwrap();
    }
}
