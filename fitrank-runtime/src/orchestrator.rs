//! Job Orchestrator
//!
//! Runs one job as a strictly sequential pipeline of typed stages:
//!
//! ```text
//! search -> normalize -> persist -> classify -> score -> rank
//! ```
//!
//! The whole pipeline races the job deadline and the caller's cancel token.
//! Classified signals land in a shared working set as they complete, so an
//! interrupted run can still be scored and ranked from what it already has.
//!
//! Terminal state:
//! - `completed`: every stage succeeded with nothing missing
//! - `partial`: results exist but search came up short, some signals could
//!   not be classified, or the run was interrupted after classification began
//! - `failed`: no usable signals, storage down for every company, or an
//!   interruption before anything was classified

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fitrank_classifier::{ClassifyError, Classifier};
use fitrank_core::{
    normalize_batch, rank, Company, CoreError, ErrorCode, FitScore, FitScorer, Job, JobError, NormalizeOutcome,
    RankedCompany, RawResult, Signal, Stage,
};
use fitrank_search::{run_queries, QueryPlan, SearchConfig, SearchError, SearchOptions, SharedSearch};
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{CancelToken, SharedStore, StoreError, ValidatedRun};

/// Job shared between the runner and pollers
pub type SharedJob = Arc<RwLock<Job>>;

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Wall-clock budget for a whole job
    pub job_timeout_ms: u64,
    /// Merge previously stored classified signals before scoring
    pub include_history: bool,
    /// How long a finished job stays pollable before the registry drops it
    pub job_retention_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            job_timeout_ms: 120_000,
            include_history: false,
            job_retention_ms: 3_600_000,
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.job_timeout_ms == 0 {
            return Err(CoreError::InvalidConfig("job_timeout_ms must be positive".to_string()));
        }
        if self.job_retention_ms == 0 {
            return Err(CoreError::InvalidConfig("job_retention_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_millis(self.job_retention_ms)
    }
}

/// Stage-level failures that end a job
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No signal source: web search is off or unavailable and no raw results were supplied")]
    NoSignalSource,

    #[error("Search failed: {0}")]
    Search(#[from] SearchError),

    #[error("No usable signals: {0}")]
    NoSignals(String),

    #[error("Storage failed: {0}")]
    Storage(#[from] StoreError),

    #[error("Job deadline of {0:?} exceeded")]
    Timeout(Duration),

    #[error("Job cancelled")]
    Cancelled,

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl PipelineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::NoSignalSource | PipelineError::NoSignals(_) | PipelineError::Cancelled => {
                ErrorCode::ServiceUnavailable
            }
            PipelineError::Search(e) => e.code(),
            PipelineError::Storage(e) => e.code(),
            PipelineError::Timeout(_) => ErrorCode::TimeoutError,
            PipelineError::Core(e) => e.code(),
        }
    }

    pub fn to_job_error(&self) -> JobError {
        JobError::new(self.code(), self.to_string())
    }
}

/// What a finished run reports back
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub job: Job,
    /// Companies with at least one classified signal
    pub processed_companies: usize,
    /// Signals classified in this run
    pub labeled_signals: usize,
}

/// Per-job state visible to the timeout and cancel guard
struct WorkingSet {
    companies: Vec<Company>,
    classified: Vec<Signal>,
}

impl WorkingSet {
    fn new() -> Self {
        Self {
            companies: Vec::new(),
            classified: Vec::new(),
        }
    }

    fn processed_companies(&self) -> usize {
        self.classified
            .iter()
            .map(|s| s.company_ref.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Output of the search stage
#[derive(Debug, Default)]
struct Gathered {
    raw: Vec<RawResult>,
    planned: usize,
    failed: usize,
    /// Results asked of the provider (0 when no search ran)
    requested: usize,
    /// Results the provider actually returned, duplicates included
    returned: usize,
}

/// Output of a pipeline that ran to the end
struct PipelineOutput {
    results: Vec<RankedCompany>,
    /// Reasons the run is degraded; empty means complete
    shortfalls: Vec<String>,
    shortfall_code: ErrorCode,
}

/// The pipeline coordinator
pub struct Orchestrator {
    search: Option<SharedSearch>,
    search_config: SearchConfig,
    store: SharedStore,
    classifier: Arc<Classifier>,
    scorer: FitScorer,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(classifier: Arc<Classifier>, store: SharedStore, scorer: FitScorer) -> Self {
        Self {
            search: None,
            search_config: SearchConfig::default(),
            store,
            classifier,
            scorer,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_search(mut self, search: Option<SharedSearch>, search_config: SearchConfig) -> Self {
        self.search = search;
        self.search_config = search_config;
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn has_search(&self) -> bool {
        self.search.is_some()
    }

    /// Drive `job` to a terminal state.
    ///
    /// Never returns an error: every failure is recorded on the job.
    pub async fn run(&self, job: SharedJob, request: ValidatedRun, cancel: CancelToken) -> RunSummary {
        let as_of = Utc::now();
        let working = Mutex::new(WorkingSet::new());

        let started = job.write().start();
        if let Err(e) = started {
            warn!("Job not started: {}", e);
            return summarize(&job, &working);
        }

        let job_id = job.read().id;
        info!("Job {} running: {:?}", job_id, request.free_text);

        let timeout = self.config.job_timeout();
        let interrupted = tokio::select! {
            result = self.pipeline(&job, &request, &working, as_of) => {
                match result {
                    Ok(output) => finish(&job, output),
                    Err(e) => fail(&job, &e),
                }
                None
            }
            _ = tokio::time::sleep(timeout) => Some(PipelineError::Timeout(timeout)),
            _ = cancel.cancelled() => Some(PipelineError::Cancelled),
        };

        if let Some(e) = interrupted {
            warn!("Job {} interrupted: {}", job_id, e);
            self.salvage(&job, &working, request.top_k, as_of, e);
        }

        let summary = summarize(&job, &working);
        info!(
            "Job {} {}: {} companies ranked, {} signals labeled",
            job_id,
            summary.job.status,
            summary.job.results.len(),
            summary.labeled_signals
        );
        summary
    }

    async fn pipeline(
        &self,
        job: &SharedJob,
        request: &ValidatedRun,
        working: &Mutex<WorkingSet>,
        as_of: DateTime<Utc>,
    ) -> Result<PipelineOutput, PipelineError> {
        let mut shortfalls = Vec::new();
        let mut shortfall_code = ErrorCode::ServiceUnavailable;

        enter(job, Stage::Searching);
        let gathered = self.search_stage(request).await?;
        {
            let mut job = job.write();
            job.progress.queries_planned = gathered.planned;
            job.progress.queries_failed = gathered.failed;
            job.progress.raw_results = gathered.raw.len();
        }

        enter(job, Stage::Normalizing);
        let outcome = normalize_stage(&gathered.raw, as_of)?;
        {
            let mut job = job.write();
            job.progress.signals = outcome.signals.len();
            job.progress.misses = outcome.misses;
            job.progress.duplicates = outcome.duplicates;
            job.progress.companies = outcome.companies.len();
        }
        if gathered.failed > 0 {
            shortfalls.push(format!("{} of {} search queries failed", gathered.failed, gathered.planned));
        }
        // Overlap between query variants is expected and is not a shortfall
        if gathered.requested > 0 && gathered.returned < gathered.requested {
            shortfalls.push(format!(
                "search returned {} results of {} requested",
                gathered.returned, gathered.requested
            ));
        }

        enter(job, Stage::Persisting);
        self.persist_stage(&outcome).await?;
        working.lock().companies = outcome.companies.clone();

        enter(job, Stage::Classifying);
        let failures = self.classify_stage(job, outcome.signals, working).await;
        let classified: Vec<Signal> = working.lock().classified.clone();
        if classified.is_empty() {
            return Err(PipelineError::NoSignals(format!(
                "none of {} signals could be classified",
                failures.len()
            )));
        }
        if let Some(first) = failures.first() {
            shortfall_code = first.code();
            shortfalls.push(format!(
                "{} of {} signals could not be classified",
                failures.len(),
                failures.len() + classified.len()
            ));
        }
        self.write_back(&classified).await;

        enter(job, Stage::Scoring);
        let mut signals = classified;
        if self.config.include_history {
            self.merge_history(&outcome.companies, &mut signals).await;
        }
        let scores = score_stage(&self.scorer, &outcome.companies, &signals, as_of);

        enter(job, Stage::Ranking);
        let results = rank(&scores, request.top_k)?;

        Ok(PipelineOutput {
            results,
            shortfalls,
            shortfall_code,
        })
    }

    async fn search_stage(&self, request: &ValidatedRun) -> Result<Gathered, PipelineError> {
        let mut gathered = Gathered {
            raw: request.raw_results.clone(),
            ..Gathered::default()
        };

        if !request.use_web_search {
            if gathered.raw.is_empty() {
                return Err(PipelineError::NoSignalSource);
            }
            debug!("Ingesting {} supplied results", gathered.raw.len());
            return Ok(gathered);
        }

        let Some(search) = &self.search else {
            if gathered.raw.is_empty() {
                return Err(PipelineError::NoSignalSource);
            }
            warn!("Web search requested but no provider is configured; using supplied results only");
            return Ok(gathered);
        };

        let plan = QueryPlan::from_free_text(&request.free_text, self.search_config.max_queries);
        let options = SearchOptions::default()
            .with_recency(request.recency)
            .with_max_results(request.max_results_per_task);

        let batch = run_queries(search.as_ref(), &plan.queries, &options, self.search_config.max_concurrent).await;
        gathered.planned = batch.planned;
        gathered.failed = batch.failures.len();
        gathered.requested = request.max_results_per_task * batch.planned;
        gathered.returned = batch.returned;

        if batch.all_failed() && gathered.raw.is_empty() {
            let first = batch.failures.into_iter().next().map(|(_, e)| PipelineError::Search(e));
            return Err(first.unwrap_or(PipelineError::NoSignalSource));
        }

        gathered.raw.extend(batch.results);
        if gathered.raw.is_empty() {
            return Err(PipelineError::NoSignals("search returned zero results".to_string()));
        }

        info!(
            "Search gathered {} results from {} queries ({} failed)",
            gathered.raw.len(),
            gathered.planned,
            gathered.failed
        );
        Ok(gathered)
    }

    /// Fails only when no company could be written
    async fn persist_stage(&self, outcome: &NormalizeOutcome) -> Result<(), PipelineError> {
        let mut company_failures = 0usize;
        let mut last_error = None;

        for company in &outcome.companies {
            if let Err(e) = self.store.upsert_company(company).await {
                warn!("Failed to store company {}: {}", company.id, e);
                company_failures += 1;
                last_error = Some(e);
            }
        }

        if company_failures == outcome.companies.len() {
            if let Some(e) = last_error {
                return Err(PipelineError::Storage(e));
            }
        }

        for signal in &outcome.signals {
            if let Err(e) = self.store.upsert_signal(signal).await {
                warn!("Failed to store signal {}: {}", signal.id, e);
            }
        }

        Ok(())
    }

    async fn classify_stage(
        &self,
        job: &SharedJob,
        signals: Vec<Signal>,
        working: &Mutex<WorkingSet>,
    ) -> Vec<ClassifyError> {
        let mut failures = Vec::new();
        let stream = self.classifier.classify_stream(signals);
        futures::pin_mut!(stream);

        while let Some((mut signal, result)) = stream.next().await {
            match result {
                Ok(classification) => {
                    if let Err(e) = signal.apply_classification(classification) {
                        warn!("{}", e);
                    }
                    working.lock().classified.push(signal);
                    job.write().progress.classified += 1;
                }
                Err(e) => {
                    warn!("Signal {} excluded from scoring: {}", signal.id, e);
                    job.write().progress.classification_failures += 1;
                    failures.push(e);
                }
            }
        }

        failures
    }

    /// Best effort: failures are logged
    async fn write_back(&self, classified: &[Signal]) {
        let mut failed = 0usize;
        for signal in classified {
            if self.store.upsert_signal(signal).await.is_err() {
                failed += 1;
            }
        }
        if failed > 0 {
            warn!("{} classified signals could not be written back", failed);
        }
    }

    async fn merge_history(&self, companies: &[Company], signals: &mut Vec<Signal>) {
        let mut seen: HashSet<String> = signals.iter().map(|s| s.id.clone()).collect();

        for company in companies {
            match self.store.fetch_signals_for_company(&company.id).await {
                Ok(history) => {
                    for signal in history {
                        if signal.is_classified() && seen.insert(signal.id.clone()) {
                            signals.push(signal);
                        }
                    }
                }
                Err(e) => warn!("History unavailable for {}: {}", company.id, e),
            }
        }
    }

    /// Score and rank what an interrupted run already classified
    fn salvage(
        &self,
        job: &SharedJob,
        working: &Mutex<WorkingSet>,
        top_k: usize,
        as_of: DateTime<Utc>,
        error: PipelineError,
    ) {
        let results = {
            let working = working.lock();
            let scores = score_stage(&self.scorer, &working.companies, &working.classified, as_of);
            rank(&scores, top_k).unwrap_or_default()
        };

        let mut job = job.write();
        let now = Utc::now();
        let transition = if results.is_empty() {
            job.fail(error.to_job_error(), now)
        } else {
            job.degrade(results, Some(error.to_job_error()), now)
        };
        if let Err(e) = transition {
            warn!("Job {}: {}", job.id, e);
        }
    }
}

fn enter(job: &SharedJob, stage: Stage) {
    let mut job = job.write();
    job.progress.stage = stage;
    debug!("Job {} entering {}", job.id, stage.as_str());
}

fn normalize_stage(raw: &[RawResult], as_of: DateTime<Utc>) -> Result<NormalizeOutcome, PipelineError> {
    let outcome = normalize_batch(raw, as_of);
    debug!(
        "Normalized {} results: {} signals, {} misses, {} duplicates",
        raw.len(),
        outcome.signals.len(),
        outcome.misses,
        outcome.duplicates
    );
    if outcome.signals.is_empty() {
        return Err(PipelineError::NoSignals(format!(
            "none of {} results could be attributed to a company",
            raw.len()
        )));
    }
    Ok(outcome)
}

/// Score every company that has at least one classified signal
fn score_stage(scorer: &FitScorer, companies: &[Company], signals: &[Signal], as_of: DateTime<Utc>) -> Vec<FitScore> {
    let mut by_company: HashMap<&str, Vec<Signal>> = HashMap::new();
    for signal in signals.iter().filter(|s| s.is_classified()) {
        by_company
            .entry(signal.company_ref.as_str())
            .or_default()
            .push(signal.clone());
    }

    companies
        .iter()
        .filter_map(|company| {
            let mut own = by_company.remove(company.id.as_str())?;
            // Completion order must not leak into the score
            own.sort_by(|a, b| a.id.cmp(&b.id));
            Some(scorer.compute(company, &own, as_of))
        })
        .collect()
}

fn finish(job: &SharedJob, output: PipelineOutput) {
    let mut job = job.write();
    let now = Utc::now();
    let transition = if output.shortfalls.is_empty() {
        job.complete(output.results, now)
    } else {
        let error = JobError::new(output.shortfall_code, output.shortfalls.join("; "))
            .with_details(json!({ "shortfalls": output.shortfalls }));
        job.degrade(output.results, Some(error), now)
    };
    if let Err(e) = transition {
        warn!("Job {}: {}", job.id, e);
    }
}

fn fail(job: &SharedJob, error: &PipelineError) {
    warn!("Job failed: {}", error);
    let mut job = job.write();
    if let Err(e) = job.fail(error.to_job_error(), Utc::now()) {
        warn!("Job {}: {}", job.id, e);
    }
}

fn summarize(job: &SharedJob, working: &Mutex<WorkingSet>) -> RunSummary {
    let working = working.lock();
    RunSummary {
        job: job.read().clone(),
        processed_companies: working.processed_companies(),
        labeled_signals: working.classified.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cancel_pair, InMemoryStore, RunRequest, SignalStore};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use fitrank_classifier::{ClassificationCache, ClassifierConfig, ModelClassifier, ModelError, ModelVerdict};
    use fitrank_core::{JobStatus, ScoringConfig, SignalLabel};
    use fitrank_search::SearchProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Model that never answers texts containing "slow" in time
    struct SlowModel;

    #[async_trait]
    impl ModelClassifier for SlowModel {
        async fn classify_text(&self, text: &str, _labels: &[SignalLabel]) -> Result<ModelVerdict, ModelError> {
            if text.contains("slow") {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Ok(ModelVerdict {
                label: SignalLabel::Other,
                confidence: 0.5,
            })
        }
    }

    struct MockSearch {
        results: Vec<RawResult>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl MockSearch {
        fn new(results: Vec<RawResult>) -> Arc<Self> {
            Arc::new(Self {
                results,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn hanging() -> Arc<Self> {
            Arc::new(Self {
                results: vec![],
                delay: Duration::from_secs(30),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SearchProvider for MockSearch {
        fn name(&self) -> &str {
            "mock"
        }

        async fn search(&self, _query: &str, _options: &SearchOptions) -> Result<Vec<RawResult>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(self.results.clone())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl SignalStore for BrokenStore {
        async fn upsert_company(&self, _company: &Company) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn upsert_signal(&self, _signal: &Signal) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn fetch_signals_for_company(&self, _company_ref: &str) -> Result<Vec<Signal>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    fn orchestrator_with(
        store: SharedStore,
        search: Option<SharedSearch>,
        model_timeout_ms: u64,
        job_timeout_ms: u64,
    ) -> Orchestrator {
        let classifier = Classifier::with_cache(
            Some(Arc::new(SlowModel)),
            ClassifierConfig {
                model_timeout_ms,
                ..ClassifierConfig::default()
            },
            Arc::new(ClassificationCache::new()),
        )
        .unwrap();
        let scorer = FitScorer::new(ScoringConfig::default()).unwrap();

        Orchestrator::new(Arc::new(classifier), store, scorer)
            .with_search(search, SearchConfig::default())
            .with_config(OrchestratorConfig {
                job_timeout_ms,
                ..OrchestratorConfig::default()
            })
    }

    fn orchestrator(search: Option<SharedSearch>) -> Orchestrator {
        orchestrator_with(Arc::new(InMemoryStore::new()), search, 50, 5_000)
    }

    async fn execute(orchestrator: &Orchestrator, request: RunRequest) -> RunSummary {
        let run = request.validate().unwrap();
        let job = Arc::new(RwLock::new(Job::new(&run.free_text, Utc::now())));
        let (_handle, token) = cancel_pair();
        orchestrator.run(job, run, token).await
    }

    fn acme_results() -> Vec<RawResult> {
        let now = Utc::now();
        vec![
            RawResult::new("Acme migrates to Kubernetes")
                .with_company_hint("acme.com")
                .with_timestamp(now),
            RawResult::new("Acme raised $12M to grow the platform")
                .with_company_hint("acme.com")
                .with_timestamp(now),
            RawResult::new("Acme names new CTO")
                .with_company_hint("acme.com")
                .with_timestamp(now - ChronoDuration::days(180)),
        ]
    }

    fn ten_signals_two_slow() -> Vec<RawResult> {
        (0..10)
            .map(|i| {
                let text = if i < 2 {
                    format!("slow picnic note {}", i)
                } else {
                    format!("Company {} raises $10M Series A", i)
                };
                RawResult::new(&text).with_company_hint(&format!("c{}.com", i))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_scenario_tech_funding_stale_exec() {
        let orchestrator = orchestrator(None);
        let summary = execute(&orchestrator, RunRequest::new("platform buyers").offline(acme_results())).await;

        assert_eq!(summary.job.status, JobStatus::Completed);
        assert_eq!(summary.processed_companies, 1);
        assert_eq!(summary.labeled_signals, 3);

        let acme = &summary.job.results[0];
        assert_eq!(acme.company_id, "acme.com");
        assert!(acme.fit_score > 0.0 && acme.fit_score <= 1.0);
        assert!(acme.reasons.iter().any(|r| r.starts_with("techSignals")));
        assert!(acme.reasons.iter().any(|r| r == "funding 0.90"));
        assert!(!acme.reasons.iter().any(|r| r.starts_with("execChanges")));
    }

    #[tokio::test]
    async fn test_scenario_empty_search_fails() {
        let search = MockSearch::new(vec![]);
        let orchestrator = orchestrator(Some(search.clone()));
        let summary = execute(&orchestrator, RunRequest::new("anything")).await;

        assert_eq!(summary.job.status, JobStatus::Failed);
        assert!(summary.job.results.is_empty());
        assert_eq!(
            summary.job.error.as_ref().map(|e| e.code),
            Some(ErrorCode::ServiceUnavailable)
        );
        assert!(search.calls.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn test_scenario_model_timeouts_degrade_to_partial() {
        let orchestrator = orchestrator(None);
        let summary = execute(&orchestrator, RunRequest::new("series a").offline(ten_signals_two_slow())).await;

        assert_eq!(summary.job.status, JobStatus::Partial);
        assert_eq!(summary.processed_companies, 8);
        assert_eq!(summary.labeled_signals, 8);
        assert_eq!(summary.job.results.len(), 8);
        assert_eq!(summary.job.progress.classification_failures, 2);
        let error = summary.job.error.unwrap();
        assert_eq!(error.code, ErrorCode::TimeoutError);
        assert!(error.message.contains("2 of 10"));
    }

    #[tokio::test]
    async fn test_search_shortfall_is_partial() {
        let search = MockSearch::new(acme_results());
        let orchestrator = orchestrator(Some(search));
        let summary = execute(&orchestrator, RunRequest::new("platform buyers")).await;

        // Three results against 10 per planned query
        assert_eq!(summary.job.status, JobStatus::Partial);
        assert_eq!(summary.job.results.len(), 1);
        assert!(summary.job.progress.duplicates > 0);
    }

    #[tokio::test]
    async fn test_overlapping_queries_are_not_a_shortfall() {
        // Every planned query returns the same full page of results
        let page: Vec<RawResult> = (0..10)
            .map(|i| {
                RawResult::new(&format!("Company {} raises $10M Series A", i))
                    .with_url(&format!("https://c{}.com/news", i))
                    .with_company_hint(&format!("c{}.com", i))
            })
            .collect();
        let orchestrator = orchestrator(Some(MockSearch::new(page)));
        let summary = execute(&orchestrator, RunRequest::new("platform buyers")).await;

        assert_eq!(summary.job.status, JobStatus::Completed);
        assert!(summary.job.error.is_none());
        assert_eq!(summary.job.progress.raw_results, 10);
        assert_eq!(summary.processed_companies, 10);
    }

    #[tokio::test]
    async fn test_no_signal_source_fails() {
        let orchestrator = orchestrator(None);
        let summary = execute(&orchestrator, RunRequest::new("anything")).await;
        assert_eq!(summary.job.status, JobStatus::Failed);
        assert_eq!(summary.job.error.unwrap().code, ErrorCode::ServiceUnavailable);
    }

    #[tokio::test]
    async fn test_storage_down_for_every_company_fails() {
        let orchestrator = orchestrator_with(Arc::new(BrokenStore), None, 50, 5_000);
        let summary = execute(&orchestrator, RunRequest::new("q").offline(acme_results())).await;
        assert_eq!(summary.job.status, JobStatus::Failed);
        assert_eq!(summary.job.error.unwrap().code, ErrorCode::DatabaseError);
    }

    #[tokio::test]
    async fn test_deadline_before_any_result_fails() {
        let orchestrator = orchestrator_with(Arc::new(InMemoryStore::new()), Some(MockSearch::hanging()), 50, 100);
        let summary = execute(&orchestrator, RunRequest::new("q")).await;

        assert_eq!(summary.job.status, JobStatus::Failed);
        assert_eq!(summary.job.error.unwrap().code, ErrorCode::TimeoutError);
        assert!(summary.job.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_deadline_during_classification_salvages_partial() {
        // Model calls outlive the job
        let orchestrator = orchestrator_with(Arc::new(InMemoryStore::new()), None, 60_000, 300);
        let summary = execute(&orchestrator, RunRequest::new("q").offline(ten_signals_two_slow())).await;

        assert_eq!(summary.job.status, JobStatus::Partial);
        assert_eq!(summary.job.results.len(), 8);
        assert_eq!(summary.job.error.unwrap().code, ErrorCode::TimeoutError);
    }

    #[tokio::test]
    async fn test_cancel_forces_terminal_state() {
        let orchestrator = orchestrator_with(Arc::new(InMemoryStore::new()), Some(MockSearch::hanging()), 50, 60_000);
        let run = RunRequest::new("q").validate().unwrap();
        let job = Arc::new(RwLock::new(Job::new("q", Utc::now())));
        let (handle, token) = cancel_pair();

        let canceller = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        };
        let (summary, _) = tokio::join!(orchestrator.run(Arc::clone(&job), run, token), canceller);

        assert_eq!(summary.job.status, JobStatus::Failed);
        assert_eq!(job.read().status, JobStatus::Failed);
        assert!(summary.job.error.unwrap().message.contains("cancelled"));
    }

    #[tokio::test]
    async fn test_history_is_merged_when_enabled() {
        let store = Arc::new(InMemoryStore::new());
        let orchestrator = orchestrator_with(store.clone(), None, 50, 5_000).with_config(OrchestratorConfig {
            job_timeout_ms: 5_000,
            include_history: true,
            ..OrchestratorConfig::default()
        });

        let first = execute(&orchestrator, RunRequest::new("q").offline(acme_results())).await;
        assert_eq!(first.job.status, JobStatus::Completed);
        assert_eq!(store.signal_count(), 3);

        let only_funding = vec![RawResult::new("Acme raised $12M to grow the platform").with_company_hint("acme.com")];
        let second = execute(&orchestrator, RunRequest::new("q").offline(only_funding)).await;
        assert!(second.job.results[0].reasons.iter().any(|r| r.starts_with("techSignals")));
    }

    #[tokio::test]
    async fn test_rerun_is_deterministic() {
        let orchestrator = orchestrator(None);
        let raw = acme_results();
        let a = execute(&orchestrator, RunRequest::new("q").offline(raw.clone())).await;
        let b = execute(&orchestrator, RunRequest::new("q").offline(raw)).await;
        assert_ne!(a.job.id, b.job.id);
        let reasons = |s: &RunSummary| -> Vec<(String, Vec<String>)> {
            s.job.results.iter().map(|r| (r.company_id.clone(), r.reasons.clone())).collect()
        };
        assert_eq!(reasons(&a), reasons(&b));
    }
}
