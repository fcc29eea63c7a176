//! Fan-out across providers and across planned queries

use std::collections::HashSet;

use async_trait::async_trait;
use fitrank_core::RawResult;
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::{SearchError, SearchOptions, SearchProvider, SharedSearch};

/// Queries every provider concurrently and merges their results
pub struct FanoutSearch {
    providers: Vec<SharedSearch>,
    max_concurrent: usize,
}

impl FanoutSearch {
    pub fn new(providers: Vec<SharedSearch>, max_concurrent: usize) -> Self {
        Self {
            providers,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }
}

#[async_trait]
impl SearchProvider for FanoutSearch {
    fn name(&self) -> &str {
        "fanout"
    }

    /// Fails only when every provider fails
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<RawResult>, SearchError> {
        if self.providers.is_empty() {
            return Err(SearchError::NoProvider);
        }

        let futures: Vec<_> = self
            .providers
            .iter()
            .enumerate()
            .map(|(idx, provider)| async move { (idx, provider.search(query, options).await) })
            .collect();
        let mut outcomes: Vec<(usize, Result<Vec<RawResult>, SearchError>)> =
            stream::iter(futures)
                .buffer_unordered(self.max_concurrent)
                .collect()
                .await;

        // Provider order, not completion order
        outcomes.sort_by_key(|(idx, _)| *idx);

        let mut merged = Vec::new();
        let mut errors = Vec::new();
        for (idx, outcome) in outcomes {
            match outcome {
                Ok(results) => merged.push(results),
                Err(e) => {
                    warn!("Provider {} failed: {}", self.providers[idx].name(), e);
                    errors.push(e);
                }
            }
        }

        if merged.is_empty() {
            if errors.len() == 1 {
                return Err(errors.remove(0));
            }
            let summary = errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
            return Err(SearchError::AllFailed(summary));
        }

        Ok(dedupe_by_url(merged.into_iter().flatten()))
    }
}

/// Results of running a query plan
#[derive(Debug, Default)]
pub struct QueryBatch {
    pub results: Vec<RawResult>,
    /// Queries that failed after retries, with their errors
    pub failures: Vec<(String, SearchError)>,
    pub planned: usize,
    /// Results the provider handed back before URL de-duplication
    pub returned: usize,
}

impl QueryBatch {
    pub fn all_failed(&self) -> bool {
        self.planned > 0 && self.failures.len() == self.planned
    }
}

/// Run every planned query against `provider` with bounded concurrency.
/// Results keep plan order and are de-duplicated by URL.
pub async fn run_queries(
    provider: &dyn SearchProvider,
    queries: &[String],
    options: &SearchOptions,
    max_concurrent: usize,
) -> QueryBatch {
    let futures: Vec<_> = queries
        .iter()
        .enumerate()
        .map(|(idx, query)| async move { (idx, provider.search(query, options).await) })
        .collect();
    let mut outcomes: Vec<(usize, Result<Vec<RawResult>, SearchError>)> = stream::iter(futures)
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await;
    outcomes.sort_by_key(|(idx, _)| *idx);

    let mut batch = QueryBatch {
        planned: queries.len(),
        ..QueryBatch::default()
    };
    let mut per_query = Vec::new();

    for (idx, outcome) in outcomes {
        match outcome {
            Ok(results) => {
                debug!("Query {:?} returned {} results", queries[idx], results.len());
                per_query.push(results);
            }
            Err(e) => {
                warn!("Query {:?} failed: {}", queries[idx], e);
                batch.failures.push((queries[idx].clone(), e));
            }
        }
    }

    batch.returned = per_query.iter().map(Vec::len).sum();
    batch.results = dedupe_by_url(per_query.into_iter().flatten());
    batch
}

/// Keep the first result per URL (trailing slash and case ignored)
pub fn dedupe_by_url(results: impl IntoIterator<Item = RawResult>) -> Vec<RawResult> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut deduped = Vec::new();

    for result in results {
        match &result.url {
            Some(url) => {
                let normalized = url.trim_end_matches('/').to_lowercase();
                if seen.insert(normalized) {
                    deduped.push(result);
                }
            }
            None => deduped.push(result),
        }
    }

    deduped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StaticProvider {
        name: &'static str,
        urls: Vec<&'static str>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl StaticProvider {
        fn new(name: &'static str, urls: Vec<&'static str>) -> Self {
            Self {
                name,
                urls,
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                fail: true,
                ..Self::new(name, vec![])
            }
        }
    }

    #[async_trait]
    impl SearchProvider for StaticProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(&self, query: &str, _options: &SearchOptions) -> Result<Vec<RawResult>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail || query.contains("broken") {
                return Err(SearchError::Status {
                    provider: self.name.to_string(),
                    status: 503,
                });
            }
            Ok(self
                .urls
                .iter()
                .map(|u| RawResult::new(&format!("{} {}", query, u)).with_url(u))
                .collect())
        }
    }

    #[tokio::test]
    async fn test_fanout_merges_and_dedupes() {
        let a: SharedSearch = Arc::new(StaticProvider::new("a", vec!["https://acme.com/news", "https://globex.com/"]));
        let b: SharedSearch = Arc::new(StaticProvider::new("b", vec!["https://ACME.com/news/", "https://initech.io"]));
        let fanout = FanoutSearch::new(vec![a, b], 2);

        let results = fanout.search("q", &SearchOptions::default()).await.unwrap();
        let urls: Vec<&str> = results.iter().filter_map(|r| r.url.as_deref()).collect();
        assert_eq!(urls, vec!["https://acme.com/news", "https://globex.com/", "https://initech.io"]);
    }

    #[tokio::test]
    async fn test_fanout_tolerates_one_failure() {
        let a: SharedSearch = Arc::new(StaticProvider::failing("a"));
        let b: SharedSearch = Arc::new(StaticProvider::new("b", vec!["https://initech.io"]));
        let fanout = FanoutSearch::new(vec![a, b], 2);

        let results = fanout.search("q", &SearchOptions::default()).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_fanout_fails_when_all_fail() {
        let fanout = FanoutSearch::new(
            vec![Arc::new(StaticProvider::failing("a")), Arc::new(StaticProvider::failing("b"))],
            2,
        );
        let err = fanout.search("q", &SearchOptions::default()).await.unwrap_err();
        assert!(matches!(err, SearchError::AllFailed(_)));

        let empty = FanoutSearch::new(vec![], 2);
        assert!(matches!(
            empty.search("q", &SearchOptions::default()).await,
            Err(SearchError::NoProvider)
        ));
    }

    #[tokio::test]
    async fn test_run_queries_records_failures_in_plan_order() {
        let provider = StaticProvider::new("a", vec!["https://acme.com/a"]);
        let queries = vec!["first".to_string(), "broken query".to_string(), "third".to_string()];

        let batch = run_queries(&provider, &queries, &SearchOptions::default(), 3).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(batch.planned, 3);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].0, "broken query");
        assert!(!batch.all_failed());
        // Same URL from two queries collapses to the first
        assert_eq!(batch.returned, 2);
        assert_eq!(batch.results.len(), 1);
        assert!(batch.results[0].text.starts_with("first"));
    }
}
