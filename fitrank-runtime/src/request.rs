//! Run requests and their validation

use fitrank_core::{CoreError, RawResult};
use fitrank_search::Recency;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TOP_K: usize = 200;
pub const DEFAULT_MAX_RESULTS_PER_TASK: usize = 10;
pub const MAX_RESULTS_PER_TASK_LIMIT: i64 = 50;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSearchOptions {
    pub recency: Option<Recency>,
    pub max_results_per_task: Option<i64>,
}

/// Body of `POST /run`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(default)]
    pub free_text: String,
    #[serde(default = "default_use_web_search")]
    pub use_web_search: bool,
    pub top_k: Option<i64>,
    pub web_search_options: Option<WebSearchOptions>,
    /// Pre-fetched results ingested without searching
    #[serde(default)]
    pub raw_results: Vec<RawResult>,
}

fn default_use_web_search() -> bool {
    true
}

impl RunRequest {
    pub fn new(free_text: &str) -> Self {
        Self {
            free_text: free_text.to_string(),
            use_web_search: true,
            top_k: None,
            web_search_options: None,
            raw_results: Vec::new(),
        }
    }

    pub fn with_top_k(mut self, top_k: i64) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Ingest `raw` instead of searching
    pub fn offline(mut self, raw: Vec<RawResult>) -> Self {
        self.use_web_search = false;
        self.raw_results = raw;
        self
    }

    /// Check the request; nothing downstream runs on failure
    pub fn validate(&self) -> Result<ValidatedRun, CoreError> {
        let free_text = self.free_text.trim();
        if free_text.is_empty() {
            return Err(CoreError::Validation("freeText must not be empty".to_string()));
        }

        let top_k = match self.top_k {
            None => DEFAULT_TOP_K,
            Some(k) if k <= 0 => {
                return Err(CoreError::Validation(format!("topK must be positive, got {}", k)));
            }
            Some(k) => k as usize,
        };

        let options = self.web_search_options.clone().unwrap_or_default();
        let max_results_per_task = match options.max_results_per_task {
            None => DEFAULT_MAX_RESULTS_PER_TASK,
            Some(n) if (1..=MAX_RESULTS_PER_TASK_LIMIT).contains(&n) => n as usize,
            Some(n) => {
                return Err(CoreError::Validation(format!(
                    "maxResultsPerTask must be within 1..={}, got {}",
                    MAX_RESULTS_PER_TASK_LIMIT, n
                )));
            }
        };

        Ok(ValidatedRun {
            free_text: free_text.to_string(),
            use_web_search: self.use_web_search,
            top_k,
            recency: options.recency,
            max_results_per_task,
            raw_results: self.raw_results.clone(),
        })
    }
}

/// A request that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRun {
    pub free_text: String,
    pub use_web_search: bool,
    pub top_k: usize,
    pub recency: Option<Recency>,
    pub max_results_per_task: usize,
    pub raw_results: Vec<RawResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let request: RunRequest = serde_json::from_str(r#"{"freeText": "fintech data platforms"}"#).unwrap();
        let run = request.validate().unwrap();
        assert!(run.use_web_search);
        assert_eq!(run.top_k, DEFAULT_TOP_K);
        assert_eq!(run.max_results_per_task, DEFAULT_MAX_RESULTS_PER_TASK);
        assert_eq!(run.recency, None);
    }

    #[test]
    fn test_full_request() {
        let body = r#"{
            "freeText": "  companies adopting Snowflake ",
            "useWebSearch": true,
            "topK": 5,
            "webSearchOptions": {"recency": "week", "maxResultsPerTask": 20}
        }"#;
        let run = serde_json::from_str::<RunRequest>(body).unwrap().validate().unwrap();
        assert_eq!(run.free_text, "companies adopting Snowflake");
        assert_eq!(run.top_k, 5);
        assert_eq!(run.recency, Some(Recency::Week));
        assert_eq!(run.max_results_per_task, 20);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(RunRequest::new("  ").validate().is_err());
        assert!(RunRequest::new("q").with_top_k(0).validate().is_err());
        assert!(RunRequest::new("q").with_top_k(-3).validate().is_err());

        let mut request = RunRequest::new("q");
        request.web_search_options = Some(WebSearchOptions {
            recency: None,
            max_results_per_task: Some(51),
        });
        assert!(matches!(request.validate(), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_offline_request() {
        let run = RunRequest::new("q")
            .offline(vec![RawResult::new("Acme raised $5M")])
            .validate()
            .unwrap();
        assert!(!run.use_web_search);
        assert_eq!(run.raw_results.len(), 1);
    }
}
