//! Search provider trait

use std::sync::Arc;

use async_trait::async_trait;
use fitrank_core::RawResult;
use serde::{Deserialize, Serialize};

use crate::SearchError;

/// How recent results should be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recency {
    Week,
    Month,
}

impl Recency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recency::Week => "week",
            Recency::Month => "month",
        }
    }
}

/// Per-query options
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub recency: Option<Recency>,
    /// Results requested per query
    pub max_results: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            recency: None,
            max_results: 10,
        }
    }
}

impl SearchOptions {
    pub fn with_recency(mut self, recency: Option<Recency>) -> Self {
        self.recency = recency;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

/// The web-search collaborator: query in, raw results out
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider name for logs and `RawResult::provider`
    fn name(&self) -> &str;

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<RawResult>, SearchError>;
}

/// Shared provider handle
pub type SharedSearch = Arc<dyn SearchProvider>;
