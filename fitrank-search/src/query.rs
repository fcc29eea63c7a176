//! Query planning from free text
//!
//! A run's free text is expanded into a small, deterministic set of search
//! queries: the text itself plus variants biased toward hiring, funding and
//! technology-adoption coverage.

use crate::normalize_whitespace;

const HIRING_TERMS: &str = r#"(hiring OR "job opening" OR "we are hiring")"#;
const FUNDING_TERMS: &str = r#"(raised OR funding OR "series a" OR "series b" OR financing)"#;
const TECH_TERMS: &str = "(launch OR announced OR integration OR migration OR adopts)";

/// Ordered, de-duplicated list of queries for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub queries: Vec<String>,
}

impl QueryPlan {
    /// Plan at most `max_queries` queries for `free_text`
    pub fn from_free_text(free_text: &str, max_queries: usize) -> Self {
        let base = normalize_whitespace(free_text);
        if base.is_empty() || max_queries == 0 {
            return Self { queries: Vec::new() };
        }

        let candidates = [
            base.clone(),
            format!("{} {}", base, HIRING_TERMS),
            format!("{} {}", base, FUNDING_TERMS),
            format!("{} {}", base, TECH_TERMS),
        ];

        let mut queries: Vec<String> = Vec::new();
        for candidate in candidates {
            if !queries.contains(&candidate) {
                queries.push(candidate);
            }
        }
        queries.truncate(max_queries);

        Self { queries }
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}
