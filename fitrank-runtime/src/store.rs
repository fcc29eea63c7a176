//! Storage collaborator
//!
//! The system of record for companies and signals beyond a single run.
//! [`InMemoryStore`] keeps everything in process; other backends implement
//! [`SignalStore`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use fitrank_core::{Company, ErrorCode, Signal};
use parking_lot::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage write rejected: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::DatabaseError
    }
}

#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn upsert_company(&self, company: &Company) -> Result<(), StoreError>;

    async fn upsert_signal(&self, signal: &Signal) -> Result<(), StoreError>;

    async fn fetch_signals_for_company(&self, company_ref: &str) -> Result<Vec<Signal>, StoreError>;
}

pub type SharedStore = Arc<dyn SignalStore>;

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    companies: RwLock<HashMap<String, Company>>,
    signals: RwLock<HashMap<String, Signal>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn company(&self, id: &str) -> Option<Company> {
        self.companies.read().get(id).cloned()
    }

    pub fn company_count(&self) -> usize {
        self.companies.read().len()
    }

    pub fn signal_count(&self) -> usize {
        self.signals.read().len()
    }
}

#[async_trait]
impl SignalStore for InMemoryStore {
    /// Merges into an existing record
    async fn upsert_company(&self, company: &Company) -> Result<(), StoreError> {
        if company.id.trim().is_empty() {
            return Err(StoreError::Rejected("company without an id".to_string()));
        }
        let mut companies = self.companies.write();
        match companies.get_mut(&company.id) {
            Some(existing) => existing.merge(company),
            None => {
                companies.insert(company.id.clone(), company.clone());
            }
        }
        Ok(())
    }

    /// A classified record is never replaced by an unclassified one
    async fn upsert_signal(&self, signal: &Signal) -> Result<(), StoreError> {
        if signal.company_ref.trim().is_empty() {
            return Err(StoreError::Rejected(format!("signal {} has no company", signal.id)));
        }
        let mut signals = self.signals.write();
        let keep_existing = signals
            .get(&signal.id)
            .is_some_and(|existing| existing.is_classified() && !signal.is_classified());
        if !keep_existing {
            signals.insert(signal.id.clone(), signal.clone());
        }
        Ok(())
    }

    async fn fetch_signals_for_company(&self, company_ref: &str) -> Result<Vec<Signal>, StoreError> {
        let mut found: Vec<Signal> = self
            .signals
            .read()
            .values()
            .filter(|s| s.company_ref == company_ref)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitrank_core::{Classification, ClassificationSource, SignalLabel, SourceType};

    #[tokio::test]
    async fn test_upsert_company_merges() {
        let store = InMemoryStore::new();
        let mut first = Company::from_ref("acme.com");
        first.append_signal("s1");
        store.upsert_company(&first).await.unwrap();

        let mut second = Company::from_ref("acme.com").with_geo(Some("US".to_string()));
        second.append_signal("s2");
        store.upsert_company(&second).await.unwrap();

        let stored = store.company("acme.com").unwrap();
        assert_eq!(stored.signal_ids, vec!["s1", "s2"]);
        assert_eq!(stored.geo.as_deref(), Some("US"));
        assert_eq!(store.company_count(), 1);
    }

    #[tokio::test]
    async fn test_classified_signal_is_not_downgraded() {
        let store = InMemoryStore::new();
        let raw = Signal::builder("acme.com", SourceType::News, "Acme adopts Snowflake").build();
        let classified = raw
            .clone()
            .classified(Classification::new(SignalLabel::Tech, 0.8, 0.0, ClassificationSource::Rule))
            .unwrap();

        store.upsert_signal(&classified).await.unwrap();
        store.upsert_signal(&raw).await.unwrap();

        let fetched = store.fetch_signals_for_company("acme.com").await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert!(fetched[0].is_classified());
        assert!(store.fetch_signals_for_company("globex.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_orphan_records_are_rejected() {
        let store = InMemoryStore::new();

        let err = store.upsert_company(&Company::from_ref("  ")).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
        assert_eq!(err.code(), ErrorCode::DatabaseError);

        let orphan = Signal::builder("", SourceType::News, "Someone adopts Snowflake").build();
        assert!(matches!(store.upsert_signal(&orphan).await, Err(StoreError::Rejected(_))));
        assert_eq!(store.signal_count(), 0);
        assert_eq!(store.company_count(), 0);
    }
}
