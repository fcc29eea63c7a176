//! Process-wide classification cache
//!
//! Keyed by the content hash of `(source_type, raw_text)`. Entries are
//! write-once: the first verdict stored for a key wins and later writers get
//! the stored value back.

use std::sync::{Arc, LazyLock};

use dashmap::DashMap;

use crate::ModelVerdict;

static GLOBAL_CACHE: LazyLock<Arc<ClassificationCache>> = LazyLock::new(|| Arc::new(ClassificationCache::new()));

#[derive(Debug, Default)]
pub struct ClassificationCache {
    entries: DashMap<String, ModelVerdict>,
}

impl ClassificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by every classifier in this process
    pub fn global() -> Arc<ClassificationCache> {
        Arc::clone(&GLOBAL_CACHE)
    }

    pub fn get(&self, key: &str) -> Option<ModelVerdict> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Store `verdict` unless the key is already present; returns the stored value
    pub fn insert(&self, key: &str, verdict: ModelVerdict) -> ModelVerdict {
        self.entries.entry(key.to_string()).or_insert(verdict).value().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitrank_core::SignalLabel;

    fn verdict(label: SignalLabel, confidence: f64) -> ModelVerdict {
        ModelVerdict { label, confidence }
    }

    #[test]
    fn test_first_writer_wins() {
        let cache = ClassificationCache::new();
        let stored = cache.insert("k", verdict(SignalLabel::Tech, 0.7));
        assert_eq!(stored.label, SignalLabel::Tech);

        let stored = cache.insert("k", verdict(SignalLabel::Other, 0.2));
        assert_eq!(stored.label, SignalLabel::Tech);
        assert_eq!(cache.get("k").map(|v| v.confidence), Some(0.7));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_writers_agree() {
        let cache = Arc::new(ClassificationCache::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    let label = if i % 2 == 0 { SignalLabel::Hiring } else { SignalLabel::Funding };
                    cache.insert("shared", verdict(label, 0.5))
                })
            })
            .collect();

        let results: Vec<ModelVerdict> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|v| *v == results[0]));
        assert_eq!(cache.get("shared"), Some(results[0].clone()));
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&ClassificationCache::global(), &ClassificationCache::global()));
    }
}
