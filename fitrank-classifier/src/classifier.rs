//! Signal classifier
//!
//! An explicit two-branch decision:
//!
//! ```text
//! rules(text, source) --confidence >= threshold--> Rule
//!                     --otherwise----------------> Model (cache, then collaborator)
//!                                                    |-- fails --> rule label, confidence halved
//!                                                    `-- fails, no rule label --> Unavailable
//! ```
//!
//! Sentiment is scored separately and always attached.

use std::sync::Arc;
use std::time::Duration;

use fitrank_core::{Classification, ClassificationSource, CoreError, ErrorCode, Signal, SignalLabel};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    evaluate_rules, score_sentiment, ClassificationCache, LlmProvider, ModelError, ModelVerdict, RuleMatch,
    SharedModel,
};

/// Classifier configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Rule confidence at or above which the model is skipped
    pub rule_threshold: f64,
    /// Per-call model timeout
    pub model_timeout_ms: u64,
    /// Concurrent classifications (bounds model calls)
    pub max_concurrent: usize,
    pub provider: LlmProvider,
    pub model: String,
    /// Base URL for local OpenAI-compatible servers
    pub base_url: Option<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            rule_threshold: fitrank_core::DEFAULT_RULE_THRESHOLD,
            model_timeout_ms: 20_000,
            max_concurrent: 4,
            provider: LlmProvider::default(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(0.0..=1.0).contains(&self.rule_threshold) {
            return Err(CoreError::InvalidConfig("rule_threshold must be within [0, 1]".to_string()));
        }
        if self.model_timeout_ms == 0 {
            return Err(CoreError::InvalidConfig("model_timeout_ms must be positive".to_string()));
        }
        if self.max_concurrent == 0 {
            return Err(CoreError::InvalidConfig("max_concurrent must be positive".to_string()));
        }
        Ok(())
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model_timeout_ms)
    }
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Neither the rules nor the model produced a label
    #[error("Classification unavailable for signal {signal_id}: {source}")]
    Unavailable {
        signal_id: String,
        #[source]
        source: ModelError,
    },
}

impl ClassifyError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ClassifyError::Unavailable { source, .. } => source.code(),
        }
    }
}

/// Which branch classifies a signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Route {
    /// Rule confidence cleared the threshold
    Rule(RuleMatch),
    /// Rules were inconclusive; the best rule label, if any, is the fallback
    Model { fallback: Option<RuleMatch> },
}

impl Route {
    pub fn decide(rule: Option<RuleMatch>, threshold: f64) -> Self {
        match rule {
            Some(m) if m.confidence >= threshold => Route::Rule(m),
            fallback => Route::Model { fallback },
        }
    }
}

/// Rule-first classifier with a cached model fallback
pub struct Classifier {
    model: Option<SharedModel>,
    cache: Arc<ClassificationCache>,
    config: ClassifierConfig,
}

impl Classifier {
    /// Classifier using the process-wide cache
    pub fn new(model: Option<SharedModel>, config: ClassifierConfig) -> Result<Self, CoreError> {
        Self::with_cache(model, config, ClassificationCache::global())
    }

    pub fn with_cache(
        model: Option<SharedModel>,
        config: ClassifierConfig,
        cache: Arc<ClassificationCache>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self { model, cache, config })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Classify one signal
    pub async fn classify(&self, signal: &Signal) -> Result<Classification, ClassifyError> {
        let sentiment = score_sentiment(&signal.raw_text);
        let rule = evaluate_rules(&signal.raw_text, signal.source_type);

        match Route::decide(rule, self.config.rule_threshold) {
            Route::Rule(m) => {
                debug!("Signal {} classified by rule as {} ({:.2})", signal.id, m.label, m.confidence);
                Ok(Classification::new(m.label, m.confidence, sentiment, ClassificationSource::Rule))
            }
            Route::Model { fallback } => match self.model_verdict(signal).await {
                Ok(verdict) => Ok(Classification::new(
                    verdict.label,
                    verdict.confidence,
                    sentiment,
                    ClassificationSource::Model,
                )),
                Err(e) => match fallback {
                    Some(m) => {
                        warn!(
                            "Model failed for signal {} ({}); falling back to rule label {}",
                            signal.id, e, m.label
                        );
                        Ok(Classification::new(
                            m.label,
                            m.confidence / 2.0,
                            sentiment,
                            ClassificationSource::Rule,
                        ))
                    }
                    None => Err(ClassifyError::Unavailable {
                        signal_id: signal.id.clone(),
                        source: e,
                    }),
                },
            },
        }
    }

    async fn model_verdict(&self, signal: &Signal) -> Result<ModelVerdict, ModelError> {
        let key = signal.content_key();
        if let Some(verdict) = self.cache.get(&key) {
            debug!("Cache hit for signal {}", signal.id);
            return Ok(verdict);
        }

        let model = self.model.as_ref().ok_or(ModelError::Unconfigured)?;
        let timeout = self.config.model_timeout();

        let verdict = tokio::time::timeout(timeout, model.classify_text(&signal.raw_text, &SignalLabel::ALL))
            .await
            .map_err(|_| ModelError::Timeout(timeout))??;

        Ok(self.cache.insert(&key, verdict))
    }

    /// Classify signals with bounded concurrency, yielding each signal with
    /// its outcome as soon as it is ready
    pub fn classify_stream(
        &self,
        signals: Vec<Signal>,
    ) -> impl Stream<Item = (Signal, Result<Classification, ClassifyError>)> + '_ {
        stream::iter(signals)
            .map(move |signal| async move {
                let result = self.classify(&signal).await;
                (signal, result)
            })
            .buffer_unordered(self.config.max_concurrent)
    }

    /// Classify a batch and fold the results into the signals
    pub async fn classify_batch(&self, signals: Vec<Signal>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let stream = self.classify_stream(signals);
        futures::pin_mut!(stream);

        while let Some((signal, result)) = stream.next().await {
            outcome.record(signal, result);
        }

        outcome.classified.sort_by(|a, b| a.id.cmp(&b.id));
        outcome
    }
}

/// Result of classifying a batch
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub classified: Vec<Signal>,
    pub failures: Vec<(Signal, ClassifyError)>,
}

impl BatchOutcome {
    pub fn record(&mut self, mut signal: Signal, result: Result<Classification, ClassifyError>) {
        match result {
            Ok(classification) => {
                if let Err(e) = signal.apply_classification(classification) {
                    warn!("{}", e);
                }
                self.classified.push(signal);
            }
            Err(e) => self.failures.push((signal, e)),
        }
    }
}
