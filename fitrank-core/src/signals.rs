//! Buying-intent signals gathered from web search results
//!
//! A signal is one piece of evidence (job posting, news item, funding
//! announcement...) attached to exactly one company. It is created by the
//! normalizer, classified exactly once, and immutable afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::CoreError;

/// Where a signal came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    JobPosting,
    News,
    Funding,
    Press,
    Other,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::JobPosting => "job_posting",
            SourceType::News => "news",
            SourceType::Funding => "funding",
            SourceType::Press => "press",
            SourceType::Other => "other",
        }
    }

    /// Parse provider vocabulary (`job`, `jobs`, `newsroom`, ...) into a source type
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "job_posting" | "job" | "jobs" | "job posting" => Some(SourceType::JobPosting),
            "news" | "blog" | "report" => Some(SourceType::News),
            "funding" | "finance" => Some(SourceType::Funding),
            "press" | "newsroom" | "press_release" => Some(SourceType::Press),
            "other" | "social" | "gov" => Some(SourceType::Other),
            _ => None,
        }
    }
}

/// Closed taxonomy of signal labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalLabel {
    /// Hiring activity
    Hiring,
    /// Funding round or financing
    Funding,
    /// Product launch or partnership
    Product,
    /// Technology adoption or migration
    Tech,
    /// Leadership change
    Exec,
    /// Anything else
    Other,
}

impl SignalLabel {
    /// Every label, in taxonomy order
    pub const ALL: [SignalLabel; 6] = [
        SignalLabel::Hiring,
        SignalLabel::Funding,
        SignalLabel::Product,
        SignalLabel::Tech,
        SignalLabel::Exec,
        SignalLabel::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalLabel::Hiring => "hiring",
            SignalLabel::Funding => "funding",
            SignalLabel::Product => "product",
            SignalLabel::Tech => "tech",
            SignalLabel::Exec => "exec",
            SignalLabel::Other => "other",
        }
    }

    /// Lenient parse accepting the synonyms models tend to answer with
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "hiring" | "jobs" | "recruiting" => Some(SignalLabel::Hiring),
            "funding" | "finance" | "financing" => Some(SignalLabel::Funding),
            "product" | "launch" | "partnership" => Some(SignalLabel::Product),
            "tech" | "tech_adoption" | "technology" => Some(SignalLabel::Tech),
            "exec" | "leadership" | "leadership_change" | "exec_change" => Some(SignalLabel::Exec),
            "other" => Some(SignalLabel::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for SignalLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which branch of the classifier produced a label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Rule,
    Model,
}

/// Classifier output, folded into its signal as a single unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: SignalLabel,
    /// Confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Sentiment (-1.0 - 1.0)
    pub sentiment: f64,
    pub source: ClassificationSource,
}

impl Classification {
    pub fn new(label: SignalLabel, confidence: f64, sentiment: f64, source: ClassificationSource) -> Self {
        Self {
            label,
            confidence: clamp_unit(confidence),
            sentiment: if sentiment.is_nan() { 0.0 } else { sentiment.clamp(-1.0, 1.0) },
            source,
        }
    }
}

/// A single piece of buying-intent evidence for one company
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Content-derived identifier
    pub id: String,

    /// Company this signal belongs to
    pub company_ref: String,

    pub source_type: SourceType,

    /// Normalized text body
    pub raw_text: String,

    pub url: Option<String>,

    /// Publication time, or ingestion time when the provider gave none
    pub timestamp: DateTime<Utc>,

    /// Label, confidence and sentiment, written together exactly once
    classification: Option<Classification>,
}

impl Signal {
    /// Create a new signal builder
    pub fn builder(company_ref: &str, source_type: SourceType, raw_text: &str) -> SignalBuilder {
        SignalBuilder::new(company_ref, source_type, raw_text)
    }

    pub fn label(&self) -> Option<SignalLabel> {
        self.classification.as_ref().map(|c| c.label)
    }

    pub fn confidence(&self) -> Option<f64> {
        self.classification.as_ref().map(|c| c.confidence)
    }

    pub fn sentiment(&self) -> Option<f64> {
        self.classification.as_ref().map(|c| c.sentiment)
    }

    pub fn classification(&self) -> Option<&Classification> {
        self.classification.as_ref()
    }

    pub fn is_classified(&self) -> bool {
        self.classification.is_some()
    }

    /// Fold a classification into this signal. A signal is classified once.
    pub fn apply_classification(&mut self, classification: Classification) -> Result<(), CoreError> {
        if self.classification.is_some() {
            return Err(CoreError::AlreadyClassified(self.id.clone()));
        }
        self.classification = Some(classification);
        Ok(())
    }

    /// Consuming variant of [`Signal::apply_classification`]
    pub fn classified(mut self, classification: Classification) -> Result<Self, CoreError> {
        self.apply_classification(classification)?;
        Ok(self)
    }

    /// Cache key over `(source_type, raw_text)`; identical content shares a key
    /// regardless of company or run.
    pub fn content_key(&self) -> String {
        content_hash(&self.raw_text, self.source_type)
    }

    /// Age in fractional days relative to `as_of` (negative for future timestamps)
    pub fn age_days(&self, as_of: DateTime<Utc>) -> f64 {
        (as_of - self.timestamp).num_seconds() as f64 / 86_400.0
    }

    fn compute_id(company_ref: &str, url: Option<&str>, raw_text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(company_ref.as_bytes());
        hasher.update([0u8]);
        hasher.update(url.unwrap_or_default().as_bytes());
        hasher.update([0u8]);
        hasher.update(raw_text.as_bytes());
        format!("{:x}", hasher.finalize())[..16].to_string()
    }
}

/// Hex SHA-256 over a signal's source type and text
pub fn content_hash(raw_text: &str, source_type: SourceType) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_type.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(raw_text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub(crate) fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Builder for signals
pub struct SignalBuilder {
    company_ref: String,
    source_type: SourceType,
    raw_text: String,
    url: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

impl SignalBuilder {
    pub fn new(company_ref: &str, source_type: SourceType, raw_text: &str) -> Self {
        Self {
            company_ref: company_ref.to_string(),
            source_type,
            raw_text: raw_text.to_string(),
            url: None,
            timestamp: None,
        }
    }

    pub fn url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn maybe_url(mut self, url: Option<&str>) -> Self {
        self.url = url.map(str::to_string);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn build(self) -> Signal {
        let id = Signal::compute_id(&self.company_ref, self.url.as_deref(), &self.raw_text);

        Signal {
            id,
            company_ref: self.company_ref,
            source_type: self.source_type,
            raw_text: self.raw_text,
            url: self.url,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            classification: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_signal_id_is_deterministic() {
        let a = Signal::builder("acme.com", SourceType::News, "Acme raised $20M")
            .url("https://news.example.com/acme")
            .timestamp(fixed_time())
            .build();
        let b = Signal::builder("acme.com", SourceType::News, "Acme raised $20M")
            .url("https://news.example.com/acme")
            .timestamp(fixed_time())
            .build();

        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 16);
        assert!(!a.is_classified());
    }

    #[test]
    fn test_classification_written_once() {
        let mut signal = Signal::builder("acme.com", SourceType::News, "Acme adopts Snowflake")
            .timestamp(fixed_time())
            .build();

        let c = Classification::new(SignalLabel::Tech, 0.9, 0.4, ClassificationSource::Rule);
        signal.apply_classification(c.clone()).unwrap();

        assert_eq!(signal.label(), Some(SignalLabel::Tech));
        assert_eq!(signal.confidence(), Some(0.9));
        assert_eq!(signal.sentiment(), Some(0.4));

        let again = signal.apply_classification(c);
        assert!(matches!(again, Err(CoreError::AlreadyClassified(_))));
    }

    #[test]
    fn test_classification_clamps_ranges() {
        let c = Classification::new(SignalLabel::Other, 1.7, -3.0, ClassificationSource::Model);
        assert_eq!(c.confidence, 1.0);
        assert_eq!(c.sentiment, -1.0);
    }

    #[test]
    fn test_content_key_ignores_company() {
        let a = Signal::builder("acme.com", SourceType::Press, "We are hiring data engineers").build();
        let b = Signal::builder("globex.com", SourceType::Press, "We are hiring data engineers").build();
        let c = Signal::builder("acme.com", SourceType::JobPosting, "We are hiring data engineers").build();

        assert_eq!(a.content_key(), b.content_key());
        assert_ne!(a.content_key(), c.content_key());
    }

    #[test]
    fn test_label_parse_synonyms() {
        assert_eq!(SignalLabel::parse("Launch"), Some(SignalLabel::Product));
        assert_eq!(SignalLabel::parse("leadership change"), Some(SignalLabel::Exec));
        assert_eq!(SignalLabel::parse("tech-adoption"), Some(SignalLabel::Tech));
        assert_eq!(SignalLabel::parse("weather"), None);
    }

    #[test]
    fn test_age_days() {
        let signal = Signal::builder("acme.com", SourceType::News, "text")
            .timestamp(fixed_time())
            .build();
        let later = fixed_time() + chrono::Duration::days(45);
        assert!((signal.age_days(later) - 45.0).abs() < 1e-9);
    }
}
