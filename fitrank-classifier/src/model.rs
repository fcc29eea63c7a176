//! Model path: the classification-model collaborator
//!
//! The collaborator sees only the text and a closed label set, and answers
//! with a label and a confidence.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fitrank_core::{ErrorCode, SignalLabel};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{LlmError, SharedBackend};

/// Label and confidence returned by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVerdict {
    pub label: SignalLabel,
    pub confidence: f64,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model backend error: {0}")]
    Backend(#[from] LlmError),

    #[error("Malformed model response: {0}")]
    Malformed(String),

    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("No classification model configured")]
    Unconfigured,
}

impl ModelError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ModelError::Backend(e) => e.code(),
            ModelError::Malformed(_) | ModelError::Unconfigured => ErrorCode::ServiceUnavailable,
            ModelError::Timeout(_) => ErrorCode::TimeoutError,
        }
    }
}

/// Classification-model collaborator
#[async_trait]
pub trait ModelClassifier: Send + Sync {
    async fn classify_text(&self, text: &str, labels: &[SignalLabel]) -> Result<ModelVerdict, ModelError>;
}

pub type SharedModel = Arc<dyn ModelClassifier>;

/// System prompt for signal classification
const CLASSIFY_SYSTEM_PROMPT: &str = r#"
You are a company signal classifier. You read one short piece of evidence about a company
(news snippet, job posting, press release) and assign exactly one category.

Categories: {labels}

Definitions:
- hiring: the company is recruiting or opening roles
- funding: a funding round, investment or financing
- product: a product launch, release or partnership
- tech: the company adopts, migrates to or rolls out a technology
- exec: a leadership change (new or departing executive)
- other: none of the above

Return only a single JSON object, no prose and no code fences:
{"label": "<category>", "confidence": <number between 0 and 1>}
"#;

/// Model classifier backed by an LLM
pub struct LlmModelClassifier {
    backend: SharedBackend,
}

impl LlmModelClassifier {
    pub fn new(backend: SharedBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ModelClassifier for LlmModelClassifier {
    async fn classify_text(&self, text: &str, labels: &[SignalLabel]) -> Result<ModelVerdict, ModelError> {
        let label_list = labels.iter().map(|l| l.as_str()).collect::<Vec<_>>().join(", ");
        let system = CLASSIFY_SYSTEM_PROMPT.replace("{labels}", &label_list);
        let user = format!("Signal: \"{}\"", text.replace('"', "'"));

        let response = self.backend.generate(&system, &user).await?;
        parse_verdict(&response, labels)
    }
}

/// Parse a model answer into a verdict.
///
/// Accepts bare JSON, fenced JSON, or JSON surrounded by prose (the outermost
/// `{...}` is used). `type` is accepted as an alias of `label`.
pub fn parse_verdict(response: &str, labels: &[SignalLabel]) -> Result<ModelVerdict, ModelError> {
    let value: Value = match serde_json::from_str(response.trim()) {
        Ok(v) => v,
        Err(_) => {
            let start = response.find('{');
            let end = response.rfind('}');
            match (start, end) {
                (Some(s), Some(e)) if e > s => serde_json::from_str(&response[s..=e])
                    .map_err(|err| ModelError::Malformed(format!("invalid JSON: {}", err)))?,
                _ => return Err(ModelError::Malformed(format!("no JSON object in: {}", truncate(response)))),
            }
        }
    };

    let raw_label = value
        .get("label")
        .or_else(|| value.get("type"))
        .and_then(Value::as_str)
        .ok_or_else(|| ModelError::Malformed("missing label".to_string()))?;

    let label = SignalLabel::parse(raw_label)
        .filter(|l| labels.contains(l))
        .ok_or_else(|| ModelError::Malformed(format!("label outside taxonomy: {}", raw_label)))?;

    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| ModelError::Malformed("missing confidence".to_string()))?;

    if !(0.0..=1.0).contains(&confidence) {
        return Err(ModelError::Malformed(format!("confidence out of range: {}", confidence)));
    }

    Ok(ModelVerdict { label, confidence })
}

fn truncate(s: &str) -> String {
    s.chars().take(120).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedBackend(&'static str);

    #[async_trait]
    impl crate::LlmBackend for CannedBackend {
        async fn generate(&self, system: &str, user: &str) -> Result<String, LlmError> {
            assert!(system.contains("hiring, funding"));
            assert!(user.starts_with("Signal:"));
            Ok(self.0.to_string())
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    #[test]
    fn test_parse_plain_json() {
        let v = parse_verdict(r#"{"label": "tech", "confidence": 0.82}"#, &SignalLabel::ALL).unwrap();
        assert_eq!(v, ModelVerdict { label: SignalLabel::Tech, confidence: 0.82 });
    }

    #[test]
    fn test_parse_fenced_and_prose() {
        let fenced = "```json\n{\"type\": \"launch\", \"confidence\": 0.6}\n```";
        assert_eq!(parse_verdict(fenced, &SignalLabel::ALL).unwrap().label, SignalLabel::Product);

        let prose = "Sure! Here you go: {\"label\": \"leadership change\", \"confidence\": 0.9} Hope it helps.";
        assert_eq!(parse_verdict(prose, &SignalLabel::ALL).unwrap().label, SignalLabel::Exec);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(parse_verdict("I think it's hiring", &SignalLabel::ALL), Err(ModelError::Malformed(_))));
        assert!(parse_verdict(r#"{"label": "weather", "confidence": 0.5}"#, &SignalLabel::ALL).is_err());
        assert!(parse_verdict(r#"{"label": "tech", "confidence": 1.5}"#, &SignalLabel::ALL).is_err());
        assert!(parse_verdict(r#"{"label": "tech"}"#, &SignalLabel::ALL).is_err());
        assert!(parse_verdict(r#"{"label": "other", "confidence": 0.5}"#, &[SignalLabel::Tech]).is_err());
    }

    #[tokio::test]
    async fn test_llm_model_classifier() {
        let model = LlmModelClassifier::new(Arc::new(CannedBackend(r#"{"label":"funding","confidence":0.77}"#)));
        let verdict = model.classify_text("Acme closed a \"big\" round", &SignalLabel::ALL).await.unwrap();
        assert_eq!(verdict.label, SignalLabel::Funding);
        assert_eq!(verdict.confidence, 0.77);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ModelError::Timeout(Duration::from_secs(1)).code(), ErrorCode::TimeoutError);
        assert_eq!(ModelError::Backend(LlmError::RateLimited).code(), ErrorCode::RateLimitExceeded);
    }
}
