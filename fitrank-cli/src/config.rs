//! `fitrank.toml` loading, startup validation and service wiring

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use fitrank_classifier::{create_backend_for, Classifier, ClassifierConfig, LlmModelClassifier, LlmProvider, SharedModel};
use fitrank_core::{FitScorer, ScoringConfig};
use fitrank_runtime::{InMemoryStore, JobRegistry, Orchestrator, OrchestratorConfig};
use fitrank_search::{BraveProvider, FanoutSearch, SearchConfig, SerperProvider, SharedSearch};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Everything in `fitrank.toml`; every section is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitrankConfig {
    pub scoring: ScoringConfig,
    pub classifier: ClassifierConfig,
    pub search: SearchConfig,
    pub orchestrator: OrchestratorConfig,
    pub server: ServerConfig,
}

impl FitrankConfig {
    /// Read the file at `path`, or use defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.scoring.validate()?;
        self.classifier.validate()?;
        self.orchestrator.validate()?;

        for name in &self.search.providers {
            if !matches!(name.as_str(), "serper" | "brave") {
                bail!("unknown search provider: {}", name);
            }
        }
        if self.search.max_queries == 0 || self.search.max_concurrent == 0 {
            bail!("search.max_queries and search.max_concurrent must be positive");
        }

        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .with_context(|| format!("invalid server.bind: {}", self.server.bind))
    }
}

/// API keys, from flags or the environment
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub serper: Option<String>,
    pub brave: Option<String>,
    pub openai: Option<String>,
    pub openrouter: Option<String>,
    pub anthropic: Option<String>,
}

impl Secrets {
    pub fn model_key(&self, provider: LlmProvider) -> Option<&str> {
        match provider {
            LlmProvider::OpenAI => self.openai.as_deref(),
            LlmProvider::OpenRouter => self.openrouter.as_deref(),
            LlmProvider::Anthropic => self.anthropic.as_deref(),
            LlmProvider::Local => None,
        }
    }
}

/// Wire the pipeline from a validated configuration.
///
/// Missing model or search keys disable those collaborators with a warning.
pub fn build_registry(config: &FitrankConfig, secrets: &Secrets) -> Result<JobRegistry> {
    let scorer = FitScorer::new(config.scoring.clone())?;

    let classifier_config = &config.classifier;
    let model: Option<SharedModel> = match create_backend_for(
        classifier_config.provider,
        &classifier_config.model,
        secrets.model_key(classifier_config.provider),
        classifier_config.base_url.as_deref(),
    ) {
        Ok(backend) => {
            info!("Model fallback: {} via {}", backend.model_name(), classifier_config.provider.as_str());
            Some(Arc::new(LlmModelClassifier::new(backend)))
        }
        Err(e) => {
            warn!("Model fallback disabled: {}", e);
            None
        }
    };
    let classifier = Classifier::new(model, classifier_config.clone())?;

    let search = build_search(&config.search, secrets)?;

    let orchestrator = Orchestrator::new(Arc::new(classifier), Arc::new(InMemoryStore::new()), scorer)
        .with_search(search, config.search.clone())
        .with_config(config.orchestrator.clone());

    Ok(JobRegistry::new(Arc::new(orchestrator)))
}

fn build_search(config: &SearchConfig, secrets: &Secrets) -> Result<Option<SharedSearch>> {
    let mut providers: Vec<SharedSearch> = Vec::new();

    for name in &config.providers {
        match name.as_str() {
            "serper" => match &secrets.serper {
                Some(key) => providers.push(Arc::new(SerperProvider::new(key, config.clone())?)),
                None => warn!("Serper configured but SERPER_API_KEY is not set"),
            },
            "brave" => match &secrets.brave {
                Some(key) => providers.push(Arc::new(BraveProvider::new(key, config.clone())?)),
                None => warn!("Brave configured but BRAVE_API_KEY is not set"),
            },
            other => bail!("unknown search provider: {}", other),
        }
    }

    if providers.is_empty() {
        warn!("No web search provider available; only offline raw results can be ranked");
        return Ok(None);
    }

    info!("Web search across {} provider(s)", providers.len());
    let search: SharedSearch = Arc::new(FanoutSearch::new(providers, config.max_concurrent));
    Ok(Some(search))
}
