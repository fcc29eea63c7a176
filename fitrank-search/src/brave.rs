//! Brave Search provider

use async_trait::async_trait;
use chrono::Utc;
use fitrank_core::RawResult;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{
    create_http_client, html_to_text, parse_published_date, with_retry, Recency, SearchConfig, SearchError,
    SearchOptions, SearchProvider,
};

pub const BRAVE_BASE_URL: &str = "https://api.search.brave.com/res/v1/web/search";

/// Brave caps `count` at 20
const BRAVE_MAX_COUNT: usize = 20;

pub struct BraveProvider {
    client: Client,
    api_key: String,
    base_url: String,
    config: SearchConfig,
}

impl BraveProvider {
    pub fn new(api_key: &str, config: SearchConfig) -> Result<Self, SearchError> {
        if api_key.trim().is_empty() {
            return Err(SearchError::MissingApiKey("BRAVE_API_KEY"));
        }
        Ok(Self {
            client: create_http_client(&config)?,
            api_key: api_key.to_string(),
            base_url: BRAVE_BASE_URL.to_string(),
            config,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    fn build_url(&self, query: &str, options: &SearchOptions) -> String {
        let mut url = format!(
            "{}?q={}&count={}",
            self.base_url,
            urlencoding::encode(query),
            options.max_results.clamp(1, BRAVE_MAX_COUNT)
        );
        if let Some(recency) = options.recency {
            url.push_str("&freshness=");
            url.push_str(freshness(recency));
        }
        url
    }
}

#[async_trait]
impl SearchProvider for BraveProvider {
    fn name(&self) -> &str {
        "brave"
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<RawResult>, SearchError> {
        let url = self.build_url(query, options);

        let data = with_retry(&self.config, "brave search", || async {
            let response = self
                .client
                .get(&url)
                .header("Accept", "application/json")
                .header("X-Subscription-Token", &self.api_key)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(SearchError::from_status("brave", response.status()));
            }

            response.json::<BraveSearchResponse>().await.map_err(|e| SearchError::Decode {
                provider: "brave".to_string(),
                message: e.to_string(),
            })
        })
        .await?;

        let now = Utc::now();
        let results: Vec<RawResult> = data
            .web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .map(|result| {
                let mut raw = RawResult::new(&html_to_text(&result.description))
                    .with_title(&html_to_text(&result.title))
                    .with_url(&result.url);
                raw.provider = "brave".to_string();
                if let Some(ts) = result.age.as_deref().and_then(|a| parse_published_date(a, now)) {
                    raw = raw.with_timestamp(ts);
                }
                raw
            })
            .collect();

        debug!("Brave returned {} results for: {}", results.len(), query);
        Ok(results)
    }
}

fn freshness(recency: Recency) -> &'static str {
    match recency {
        Recency::Week => "pw",
        Recency::Month => "pm",
    }
}

// Brave Search API response types
#[derive(Debug, Deserialize)]
struct BraveSearchResponse {
    web: Option<BraveWebResults>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResults {
    results: Vec<BraveWebResult>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResult {
    title: String,
    url: String,
    #[serde(default)]
    description: String,
    age: Option<String>,
}
