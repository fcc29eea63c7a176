//! Serper.dev provider (Google web + news JSON API)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fitrank_core::RawResult;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::{
    create_http_client, html_to_text, parse_published_date, with_retry, Recency, SearchConfig, SearchError,
    SearchOptions, SearchProvider,
};

pub const SERPER_BASE_URL: &str = "https://google.serper.dev";

/// Serper provider querying both `/search` and `/news`
pub struct SerperProvider {
    client: Client,
    api_key: String,
    base_url: String,
    config: SearchConfig,
}

impl SerperProvider {
    pub fn new(api_key: &str, config: SearchConfig) -> Result<Self, SearchError> {
        if api_key.trim().is_empty() {
            return Err(SearchError::MissingApiKey("SERPER_API_KEY"));
        }
        Ok(Self {
            client: create_http_client(&config)?,
            api_key: api_key.to_string(),
            base_url: SERPER_BASE_URL.to_string(),
            config,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn post(&self, path: &str, query: &str, options: &SearchOptions) -> Result<SerperResponse, SearchError> {
        let url = format!("{}{}", self.base_url, path);
        let mut payload = json!({ "q": query, "num": options.max_results });
        if let Some(recency) = options.recency {
            payload["tbs"] = json!(time_bound(recency));
        }

        with_retry(&self.config, &format!("serper {}", path), || async {
            let response = self
                .client
                .post(&url)
                .header("X-API-KEY", &self.api_key)
                .json(&payload)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(SearchError::from_status("serper", response.status()));
            }

            response.json::<SerperResponse>().await.map_err(|e| SearchError::Decode {
                provider: "serper".to_string(),
                message: e.to_string(),
            })
        })
        .await
    }
}

#[async_trait]
impl SearchProvider for SerperProvider {
    fn name(&self) -> &str {
        "serper"
    }

    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<RawResult>, SearchError> {
        let now = Utc::now();

        let web = self.post("/search", query, options).await?;
        let news = self.post("/news", query, options).await?;

        let results: Vec<RawResult> = web
            .organic
            .into_iter()
            .chain(news.news)
            .filter_map(|item| item.into_raw(now))
            .collect();

        debug!("Serper returned {} results for: {}", results.len(), query);
        Ok(results)
    }
}

fn time_bound(recency: Recency) -> &'static str {
    match recency {
        Recency::Week => "qdr:w",
        Recency::Month => "qdr:m",
    }
}

// Serper API response types
#[derive(Debug, Default, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperItem>,
    #[serde(default)]
    news: Vec<SerperItem>,
}

#[derive(Debug, Deserialize)]
struct SerperItem {
    #[serde(default)]
    title: String,
    link: Option<String>,
    #[serde(default)]
    snippet: String,
    date: Option<String>,
    /// Publisher name on news items
    source: Option<String>,
}

impl SerperItem {
    fn into_raw(self, now: DateTime<Utc>) -> Option<RawResult> {
        let text = html_to_text(&self.snippet);
        let title = html_to_text(&self.title);
        if text.is_empty() && title.is_empty() {
            return None;
        }

        let mut raw = RawResult::new(&text).with_title(&title);
        raw.provider = match &self.source {
            Some(source) => format!("serper:{}", source),
            None => "serper".to_string(),
        };
        if let Some(link) = &self.link {
            raw = raw.with_url(link);
        }
        if let Some(ts) = self.date.as_deref().and_then(|d| parse_published_date(d, now)) {
            raw = raw.with_timestamp(ts);
        }
        Some(raw)
    }
}
