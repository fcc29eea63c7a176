//! Signal normalizer
//!
//! Turns heterogeneous search-provider records into uniform [`Signal`]s:
//! - Infers the owning company (explicit hint, text, job-board URL, host, name pattern)
//! - Infers the source type when the provider gave none
//! - Collapses duplicates by canonical URL and title
//!
//! Everything here is a pure function of its input plus the ingestion time.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::{display_name, Company, Signal, SourceType};

/// A provider record before normalization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResult {
    /// Text body (snippet, description, article lead)
    pub text: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Explicit company reference (domain or name)
    pub company_hint: Option<String>,
    /// Explicit company display name
    pub company_name: Option<String>,
    pub source_hint: Option<SourceType>,
    /// Provider tag, e.g. "serper:news"
    #[serde(default)]
    pub provider: String,
}

impl RawResult {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_company_hint(mut self, hint: &str) -> Self {
        self.company_hint = Some(hint.to_string());
        self
    }

    pub fn with_source(mut self, source: SourceType) -> Self {
        self.source_hint = Some(source);
        self
    }
}

/// Why a raw result was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeMiss {
    /// Nothing left after whitespace cleanup
    EmptyText,
    /// No company could be inferred
    NoCompany,
}

/// A normalized signal together with the company it references
#[derive(Debug, Clone)]
pub struct Normalized {
    pub signal: Signal,
    pub company: Company,
}

/// Result of normalizing a batch of raw results
#[derive(Debug, Clone, Default)]
pub struct NormalizeOutcome {
    pub signals: Vec<Signal>,
    /// Companies in order of first appearance
    pub companies: Vec<Company>,
    pub misses: usize,
    pub duplicates: usize,
}

static DOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}\b").unwrap()
});

static COMPANY_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b([A-Z][A-Za-z0-9&]*(?:\s+[A-Z][A-Za-z0-9&]*){0,2})\s+(?:Inc|Corp|Corporation|Ltd|LLC|GmbH|Labs|Technologies)\b",
    )
    .unwrap()
});

static FUNDING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:raised|raises|funding round|series [a-e]|seed round|pre-seed|venture funding|led the round)\b")
        .unwrap()
});

static INDUSTRY_HINTS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("Fintech", r"(?i)\b(?:fintech|payments|banking|lending|insurtech|brokerage)\b"),
        ("Healthcare", r"(?i)\b(?:healthcare|health tech|medtech|biotech|pharma|clinical)\b"),
        ("SaaS", r"(?i)\b(?:saas|software-as-a-service|b2b software|cloud software)\b"),
        ("Ecommerce", r"(?i)\b(?:e-commerce|ecommerce|retail tech|marketplace)\b"),
        ("Security", r"(?i)\b(?:cybersecurity|infosec|security)\b"),
        ("AI", r"(?i)\b(?:AI|artificial intelligence|machine learning|genai|generative ai)\b"),
        ("Data", r"(?i)\b(?:data platform|analytics|data engineering|lakehouse|data warehouse)\b"),
    ]
    .into_iter()
    .map(|(tag, pattern)| (tag, Regex::new(pattern).unwrap()))
    .collect()
});

static GEO_HINTS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("US", r"\b(?:USA|US)\b|U\.S\.|(?i:\bunited states\b|\bnew york\b|\bsan francisco\b)"),
        ("CA", r"(?i:\bcanada\b|\btoronto\b|\bvancouver\b)"),
        ("UK", r"\bUK\b|(?i:\bunited kingdom\b|\bbritain\b|\bengland\b|\blondon\b)"),
        ("EU", r"\bEU\b|(?i:\beurope\b|\beuropean\b|\bberlin\b|\bparis\b)"),
        ("IN", r"(?i:\bindia\b|\bbangalore\b|\bbengaluru\b)"),
    ]
    .into_iter()
    .map(|(code, pattern)| (code, Regex::new(pattern).unwrap()))
    .collect()
});

/// Top-level domains accepted when a domain is mentioned in free text
const KNOWN_TLDS: &[&str] = &[
    "com", "io", "ai", "co", "net", "org", "dev", "app", "tech", "cloud", "so", "xyz", "uk", "de",
    "fr", "in", "ca", "us", "eu", "nl", "se", "ch", "au", "sg", "health", "finance",
];

/// Job boards where the company slug is the first path segment
const PATH_SLUG_BOARDS: &[&str] = &[
    "greenhouse.io",
    "lever.co",
    "ashbyhq.com",
    "workable.com",
    "smartrecruiters.com",
    "wellfound.com",
    "angel.co",
];

/// Job boards where the company slug is the first host label
const SUBDOMAIN_BOARDS: &[&str] = &["myworkdayjobs.com", "bamboohr.com", "teamtailor.com", "recruitee.com"];

/// Aggregators that never identify the company they host
const JOB_AGGREGATORS: &[&str] = &["indeed.com", "glassdoor.com", "ziprecruiter.com", "monster.com", "icims.com", "jobvite.com"];

/// Publishers, social networks and search engines: never the subject company
const PUBLISHER_DOMAINS: &[&str] = &[
    "techcrunch.com", "reuters.com", "bloomberg.com", "businesswire.com", "prnewswire.com",
    "globenewswire.com", "forbes.com", "wsj.com", "cnbc.com", "venturebeat.com", "crunchbase.com",
    "medium.com", "substack.com", "yahoo.com", "google.com", "linkedin.com", "twitter.com", "x.com",
    "facebook.com", "youtube.com", "wikipedia.org", "github.com", "ycombinator.com", "axios.com",
    "theverge.com", "zdnet.com", "siliconangle.com", "finextra.com", "fiercehealthcare.com",
    "instagram.com", "reddit.com", "apple.com", "microsoft.com", "amazon.com", "nytimes.com",
    "ft.com", "theinformation.com", "sifted.eu", "eu-startups.com", "pitchbook.com",
];

/// Normalize a single raw result into a signal
pub fn normalize(raw: &RawResult, ingested_at: DateTime<Utc>) -> Result<Signal, NormalizeMiss> {
    normalize_with_company(raw, ingested_at).map(|n| n.signal)
}

/// Normalize a single raw result, also returning the referenced company
pub fn normalize_with_company(raw: &RawResult, ingested_at: DateTime<Utc>) -> Result<Normalized, NormalizeMiss> {
    let text = compose_text(raw.title.as_deref(), &raw.text);
    if text.is_empty() {
        return Err(NormalizeMiss::EmptyText);
    }

    let company_ref = infer_company_ref(raw, &text).ok_or(NormalizeMiss::NoCompany)?;
    let source_type = raw
        .source_hint
        .unwrap_or_else(|| infer_source_type(raw.url.as_deref(), &text));

    let signal = Signal::builder(&company_ref, source_type, &text)
        .maybe_url(raw.url.as_deref())
        .timestamp(raw.timestamp.unwrap_or(ingested_at))
        .build();

    let name = raw
        .company_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| display_name(&company_ref));

    let mut company = Company::new(&company_ref, &name)
        .with_industry(infer_industry(&text))
        .with_geo(infer_geo(&text));
    company.append_signal(&signal.id);

    Ok(Normalized { signal, company })
}

/// Normalize a batch, dropping misses and duplicates.
///
/// Duplicates are detected by canonical URL (host + path), then by
/// host + title, then by signal id. The first occurrence wins.
pub fn normalize_batch(raws: &[RawResult], ingested_at: DateTime<Utc>) -> NormalizeOutcome {
    let mut outcome = NormalizeOutcome::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut company_index: HashMap<String, usize> = HashMap::new();

    for raw in raws {
        let normalized = match normalize_with_company(raw, ingested_at) {
            Ok(n) => n,
            Err(_) => {
                outcome.misses += 1;
                continue;
            }
        };

        let keys = dedupe_keys(raw, &normalized.signal);
        if keys.iter().any(|k| seen.contains(k)) {
            outcome.duplicates += 1;
            continue;
        }
        seen.extend(keys);

        match company_index.get(&normalized.company.id) {
            Some(&idx) => outcome.companies[idx].merge(&normalized.company),
            None => {
                company_index.insert(normalized.company.id.clone(), outcome.companies.len());
                outcome.companies.push(normalized.company);
            }
        }
        outcome.signals.push(normalized.signal);
    }

    outcome
}

fn dedupe_keys(raw: &RawResult, signal: &Signal) -> Vec<String> {
    let mut keys = vec![format!("id:{}", signal.id)];

    if let Some(url) = raw.url.as_deref() {
        let host = host_of(url).unwrap_or_default();
        let path = path_of(url).trim_end_matches('/');
        let path = if path.is_empty() { "/" } else { path };
        keys.push(format!("url:{}{}", host, path));

        if let Some(title) = raw.title.as_deref() {
            let title = collapse_whitespace(title).to_lowercase();
            if !title.is_empty() {
                keys.push(format!("title:{}||{}", host, title));
            }
        }
    }

    keys
}

fn compose_text(title: Option<&str>, body: &str) -> String {
    let body = collapse_whitespace(body);
    let title = title.map(collapse_whitespace).unwrap_or_default();

    if title.is_empty() {
        body
    } else if body.is_empty() {
        title
    } else if body.starts_with(&title) {
        body
    } else {
        format!("{}. {}", title.trim_end_matches('.'), body)
    }
}

/// Collapse runs of whitespace into single spaces
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn infer_company_ref(raw: &RawResult, text: &str) -> Option<String> {
    if let Some(hint) = raw.company_hint.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
        return company_ref_from_hint(hint);
    }

    // The page's own board or site outranks domains the text merely mentions
    if let Some(url) = raw.url.as_deref() {
        if let Some(slug) = job_board_slug(url) {
            return Some(slug);
        }
        if let Some(host) = host_of(url) {
            let domain = canonical_domain(&host);
            if !is_non_company_domain(&domain) {
                return Some(domain);
            }
        }
    }

    if let Some(domain) = domain_in_text(text) {
        return Some(domain);
    }

    COMPANY_NAME_REGEX
        .captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| slugify(m.as_str()))
        .filter(|s| !s.is_empty())
}

fn company_ref_from_hint(hint: &str) -> Option<String> {
    if hint.contains("://") {
        return host_of(hint).map(|h| canonical_domain(&h));
    }
    if hint.contains('.') && !hint.contains(char::is_whitespace) {
        return Some(canonical_domain(hint));
    }
    let slug = slugify(hint);
    if slug.is_empty() {
        None
    } else {
        Some(slug)
    }
}

fn domain_in_text(text: &str) -> Option<String> {
    DOMAIN_REGEX
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|d| {
            d.rsplit('.')
                .next()
                .map(|tld| KNOWN_TLDS.contains(&tld))
                .unwrap_or(false)
        })
        .map(|d| canonical_domain(&d))
        .find(|d| !is_non_company_domain(d))
}

fn job_board_slug(url: &str) -> Option<String> {
    let host = host_of(url)?;

    if PATH_SLUG_BOARDS.iter().any(|b| host == *b || host.ends_with(&format!(".{}", b))) {
        let slug = path_of(url)
            .split('/')
            .filter(|seg| !seg.is_empty())
            .find(|seg| !matches!(*seg, "company" | "companies" | "jobs" | "j"))?;
        let slug = slugify(slug);
        return if slug.is_empty() { None } else { Some(slug) };
    }

    if let Some(board) = SUBDOMAIN_BOARDS.iter().find(|b| host.ends_with(&format!(".{}", b))) {
        let prefix = host.trim_end_matches(*board).trim_end_matches('.');
        let slug = slugify(prefix.split('.').next().unwrap_or_default());
        return if slug.is_empty() { None } else { Some(slug) };
    }

    None
}

fn infer_source_type(url: Option<&str>, text: &str) -> SourceType {
    if let Some(url) = url {
        let host = host_of(url).unwrap_or_default();
        let path = path_of(url).to_lowercase();

        let is_job_host = PATH_SLUG_BOARDS
            .iter()
            .chain(SUBDOMAIN_BOARDS)
            .chain(JOB_AGGREGATORS)
            .any(|b| host == *b || host.ends_with(&format!(".{}", b)));
        if is_job_host || path.contains("/careers") || path.contains("/jobs") {
            return SourceType::JobPosting;
        }
        if host.contains("press") || host.contains("newsroom") || path.contains("/press") || path.contains("/newsroom") {
            return SourceType::Press;
        }
    }

    if FUNDING_REGEX.is_match(text) {
        return SourceType::Funding;
    }

    if url.is_some() {
        SourceType::News
    } else {
        SourceType::Other
    }
}

fn infer_industry(text: &str) -> Option<String> {
    INDUSTRY_HINTS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(tag, _)| tag.to_string())
}

fn infer_geo(text: &str) -> Option<String> {
    GEO_HINTS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(code, _)| code.to_string())
}

fn is_non_company_domain(domain: &str) -> bool {
    PUBLISHER_DOMAINS
        .iter()
        .chain(JOB_AGGREGATORS)
        .chain(PATH_SLUG_BOARDS)
        .chain(SUBDOMAIN_BOARDS)
        .any(|d| domain == *d)
}

/// Lowercased host of a URL, without port or credentials
pub fn host_of(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?.split(':').next()?.trim().to_lowercase();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

fn path_of(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    rest.find('/').map(|i| &rest[i..]).unwrap_or("")
}

/// Canonical registrable domain: lowercase, no `www.`, naive eTLD+1
/// with support for two-level country suffixes such as `co.uk`.
pub fn canonical_domain(domain: &str) -> String {
    let d = domain.trim().trim_end_matches('.').to_lowercase();
    let d = d.strip_prefix("www.").unwrap_or(&d);
    let parts: Vec<&str> = d.split('.').collect();
    if parts.len() <= 2 {
        return d.to_string();
    }

    let n = parts.len();
    let second_level = parts[n - 2];
    let keep = if parts[n - 1].len() == 2 && matches!(second_level, "co" | "com" | "ac" | "org" | "net" | "gov") {
        3
    } else {
        2
    };
    parts[n - keep..].join(".")
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}
