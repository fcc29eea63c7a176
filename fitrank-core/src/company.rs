//! Companies referenced by signals

use serde::{Deserialize, Serialize};

/// A company exhibiting buying-intent signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    /// Stable key, usually the canonical domain
    pub id: String,
    /// Display name
    pub name: String,
    pub industry: Option<String>,
    pub geo: Option<String>,
    /// Signals referencing this company, in arrival order
    pub signal_ids: Vec<String>,
}

impl Company {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            industry: None,
            geo: None,
            signal_ids: Vec::new(),
        }
    }

    /// Create a company whose display name is derived from its id
    pub fn from_ref(id: &str) -> Self {
        Self::new(id, &display_name(id))
    }

    pub fn with_industry(mut self, industry: Option<String>) -> Self {
        self.industry = industry;
        self
    }

    pub fn with_geo(mut self, geo: Option<String>) -> Self {
        self.geo = geo;
        self
    }

    /// Attach a signal reference; repeated ids are ignored
    pub fn append_signal(&mut self, signal_id: &str) {
        if !self.signal_ids.iter().any(|id| id == signal_id) {
            self.signal_ids.push(signal_id.to_string());
        }
    }

    /// Fold another observation of the same company into this one.
    /// Missing attributes are filled in; existing ones are kept.
    pub fn merge(&mut self, other: &Company) {
        if self.industry.is_none() {
            self.industry = other.industry.clone();
        }
        if self.geo.is_none() {
            self.geo = other.geo.clone();
        }
        for id in &other.signal_ids {
            self.append_signal(id);
        }
    }
}

/// "acme-robotics.io" -> "Acme Robotics", "globex" -> "Globex"
pub fn display_name(company_ref: &str) -> String {
    let label = company_ref.split('.').next().unwrap_or(company_ref);
    label
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
