//! Fit score engine
//!
//! Aggregates a company's classified signals into a bounded [0,1] score:
//!
//! ```text
//! score = 0.35*techSignal + 0.25*recentVolume + 0.20*execChange + 0.10*sentiment + 0.10*funding
//! ```
//!
//! Each feature is normalized to [0,1]. The weights are validated once, when
//! the [`FitScorer`] is built, and never per call. Features whose value clears
//! the reporting floor are disclosed as reasons, strongest contribution first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signals::clamp_unit;
use crate::{
    Company, CoreError, Signal, SignalLabel, DEFAULT_LOOKBACK_DAYS, DEFAULT_REASON_FLOOR,
    DEFAULT_RECENT_WINDOW_DAYS, DEFAULT_VOLUME_CAP,
};

const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Scored features, in disclosure tie-break order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    TechSignal,
    RecentVolume,
    ExecChange,
    Sentiment,
    Funding,
}

impl Feature {
    pub const ALL: [Feature; 5] = [
        Feature::TechSignal,
        Feature::RecentVolume,
        Feature::ExecChange,
        Feature::Sentiment,
        Feature::Funding,
    ];

    /// Name used in reason strings
    pub fn label(&self) -> &'static str {
        match self {
            Feature::TechSignal => "techSignals",
            Feature::RecentVolume => "recentVolume",
            Feature::ExecChange => "execChanges",
            Feature::Sentiment => "sentiment",
            Feature::Funding => "funding",
        }
    }
}

/// Convex weights of the fit score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitWeights {
    pub tech_signal: f64,
    pub recent_volume: f64,
    pub exec_change: f64,
    pub sentiment: f64,
    pub funding: f64,
}

impl Default for FitWeights {
    fn default() -> Self {
        Self {
            tech_signal: 0.35,
            recent_volume: 0.25,
            exec_change: 0.20,
            sentiment: 0.10,
            funding: 0.10,
        }
    }
}

impl FitWeights {
    pub fn weight(&self, feature: Feature) -> f64 {
        match feature {
            Feature::TechSignal => self.tech_signal,
            Feature::RecentVolume => self.recent_volume,
            Feature::ExecChange => self.exec_change,
            Feature::Sentiment => self.sentiment,
            Feature::Funding => self.funding,
        }
    }

    pub fn sum(&self) -> f64 {
        Feature::ALL.iter().map(|f| self.weight(*f)).sum()
    }

    /// Every weight in [0,1] and the total equal to 1.0
    pub fn validate(&self) -> Result<(), CoreError> {
        for feature in Feature::ALL {
            let w = self.weight(feature);
            if !(0.0..=1.0).contains(&w) {
                return Err(CoreError::InvalidConfig(format!(
                    "weight for {} must be within [0, 1], got {}",
                    feature.label(),
                    w
                )));
            }
        }

        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(CoreError::InvalidConfig(format!("weights must sum to 1.0, got {}", sum)));
        }
        Ok(())
    }
}

/// Presentation strength of a disclosed feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    Strong,
    Moderate,
    #[serde(rename = "some")]
    Weak,
}

/// Thresholds mapping a feature value to a [`Strength`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrengthBands {
    pub strong: f64,
    pub moderate: f64,
    pub some: f64,
}

impl Default for StrengthBands {
    fn default() -> Self {
        Self {
            strong: 0.70,
            moderate: 0.50,
            some: 0.30,
        }
    }
}

impl StrengthBands {
    pub fn classify(&self, value: f64) -> Option<Strength> {
        if value >= self.strong {
            Some(Strength::Strong)
        } else if value >= self.moderate {
            Some(Strength::Moderate)
        } else if value >= self.some {
            Some(Strength::Weak)
        } else {
            None
        }
    }
}

/// Fit score engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: FitWeights,
    /// Tech, leadership and funding evidence older than this is ignored
    pub lookback_days: i64,
    /// Window for counting recent volume
    pub recent_window_days: i64,
    /// Count at which recent volume saturates
    pub volume_cap: f64,
    /// Minimum feature value disclosed as a reason
    pub reason_floor: f64,
    pub bands: StrengthBands,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: FitWeights::default(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            recent_window_days: DEFAULT_RECENT_WINDOW_DAYS,
            volume_cap: DEFAULT_VOLUME_CAP,
            reason_floor: DEFAULT_REASON_FLOOR,
            bands: StrengthBands::default(),
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        self.weights.validate()?;

        if self.lookback_days <= 0 || self.recent_window_days <= 0 {
            return Err(CoreError::InvalidConfig("windows must be positive".to_string()));
        }
        if self.volume_cap.is_nan() || self.volume_cap <= 0.0 {
            return Err(CoreError::InvalidConfig("volume_cap must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.reason_floor) {
            return Err(CoreError::InvalidConfig("reason_floor must be within [0, 1]".to_string()));
        }
        let b = &self.bands;
        if !(0.0..=1.0).contains(&b.some) || !(b.some <= b.moderate && b.moderate <= b.strong && b.strong <= 1.0) {
            return Err(CoreError::InvalidConfig(
                "strength bands must satisfy 0 <= some <= moderate <= strong <= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-company features, each in [0,1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    pub tech_signal: f64,
    pub recent_volume: f64,
    pub exec_change: f64,
    pub sentiment: f64,
    pub funding: f64,
}

impl FeatureVector {
    pub fn get(&self, feature: Feature) -> f64 {
        match feature {
            Feature::TechSignal => self.tech_signal,
            Feature::RecentVolume => self.recent_volume,
            Feature::ExecChange => self.exec_change,
            Feature::Sentiment => self.sentiment,
            Feature::Funding => self.funding,
        }
    }
}

/// A disclosed feature contribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    pub feature: Feature,
    /// Feature value in [0,1]
    pub value: f64,
    /// weight * value
    pub contribution: f64,
    pub strength: Option<Strength>,
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:.2}", self.feature.label(), self.value)
    }
}

/// A company's score with its evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitScore {
    pub company_ref: String,
    pub score: f64,
    pub features: FeatureVector,
    pub reasons: Vec<Reason>,
}

impl FitScore {
    pub fn zero(company_ref: &str) -> Self {
        Self {
            company_ref: company_ref.to_string(),
            score: 0.0,
            features: FeatureVector::default(),
            reasons: Vec::new(),
        }
    }

    /// Reasons formatted as `"{feature} {value:.2}"`
    pub fn reason_strings(&self) -> Vec<String> {
        self.reasons.iter().map(|r| r.to_string()).collect()
    }
}

/// Validated fit score engine
#[derive(Debug, Clone)]
pub struct FitScorer {
    config: ScoringConfig,
}

impl FitScorer {
    /// Build a scorer; the configuration is validated here once
    pub fn new(config: ScoringConfig) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Compute the fit score of `company` from its signals as of `as_of`.
    ///
    /// Unclassified signals and signals of other companies are ignored. A
    /// company without classified signals scores 0 with no reasons.
    pub fn compute(&self, company: &Company, signals: &[Signal], as_of: DateTime<Utc>) -> FitScore {
        let relevant: Vec<&Signal> = signals
            .iter()
            .filter(|s| s.company_ref == company.id && s.is_classified())
            .collect();

        if relevant.is_empty() {
            return FitScore::zero(&company.id);
        }

        let features = self.extract_features(&relevant, as_of);
        let weights = &self.config.weights;

        let score = clamp_unit(Feature::ALL.iter().map(|f| weights.weight(*f) * features.get(*f)).sum());

        let mut reasons: Vec<Reason> = Feature::ALL
            .iter()
            .map(|&feature| {
                let value = features.get(feature);
                Reason {
                    feature,
                    value,
                    contribution: weights.weight(feature) * value,
                    strength: self.config.bands.classify(value),
                }
            })
            .filter(|r| r.value >= self.config.reason_floor)
            .collect();
        // Stable sort keeps feature order for equal contributions
        reasons.sort_by(|a, b| b.contribution.total_cmp(&a.contribution));

        FitScore {
            company_ref: company.id.clone(),
            score,
            features,
            reasons,
        }
    }

    /// Derive the feature vector from classified signals
    pub fn extract_features(&self, signals: &[&Signal], as_of: DateTime<Utc>) -> FeatureVector {
        let lookback = self.config.lookback_days as f64;
        let recent_window = self.config.recent_window_days as f64;

        let mut tech: f64 = 0.0;
        let mut exec: f64 = 0.0;
        let mut funding: f64 = 0.0;
        let mut recent_count = 0usize;
        let mut sentiment_sum = 0.0;
        let mut sentiment_n = 0usize;

        for signal in signals {
            let Some(classification) = signal.classification() else {
                continue;
            };
            let age = signal.age_days(as_of).max(0.0);
            let confidence = classification.confidence;

            if age <= recent_window {
                recent_count += 1;
            }

            sentiment_sum += classification.sentiment;
            sentiment_n += 1;

            if age > lookback {
                continue;
            }

            match classification.label {
                SignalLabel::Tech => {
                    let decayed = confidence * (1.0 - age / lookback);
                    tech = tech.max(decayed);
                }
                SignalLabel::Exec => exec = exec.max(confidence),
                SignalLabel::Funding => funding = funding.max(confidence),
                _ => {}
            }
        }

        let sentiment = if sentiment_n == 0 {
            0.5
        } else {
            (sentiment_sum / sentiment_n as f64 + 1.0) / 2.0
        };

        FeatureVector {
            tech_signal: clamp_unit(tech),
            recent_volume: clamp_unit(recent_count as f64 / self.config.volume_cap),
            exec_change: clamp_unit(exec),
            sentiment: clamp_unit(sentiment),
            funding: clamp_unit(funding),
        }
    }
}
