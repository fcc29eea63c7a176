//! Rule path: fixed regex taxonomy
//!
//! Each rule carries a base confidence. Per label, the strongest matching
//! rule sets the confidence and every additional hit adds a small bonus.
//! Source types carry priors (job postings lean hiring, funding feeds lean
//! funding).

use std::sync::LazyLock;

use fitrank_core::{SignalLabel, SourceType};
use regex::Regex;

/// Added per extra hit for the same label
const EXTRA_HIT_BONUS: f64 = 0.05;

/// Rule confidence never exceeds this
const MAX_RULE_CONFIDENCE: f64 = 0.95;

/// Prior from a matching source type
const SOURCE_PRIOR: f64 = 0.80;

struct Rule {
    label: SignalLabel,
    pattern: Regex,
    confidence: f64,
}

fn rule(label: SignalLabel, pattern: &str, confidence: f64) -> Rule {
    Rule {
        label,
        pattern: Regex::new(&format!("(?i){}", pattern)).unwrap(),
        confidence,
    }
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        // Hiring
        rule(
            SignalLabel::Hiring,
            r"\b(we'?re hiring|we are hiring|now hiring|is hiring|job openings?|open positions?|open roles?|join our team)\b",
            0.85,
        ),
        rule(SignalLabel::Hiring, r"\b(hiring|recruiting|headcount|apply now)\b", 0.65),
        // Funding
        rule(
            SignalLabel::Funding,
            r"(\bseries [a-e]\b|\bseed round\b|\bpre-seed\b|\bfunding round\b|\braise[sd]? \$|\bclose[sd]? \$)",
            0.90,
        ),
        rule(
            SignalLabel::Funding,
            r"\b(funding|investment|investors?|valuation|financing|backed by)\b",
            0.70,
        ),
        // Product
        rule(
            SignalLabel::Product,
            r"\b(launch(es|ed)?|unveil(s|ed)?|introduc(es|ed|ing)|now available|general availability)\b",
            0.80,
        ),
        rule(
            SignalLabel::Product,
            r"\b(partner(s|ed|ship)|integration with|new product|announce[sd]?)\b",
            0.60,
        ),
        // Technology adoption
        rule(
            SignalLabel::Tech,
            r"\b(migrat(es|ed|ing|ion) to|adopt(s|ed|ing)?|rolls? out|switch(es|ed)? to|moves? to|implement(s|ed|ing))\b",
            0.80,
        ),
        rule(
            SignalLabel::Tech,
            r"\b(kubernetes|snowflake|databricks|aws|azure|gcp|salesforce|hubspot|kafka|terraform|data platform|cloud migration|tech stack)\b",
            0.70,
        ),
        // Leadership change
        rule(
            SignalLabel::Exec,
            r"\b(new|appoints?|appointed|names?|named)\s+(\w+\s+){0,2}(ceo|cto|cfo|coo|cmo|cio|ciso|chief|president|vp|head of)\b",
            0.85,
        ),
        rule(
            SignalLabel::Exec,
            r"\b(steps down|stepping down|resigns?|resigned|leadership change|joins as)\b",
            0.80,
        ),
    ]
});

/// Best rule-path label for a text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleMatch {
    pub label: SignalLabel,
    pub confidence: f64,
    /// Pattern matches behind the label
    pub hits: usize,
}

/// Evaluate the rule table. `None` means the rule path produced no label.
pub fn evaluate_rules(text: &str, source_type: SourceType) -> Option<RuleMatch> {
    let text = text.trim();

    let mut best: Option<RuleMatch> = None;

    for label in SignalLabel::ALL {
        let mut top: f64 = 0.0;
        let mut hits = 0usize;

        if !text.is_empty() {
            for r in RULES.iter().filter(|r| r.label == label) {
                let n = r.pattern.find_iter(text).count();
                if n > 0 {
                    hits += n;
                    top = top.max(r.confidence);
                }
            }
        }

        let mut confidence = if hits > 0 {
            (top + EXTRA_HIT_BONUS * (hits - 1) as f64).min(MAX_RULE_CONFIDENCE)
        } else {
            0.0
        };

        if let Some(prior) = source_prior(source_type, label) {
            confidence = confidence.max(prior);
        }

        if confidence <= 0.0 {
            continue;
        }

        // Strict comparison keeps taxonomy order on ties
        if best.map_or(true, |b| confidence > b.confidence) {
            best = Some(RuleMatch {
                label,
                confidence,
                hits,
            });
        }
    }

    if text.is_empty() {
        return None;
    }
    best
}

fn source_prior(source_type: SourceType, label: SignalLabel) -> Option<f64> {
    match (source_type, label) {
        (SourceType::JobPosting, SignalLabel::Hiring) => Some(SOURCE_PRIOR),
        (SourceType::Funding, SignalLabel::Funding) => Some(SOURCE_PRIOR),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str) -> Option<RuleMatch> {
        evaluate_rules(text, SourceType::News)
    }

    #[test]
    fn test_tech_adoption() {
        let m = eval("Acme migrates to Kubernetes").unwrap();
        assert_eq!(m.label, SignalLabel::Tech);
        assert_eq!(m.hits, 2);
        assert!((m.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_funding_beats_hiring() {
        let m = eval("Acme raises $20M Series B to expand hiring").unwrap();
        assert_eq!(m.label, SignalLabel::Funding);
        assert!((m.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_exec_change() {
        let m = eval("Globex names new CTO").unwrap();
        assert_eq!(m.label, SignalLabel::Exec);
        assert!((m.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_is_capped() {
        let m = eval("We're hiring! Now hiring, open roles, join our team, apply now").unwrap();
        assert_eq!(m.label, SignalLabel::Hiring);
        assert_eq!(m.confidence, MAX_RULE_CONFIDENCE);
    }

    #[test]
    fn test_source_prior() {
        let m = evaluate_rules("Senior Data Engineer, Remote", SourceType::JobPosting).unwrap();
        assert_eq!(m.label, SignalLabel::Hiring);
        assert_eq!(m.confidence, SOURCE_PRIOR);
        assert_eq!(m.hits, 0);
    }

    #[test]
    fn test_weak_match_below_threshold() {
        let m = eval("Acme announces quarterly update").unwrap();
        assert_eq!(m.label, SignalLabel::Product);
        assert!(m.confidence < 0.75);
    }

    #[test]
    fn test_no_match() {
        assert!(eval("Acme hosts a company picnic").is_none());
        assert!(evaluate_rules("   ", SourceType::JobPosting).is_none());
    }
}
