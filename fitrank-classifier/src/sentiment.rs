//! Lexicon sentiment
//!
//! `(pos - neg) / (pos + neg)` over word tokens, with the token after a
//! negator counted with the opposite polarity. 0.0 when no lexicon word
//! appears.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z]+(?:'[a-z]+)?").unwrap());

const POSITIVE_WORDS: &[&str] = &[
    "growth", "growing", "grows", "raised", "raises", "expand", "expands", "expanding", "expansion",
    "launch", "launches", "launched", "record", "wins", "won", "partnership", "strong", "success",
    "successful", "innovative", "secures", "secured", "award", "profitable", "surge", "milestone",
    "accelerate", "accelerates", "improve", "improves", "improved", "hiring", "momentum",
    "leading", "opportunity", "excited", "welcomes",
];

const NEGATIVE_WORDS: &[&str] = &[
    "layoff", "layoffs", "lawsuit", "decline", "declines", "declined", "loss", "losses", "cuts", "cut",
    "breach", "bankruptcy", "bankrupt", "delay", "delayed", "resigns", "resigned", "fraud", "downturn",
    "shutdown", "shuts", "fined", "investigation", "outage", "struggle", "struggles", "struggling",
    "closes", "closing", "weak", "warning", "scandal", "slump", "downsizing",
];

static POSITIVE: LazyLock<HashSet<&'static str>> = LazyLock::new(|| POSITIVE_WORDS.iter().copied().collect());
static NEGATIVE: LazyLock<HashSet<&'static str>> = LazyLock::new(|| NEGATIVE_WORDS.iter().copied().collect());

const NEGATORS: &[&str] = &["not", "no", "never", "isn't", "wasn't", "don't", "doesn't", "didn't", "won't"];

/// Sentiment in [-1, 1]
pub fn score_sentiment(text: &str) -> f64 {
    let lowered = text.to_lowercase();
    let mut pos = 0u32;
    let mut neg = 0u32;
    let mut negate = false;

    for m in TOKEN.find_iter(&lowered) {
        let token = m.as_str();
        if NEGATORS.contains(&token) {
            negate = true;
            continue;
        }

        let polarity = if POSITIVE.contains(token) {
            1
        } else if NEGATIVE.contains(token) {
            -1
        } else {
            0
        };

        match (polarity, negate) {
            (1, false) | (-1, true) => pos += 1,
            (-1, false) | (1, true) => neg += 1,
            _ => {}
        }
        negate = false;
    }

    if pos + neg == 0 {
        return 0.0;
    }
    ((pos as f64 - neg as f64) / (pos + neg) as f64).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_and_negative() {
        assert_eq!(score_sentiment("Acme secures record growth"), 1.0);
        assert_eq!(score_sentiment("Globex announces layoffs after losses"), -1.0);
        assert_eq!(score_sentiment("Initech hires a data engineer"), 0.0);
    }

    #[test]
    fn test_mixed() {
        let s = score_sentiment("Strong quarter despite lawsuit");
        assert_eq!(s, 0.0);
        let s = score_sentiment("Strong growth, one lawsuit");
        assert!((s - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_lexicons_have_no_repeats_or_overlap() {
        assert_eq!(POSITIVE.len(), POSITIVE_WORDS.len());
        assert_eq!(NEGATIVE.len(), NEGATIVE_WORDS.len());
        assert!(POSITIVE.is_disjoint(&NEGATIVE));
    }

    #[test]
    fn test_negation_flips_next_token() {
        assert_eq!(score_sentiment("The launch was not successful"), 0.0);
        assert_eq!(score_sentiment("no layoffs planned"), 1.0);
    }
}
