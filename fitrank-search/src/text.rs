//! Snippet cleanup
//!
//! Providers return snippets with inline markup (`<strong>`, entities) and
//! human dates ("3 days ago", "Jan 5, 2025"). These helpers turn them into
//! plain text and timestamps before normalization.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};
use regex::Regex;
use scraper::node::Node;
use scraper::Html;

static RELATIVE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d+|an?)\s+(minute|min|hour|day|week|month|year)s?\s+ago$").unwrap()
});

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%b %d, %Y", "%d %b %Y", "%B %d, %Y", "%m/%d/%Y"];

/// Extract visible text from an HTML fragment
pub fn html_to_text(fragment: &str) -> String {
    if !fragment.contains('<') && !fragment.contains('&') {
        return normalize_whitespace(fragment);
    }

    let document = Html::parse_fragment(fragment);
    let mut parts = Vec::new();

    for node_ref in document.root_element().descendants() {
        if let Node::Text(text_node) = node_ref.value() {
            let in_excluded = node_ref.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .map(|el| matches!(el.name(), "script" | "style" | "noscript"))
                    .unwrap_or(false)
            });

            if !in_excluded {
                parts.push(text_node.to_string());
            }
        }
    }

    normalize_whitespace(&parts.concat())
}

/// Collapse runs of whitespace into single spaces
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a provider date relative to `now`
pub fn parse_published_date(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    if let Some(caps) = RELATIVE_DATE.captures(raw) {
        let n: i64 = match &caps[1] {
            "a" | "an" | "A" | "An" => 1,
            digits => digits.parse().ok()?,
        };
        // Counts beyond the representable range give no date
        let delta = match caps[2].to_lowercase().as_str() {
            "minute" | "min" => TimeDelta::try_minutes(n),
            "hour" => TimeDelta::try_hours(n),
            "day" => TimeDelta::try_days(n),
            "week" => TimeDelta::try_weeks(n),
            "month" => n.checked_mul(30).and_then(TimeDelta::try_days),
            _ => n.checked_mul(365).and_then(TimeDelta::try_days),
        }?;
        return now.checked_sub_signed(delta);
    }

    DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(raw, fmt)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| Utc.from_utc_datetime(&naive))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_html_to_text() {
        let text = html_to_text("Acme <strong>raises</strong> $20M &amp; expands <script>x()</script>");
        assert_eq!(text, "Acme raises $20M & expands");
    }

    #[test]
    fn test_plain_text_passthrough() {
        assert_eq!(html_to_text("  plain   snippet "), "plain snippet");
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  hello   world  \n\t  test  "), "hello world test");
    }

    #[test]
    fn test_relative_dates() {
        assert_eq!(parse_published_date("3 days ago", now()), Some(now() - Duration::days(3)));
        assert_eq!(parse_published_date("an hour ago", now()), Some(now() - Duration::hours(1)));
        assert_eq!(parse_published_date("2 weeks ago", now()), Some(now() - Duration::weeks(2)));
    }

    #[test]
    fn test_huge_relative_counts_are_rejected() {
        assert_eq!(parse_published_date("1000000 years ago", now()), None);
        assert_eq!(parse_published_date("99999999999999 months ago", now()), None);
        assert_eq!(parse_published_date("99999999999999999999999 days ago", now()), None);
        assert_eq!(
            parse_published_date("2 years ago", now()),
            Some(now() - Duration::days(730))
        );
    }

    #[test]
    fn test_absolute_dates() {
        let expected = Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 0).unwrap();
        assert_eq!(parse_published_date("Jan 5, 2025", now()), Some(expected));
        assert_eq!(parse_published_date("2025-01-05", now()), Some(expected));
        assert_eq!(
            parse_published_date("2025-01-05T08:30:00Z", now()),
            Some(Utc.with_ymd_and_hms(2025, 1, 5, 8, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_unparseable_date() {
        assert_eq!(parse_published_date("sometime", now()), None);
        assert_eq!(parse_published_date("", now()), None);
    }
}
