use chrono::{DateTime, Utc};
use serde_json::Value;

/// Returns the last DNS label of `domain`, lower-cased (trailing root dot ignored).
pub(crate) fn last_label(domain: &str) -> String {
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    domain
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

pub(crate) fn trim_dot_lower(s: &str) -> String {
    s.strip_prefix('.').unwrap_or(s).to_ascii_lowercase()
}

/// Joins `base` with path segments, collapsing duplicate slashes.
pub(crate) fn join_url(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        let segment = segment.trim_matches('/');
        if segment.is_empty() {
            continue;
        }
        url.push('/');
        url.push_str(segment);
    }
    url
}

/// Extracts the string members of a JSON array, skipping anything else.
pub(crate) fn string_values(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

/// Parses an HTTP-date (RFC 7231 IMF-fixdate, e.g. `Tue, 15 Nov 1994 08:12:31 GMT`).
pub(crate) fn parse_http_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

pub(crate) fn format_http_date(t: DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
