//! Backoff policy and retry classification for transient fetch failures.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::util::parse_http_date;

/// Maps a 1-based attempt number to the sleep before the next try.
pub type Backoff = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Exponential backoff starting at `start`, multiplied by `factor` per
/// attempt and capped at `cap`. Out-of-range inputs fall back to
/// 100 ms / 1.5 / 2 s.
pub fn exponential_backoff(start: Duration, factor: f64, cap: Duration) -> Backoff {
    let start = if start.is_zero() {
        Duration::from_millis(100)
    } else {
        start
    };
    let factor = if factor < 1.1 { 1.5 } else { factor };
    let cap = if cap.is_zero() {
        Duration::from_secs(2)
    } else {
        cap
    };
    Arc::new(move |attempt| {
        let mut delay = start.as_secs_f64();
        for _ in 1..attempt {
            delay *= factor;
        }
        Duration::from_secs_f64(delay.min(cap.as_secs_f64()))
    })
}

/// Honors a `Retry-After` header when its wait lands in (0, 10 s); anything
/// longer, absent, or unparseable yields `fallback`. The cap keeps a server
/// from parking clients on arbitrary delays.
pub(crate) fn retry_after(headers: &HeaderMap, fallback: Duration) -> Duration {
    if let Some(value) = headers.get(RETRY_AFTER).and_then(|v| v.to_str().ok()) {
        let value = value.trim();
        if let Ok(secs) = value.parse::<f64>() {
            if secs > 0.0 && secs < 10.0 {
                return Duration::from_secs_f64(secs);
            }
        } else if let Some(when) = parse_http_date(value) {
            if let Ok(wait) = (when - Utc::now()).to_std() {
                if !wait.is_zero() && wait < Duration::from_secs(10) {
                    return wait;
                }
            }
        }
    }
    fallback
}

const TRANSIENT_MESSAGES: [&str; 4] = [
    "connection reset",
    "broken pipe",
    "unexpected eof",
    "no such host",
];

/// Whether a transport-level error is worth retrying: timeouts and
/// connection failures, plus a small set of transient failure texts
/// anywhere in the source chain.
pub(crate) fn is_retryable_transport(error: &reqwest::Error) -> bool {
    if error.is_timeout() || error.is_connect() {
        return true;
    }
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(current) = source {
        let message = current.to_string().to_ascii_lowercase();
        if TRANSIENT_MESSAGES.iter().any(|m| message.contains(m)) {
            return true;
        }
        source = current.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::format_http_date;

    #[test]
    fn exponential_backoff_defaults_and_clamping() {
        // Invalid inputs fall back to start=100ms, factor=1.5, cap=2s.
        let backoff = exponential_backoff(Duration::ZERO, 0.0, Duration::ZERO);
        assert_eq!(backoff(1), Duration::from_millis(100));
        assert_eq!(backoff(2), Duration::from_millis(150));
        assert!(backoff(10) <= Duration::from_secs(2));

        let backoff = exponential_backoff(Duration::from_millis(200), 2.0, Duration::from_secs(1));
        assert_eq!(backoff(1), Duration::from_millis(200));
        assert_eq!(backoff(2), Duration::from_millis(400));
        assert_eq!(backoff(3), Duration::from_millis(800));
        assert_eq!(backoff(4), Duration::from_secs(1));
    }

    #[test]
    fn retry_after_seconds_form() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "3".parse().unwrap());
        assert_eq!(
            retry_after(&headers, Duration::from_secs(10)),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn retry_after_date_form() {
        let mut headers = HeaderMap::new();
        let when = Utc::now() + chrono::Duration::seconds(5);
        headers.insert(RETRY_AFTER, format_http_date(when).parse().unwrap());
        let wait = retry_after(&headers, Duration::from_secs(10));
        assert!(wait > Duration::from_secs(3) && wait < Duration::from_secs(7));
    }

    #[test]
    fn retry_after_too_large_falls_back() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "999".parse().unwrap());
        assert_eq!(
            retry_after(&headers, Duration::from_secs(7)),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn retry_after_absent_or_garbage_falls_back() {
        let headers = HeaderMap::new();
        assert_eq!(
            retry_after(&headers, Duration::from_millis(250)),
            Duration::from_millis(250)
        );

        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "soon".parse().unwrap());
        assert_eq!(
            retry_after(&headers, Duration::from_millis(250)),
            Duration::from_millis(250)
        );
    }
}
