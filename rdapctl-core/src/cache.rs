//! TTL-LRU caching for bootstrap bases and HTTP responses.
//!
//! Two independent caches: a generic TTL-LRU map used for registry base
//! URLs, and a URL-keyed response cache holding body bytes plus validator
//! metadata, positive expiry, and a negative-cache window. Their storage is
//! deliberately separate: the response cache must evict eagerly on shrink.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use lru::LruCache;
use reqwest::header::{HeaderMap, CACHE_CONTROL, ETAG, EXPIRES, LAST_MODIFIED};
use tracing::{debug, warn};

use crate::util::parse_http_date;

/// Cache clock, overridable so tests can freeze time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

fn capacity(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}

fn expires_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

struct TtlEntry<V> {
    value: V,
    expires: DateTime<Utc>,
}

/// Bounded key/value map where entries expire after a fixed TTL and the
/// least-recently-used entry is dropped on overflow. Reads promote to MRU;
/// updates renew the expiry.
pub struct TtlLruCache<V> {
    inner: Mutex<LruCache<String, TtlEntry<V>>>,
    ttl: Duration,
    clock: Mutex<Clock>,
}

impl<V: Clone> TtlLruCache<V> {
    pub fn new(ttl: Duration, cap: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity(cap))),
            ttl,
            clock: Mutex::new(system_clock()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, TtlEntry<V>>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("ttl cache lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let clock = match self.clock.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        clock()
    }

    pub fn set_clock(&self, clock: Clock) {
        match self.clock.lock() {
            Ok(mut guard) => *guard = clock,
            Err(poisoned) => *poisoned.into_inner() = clock,
        }
    }

    /// Returns the value for `key` if present and not expired, promoting the
    /// entry to most-recently-used. Expired entries are dropped on read.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.now();
        let mut inner = self.lock();
        let expired = match inner.get(key) {
            Some(entry) => {
                if entry.expires > now {
                    return Some(entry.value.clone());
                }
                true
            }
            None => false,
        };
        if expired {
            inner.pop(key);
        }
        None
    }

    /// Inserts or updates `key`. Updates refresh the expiry and move the
    /// entry to most-recently-used; overflow drops the LRU entry.
    pub fn set(&self, key: &str, value: V) {
        let expires = expires_after(self.now(), self.ttl);
        self.lock().put(key.to_string(), TtlEntry { value, expires });
    }

    pub fn resize(&self, cap: usize) {
        self.lock().resize(capacity(cap));
    }
}

/// Validators and expiry state derived from response headers.
#[derive(Debug, Clone, Default)]
pub struct CacheMeta {
    /// `ETag` stored verbatim, surrounding quotes included.
    pub etag: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// While set and in the future, lookups miss regardless of the body.
    pub neg_until: Option<DateTime<Utc>>,
}

struct CachedResponse {
    body: Vec<u8>,
    meta: CacheMeta,
}

/// URL-keyed LRU of response bodies plus cache metadata.
pub struct ResponseCache {
    inner: Mutex<LruCache<String, CachedResponse>>,
    default_ttl: Duration,
    clock: Mutex<Clock>,
}

impl ResponseCache {
    pub fn new(cap: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity(cap))),
            default_ttl,
            clock: Mutex::new(system_clock()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CachedResponse>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("response cache lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let clock = match self.clock.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        clock()
    }

    pub fn set_clock(&self, clock: Clock) {
        match self.clock.lock() {
            Ok(mut guard) => *guard = clock,
            Err(poisoned) => *poisoned.into_inner() = clock,
        }
    }

    /// Returns the body only for a fresh positive entry: not negative-active,
    /// unexpired, and non-empty. A hit promotes the entry to MRU.
    pub fn get(&self, url: &str) -> Option<Vec<u8>> {
        let now = self.now();
        let mut inner = self.lock();
        let entry = inner.peek(url)?;
        if let Some(neg) = entry.meta.neg_until {
            if now < neg {
                return None;
            }
        }
        if entry.meta.expires_at.is_some_and(|t| now < t) && !entry.body.is_empty() {
            return inner.get(url).map(|e| e.body.clone());
        }
        None
    }

    /// Returns any stored body regardless of expiry, used to answer a 304
    /// revalidation. Does not change recency.
    pub fn fresh_body(&self, url: &str) -> Option<Vec<u8>> {
        let inner = self.lock();
        inner
            .peek(url)
            .filter(|entry| !entry.body.is_empty())
            .map(|entry| entry.body.clone())
    }

    pub fn meta(&self, url: &str) -> Option<CacheMeta> {
        self.lock().peek(url).map(|entry| entry.meta.clone())
    }

    /// Stores a body with metadata derived from `headers`, replacing any
    /// existing entry in place.
    pub fn store(&self, url: &str, body: &[u8], headers: &HeaderMap) {
        let now = self.now();
        let meta = make_meta(headers, self.default_ttl, now);
        debug!(url, bytes = body.len(), "caching response");
        self.lock().put(
            url.to_string(),
            CachedResponse {
                body: body.to_vec(),
                meta,
            },
        );
    }

    /// Stores metadata without a body (conditional-fetch bookkeeping).
    pub fn store_meta(&self, url: &str, headers: &HeaderMap) {
        let now = self.now();
        let mut inner = self.lock();
        if let Some(entry) = inner.get_mut(url) {
            entry.meta = merge_meta(&entry.meta, headers, self.default_ttl, now);
            return;
        }
        let meta = make_meta(headers, self.default_ttl, now);
        inner.put(
            url.to_string(),
            CachedResponse {
                body: Vec::new(),
                meta,
            },
        );
    }

    /// Merges validators and recomputes the expiry after a 304, clearing any
    /// negative window.
    pub fn update_freshness(&self, url: &str, headers: &HeaderMap) {
        let now = self.now();
        let mut inner = self.lock();
        if let Some(entry) = inner.get_mut(url) {
            entry.meta = merge_meta(&entry.meta, headers, self.default_ttl, now);
        }
    }

    /// Marks `url` negative for `window`, keeping any stored body.
    pub fn store_negative(&self, url: &str, window: Duration) {
        let neg_until = Some(expires_after(self.now(), window));
        let mut inner = self.lock();
        if let Some(entry) = inner.get_mut(url) {
            entry.meta.neg_until = neg_until;
            return;
        }
        inner.put(
            url.to_string(),
            CachedResponse {
                body: Vec::new(),
                meta: CacheMeta {
                    neg_until,
                    ..CacheMeta::default()
                },
            },
        );
    }

    /// Shrinking evicts from the LRU end immediately so memory pressure
    /// drops deterministically.
    pub fn resize(&self, cap: usize) {
        self.lock().resize(capacity(cap));
    }
}

fn make_meta(headers: &HeaderMap, default_ttl: Duration, now: DateTime<Utc>) -> CacheMeta {
    let etag = headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let last_modified = headers
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date);
    let ttl = expiry_from_headers(headers, default_ttl, now);
    CacheMeta {
        etag,
        last_modified,
        expires_at: Some(expires_after(now, ttl)),
        neg_until: None,
    }
}

/// New validators overwrite existing ones when non-empty; the positive
/// expiry is recomputed from the new headers; the negative window is
/// cleared.
fn merge_meta(
    prev: &CacheMeta,
    headers: &HeaderMap,
    default_ttl: Duration,
    now: DateTime<Utc>,
) -> CacheMeta {
    let mut meta = prev.clone();
    if let Some(etag) = headers.get(ETAG).and_then(|v| v.to_str().ok()) {
        if !etag.is_empty() {
            meta.etag = etag.to_string();
        }
    }
    if let Some(last_modified) = headers
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date)
    {
        meta.last_modified = Some(last_modified);
    }
    let ttl = expiry_from_headers(headers, default_ttl, now);
    meta.expires_at = Some(expires_after(now, ttl));
    meta.neg_until = None;
    meta
}

/// Derives a TTL from response headers: `no-store`/`no-cache` pin it to
/// zero, `max-age` wins over `Expires`, a future `Expires` supplies the
/// interval, and anything else falls back to `default_ttl`.
fn expiry_from_headers(headers: &HeaderMap, default_ttl: Duration, now: DateTime<Utc>) -> Duration {
    if let Some(cc) = headers.get(CACHE_CONTROL).and_then(|v| v.to_str().ok()) {
        let lower = cc.to_ascii_lowercase();
        if lower.contains("no-store") || lower.contains("no-cache") {
            return Duration::ZERO;
        }
        for directive in lower.split(',') {
            if let Some(raw) = directive.trim().strip_prefix("max-age=") {
                if let Ok(secs) = raw.parse::<u64>() {
                    return Duration::from_secs(secs);
                }
            }
        }
    }
    if let Some(expires) = headers.get(EXPIRES).and_then(|v| v.to_str().ok()) {
        if let Some(when) = parse_http_date(expires) {
            if let Ok(interval) = (when - now).to_std() {
                if !interval.is_zero() {
                    return interval;
                }
            }
        }
    }
    default_ttl
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::format_http_date;
    use chrono::TimeZone;

    fn test_clock(base: DateTime<Utc>) -> (Clock, Arc<Mutex<DateTime<Utc>>>) {
        let now = Arc::new(Mutex::new(base));
        let handle = now.clone();
        let clock: Clock = Arc::new(move || *now.lock().unwrap());
        (clock, handle)
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    #[test]
    fn ttl_cache_get_set_expire_and_evict() {
        let cache: TtlLruCache<i32> = TtlLruCache::new(Duration::from_secs(60), 2);
        let (clock, now) = test_clock(base_time());
        cache.set_clock(clock);

        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.get("a"), Some(1));

        // "a" is MRU after the read, so inserting "c" evicts "b".
        cache.set("c", 3);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), Some(3));

        *now.lock().unwrap() = base_time() + chrono::Duration::seconds(120);
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn ttl_cache_update_renews_expiry_and_moves_to_front() {
        let cache: TtlLruCache<i32> = TtlLruCache::new(Duration::from_secs(60), 2);
        let (clock, now) = test_clock(base_time());
        cache.set_clock(clock);

        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.get("b"), Some(2)); // "a" is now LRU

        // Updating "a" near its original expiry renews it and makes it MRU.
        *now.lock().unwrap() = base_time() + chrono::Duration::seconds(59);
        cache.set("a", 42);
        cache.set("c", 3); // evicts "b"

        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(42));
        assert_eq!(cache.get("c"), Some(3));

        // Old expiry was base+60s; the renewed one is base+119s.
        *now.lock().unwrap() = base_time() + chrono::Duration::seconds(90);
        assert_eq!(cache.get("a"), Some(42));
    }

    #[test]
    fn ttl_cache_expiry_is_strict() {
        let cache: TtlLruCache<i32> = TtlLruCache::new(Duration::from_secs(60), 4);
        let (clock, now) = test_clock(base_time());
        cache.set_clock(clock);

        cache.set("a", 1);
        *now.lock().unwrap() = base_time() + chrono::Duration::seconds(60);
        assert_eq!(cache.get("a"), None);
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                reqwest::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        map
    }

    #[test]
    fn response_cache_store_get_and_meta_merge() {
        let cache = ResponseCache::new(2, Duration::from_secs(30));
        let (clock, _now) = test_clock(base_time());
        cache.set_clock(clock);

        cache.store(
            "https://x",
            br#"{"ok":true}"#,
            &headers(&[("Cache-Control", "max-age=60"), ("ETag", "\"v1\"")]),
        );
        let body = cache.get("https://x").unwrap();
        assert!(String::from_utf8_lossy(&body).contains("ok"));

        cache.update_freshness(
            "https://x",
            &headers(&[("Cache-Control", "max-age=120"), ("ETag", "\"v2\"")]),
        );
        let meta = cache.meta("https://x").unwrap();
        assert_eq!(meta.etag, "\"v2\"");
    }

    #[test]
    fn response_cache_negative_window_always_misses() {
        let cache = ResponseCache::new(4, Duration::from_secs(30));
        let (clock, now) = test_clock(base_time());
        cache.set_clock(clock);

        cache.store_negative("https://neg", Duration::from_secs(3600));
        assert!(cache.get("https://neg").is_none());

        // Past the window the entry has no body, so it still misses.
        *now.lock().unwrap() = base_time() + chrono::Duration::seconds(7200);
        assert!(cache.get("https://neg").is_none());
    }

    #[test]
    fn response_cache_negative_on_existing_keeps_body_and_moves_to_front() {
        let cache = ResponseCache::new(2, Duration::from_secs(30));
        let (clock, _now) = test_clock(base_time());
        cache.set_clock(clock);

        cache.store("x", b"X", &HeaderMap::new());
        cache.store("u", b"U", &HeaderMap::new());
        assert!(cache.get("x").is_some()); // "u" is now LRU

        cache.store_negative("u", Duration::from_secs(3600));
        let meta = cache.meta("u").unwrap();
        assert!(meta.neg_until.is_some());
        assert_eq!(cache.fresh_body("u").unwrap(), b"U");

        // "u" moved to MRU, so inserting "y" evicts "x".
        cache.store("y", b"Y", &HeaderMap::new());
        assert!(cache.get("x").is_none());
        assert!(cache.get("u").is_none()); // negative-active
    }

    #[test]
    fn response_cache_eviction_uses_url_key() {
        let cache = ResponseCache::new(1, Duration::from_secs(10));
        cache.store("u1", b"1", &HeaderMap::new());
        cache.store("u2", b"2", &HeaderMap::new());
        assert!(cache.get("u1").is_none());
        assert_eq!(cache.get("u2").unwrap(), b"2");
    }

    #[test]
    fn response_cache_shrink_evicts_immediately() {
        let cache = ResponseCache::new(3, Duration::from_secs(10));
        let (clock, _now) = test_clock(base_time());
        cache.set_clock(clock);

        cache.store("a", b"A", &HeaderMap::new());
        cache.store("b", b"B", &HeaderMap::new());
        cache.store("c", b"C", &HeaderMap::new());

        cache.resize(1);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("c").unwrap(), b"C");
    }

    #[test]
    fn fresh_body_ignores_expiry_but_not_absence() {
        let cache = ResponseCache::new(4, Duration::from_secs(10));
        let (clock, now) = test_clock(base_time());
        cache.set_clock(clock);

        cache.store("u", b"body", &HeaderMap::new());
        *now.lock().unwrap() = base_time() + chrono::Duration::seconds(3600);
        assert!(cache.get("u").is_none());
        assert_eq!(cache.fresh_body("u").unwrap(), b"body");

        cache.store_meta("meta-only", &HeaderMap::new());
        assert!(cache.fresh_body("meta-only").is_none());
    }

    #[test]
    fn expiry_from_headers_rules() {
        let now = base_time();
        let default_ttl = Duration::from_secs(300);

        // no-store / no-cache force a zero TTL, even next to max-age.
        let h = headers(&[("Cache-Control", "no-cache, max-age=999")]);
        assert_eq!(expiry_from_headers(&h, default_ttl, now), Duration::ZERO);
        let h = headers(&[("Cache-Control", "No-Store")]);
        assert_eq!(expiry_from_headers(&h, default_ttl, now), Duration::ZERO);

        // max-age beats Expires.
        let h = headers(&[
            ("Cache-Control", "max-age=42"),
            ("Expires", &format_http_date(now + chrono::Duration::seconds(300))),
        ]);
        assert_eq!(
            expiry_from_headers(&h, default_ttl, now),
            Duration::from_secs(42)
        );

        // A future Expires supplies the interval.
        let h = headers(&[(
            "Expires",
            &format_http_date(now + chrono::Duration::seconds(90)),
        )]);
        assert_eq!(
            expiry_from_headers(&h, default_ttl, now),
            Duration::from_secs(90)
        );

        // Past or invalid Expires falls back to the default.
        let h = headers(&[(
            "Expires",
            &format_http_date(now - chrono::Duration::seconds(30)),
        )]);
        assert_eq!(expiry_from_headers(&h, default_ttl, now), default_ttl);
        let h = headers(&[("Expires", "not-a-date")]);
        assert_eq!(expiry_from_headers(&h, default_ttl, now), default_ttl);

        let h = HeaderMap::new();
        assert_eq!(expiry_from_headers(&h, default_ttl, now), default_ttl);
    }
}
