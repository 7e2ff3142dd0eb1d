//! The RDAP client: configuration, caches, and typed endpoints.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::instrument;

use crate::bootstrap::{
    ASN_BOOTSTRAP_URL, DEFAULT_AGGREGATOR, DNS_BOOTSTRAP_URL, IPV4_BOOTSTRAP_URL,
};
use crate::cache::{Clock, ResponseCache, TtlLruCache};
use crate::error::{RdapError, Result};
use crate::object::{parse_object, RdapObject};
use crate::retry::{exponential_backoff, Backoff};
use crate::types::{Autnum, Domain, Entity, IpNetwork, Nameserver};
use crate::util::{join_url, last_label, trim_dot_lower};

const DEFAULT_USER_AGENT: &str = concat!("rdapctl/", env!("CARGO_PKG_VERSION"));

/// A concurrency-safe RDAP client with IANA bootstrap resolution and
/// validator-based response caching. Configuration is fixed after
/// construction; the caches are shared across clones.
#[derive(Clone)]
pub struct Client {
    pub(crate) http: reqwest::Client,
    pub(crate) user_agent: String,
    pub(crate) base_timeout: Duration,
    pub(crate) extra_headers: HeaderMap,
    pub(crate) bootstrap_url: String,
    pub(crate) ip_bootstrap_url: String,
    pub(crate) asn_bootstrap_url: String,
    pub(crate) default_base: Option<String>,
    pub(crate) base_cache: Arc<TtlLruCache<String>>,
    pub(crate) resp_cache: Arc<ResponseCache>,
    pub(crate) max_retries: u32,
    pub(crate) backoff: Backoff,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("default HTTP client configuration is valid");
        Self {
            http,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            base_timeout: Duration::from_secs(10),
            extra_headers: HeaderMap::new(),
            bootstrap_url: DNS_BOOTSTRAP_URL.to_string(),
            ip_bootstrap_url: IPV4_BOOTSTRAP_URL.to_string(),
            asn_bootstrap_url: ASN_BOOTSTRAP_URL.to_string(),
            default_base: None,
            base_cache: Arc::new(TtlLruCache::new(Duration::from_secs(6 * 60 * 60), 64)),
            resp_cache: Arc::new(ResponseCache::new(512, Duration::from_secs(10 * 60))),
            max_retries: 2,
            backoff: exponential_backoff(Duration::from_millis(200), 2.0, Duration::from_secs(2)),
        }
    }

    /// Replaces the HTTP transport (connection pool, TLS, proxies).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    /// Per-attempt request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.base_timeout = timeout;
        self
    }

    /// Overrides the IANA DNS bootstrap URL.
    pub fn with_bootstrap_url(mut self, url: &str) -> Self {
        self.bootstrap_url = url.to_string();
        self
    }

    /// Overrides the IANA IP bootstrap URL. A query of the other address
    /// family still switches to the canonical IANA file for that family.
    pub fn with_ip_bootstrap_url(mut self, url: &str) -> Self {
        self.ip_bootstrap_url = url.to_string();
        self
    }

    /// Overrides the IANA ASN bootstrap URL.
    pub fn with_asn_bootstrap_url(mut self, url: &str) -> Self {
        self.asn_bootstrap_url = url.to_string();
        self
    }

    /// Base to use for TLDs the DNS bootstrap cannot resolve. Without one,
    /// unknown TLDs fail with `NoRdapBaseForTld`.
    pub fn with_default_base(mut self, base: &str) -> Self {
        self.default_base = Some(base.trim_end_matches('/').to_string());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Appends a header to every outgoing request.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.extra_headers.append(name, value);
        self
    }

    /// Resizes the TLD/base cache and the response cache. Zero leaves a
    /// cache unchanged.
    pub fn with_cache_sizes(self, tld_cap: usize, resp_cap: usize) -> Self {
        if tld_cap > 0 {
            self.base_cache.resize(tld_cap);
        }
        if resp_cap > 0 {
            self.resp_cache.resize(resp_cap);
        }
        self
    }

    /// Overrides the clock both caches read, so tests can freeze time.
    pub fn with_clock(self, clock: Clock) -> Self {
        self.base_cache.set_clock(clock.clone());
        self.resp_cache.set_clock(clock);
        self
    }

    /// The URL-keyed response cache.
    pub fn response_cache(&self) -> &ResponseCache {
        &self.resp_cache
    }

    /// Forces a re-fetch of the IANA DNS bootstrap right now.
    pub async fn refresh_bootstrap(&self) -> Result<()> {
        self.fetch_dns_bootstrap(true).await
    }

    /// Fetches the RDAP domain object for `fqdn`.
    #[instrument(skip(self), fields(fqdn = %fqdn))]
    pub async fn domain(&self, fqdn: &str) -> Result<Domain> {
        let base = self.base_for_tld(&last_label(fqdn)).await?;
        let url = join_url(&base, &["domain", fqdn]);
        let (raw, _) = self.get_json(&url).await?;
        match parse_object(&raw)? {
            RdapObject::Domain(domain) => Ok(domain),
            other => Err(unexpected("domain", &other)),
        }
    }

    /// Fetches the RDAP nameserver object for `host`. When the host's TLD
    /// has no bootstrap entry the aggregator is queried instead.
    #[instrument(skip(self), fields(host = %host))]
    pub async fn nameserver(&self, host: &str) -> Result<Nameserver> {
        let base = match self.base_for_tld(&last_label(host)).await {
            Ok(base) => base,
            Err(_) => DEFAULT_AGGREGATOR.to_string(),
        };
        let url = join_url(&base, &["nameserver", host]);
        let (raw, _) = self.get_json(&url).await?;
        match parse_object(&raw)? {
            RdapObject::Nameserver(nameserver) => Ok(nameserver),
            other => Err(unexpected("nameserver", &other)),
        }
    }

    /// Fetches the RDAP autnum object. Accepts `AS15169`, `as15169`, or
    /// `15169`.
    #[instrument(skip(self), fields(asn = %asn))]
    pub async fn autnum(&self, asn: &str) -> Result<Autnum> {
        let upper = asn.trim().to_ascii_uppercase();
        let digits = upper.strip_prefix("AS").unwrap_or(&upper);
        let number: u32 = digits
            .parse()
            .map_err(|_| RdapError::InvalidAsn(asn.to_string()))?;
        let base = self.base_for_asn(number).await;
        let url = join_url(&base, &["autnum", &number.to_string()]);
        let (raw, _) = self.get_json(&url).await?;
        match parse_object(&raw)? {
            RdapObject::Autnum(autnum) => Ok(autnum),
            other => Err(unexpected("autnum", &other)),
        }
    }

    /// Fetches the RDAP ip network object for an address or CIDR. The
    /// query is passed through in the caller's form.
    #[instrument(skip(self), fields(ip = %ip_or_cidr))]
    pub async fn ip(&self, ip_or_cidr: &str) -> Result<IpNetwork> {
        let base = self.base_for_ip(ip_or_cidr).await?;
        let url = join_url(&base, &["ip", ip_or_cidr]);
        let (raw, _) = self.get_json(&url).await?;
        match parse_object(&raw)? {
            RdapObject::IpNetwork(network) => Ok(network),
            other => Err(unexpected("ip network", &other)),
        }
    }

    /// Fetches the RDAP entity for `handle`. A non-empty `tld_hint` picks
    /// the registry base; otherwise the aggregator is used.
    #[instrument(skip(self), fields(handle = %handle))]
    pub async fn entity(&self, handle: &str, tld_hint: &str) -> Result<Entity> {
        let hint = trim_dot_lower(tld_hint);
        let base = if hint.is_empty() {
            DEFAULT_AGGREGATOR.to_string()
        } else {
            self.base_for_tld(&hint)
                .await
                .unwrap_or_else(|_| DEFAULT_AGGREGATOR.to_string())
        };
        let url = join_url(&base, &["entity", handle]);
        let (raw, _) = self.get_json(&url).await?;
        match parse_object(&raw)? {
            RdapObject::Entity(entity) => Ok(entity),
            other => Err(unexpected("entity", &other)),
        }
    }
}

fn unexpected(expected: &'static str, got: &RdapObject) -> RdapError {
    RdapError::UnexpectedObjectClass {
        expected,
        got: got.object_class_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_applies_options() {
        let client = Client::new()
            .with_user_agent("test/1.0")
            .with_timeout(Duration::from_secs(3))
            .with_max_retries(7)
            .with_default_base("https://rdap.example/");
        assert_eq!(client.user_agent, "test/1.0");
        assert_eq!(client.base_timeout, Duration::from_secs(3));
        assert_eq!(client.max_retries, 7);
        assert_eq!(client.default_base.as_deref(), Some("https://rdap.example"));
    }

    #[test]
    fn clones_share_caches() {
        let client = Client::new();
        let clone = client.clone();
        client
            .resp_cache
            .store("https://shared", b"{}", &HeaderMap::new());
        assert!(clone.resp_cache.get("https://shared").is_some());
    }
}
