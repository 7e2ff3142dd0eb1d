//! IANA RDAP service-registry (bootstrap) fetching and resolution.
//!
//! The registry files map registration keys to authoritative server base
//! URLs: `dns.json` keys are TLD labels, `asn.json` keys are numbers or
//! `"LO-HI"` ranges, `ipv4.json`/`ipv6.json` keys are CIDR prefixes. The
//! first URL of each service entry is the preferred base; a trailing slash
//! is stripped.

use std::net::IpAddr;
use std::str::FromStr;

use ip_network::IpNetwork;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::Client;
use crate::error::{RdapError, Result};
use crate::http::read_body_capped;
use crate::util::{format_http_date, string_values, trim_dot_lower};

pub(crate) const DNS_BOOTSTRAP_URL: &str = "https://data.iana.org/rdap/dns.json";
pub(crate) const IPV4_BOOTSTRAP_URL: &str = "https://data.iana.org/rdap/ipv4.json";
pub(crate) const IPV6_BOOTSTRAP_URL: &str = "https://data.iana.org/rdap/ipv6.json";
pub(crate) const ASN_BOOTSTRAP_URL: &str = "https://data.iana.org/rdap/asn.json";

/// Aggregator used when bootstrap data is unreachable or has no match.
pub(crate) const DEFAULT_AGGREGATOR: &str = "https://rdap.org";

const DNS_BODY_CAP: usize = 512 << 10;
const IP_BODY_CAP: usize = 2 << 20;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct BootstrapServices {
    #[serde(default)]
    services: Vec<Vec<Value>>,
}

impl BootstrapServices {
    /// Yields (keys, preferred base) per service entry, skipping malformed
    /// entries and non-string members.
    fn entries(&self) -> impl Iterator<Item = (Vec<String>, String)> + '_ {
        self.services.iter().filter_map(|service| {
            if service.len() != 2 {
                return None;
            }
            let keys = string_values(&service[0]);
            let urls = string_values(&service[1]);
            let base = urls.first()?.trim_end_matches('/').to_string();
            Some((keys, base))
        })
    }
}

/// Parses an ASN service key: either a single number or an inclusive
/// `"LO-HI"` range.
fn parse_asn_range(raw: &str) -> Option<(u32, u32)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some((lo, hi)) = raw.split_once('-') {
        let lo: u32 = lo.trim().parse().ok()?;
        let hi: u32 = hi.trim().parse().ok()?;
        if hi < lo {
            return None;
        }
        Some((lo, hi))
    } else {
        let n: u32 = raw.parse().ok()?;
        Some((n, n))
    }
}

fn asn_base(services: &BootstrapServices, asn: u32) -> Option<String> {
    for (keys, base) in services.entries() {
        for raw in &keys {
            if let Some((lo, hi)) = parse_asn_range(raw) {
                if (lo..=hi).contains(&asn) {
                    return Some(base);
                }
            }
        }
    }
    None
}

/// Longest-prefix match: among service CIDRs of the right family that
/// contain `addr`, the most specific prefix wins.
fn longest_prefix_base(services: &BootstrapServices, addr: IpAddr) -> Option<String> {
    let mut best: Option<(u8, String)> = None;
    for (keys, base) in services.entries() {
        for raw in &keys {
            let Ok(network) = IpNetwork::from_str(raw.trim()) else {
                continue;
            };
            let (contains, prefix) = match (&network, addr) {
                (IpNetwork::V4(net), IpAddr::V4(v4)) => (net.contains(v4), net.netmask()),
                (IpNetwork::V6(net), IpAddr::V6(v6)) => (net.contains(v6), net.netmask()),
                _ => continue,
            };
            if contains && best.as_ref().is_none_or(|(b, _)| prefix > *b) {
                best = Some((prefix, base.clone()));
            }
        }
    }
    best.map(|(_, base)| base)
}

/// Parses an IP address or CIDR, resolving a CIDR to its network address.
pub(crate) fn parse_ip_or_cidr(s: &str) -> Option<IpAddr> {
    let s = s.trim();
    if let Some((addr, prefix)) = s.split_once('/') {
        let addr: IpAddr = addr.parse().ok()?;
        let prefix: u8 = prefix.parse().ok()?;
        let network = IpNetwork::new_truncate(addr, prefix).ok()?;
        Some(network.network_address())
    } else {
        s.parse().ok()
    }
}

impl Client {
    /// Fetches the IANA DNS bootstrap file and fills the TLD base cache.
    /// Unless `force`, the request carries stored validators and a 304 is a
    /// no-op (the key cache is assumed populated).
    pub(crate) async fn fetch_dns_bootstrap(&self, force: bool) -> Result<()> {
        let url = self.bootstrap_url.clone();
        let mut request = self
            .http
            .get(&url)
            .timeout(self.base_timeout)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .headers(self.extra_headers.clone());

        if !force {
            if let Some(meta) = self.resp_cache.meta(&url) {
                if !meta.etag.is_empty() {
                    request = request.header(reqwest::header::IF_NONE_MATCH, &meta.etag);
                }
                if let Some(last_modified) = meta.last_modified {
                    request = request.header(
                        reqwest::header::IF_MODIFIED_SINCE,
                        format_http_date(last_modified),
                    );
                }
            }
        }

        let response = request.send().await?;
        match response.status().as_u16() {
            304 => Ok(()),
            200 => {
                let headers = response.headers().clone();
                let body = read_body_capped(response, DNS_BODY_CAP).await?;
                let services: BootstrapServices =
                    serde_json::from_slice(&body).map_err(RdapError::BootstrapParse)?;
                let mut tlds = 0usize;
                for (keys, base) in services.entries() {
                    for tld in keys {
                        self.base_cache.set(&tld.to_ascii_lowercase(), base.clone());
                        tlds += 1;
                    }
                }
                self.resp_cache.store_meta(&url, &headers);
                debug!(url = %url, tlds, "dns bootstrap refreshed");
                Ok(())
            }
            _ => Err(RdapError::BootstrapFetch {
                status: response.status(),
            }),
        }
    }

    /// Fetches an ASN or IP bootstrap file, always conditionally. A 304 is
    /// surfaced as stale since the parsed services are not retained; callers
    /// fall back to the aggregator.
    async fn fetch_bootstrap_services(&self, url: &str) -> Result<BootstrapServices> {
        let mut request = self
            .http
            .get(url)
            .timeout(self.base_timeout)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .headers(self.extra_headers.clone());

        if let Some(meta) = self.resp_cache.meta(url) {
            if !meta.etag.is_empty() {
                request = request.header(reqwest::header::IF_NONE_MATCH, &meta.etag);
            }
            if let Some(last_modified) = meta.last_modified {
                request = request.header(
                    reqwest::header::IF_MODIFIED_SINCE,
                    format_http_date(last_modified),
                );
            }
        }

        let response = request.send().await?;
        match response.status().as_u16() {
            304 => Err(RdapError::BootstrapStale),
            200 => {
                let headers = response.headers().clone();
                let body = read_body_capped(response, IP_BODY_CAP).await?;
                let services =
                    serde_json::from_slice(&body).map_err(RdapError::BootstrapParse)?;
                self.resp_cache.store_meta(url, &headers);
                Ok(services)
            }
            _ => Err(RdapError::BootstrapFetch {
                status: response.status(),
            }),
        }
    }

    /// Resolves the RDAP base URL for a TLD (lower-cased, leading dot
    /// stripped), consulting the TLD cache, then the DNS bootstrap, then a
    /// forced refresh, then the configured default base.
    pub async fn base_for_tld(&self, tld: &str) -> Result<String> {
        let tld = trim_dot_lower(tld);
        if tld.is_empty() {
            return Err(RdapError::EmptyTld);
        }
        if let Some(base) = self.base_cache.get(&tld) {
            return Ok(base);
        }
        if let Err(err) = self.fetch_dns_bootstrap(false).await {
            if let Some(base) = &self.default_base {
                warn!(%err, tld = %tld, "dns bootstrap fetch failed, using default base");
                return Ok(base.clone());
            }
            return Err(err);
        }
        if let Some(base) = self.base_cache.get(&tld) {
            return Ok(base);
        }
        // One forced refresh covers a 304 against an empty key cache.
        if self.fetch_dns_bootstrap(true).await.is_ok() {
            if let Some(base) = self.base_cache.get(&tld) {
                return Ok(base);
            }
        }
        if let Some(base) = &self.default_base {
            return Ok(base.clone());
        }
        Err(RdapError::NoRdapBaseForTld(tld))
    }

    /// Resolves the RDAP base for a numeric ASN via `asn.json`, caching the
    /// hit under `asn:<n>`. Fetch failures and misses fall back to the
    /// aggregator.
    pub(crate) async fn base_for_asn(&self, asn: u32) -> String {
        let key = format!("asn:{asn}");
        if let Some(base) = self.base_cache.get(&key) {
            return base;
        }
        let services = match self.fetch_bootstrap_services(&self.asn_bootstrap_url).await {
            Ok(services) => services,
            Err(err) => {
                warn!(%err, asn, "asn bootstrap fetch failed, using aggregator");
                return DEFAULT_AGGREGATOR.to_string();
            }
        };
        match asn_base(&services, asn) {
            Some(base) => {
                self.base_cache.set(&key, base.clone());
                base
            }
            None => DEFAULT_AGGREGATOR.to_string(),
        }
    }

    /// Resolves the RDAP base for an IP or CIDR via the family-appropriate
    /// bootstrap file, longest prefix winning; caches under `ip:<addr>`.
    pub(crate) async fn base_for_ip(&self, ip_or_cidr: &str) -> Result<String> {
        let addr = parse_ip_or_cidr(ip_or_cidr)
            .ok_or_else(|| RdapError::InvalidIp(ip_or_cidr.to_string()))?;

        // The configured file is overridden when its family suffix does not
        // match the query's family.
        let is_v6 = addr.is_ipv6();
        let url = if is_v6 && self.ip_bootstrap_url.ends_with("/ipv4.json") {
            IPV6_BOOTSTRAP_URL
        } else if !is_v6 && self.ip_bootstrap_url.ends_with("/ipv6.json") {
            IPV4_BOOTSTRAP_URL
        } else {
            self.ip_bootstrap_url.as_str()
        };

        let key = format!("ip:{addr}");
        if let Some(base) = self.base_cache.get(&key) {
            return Ok(base);
        }
        let services = match self.fetch_bootstrap_services(url).await {
            Ok(services) => services,
            Err(err) => {
                warn!(%err, %addr, "ip bootstrap fetch failed, using aggregator");
                return Ok(DEFAULT_AGGREGATOR.to_string());
            }
        };
        match longest_prefix_base(&services, addr) {
            Some(base) => {
                self.base_cache.set(&key, base.clone());
                Ok(base)
            }
            None => Ok(DEFAULT_AGGREGATOR.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn services(value: Value) -> BootstrapServices {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn entries_skip_malformed_services() {
        let services = services(json!({
            "services": [
                [["COM", 7, "net"], ["https://rdap.example/v1/"]],
                [["org"]],
                [["xyz"], []],
                [["se"], ["https://rdap.se.example", "https://backup.example"]]
            ]
        }));
        let entries: Vec<_> = services.entries().collect();
        assert_eq!(
            entries,
            vec![
                (
                    vec!["COM".to_string(), "net".to_string()],
                    "https://rdap.example/v1".to_string()
                ),
                (
                    vec!["se".to_string()],
                    "https://rdap.se.example".to_string()
                ),
            ]
        );
    }

    #[test]
    fn asn_range_parsing() {
        assert_eq!(parse_asn_range("12345"), Some((12345, 12345)));
        assert_eq!(parse_asn_range(" 1-1876 "), Some((1, 1876)));
        assert_eq!(parse_asn_range("1876-1"), None);
        assert_eq!(parse_asn_range(""), None);
        assert_eq!(parse_asn_range("AS1"), None);
    }

    #[test]
    fn asn_range_match() {
        let services = services(json!({
            "services": [
                [["1-1876"], ["https://a.example/"]],
                [["64512"], ["https://b.example/"]]
            ]
        }));
        assert_eq!(asn_base(&services, 1000).as_deref(), Some("https://a.example"));
        assert_eq!(asn_base(&services, 64512).as_deref(), Some("https://b.example"));
        assert_eq!(asn_base(&services, 2000), None);
    }

    #[test]
    fn longest_prefix_wins() {
        let services = services(json!({
            "services": [
                [["10.0.0.0/8"], ["https://a.example/"]],
                [["10.1.0.0/16"], ["https://b.example/"]]
            ]
        }));
        let addr: IpAddr = "10.1.2.3".parse().unwrap();
        assert_eq!(
            longest_prefix_base(&services, addr).as_deref(),
            Some("https://b.example")
        );
        let addr: IpAddr = "10.2.2.3".parse().unwrap();
        assert_eq!(
            longest_prefix_base(&services, addr).as_deref(),
            Some("https://a.example")
        );
        let addr: IpAddr = "192.0.2.1".parse().unwrap();
        assert_eq!(longest_prefix_base(&services, addr), None);
    }

    #[test]
    fn wrong_family_prefixes_are_skipped() {
        let services = services(json!({
            "services": [
                [["2001:db8::/32"], ["https://six.example/"]],
                [["0.0.0.0/0"], ["https://four.example/"]]
            ]
        }));
        let addr: IpAddr = "2001:db8::1".parse().unwrap();
        assert_eq!(
            longest_prefix_base(&services, addr).as_deref(),
            Some("https://six.example")
        );
    }

    #[test]
    fn ip_or_cidr_parsing_uses_network_address() {
        assert_eq!(
            parse_ip_or_cidr("8.8.8.0/24"),
            Some("8.8.8.0".parse().unwrap())
        );
        assert_eq!(
            parse_ip_or_cidr("10.1.2.3/8"),
            Some("10.0.0.0".parse().unwrap())
        );
        assert_eq!(
            parse_ip_or_cidr("192.0.2.7"),
            Some("192.0.2.7".parse().unwrap())
        );
        assert_eq!(
            parse_ip_or_cidr("2001:db8::1"),
            Some("2001:db8::1".parse().unwrap())
        );
        assert_eq!(parse_ip_or_cidr("not-an-ip"), None);
        assert_eq!(parse_ip_or_cidr("10.0.0.0/99"), None);
    }
}
