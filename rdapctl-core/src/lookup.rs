//! Auto-detection of free-form queries onto the typed endpoints.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument};

use crate::bootstrap::parse_ip_or_cidr;
use crate::client::Client;
use crate::error::Result;
use crate::object::RdapObject;

static ASN_QUERY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i:AS)?\d+$").expect("ASN pattern compiles"));
static NS_HOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(ns\d+|dns\d+)[.-]").expect("nameserver pattern compiles"));

/// Entity handles commonly contain a dash, or mix letters and digits
/// (e.g. `ORG-EXAMPLE1`).
fn looks_like_entity_handle(s: &str) -> bool {
    if s.contains('-') {
        return true;
    }
    let has_alpha = s.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = s.chars().any(|c| c.is_ascii_digit());
    has_alpha && has_digit
}

impl Client {
    /// Classifies `query` and dispatches to the matching endpoint: ASN,
    /// then IP/CIDR, then a nameserver-host heuristic, then an
    /// entity-handle heuristic when `tld_hint` is non-empty, and finally
    /// domain. Heuristic misses fall through to the next classification.
    #[instrument(skip(self), fields(query = %query))]
    pub async fn lookup(&self, query: &str, tld_hint: &str) -> Result<RdapObject> {
        let q = query.trim();

        if ASN_QUERY.is_match(q) {
            return self.autnum(q).await.map(RdapObject::Autnum);
        }

        if parse_ip_or_cidr(q).is_some() {
            return self.ip(q).await.map(RdapObject::IpNetwork);
        }

        let lower = q.to_ascii_lowercase();
        if NS_HOST.is_match(&lower) {
            match self.nameserver(&lower).await {
                Ok(nameserver) => return Ok(RdapObject::Nameserver(nameserver)),
                Err(err) => debug!(%err, "nameserver heuristic missed, falling through"),
            }
        }

        if !tld_hint.is_empty() && looks_like_entity_handle(&lower) {
            match self.entity(q, tld_hint).await {
                Ok(entity) => return Ok(RdapObject::Entity(entity)),
                Err(err) => debug!(%err, "entity heuristic missed, falling through"),
            }
        }

        self.domain(&lower).await.map(RdapObject::Domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asn_pattern() {
        assert!(ASN_QUERY.is_match("15169"));
        assert!(ASN_QUERY.is_match("AS15169"));
        assert!(ASN_QUERY.is_match("as15169"));
        assert!(!ASN_QUERY.is_match("AS15169x"));
        assert!(!ASN_QUERY.is_match("example.com"));
    }

    #[test]
    fn nameserver_pattern() {
        assert!(NS_HOST.is_match("ns1.example.com"));
        assert!(NS_HOST.is_match("dns2-a.example.com"));
        assert!(!NS_HOST.is_match("www.example.com"));
        assert!(!NS_HOST.is_match("nsx.example.com"));
    }

    #[test]
    fn entity_handle_heuristic() {
        assert!(looks_like_entity_handle("org-example1"));
        assert!(looks_like_entity_handle("orgexample123"));
        assert!(!looks_like_entity_handle("example"));
        assert!(!looks_like_entity_handle("12345"));
    }
}
