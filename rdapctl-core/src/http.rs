//! The HTTP fetch engine: validators, response caching, bounded retries,
//! and rate-limit handling.

use std::time::Duration;

use reqwest::header::{HeaderMap, ACCEPT, IF_MODIFIED_SINCE, IF_NONE_MATCH, USER_AGENT};
use reqwest::Response;
use serde_json::{Map, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::client::Client;
use crate::error::{RdapError, Result};
use crate::retry::{is_retryable_transport, retry_after};
use crate::util::format_http_date;

const RDAP_ACCEPT: &str = "application/rdap+json, application/json;q=0.8, */*;q=0.1";

const RESPONSE_BODY_CAP: usize = 1 << 20;
const ERROR_BODY_CAP: usize = 512 << 10;
const NEGATIVE_WINDOW: Duration = Duration::from_secs(5 * 60);

pub type JsonMap = Map<String, Value>;

impl Client {
    /// Performs a GET for an RDAP JSON document with validator-based
    /// revalidation, response caching, bounded retries, and `Retry-After`
    /// honoring. Returns the decoded object and the response headers
    /// (empty on a cache hit).
    ///
    /// Dropping the returned future aborts the in-flight request and any
    /// backoff sleep; no further requests are issued.
    pub async fn get_json(&self, url: &str) -> Result<(JsonMap, HeaderMap)> {
        // Fresh cache hit: no network I/O, no validators.
        if let Some(body) = self.resp_cache.get(url) {
            if let Ok(map) = serde_json::from_slice::<JsonMap>(&body) {
                debug!(url, "serving fresh cached response");
                return Ok((map, HeaderMap::new()));
            }
        }

        let mut use_validators = true;
        let mut did_unconditional = false;
        let mut attempt: u32 = 1;

        loop {
            let mut request = self
                .http
                .get(url)
                .timeout(self.base_timeout)
                .header(ACCEPT, RDAP_ACCEPT)
                .header(USER_AGENT, &self.user_agent)
                .headers(self.extra_headers.clone());

            if use_validators {
                if let Some(meta) = self.resp_cache.meta(url) {
                    if !meta.etag.is_empty() {
                        request = request.header(IF_NONE_MATCH, &meta.etag);
                    }
                    if let Some(last_modified) = meta.last_modified {
                        request =
                            request.header(IF_MODIFIED_SINCE, format_http_date(last_modified));
                    }
                }
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    if attempt <= self.max_retries && is_retryable_transport(&err) {
                        let wait = (self.backoff)(attempt);
                        warn!(url, attempt, error = %err, "transport error, retrying");
                        sleep(wait).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(err.into());
                }
            };

            match response.status().as_u16() {
                304 => {
                    let headers = response.headers().clone();
                    if let Some(body) = self.resp_cache.fresh_body(url) {
                        if let Ok(map) = serde_json::from_slice::<JsonMap>(&body) {
                            self.resp_cache.update_freshness(url, &headers);
                            debug!(url, "revalidated cached response");
                            return Ok((map, headers));
                        }
                    }
                    // No cached body: drop validators once and retry
                    // unconditionally, without spending the retry budget.
                    if !did_unconditional {
                        did_unconditional = true;
                        use_validators = false;
                        continue;
                    }
                    return Err(RdapError::NotModifiedWithoutBody(url.to_string()));
                }
                200 => {
                    let headers = response.headers().clone();
                    let body = read_body_capped(response, RESPONSE_BODY_CAP).await?;
                    let map: JsonMap = serde_json::from_slice(&body)?;
                    self.resp_cache.store(url, &body, &headers);
                    return Ok((map, headers));
                }
                429 | 500 | 502 | 503 | 504 => {
                    let status = response.status();
                    let wait = retry_after(response.headers(), (self.backoff)(attempt));
                    if attempt <= self.max_retries {
                        warn!(url, attempt, status = status.as_u16(), "server busy, retrying");
                        sleep(wait).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(RdapError::HttpStatus {
                        url: url.to_string(),
                        status,
                        body: String::new(),
                    });
                }
                code => {
                    let status = response.status();
                    let body = read_body_capped(response, ERROR_BODY_CAP)
                        .await
                        .unwrap_or_default();
                    if code == 404 {
                        self.resp_cache.store_negative(url, NEGATIVE_WINDOW);
                    }
                    return Err(RdapError::HttpStatus {
                        url: url.to_string(),
                        status,
                        body: String::from_utf8_lossy(&body).into_owned(),
                    });
                }
            }
        }
    }
}

/// Reads a response body, truncating at `cap` bytes.
pub(crate) async fn read_body_capped(mut response: Response, cap: usize) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > cap {
            body.extend_from_slice(&chunk[..cap - body.len()]);
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
