//! Async RDAP (RFC 9082/9083) client with IANA bootstrap resolution,
//! validator-based HTTP caching, and typed object classes.
//!
//! A [`Client`] resolves a query (domain, nameserver, IP/CIDR, ASN, or
//! entity handle) to the authoritative RDAP server using the IANA service
//! registries, fetches the response under caching and retry discipline,
//! and returns a typed object.
//!
//! ```no_run
//! # async fn demo() -> rdapctl_core::Result<()> {
//! let client = rdapctl_core::Client::new();
//! let domain = client.domain("example.com").await?;
//! println!("{:?}", domain.ldh_name);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod error;
pub mod object;
pub mod retry;
pub mod types;

mod bootstrap;
mod http;
mod lookup;
mod util;

pub use cache::{CacheMeta, Clock, ResponseCache, TtlLruCache};
pub use client::Client;
pub use error::{RdapError, Result};
pub use http::JsonMap;
pub use object::{parse_object, RdapObject};
pub use retry::{exponential_backoff, Backoff};
pub use types::{Autnum, Domain, Entity, IpNetwork, Nameserver};
