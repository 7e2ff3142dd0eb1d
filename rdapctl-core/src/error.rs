use thiserror::Error;

#[derive(Error, Debug)]
pub enum RdapError {
    #[error("empty TLD")]
    EmptyTld,

    #[error("invalid ASN: {0}")]
    InvalidAsn(String),

    #[error("invalid IP address or CIDR: {0}")]
    InvalidIp(String),

    #[error("no RDAP base for TLD {0:?}")]
    NoRdapBaseForTld(String),

    #[error("bootstrap fetch failed: {status}")]
    BootstrapFetch { status: reqwest::StatusCode },

    #[error("bootstrap 304 Not Modified (no cached body)")]
    BootstrapStale,

    #[error("parse bootstrap: {0}")]
    BootstrapParse(#[source] serde_json::Error),

    #[error("rdap GET {url}: {status}: {body}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("rdap GET {0}: 304 but no cached body")]
    NotModifiedWithoutBody(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("empty RDAP object")]
    NilObject,

    #[error("unknown RDAP objectClassName: {0}")]
    UnknownObjectClass(String),

    #[error("unexpected RDAP objectClassName, want {expected}, got {got}")]
    UnexpectedObjectClass { expected: &'static str, got: String },
}

pub type Result<T> = std::result::Result<T, RdapError>;
