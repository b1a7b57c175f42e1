//! Source connector trait and built-in connectors.
//!
//! A connector translates between one upstream API and the canonical
//! [`NormalizedFields`]: it resolves identifiers from URLs, fetches and
//! paginates raw payloads, and maps them onto the common field set.

mod grants_gov;
mod nsf;

use async_trait::async_trait;
use foaintel_shared::{IngestConfig, NormalizedFields, Result, Source};
use tracing::warn;
use url::Url;

pub use grants_gov::GrantsGovConnector;
pub use nsf::NsfConnector;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Untyped, source-specific JSON object as returned by an upstream API.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Outcome of fetching a single opportunity by URL.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    /// The upstream returned a record.
    Found(RawRecord),
    /// The upstream answered but holds no record for the identifier.
    Empty,
    /// The identifier could not be resolved or every fetch tier failed.
    Failed {
        source_url: Option<String>,
        error: String,
    },
}

impl RawPayload {
    pub(crate) fn failed(source_url: Option<&str>, error: impl Into<String>) -> Self {
        Self::Failed {
            source_url: source_url.map(String::from),
            error: error.into(),
        }
    }

    /// The record, if one was found.
    pub fn into_record(self) -> Option<RawRecord> {
        match self {
            Self::Found(record) => Some(record),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Common contract implemented by every upstream source.
///
/// Implementations are stateless apart from their configuration and HTTP client.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Which source this connector talks to.
    fn source(&self) -> Source;

    /// Stable source identifier written into records.
    fn source_name(&self) -> &'static str {
        self.source().as_str()
    }

    /// Resolve the source-native identifier from `url` and fetch its record.
    ///
    /// An unresolvable URL yields [`RawPayload::Failed`] rather than an error.
    async fn fetch_by_url(&self, url: &str) -> Result<RawPayload>;

    /// Page through keyword search results until `max_results` are collected
    /// or the upstream returns an empty page.
    async fn search(&self, keyword: &str, max_results: usize) -> Result<Vec<RawRecord>>;

    /// Map a raw payload onto the canonical field set. Pure; never fails.
    fn extract_fields(&self, raw: &RawRecord) -> NormalizedFields;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Detect which source a URL belongs to.
///
/// Unknown hosts fall back to [`Source::GrantsGov`] with a warning.
pub fn detect_source(url: &str) -> Source {
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase));
    let haystack = host.unwrap_or_else(|| url.to_ascii_lowercase());

    if haystack.contains("grants.gov") {
        Source::GrantsGov
    } else if haystack.contains("nsf.gov") {
        Source::Nsf
    } else {
        warn!(url, "unknown source for URL, defaulting to grants_gov");
        Source::GrantsGov
    }
}

/// Build the connector for `source`.
pub fn connector_for(source: Source, config: &IngestConfig) -> Result<Box<dyn SourceConnector>> {
    Ok(match source {
        Source::GrantsGov => Box::new(GrantsGovConnector::new(config.clone())?),
        Source::Nsf => Box::new(NsfConnector::new(config.clone())?),
    })
}
