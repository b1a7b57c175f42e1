//! Grants-search connector (api.grants.gov).
//!
//! Two POST endpoints: `fetchOpportunity` for a single record by numeric id,
//! and `search2` for keyword search. A detail fetch that yields nothing falls
//! back to a search using the id as the keyword.

use std::sync::LazyLock;

use async_trait::async_trait;
use foaintel_shared::{IngestConfig, NormalizedFields, Result, Source};
use regex::Regex;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument, warn};

use super::{RawPayload, RawRecord, SourceConnector};
use crate::fields::{descriptive_text, first_present, first_string, parse_amount, parse_date};
use crate::http;

/// Public detail page for an opportunity id.
const DETAIL_URL_PREFIX: &str = "https://www.grants.gov/search-results-detail/";

/// Statuses included in keyword search.
const SEARCH_STATUSES: &str = "forecasted|posted";

/// Statuses included when searching by id as a fetch fallback.
const FALLBACK_STATUSES: &str = "forecasted|posted|closed|archived";

/// Rows requested by the fallback search.
const FALLBACK_ROWS: usize = 5;

/// Descriptive fields shorter than this are labels, not prose.
const MIN_DESCRIPTION_CHARS: usize = 20;

const ID_FIELDS: &[&str] = &["number", "opportunityNumber", "oppId", "id"];
const TITLE_FIELDS: &[&str] = &["title", "opportunityTitle"];
const AGENCY_FIELDS: &[&str] = &["agency", "agencyName"];
const OPEN_DATE_FIELDS: &[&str] = &["openDate", "postDate", "postingDate"];
const CLOSE_DATE_FIELDS: &[&str] = &["closeDate", "responseDate", "archiveDate"];
const FLOOR_FIELDS: &[&str] = &["awardFloor", "fundingFloor"];
const CEILING_FIELDS: &[&str] = &["awardCeiling", "fundingCeiling"];
const ELIGIBILITY_FIELDS: &[&str] = &["eligibility", "applicantEligibilityDesc"];
const DESCRIPTION_FIELDS: &[&str] = &["synopsis", "synopsisDesc", "description", "opportunityTitle"];

/// URL shapes carrying an opportunity id, tried in order.
static ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"grants\.gov/search-results-detail/(\d+)",
        r"grants\.gov/view-opportunity/html/\?oppId=(\d+)",
        r"grants\.gov.*[?&]oppId=(\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// Connector for the grants-search API.
pub struct GrantsGovConnector {
    config: IngestConfig,
    client: Client,
}

impl GrantsGovConnector {
    pub fn new(config: IngestConfig) -> Result<Self> {
        let client = http::build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    /// Extract the numeric opportunity id from a grants.gov URL.
    pub fn extract_opportunity_id(url: &str) -> Option<u64> {
        ID_PATTERNS
            .iter()
            .find_map(|re| re.captures(url))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Detail fetch with retries, then the search fallback.
    #[instrument(skip_all, fields(opp_id = opp_id))]
    async fn fetch_by_id(&self, opp_id: u64) -> RawPayload {
        let body = json!({ "oppId": opp_id });
        let attempts = self.config.max_retries.max(1);

        for attempt in 0..attempts {
            match http::post_json(&self.client, &self.config.grants_fetch_url, &body).await {
                Ok(value) => {
                    let inner = http::unwrap_data_envelope(value);
                    if first_present(&inner, &["opportunity", "title"]).is_some() {
                        info!("fetched opportunity via detail endpoint");
                        return RawPayload::Found(inner);
                    }
                    // A data-less answer ends this tier at once, even on the
                    // first attempt; the retry budget is not spent on it.
                    warn!("detail endpoint returned no data, trying search fallback");
                    break;
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, attempts, error = %e, "detail fetch failed");
                    if attempt + 1 < attempts {
                        tokio::time::sleep(http::backoff(self.config.rate_limit_delay, attempt)).await;
                    }
                }
            }
        }

        self.search_by_id(opp_id).await
    }

    /// Search using the id as the keyword; prefer an exact id match.
    async fn search_by_id(&self, opp_id: u64) -> RawPayload {
        info!(opp_id, "using search fallback");
        let body = json!({
            "keyword": opp_id.to_string(),
            "oppStatuses": FALLBACK_STATUSES,
            "rows": FALLBACK_ROWS,
            "offset": 0,
        });
        let attempts = self.config.max_retries.max(1);

        for attempt in 0..attempts {
            match http::post_json(&self.client, &self.config.grants_search_url, &body).await {
                Ok(value) => return pick_hit(opp_id, opp_hits(value)),
                Err(e) => {
                    error!(opp_id, attempt = attempt + 1, attempts, error = %e, "search fallback failed");
                    if attempt + 1 < attempts {
                        tokio::time::sleep(http::backoff(self.config.rate_limit_delay, attempt)).await;
                    }
                }
            }
        }

        RawPayload::failed(None, format!("Could not fetch opportunity {opp_id}"))
    }
}

#[async_trait]
impl SourceConnector for GrantsGovConnector {
    fn source(&self) -> Source {
        Source::GrantsGov
    }

    async fn fetch_by_url(&self, url: &str) -> Result<RawPayload> {
        match Self::extract_opportunity_id(url) {
            Some(opp_id) => Ok(self.fetch_by_id(opp_id).await),
            None => {
                warn!(url, "could not extract opportunity id from URL");
                Ok(RawPayload::failed(Some(url), "Could not extract opportunity ID"))
            }
        }
    }

    #[instrument(skip_all, fields(keyword = keyword, max_results = max_results))]
    async fn search(&self, keyword: &str, max_results: usize) -> Result<Vec<RawRecord>> {
        let mut results: Vec<RawRecord> = Vec::new();
        let page_size = max_results.min(self.config.page_size);
        let mut offset = 0usize;

        while results.len() < max_results {
            let body = json!({
                "keyword": keyword,
                "oppStatuses": SEARCH_STATUSES,
                "sortBy": "openDate|desc",
                "rows": page_size,
                "offset": offset,
            });

            match http::post_json(&self.client, &self.config.grants_search_url, &body).await {
                Ok(value) => {
                    let page = opp_hits(value);
                    if page.is_empty() {
                        break;
                    }
                    debug!(offset, count = page.len(), "received search page");
                    results.extend(page);
                    offset += page_size;
                    if results.len() < max_results {
                        tokio::time::sleep(self.config.rate_limit_delay).await;
                    }
                }
                Err(e) => {
                    error!(offset, error = %e, "search failed");
                    break;
                }
            }
        }

        results.truncate(max_results);
        info!(count = results.len(), "search complete");
        Ok(results)
    }

    fn extract_fields(&self, raw: &RawRecord) -> NormalizedFields {
        let opportunity = merge_synopsis(raw);
        let o = &opportunity;

        let source_url = first_string(o, &["oppId", "id"])
            .map(|id| format!("{DETAIL_URL_PREFIX}{id}"))
            .unwrap_or_default();

        NormalizedFields {
            foa_id: first_string(o, ID_FIELDS).unwrap_or_default(),
            title: first_string(o, TITLE_FIELDS).unwrap_or_else(|| "Unknown".into()),
            agency: first_string(o, AGENCY_FIELDS).unwrap_or_else(|| "Unknown".into()),
            open_date: first_present(o, OPEN_DATE_FIELDS).and_then(parse_date),
            close_date: first_present(o, CLOSE_DATE_FIELDS).and_then(parse_date),
            eligibility: first_string(o, ELIGIBILITY_FIELDS),
            program_description: descriptive_text(o, DESCRIPTION_FIELDS, MIN_DESCRIPTION_CHARS),
            award_range_min: first_present(o, FLOOR_FIELDS).and_then(parse_amount),
            award_range_max: first_present(o, CEILING_FIELDS).and_then(parse_amount),
            source_url,
            source: Source::GrantsGov,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Pull `oppHits` out of a (possibly enveloped) search response.
fn opp_hits(value: Value) -> Vec<RawRecord> {
    match http::unwrap_data_envelope(value).remove("oppHits") {
        Some(Value::Array(hits)) => hits
            .into_iter()
            .filter_map(|hit| match hit {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn pick_hit(opp_id: u64, mut hits: Vec<RawRecord>) -> RawPayload {
    let wanted = opp_id.to_string();
    if let Some(pos) = hits
        .iter()
        .position(|hit| first_string(hit, &["id"]).as_deref() == Some(wanted.as_str()))
    {
        info!(opp_id, "found opportunity via search fallback");
        return RawPayload::Found(hits.swap_remove(pos));
    }

    if hits.is_empty() {
        return RawPayload::failed(None, format!("Could not fetch opportunity {opp_id}"));
    }

    warn!(opp_id, "no exact id match, using best search hit");
    RawPayload::Found(hits.swap_remove(0))
}

/// The opportunity object with any `synopsis` object merged over it.
fn merge_synopsis(raw: &RawRecord) -> RawRecord {
    let mut merged = match raw.get("opportunity") {
        Some(Value::Object(inner)) => inner.clone(),
        _ => raw.clone(),
    };

    let synopsis = match raw.get("synopsis") {
        Some(Value::Object(s)) => Some(s.clone()),
        _ => match merged.get("synopsis") {
            Some(Value::Object(s)) => Some(s.clone()),
            _ => None,
        },
    };

    if let Some(synopsis) = synopsis {
        for (key, value) in synopsis {
            if !value.is_null() {
                merged.insert(key, value);
            }
        }
    }
    merged
}
