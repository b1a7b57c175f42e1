//! Award-registry connector (api.nsf.gov awards).
//!
//! A single GET endpoint serves both lookups: `id=` for one award and
//! `keyword=` with one-based `offset`/`rpp` paging for search. Unlike the
//! grants connector, a detail fetch that keeps failing is propagated.

use std::sync::LazyLock;

use async_trait::async_trait;
use foaintel_shared::{FoaError, IngestConfig, NormalizedFields, Result, Source};
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use super::{RawPayload, RawRecord, SourceConnector};
use crate::fields::{first_present, first_string, parse_amount, parse_date};
use crate::http;

/// Fields projected by every awards request.
pub const PRINT_FIELDS: &[&str] = &[
    "id",
    "title",
    "agency",
    "startDate",
    "expDate",
    "abstractText",
    "fundsObligatedAmt",
    "awardeeCity",
    "awardeeStateCode",
    "awardeeName",
    "piFirstName",
    "piLastName",
    "poName",
    "primaryProgram",
    "programElementCode",
    "fundProgramName",
];

const AWARD_URL_PREFIX: &str = "https://www.nsf.gov/awardsearch/showAward?AWD_ID=";

static AWARD_ID_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)AWD_ID=(\d+)").expect("valid regex"));

// Bare 7-digit path segment on an nsf.gov URL.
static AWARD_ID_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"nsf\.gov/(?:[^?#]*/)?(\d{7})(?:$|[/?#])").expect("valid regex"));

/// Connector for the award-registry API.
pub struct NsfConnector {
    config: IngestConfig,
    client: Client,
}

impl NsfConnector {
    pub fn new(config: IngestConfig) -> Result<Self> {
        let client = http::build_client(config.timeout)?;
        Ok(Self { config, client })
    }

    /// Extract the award id from an `AWD_ID=` parameter or a 7-digit path segment.
    pub fn extract_award_id(url: &str) -> Option<String> {
        [&*AWARD_ID_PARAM, &*AWARD_ID_SEGMENT]
            .into_iter()
            .find_map(|re| re.captures(url))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Single-tier fetch; retries transport failures, then propagates the last one.
    #[instrument(skip_all, fields(award_id = award_id))]
    async fn fetch_by_id(&self, award_id: &str) -> Result<RawPayload> {
        let query = [("id", award_id.to_string()), ("printFields", PRINT_FIELDS.join(","))];
        let attempts = self.config.max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            match http::get_json(&self.client, &self.config.awards_url, &query).await {
                Ok(value) => {
                    let mut awards = awards(value);
                    if awards.is_empty() {
                        warn!("no award found");
                        return Ok(RawPayload::Empty);
                    }
                    info!("fetched award");
                    return Ok(RawPayload::Found(awards.swap_remove(0)));
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, attempts, error = %e, "award fetch failed");
                    if attempt + 1 < attempts {
                        tokio::time::sleep(http::backoff(self.config.rate_limit_delay, attempt)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FoaError::Network(format!("award {award_id}: no attempts made"))))
    }
}

#[async_trait]
impl SourceConnector for NsfConnector {
    fn source(&self) -> Source {
        Source::Nsf
    }

    async fn fetch_by_url(&self, url: &str) -> Result<RawPayload> {
        match Self::extract_award_id(url) {
            Some(award_id) => self.fetch_by_id(&award_id).await,
            None => {
                warn!(url, "could not extract award id from URL");
                Ok(RawPayload::failed(Some(url), "Could not extract award ID"))
            }
        }
    }

    #[instrument(skip_all, fields(keyword = keyword, max_results = max_results))]
    async fn search(&self, keyword: &str, max_results: usize) -> Result<Vec<RawRecord>> {
        let mut results: Vec<RawRecord> = Vec::new();
        let page_size = max_results.min(self.config.page_size);
        let print_fields = PRINT_FIELDS.join(",");
        // one-based
        let mut offset = 1usize;

        while results.len() < max_results {
            let query = [
                ("keyword", keyword.to_string()),
                ("printFields", print_fields.clone()),
                ("offset", offset.to_string()),
                ("rpp", page_size.to_string()),
            ];

            match http::get_json(&self.client, &self.config.awards_url, &query).await {
                Ok(value) => {
                    let page = awards(value);
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
        let award_id = first_string(raw, &["id"]).unwrap_or_default();
        let amount = first_present(raw, &["fundsObligatedAmt"]).and_then(parse_amount);

        let source_url = if award_id.is_empty() {
            String::new()
        } else {
            format!("{AWARD_URL_PREFIX}{award_id}")
        };

        NormalizedFields {
            title: first_string(raw, &["title"]).unwrap_or_else(|| "Unknown".into()),
            agency: first_string(raw, &["agency"]).unwrap_or_else(|| "NSF".into()),
            open_date: first_present(raw, &["startDate"]).and_then(parse_date),
            close_date: first_present(raw, &["expDate"]).and_then(parse_date),
            eligibility: eligibility(raw),
            program_description: program_description(raw),
            award_range_min: amount,
            award_range_max: amount,
            source_url,
            source: Source::Nsf,
            foa_id: award_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Pull `response.award` out of an awards response.
fn awards(value: Value) -> Vec<RawRecord> {
    let Value::Object(mut root) = value else {
        return Vec::new();
    };
    match root.remove("response") {
        Some(Value::Object(mut response)) => match response.remove("award") {
            Some(Value::Array(list)) => list
                .into_iter()
                .filter_map(|award| match award {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// "Awardee: <name>; PI: <first last>", either part optional.
fn eligibility(raw: &RawRecord) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(awardee) = first_string(raw, &["awardeeName"]) {
        parts.push(format!("Awardee: {awardee}"));
    }

    let pi = [
        first_string(raw, &["piFirstName"]),
        first_string(raw, &["piLastName"]),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ");
    if !pi.trim().is_empty() {
        parts.push(format!("PI: {}", pi.trim()));
    }

    (!parts.is_empty()).then(|| parts.join("; "))
}

/// The abstract, prefixed with a "Program: <name>" line when a program is named.
fn program_description(raw: &RawRecord) -> Option<String> {
    let abstract_text = first_string(raw, &["abstractText"]).unwrap_or_default();
    let description = match first_string(raw, &["primaryProgram", "fundProgramName"]) {
        Some(program) => format!("Program: {program}\n\n{abstract_text}"),
        None => abstract_text,
    };
    (!description.is_empty()).then_some(description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{load_json_fixture, test_config};
    use chrono::NaiveDate;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const AWARDS_PATH: &str = "/services/v1/awards.json";

    fn connector(server: &MockServer) -> NsfConnector {
        NsfConnector::new(test_config(&server.uri())).unwrap()
    }

    fn page(start: usize, count: usize) -> Value {
        let awards: Vec<Value> = (start..start + count)
            .map(|i| json!({"id": format!("{:07}", 2_300_000 + i), "title": format!("Award {i}")}))
            .collect();
        json!({ "response": { "award": awards } })
    }

    #[test]
    fn award_id_patterns_compile() {
        assert!(AWARD_ID_PARAM.is_match("AWD_ID=1"));
        assert!(AWARD_ID_SEGMENT.is_match("https://www.nsf.gov/awards/2345678"));
    }

    #[test]
    fn extracts_award_ids() {
        assert_eq!(
            NsfConnector::extract_award_id("https://www.nsf.gov/awardsearch/showAward?AWD_ID=2345678"),
            Some("2345678".into())
        );
        assert_eq!(
            NsfConnector::extract_award_id("https://nsf.gov/awardsearch/showAward?awd_id=2345678&HistoricalAwards=false"),
            Some("2345678".into())
        );
        assert_eq!(
            NsfConnector::extract_award_id("https://www.nsf.gov/awards/2345678/summary"),
            Some("2345678".into())
        );
        assert_eq!(NsfConnector::extract_award_id("https://www.nsf.gov/funding/"), None);
        assert_eq!(NsfConnector::extract_award_id("https://www.nsf.gov/awards/123456789"), None);
    }

    #[tokio::test]
    async fn fetch_returns_first_award() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(AWARDS_PATH))
            .and(query_param("id", "2345678"))
            .and(query_param("printFields", PRINT_FIELDS.join(",")))
            .respond_with(ResponseTemplate::new(200).set_body_json(load_json_fixture("nsf_award.json")))
            .expect(1)
            .mount(&server)
            .await;

        let record = connector(&server)
            .fetch_by_url("https://www.nsf.gov/awardsearch/showAward?AWD_ID=2345678")
            .await
            .unwrap()
            .into_record()
            .expect("found");
        assert_eq!(record.get("id"), Some(&json!("2345678")));
    }

    #[tokio::test]
    async fn empty_award_list_is_empty_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": {"award": []}})))
            .expect(1)
            .mount(&server)
            .await;

        let payload = connector(&server)
            .fetch_by_url("https://www.nsf.gov/awardsearch/showAward?AWD_ID=1000000")
            .await
            .unwrap();
        assert_eq!(payload, RawPayload::Empty);
    }

    #[tokio::test]
    async fn persistent_failure_propagates_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let err = connector(&server)
            .fetch_by_url("https://www.nsf.gov/awardsearch/showAward?AWD_ID=2345678")
            .await
            .unwrap_err();
        assert!(matches!(err, FoaError::Network(_)));
    }

    #[tokio::test]
    async fn unresolvable_url_is_failed_payload() {
        let server = MockServer::start().await;
        let payload = connector(&server).fetch_by_url("https://www.nsf.gov/funding/").await.unwrap();
        assert!(matches!(payload, RawPayload::Failed { source_url: Some(_), .. }));
    }

    #[tokio::test]
    async fn search_uses_one_based_offsets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("keyword", "quantum"))
            .and(query_param("offset", "1"))
            .and(query_param("rpp", "25"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(0, 25)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("offset", "26"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(25, 25)))
            .expect(1)
            .mount(&server)
            .await;

        let results = connector(&server).search("quantum", 30).await.unwrap();
        assert_eq!(results.len(), 30);
    }

    #[tokio::test]
    async fn search_within_one_page_issues_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("rpp", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(0, 10)))
            .expect(1)
            .mount(&server)
            .await;

        let results = connector(&server).search("quantum", 10).await.unwrap();
        assert_eq!(results.len(), 10);
    }

    #[tokio::test]
    async fn search_stops_on_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let results = connector(&server).search("nothing", 10).await.unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn extracts_award_fields() {
        let connector = NsfConnector::new(IngestConfig::default()).unwrap();
        let raw = awards(load_json_fixture("nsf_award.json")).swap_remove(0);
        let fields = connector.extract_fields(&raw);

        assert_eq!(fields.foa_id, "2345678");
        assert_eq!(fields.title, "Collaborative Research: Machine Learning for Coastal Flood Prediction");
        assert_eq!(fields.agency, "NSF");
        assert_eq!(fields.open_date, NaiveDate::from_ymd_opt(2024, 9, 1));
        assert_eq!(fields.close_date, NaiveDate::from_ymd_opt(2027, 8, 31));
        assert_eq!(fields.award_range_min, Some(449_872.0));
        assert_eq!(fields.award_range_min, fields.award_range_max);
        assert_eq!(
            fields.eligibility.as_deref(),
            Some("Awardee: University of Example; PI: Jane Researcher")
        );
        assert_eq!(fields.source_url, "https://www.nsf.gov/awardsearch/showAward?AWD_ID=2345678");

        let description = fields.program_description.expect("description");
        assert!(description.starts_with("Program: Hydrologic Sciences\n\n"));
        assert!(description.contains("coastal flooding"));
    }

    #[test]
    fn sparse_award_uses_defaults() {
        let connector = NsfConnector::new(IngestConfig::default()).unwrap();
        let raw = match json!({"piLastName": "Solo"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let fields = connector.extract_fields(&raw);
        assert_eq!(fields.foa_id, "");
        assert_eq!(fields.title, "Unknown");
        assert_eq!(fields.agency, "NSF");
        assert_eq!(fields.eligibility.as_deref(), Some("PI: Solo"));
        assert_eq!(fields.program_description, None);
        assert_eq!(fields.source_url, "");
    }
}
