//! HTTP plumbing shared by the connectors.

use std::time::Duration;

use foaintel_shared::{FoaError, Result};
use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::connectors::RawRecord;

/// User-Agent string for upstream API requests.
const USER_AGENT: &str = concat!("FOAIntel/", env!("CARGO_PKG_VERSION"));

/// Build a client with the fixed per-request timeout.
pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| FoaError::Network(format!("failed to build HTTP client: {e}")))
}

/// POST a JSON body and decode a JSON response.
///
/// Send errors, non-2xx statuses, and undecodable bodies are all reported as
/// [`FoaError::Network`] so callers can treat them uniformly as transport failures.
pub(crate) async fn post_json(client: &Client, url: &Url, body: &Value) -> Result<Value> {
    let response = client
        .post(url.as_str())
        .json(body)
        .send()
        .await
        .map_err(|e| FoaError::Network(format!("{url}: {e}")))?;

    decode(url, response).await
}

/// GET with query parameters and decode a JSON response.
pub(crate) async fn get_json(client: &Client, url: &Url, query: &[(&str, String)]) -> Result<Value> {
    let response = client
        .get(url.as_str())
        .query(query)
        .send()
        .await
        .map_err(|e| FoaError::Network(format!("{url}: {e}")))?;

    decode(url, response).await
}

async fn decode(url: &Url, response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        return Err(FoaError::Network(format!("{url}: HTTP {status}")));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| FoaError::Network(format!("{url}: invalid JSON body: {e}")))
}

/// Linear backoff: `base * (attempt + 1)` for a zero-based attempt number.
pub(crate) fn backoff(base: Duration, attempt: u32) -> Duration {
    base * (attempt + 1)
}

/// Unwrap an optional `data` envelope around a JSON object.
pub(crate) fn unwrap_data_envelope(value: Value) -> RawRecord {
    match value {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Object(inner)) => inner,
            Some(other) => {
                map.insert("data".into(), other);
                map
            }
            None => map,
        },
        _ => RawRecord::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn backoff_is_linear() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff(base, 0), Duration::from_millis(100));
        assert_eq!(backoff(base, 2), Duration::from_millis(300));
    }

    #[test]
    fn envelope_is_unwrapped() {
        let inner = unwrap_data_envelope(json!({"data": {"oppHits": []}, "errorcode": 0}));
        assert!(inner.contains_key("oppHits"));
        assert!(!inner.contains_key("errorcode"));

        let flat = unwrap_data_envelope(json!({"title": "Direct"}));
        assert_eq!(flat.get("title"), Some(&json!("Direct")));

        assert!(unwrap_data_envelope(json!([1, 2])).is_empty());
    }

    #[tokio::test]
    async fn non_success_status_is_network_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .respond_with(wiremock::ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = build_client(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&server.uri()).unwrap();
        let err = post_json(&client, &url, &json!({})).await.unwrap_err();
        assert!(matches!(err, FoaError::Network(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn invalid_json_is_network_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("<html>busy</html>"))
            .mount(&server)
            .await;

        let client = build_client(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&server.uri()).unwrap();
        let err = get_json(&client, &url, &[]).await.unwrap_err();
        assert!(matches!(err, FoaError::Network(_)));
    }
}
