use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Page-view events feed the hourly page-view buckets and referrer grouping.
pub const PAGEVIEW: &str = "pageview";
/// Sync pings are bucketed per hour separately from page views.
pub const QUICKSYNC: &str = "quicksync";

/// The payload the ingestion client sends to `POST /ingest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestPayload {
    pub domain: String,
    pub path: String,
    #[serde(default)]
    pub query: String,
    pub event_name: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub visitor_id: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
    /// Forwarded-for chain; the first entry is the client address.
    #[serde(default)]
    pub client_ip: Vec<String>,
    #[serde(default)]
    pub client_user_agent: String,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub status_code: i16,
    /// Free-form JSON object, kept as received.
    #[serde(default)]
    pub event_data: Option<serde_json::Value>,
}

/// One stored, already-classified occurrence. Mirrors the `events` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub domain: String,
    pub event_name: String,
    pub timestamp: DateTime<Utc>,
    pub visitor_id: String,
    pub session_id: Option<String>,
    pub path: String,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    /// Host of `referrer`, computed at ingest.
    pub referrer_domain: Option<String>,
    pub country: String,
    /// Serialized JSON object of query-string parameters.
    pub query_params: Option<String>,
    /// Serialized JSON string of the client's event payload.
    pub event_data: Option<String>,
    pub status_code: i16,
    pub duration_ms: Option<i64>,
}

impl Event {
    pub fn is_pageview(&self) -> bool {
        self.event_name == PAGEVIEW
    }
}

/// Network-layer facts of one HTTP request. Mirrors the `requests` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: String,
    pub domain: String,
    pub timestamp: DateTime<Utc>,
    pub path: String,
    pub user_agent: Option<String>,
    pub primary_ip: String,
    /// Forwarded-for entries beyond the first.
    pub secondary_ips: Vec<String>,
    pub country: String,
    pub status_code: i16,
    pub duration_ms: Option<i64>,
}

/// Lower-case and trim a site domain so stored rows and queries agree.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().to_lowercase()
}

/// Parse a raw query string into a JSON object string, keeping the first
/// value of each key. Returns `None` when the query carries no parameters.
pub fn encode_query_params(query: &str) -> Result<Option<String>, CoreError> {
    let query = query.trim_start_matches('?');
    let mut params: BTreeMap<String, String> = BTreeMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    if params.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(&params)?))
}

/// Map empty strings to `None`.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_params_keep_first_value() {
        let json = encode_query_params("?utm_source=ads&utm_source=mail&sale_total=19.99")
            .expect("encode")
            .expect("non-empty");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("json");
        assert_eq!(parsed["utm_source"], "ads");
        assert_eq!(parsed["sale_total"], "19.99");
    }

    #[test]
    fn empty_query_is_none() {
        assert_eq!(encode_query_params("").expect("encode"), None);
        assert_eq!(encode_query_params("?").expect("encode"), None);
    }

    #[test]
    fn ingest_payload_uses_camel_case() {
        let payload: IngestPayload = serde_json::from_str(
            r#"{"domain":"Example.com","path":"/","eventName":"pageview","clientIp":["1.0.0.1","10.0.0.1"]}"#,
        )
        .expect("parse");
        assert_eq!(payload.event_name, "pageview");
        assert_eq!(payload.client_ip.len(), 2);
        assert_eq!(payload.duration, 0);
        assert_eq!(normalize_domain(&payload.domain), "example.com");
    }
}
