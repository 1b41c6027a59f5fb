//! Log record types.
//!
//! [`LogRecord`] is the normalized, already-masked representation of one
//! logged exchange. It is produced by the record builder and never mutated
//! afterwards, so it exposes getters only.
//!
//! [`StoredRecord`] is what sinks persist: the structured fields flattened to
//! pretty-printed JSON text, the way the storage table expects them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// One logged exchange.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    api: String,
    method: String,
    client_ip: String,
    headers: BTreeMap<String, String>,
    body: Option<Value>,
    response: Option<Value>,
    status_code: u16,
    #[serde(serialize_with = "serialize_secs")]
    execution_time: Duration,
    added_on: DateTime<Utc>,
}

impl LogRecord {
    /// Only the record builder constructs records, after masking.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        api: String,
        method: String,
        client_ip: String,
        headers: BTreeMap<String, String>,
        body: Option<Value>,
        response: Option<Value>,
        status_code: u16,
        execution_time: Duration,
    ) -> Self {
        Self {
            api,
            method,
            client_ip,
            headers,
            body,
            response,
            status_code,
            execution_time,
            added_on: Utc::now(),
        }
    }

    /// The URL, rendered per the configured resolution mode.
    pub fn api(&self) -> &str {
        &self.api
    }

    /// HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Best-effort client IP. Empty when unknown.
    pub fn client_ip(&self) -> &str {
        &self.client_ip
    }

    /// Request headers, masked.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Request body, masked. `None` when empty or not valid JSON.
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Response body, masked, or a placeholder for streaming and oversized
    /// responses. `None` when empty or not valid JSON.
    pub fn response(&self) -> Option<&Value> {
        self.response.as_ref()
    }

    /// Response status code.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Wall-clock time between request entry and response availability.
    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }

    /// When the record was created.
    pub fn added_on(&self) -> DateTime<Utc> {
        self.added_on
    }

    /// Flatten into the storage format.
    pub fn to_stored(&self) -> StoredRecord {
        StoredRecord::from(self)
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// A record as written to the storage sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Logged URL.
    pub api: String,
    /// Masked headers as pretty JSON.
    pub headers: String,
    /// Masked request body as pretty JSON, or empty.
    pub body: String,
    /// HTTP method.
    pub method: String,
    /// Client IP.
    pub client_ip_address: String,
    /// Masked response as pretty JSON, or empty.
    pub response: String,
    /// Response status code.
    pub status_code: u16,
    /// Seconds.
    pub execution_time: f64,
    /// Record creation time.
    pub added_on: DateTime<Utc>,
}

impl From<&LogRecord> for StoredRecord {
    fn from(record: &LogRecord) -> Self {
        Self {
            api: record.api.clone(),
            headers: pretty(&record.headers),
            body: record.body.as_ref().map(pretty).unwrap_or_default(),
            method: record.method.clone(),
            client_ip_address: record.client_ip.clone(),
            response: record.response.as_ref().map(pretty).unwrap_or_default(),
            status_code: record.status_code,
            execution_time: record.execution_time.as_secs_f64(),
            added_on: record.added_on,
        }
    }
}

fn pretty<T: Serialize + ?Sized>(value: &T) -> String {
    // String-keyed maps and JSON values always serialize.
    serde_json::to_string_pretty(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> LogRecord {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        LogRecord::new(
            "http://example.com/users?page=2".to_string(),
            "POST".to_string(),
            "10.0.0.1".to_string(),
            headers,
            Some(json!({ "name": "ada" })),
            Some(json!({ "id": 1 })),
            201,
            Duration::from_millis(1500),
        )
    }

    #[test]
    fn test_stored_record_formats_json_text() {
        let stored = sample().to_stored();

        assert_eq!(stored.api, "http://example.com/users?page=2");
        assert_eq!(stored.client_ip_address, "10.0.0.1");
        assert_eq!(stored.status_code, 201);
        assert_eq!(stored.execution_time, 1.5);
        assert!(stored.headers.contains("\"content-type\": \"application/json\""));
        assert!(stored.body.contains('\n'));
        assert_eq!(
            serde_json::from_str::<Value>(&stored.response).unwrap(),
            json!({ "id": 1 })
        );
    }

    #[test]
    fn test_empty_body_stored_as_empty_text() {
        let record = LogRecord::new(
            "/".to_string(),
            "GET".to_string(),
            String::new(),
            BTreeMap::new(),
            None,
            None,
            204,
            Duration::ZERO,
        );
        let stored = record.to_stored();
        assert_eq!(stored.body, "");
        assert_eq!(stored.response, "");
        assert_eq!(stored.headers, "{}");
    }

    #[test]
    fn test_record_serializes_execution_time_as_seconds() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["execution_time"], json!(1.5));
        assert_eq!(value["method"], "POST");
    }
}
