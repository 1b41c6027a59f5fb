//! Building log records from exchanges.
//!
//! [`RecordBuilder`] turns an exchange that passed the filter chain into a
//! [`LogRecord`]. Nothing here can fail: bodies that are not JSON become
//! `None`, streaming and oversized bodies become placeholders, and unknown
//! client addresses become an empty string.

use crate::config::{FilterConfig, UrlResolution};
use crate::exchange::{Exchange, ResponseBody};
use crate::mask::Masker;
use crate::record::LogRecord;
use bytes::Bytes;
use http::HeaderMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

/// Stored in place of a streaming response body.
pub const STREAMING_PLACEHOLDER: &str = "** Streaming **";

/// Stored in place of a body above its configured size limit.
pub const OVERSIZED_PLACEHOLDER: &str = "** Body too large **";

/// Produces masked, immutable log records.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    url_resolution: UrlResolution,
    masker: Masker,
    max_request_body_size: Option<usize>,
    max_response_body_size: Option<usize>,
}

impl RecordBuilder {
    /// Create a builder for the given configuration.
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            url_resolution: config.url_resolution,
            masker: Masker::new(&config.sensitive_keys),
            max_request_body_size: config.max_request_body_size,
            max_response_body_size: config.max_response_body_size,
        }
    }

    /// Build the record for an exchange that took `elapsed` to handle.
    pub fn build(&self, exchange: &Exchange<'_>, elapsed: Duration) -> LogRecord {
        let mut headers = capture_headers(exchange.request_headers());
        self.masker.mask_headers(&mut headers);

        let mut body = if exchange.is_request_body_oversized() {
            Some(Value::String(OVERSIZED_PLACEHOLDER.to_string()))
        } else {
            parse_body(exchange.request_body(), self.max_request_body_size)
        };
        if let Some(body) = body.as_mut() {
            self.masker.mask_value(body);
        }

        let mut response = match exchange.response_body() {
            ResponseBody::Streaming => Some(Value::String(STREAMING_PLACEHOLDER.to_string())),
            ResponseBody::Buffered(bytes) => parse_body(bytes, self.max_response_body_size),
        };
        if let Some(response) = response.as_mut() {
            self.masker.mask_value(response);
        }

        LogRecord::new(
            self.resolve_url(exchange),
            exchange.method().as_str().to_string(),
            client_ip(exchange),
            headers,
            body,
            response,
            exchange.status().as_u16(),
            elapsed,
        )
    }

    /// Render the request URL in the configured mode.
    pub fn resolve_url(&self, exchange: &Exchange<'_>) -> String {
        let uri = exchange.uri();
        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        match self.url_resolution {
            UrlResolution::FullPath => path_and_query.to_string(),
            UrlResolution::Absolute => {
                let scheme = uri.scheme_str().unwrap_or("http");
                let host = uri
                    .authority()
                    .map(|a| a.as_str().to_string())
                    .or_else(|| host_header(exchange.request_headers()).map(str::to_string))
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                format!("{}://{}{}", scheme, host, path_and_query)
            }
            UrlResolution::RawUri => {
                let scheme = uri.scheme_str().unwrap_or("http");
                let host = host_header(exchange.request_headers())
                    .map(str::to_string)
                    .or_else(|| uri.authority().map(|a| a.as_str().to_string()))
                    .unwrap_or_default();
                format!("{}://{}{}", scheme, host, path_and_query)
            }
        }
    }
}

fn host_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
}

/// Every header, repeated values joined with `", "`. Non-UTF-8 values are
/// skipped.
fn capture_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut captured: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        captured
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    captured
}

fn parse_body(bytes: &Bytes, limit: Option<usize>) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    if limit.is_some_and(|max| bytes.len() > max) {
        return Some(Value::String(OVERSIZED_PLACEHOLDER.to_string()));
    }
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(error = %e, "body is not valid JSON, storing empty value");
            None
        }
    }
}

/// First `X-Forwarded-For` entry, then `X-Real-IP`, then the peer address.
fn client_ip(exchange: &Exchange<'_>) -> String {
    let headers = exchange.request_headers();

    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let ip = first.trim();
            if ip.parse::<IpAddr>().is_ok() {
                return ip.to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let ip = real_ip.trim();
        if ip.parse::<IpAddr>().is_ok() {
            return ip.to_string();
        }
    }

    exchange
        .remote_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_default()
}
