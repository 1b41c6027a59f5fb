#![allow(dead_code)]

use api_logger::{ApiLoggerSignal, LogRecord};
use bytes::Bytes;
use http::{request, response, Method, StatusCode};
use std::sync::{Arc, Mutex};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api_logger=info".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Owned pieces of one exchange, ready to be borrowed by `Exchange::new`.
pub struct OwnedExchange {
    pub request: request::Parts,
    pub request_body: Bytes,
    pub response: response::Parts,
    pub response_body: Bytes,
}

pub fn json_exchange(method: Method, path: &str, status: StatusCode, body: &str) -> OwnedExchange {
    let (request, _) = http::Request::builder()
        .method(method)
        .uri(path)
        .header("host", "api.example.com")
        .header("content-type", "application/json")
        .body(())
        .unwrap()
        .into_parts();
    let (response, _) = http::Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(())
        .unwrap()
        .into_parts();
    OwnedExchange {
        request,
        request_body: Bytes::copy_from_slice(body.as_bytes()),
        response,
        response_body: Bytes::from_static(br#"{"ok":true}"#),
    }
}

pub fn capture_signal() -> (ApiLoggerSignal, Arc<Mutex<Vec<LogRecord>>>) {
    let signal = ApiLoggerSignal::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let store = seen.clone();
    signal.listen(move |record| store.lock().unwrap().push(record.clone()));
    (signal, seen)
}
