//! A request paired with its already-produced response.

use bytes::Bytes;
use http::{request, response, HeaderMap, Method, StatusCode, Uri};
use std::net::SocketAddr;

/// Marker extension for responses whose body must not be buffered.
///
/// Handlers that stream (SSE, chunked downloads) insert this into the
/// response extensions. Bodies without an exact size hint are treated the
/// same way.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamingResponse;

/// The response body as seen by the logger.
#[derive(Debug, Clone, Copy)]
pub enum ResponseBody<'a> {
    /// Fully buffered body.
    Buffered(&'a Bytes),
    /// Streaming body. Never read.
    Streaming,
}

/// One request/response exchange, borrowed from the middleware.
///
/// The response is required up front because several filters inspect the
/// status code and content type.
#[derive(Debug, Clone, Copy)]
pub struct Exchange<'a> {
    request: &'a request::Parts,
    request_body: &'a Bytes,
    request_body_oversized: bool,
    remote_addr: Option<SocketAddr>,
    response: &'a response::Parts,
    response_body: ResponseBody<'a>,
}

impl<'a> Exchange<'a> {
    /// Bundle a request and its response.
    pub fn new(
        request: &'a request::Parts,
        request_body: &'a Bytes,
        response: &'a response::Parts,
        response_body: ResponseBody<'a>,
    ) -> Self {
        Self {
            request,
            request_body,
            request_body_oversized: false,
            remote_addr: request.extensions.get::<SocketAddr>().copied(),
            response,
            response_body,
        }
    }

    /// Override the peer address.
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Mark the request body as too large to have been buffered.
    pub fn with_oversized_request_body(mut self) -> Self {
        self.request_body_oversized = true;
        self
    }

    /// Request method.
    pub fn method(&self) -> &Method {
        &self.request.method
    }

    /// Request URI.
    pub fn uri(&self) -> &Uri {
        &self.request.uri
    }

    /// Request path without query.
    pub fn path(&self) -> &str {
        self.request.uri.path()
    }

    /// Request headers.
    pub fn request_headers(&self) -> &HeaderMap {
        &self.request.headers
    }

    /// Raw request body.
    pub fn request_body(&self) -> &Bytes {
        self.request_body
    }

    /// Whether the request body was left unread for being too large.
    pub fn is_request_body_oversized(&self) -> bool {
        self.request_body_oversized
    }

    /// Peer socket address, if the server supplied one.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.response.status
    }

    /// Response headers.
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response.headers
    }

    /// Response body.
    pub fn response_body(&self) -> ResponseBody<'a> {
        self.response_body
    }

    /// Response content type, if present and valid UTF-8.
    pub fn response_content_type(&self) -> Option<&str> {
        self.response
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}
