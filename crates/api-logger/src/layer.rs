//! Tower middleware that feeds exchanges to an [`ApiLogger`].
//!
//! The request body is buffered before the inner service runs, so the logger
//! can parse it, and is handed on intact. A request body announced above
//! `max_request_body_size` is passed through unread. The response body is
//! buffered only when the exchange passes the filter chain and the body is
//! not streaming. Status, headers, extensions and bodies reach the client
//! unchanged. A body that fails to read is handed on as far as it got and
//! the exchange is not logged.
//!
//! ```ignore
//! use api_logger::{ApiLogger, ApiLoggerLayer, FilterConfig};
//! use tower::ServiceBuilder;
//!
//! let logger = ApiLogger::builder(config).queue(queue).build()?;
//! let service = ServiceBuilder::new()
//!     .layer(ApiLoggerLayer::new(logger))
//!     .service(app);
//! ```

use crate::exchange::{Exchange, ResponseBody, StreamingResponse};
use crate::logger::ApiLogger;
use bytes::{BufMut, Bytes, BytesMut};
use http::{request, response, HeaderMap, Request, Response};
use http_body_util::BodyExt;
use hyper::body::Body;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{BoxError, Layer, Service};

/// Applies [`ApiLoggerService`] to inner services.
#[derive(Debug, Clone)]
pub struct ApiLoggerLayer {
    logger: Option<ApiLogger>,
}

impl ApiLoggerLayer {
    /// Wrap services with `logger`. `None` makes the layer a passthrough.
    pub fn new(logger: Option<ApiLogger>) -> Self {
        Self { logger }
    }

    /// Whether the layer does any work.
    pub fn is_enabled(&self) -> bool {
        self.logger.is_some()
    }
}

impl<S> Layer<S> for ApiLoggerLayer {
    type Service = ApiLoggerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiLoggerService {
            inner,
            logger: self.logger.clone(),
        }
    }
}

/// Middleware service produced by [`ApiLoggerLayer`].
#[derive(Debug, Clone)]
pub struct ApiLoggerService<S> {
    inner: S,
    logger: Option<ApiLogger>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for ApiLoggerService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
    ReqBody: Body + From<Bytes> + Send + 'static,
    ReqBody::Data: Send,
    ReqBody::Error: Into<BoxError>,
    ResBody: Body<Data = Bytes> + From<Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<ResBody>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // The clone may not be ready; keep the service that was polled.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let Some(logger) = self.logger.clone() else {
            return Box::pin(async move { inner.call(req).await.map_err(Into::<BoxError>::into) });
        };

        Box::pin(log_exchange(inner, logger, req))
    }
}

async fn log_exchange<S, ReqBody, ResBody>(
    mut inner: S,
    logger: ApiLogger,
    req: Request<ReqBody>,
) -> Result<Response<ResBody>, BoxError>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: Into<BoxError>,
    ReqBody: Body + From<Bytes>,
    ReqBody::Error: Into<BoxError>,
    ResBody: Body<Data = Bytes> + From<Bytes>,
    ResBody::Error: Into<BoxError>,
{
    let start = Instant::now();

    let (parts, body) = req.into_parts();
    let request_parts = snapshot(&parts);
    let oversized = logger
        .config()
        .max_request_body_size
        .is_some_and(|max| declared_len(&parts.headers, &body) > max as u64);

    let (request, request_body) = if oversized {
        (Request::from_parts(parts, body), Bytes::new())
    } else {
        match buffer(body).await {
            Ok(bytes) => (
                Request::from_parts(parts, ReqBody::from(bytes.clone())),
                bytes,
            ),
            Err((partial, e)) => {
                tracing::debug!(error = %e, "request body read failed, exchange not logged");
                return inner
                    .call(Request::from_parts(parts, ReqBody::from(partial)))
                    .await
                    .map_err(Into::<BoxError>::into);
            }
        }
    };
    let logged = LoggedRequest {
        parts: request_parts,
        body: request_body,
        oversized,
    };

    let response = inner.call(request).await.map_err(Into::<BoxError>::into)?;
    let elapsed = start.elapsed();

    let streaming = response.extensions().get::<StreamingResponse>().is_some()
        || response.body().size_hint().exact().is_none();
    let (response_parts, body) = response.into_parts();

    if logger.is_filtered(&logged.exchange(&response_parts, ResponseBody::Streaming)) {
        return Ok(Response::from_parts(response_parts, body));
    }

    if streaming {
        logger.dispatch(
            &logged.exchange(&response_parts, ResponseBody::Streaming),
            elapsed,
        );
        return Ok(Response::from_parts(response_parts, body));
    }

    match buffer(body).await {
        Ok(response_body) => {
            logger.dispatch(
                &logged.exchange(&response_parts, ResponseBody::Buffered(&response_body)),
                elapsed,
            );
            Ok(Response::from_parts(
                response_parts,
                ResBody::from(response_body),
            ))
        }
        Err((partial, e)) => {
            tracing::debug!(error = %e, "response body read failed, exchange not logged");
            Ok(Response::from_parts(response_parts, ResBody::from(partial)))
        }
    }
}

/// What the logger keeps of the request once the body has been handed on.
struct LoggedRequest {
    parts: request::Parts,
    body: Bytes,
    /// The body was above the size limit and left unread.
    oversized: bool,
}

impl LoggedRequest {
    fn exchange<'a>(
        &'a self,
        response: &'a response::Parts,
        response_body: ResponseBody<'a>,
    ) -> Exchange<'a> {
        let exchange = Exchange::new(&self.parts, &self.body, response, response_body);
        if self.oversized {
            exchange.with_oversized_request_body()
        } else {
            exchange
        }
    }
}

/// Body length announced by `Content-Length` or the body's size hint,
/// whichever is larger.
fn declared_len<B: Body>(headers: &HeaderMap, body: &B) -> u64 {
    let announced = headers
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);
    announced.max(body.size_hint().lower())
}

/// Read a body to the end. On a read error, returns the bytes that arrived
/// before it.
async fn buffer<B>(body: B) -> Result<Bytes, (Bytes, BoxError)>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    let mut body = std::pin::pin!(body);
    let mut buffered = BytesMut::new();
    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => {
                if let Ok(data) = frame.into_data() {
                    buffered.put(data);
                }
            }
            Err(e) => return Err((buffered.freeze(), e.into())),
        }
    }
    Ok(buffered.freeze())
}

/// The request metadata the logger reads, detached from the parts handed on
/// to the inner service.
fn snapshot(parts: &request::Parts) -> request::Parts {
    let mut request = Request::new(());
    *request.method_mut() = parts.method.clone();
    *request.uri_mut() = parts.uri.clone();
    *request.version_mut() = parts.version;
    *request.headers_mut() = parts.headers.clone();
    if let Some(addr) = parts.extensions.get::<SocketAddr>() {
        request.extensions_mut().insert(*addr);
    }
    request.into_parts().0
}
