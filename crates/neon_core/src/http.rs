//! HTTP handler and middleware composition types.
//!
//! Listener modules feed inbound requests to an [`HttpHandler`]; sites
//! compose handlers out of [`HttpMiddleware`] wrappers applied
//! outermost-first around a terminal handler. Request bodies abstract over
//! hyper's [`Incoming`] so handlers can also be driven directly in tests.

use core::convert::Infallible;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Response, StatusCode, header};
use http_body::{Body, Frame, SizeHint};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;

/// An inbound HTTP request as seen by handlers and middlewares.
pub type HttpRequest = http::Request<RequestBody>;

/// The response body type produced by handlers.
pub type ResponseBody = BoxBody<Bytes, Infallible>;

/// An outbound HTTP response.
pub type HttpResponse = Response<ResponseBody>;

// ─────────────────────────────────────────────────────────────────────────────
// RequestBody
// ─────────────────────────────────────────────────────────────────────────────

/// Request body fed to handlers.
///
/// Live connections carry [`Incoming`]; tests construct the buffered
/// variants directly.
pub enum RequestBody {
    /// A streaming body from a live hyper connection.
    Incoming(Incoming),
    /// A fully buffered body.
    Full(Full<Bytes>),
    /// No body.
    Empty,
}

impl RequestBody {
    /// Creates a fully buffered request body.
    #[must_use]
    pub fn full(data: impl Into<Bytes>) -> Self {
        Self::Full(Full::new(data.into()))
    }
}

impl From<Incoming> for RequestBody {
    fn from(body: Incoming) -> Self {
        Self::Incoming(body)
    }
}

impl Body for RequestBody {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Incoming(body) => Pin::new(body).poll_frame(cx),
            Self::Full(body) => Pin::new(body)
                .poll_frame(cx)
                .map(|frame| frame.map(|result| result.map_err(|err| match err {}))),
            Self::Empty => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Incoming(body) => body.is_end_stream(),
            Self::Full(body) => body.is_end_stream(),
            Self::Empty => true,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            Self::Incoming(body) => body.size_hint(),
            Self::Full(body) => body.size_hint(),
            Self::Empty => SizeHint::with_exact(0),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handler / Middleware
// ─────────────────────────────────────────────────────────────────────────────

/// A terminal request handler.
#[async_trait]
pub trait HttpHandler: Send + Sync {
    /// Produces the response for one request.
    async fn handle(&self, request: HttpRequest) -> HttpResponse;
}

/// A handler wrapper.
///
/// Middlewares apply outermost-first: the last middleware in a route's list
/// wraps closest to the terminal handler.
pub trait HttpMiddleware: Send + Sync {
    /// Wraps the next handler in the chain.
    fn wrap(&self, next: Arc<dyn HttpHandler>) -> Arc<dyn HttpHandler>;
}

struct HandlerFn<F>(F);

#[async_trait]
impl<F, Fut> HttpHandler for HandlerFn<F>
where
    F: Fn(HttpRequest) -> Fut + Send + Sync,
    Fut: Future<Output = HttpResponse> + Send,
{
    async fn handle(&self, request: HttpRequest) -> HttpResponse {
        (self.0)(request).await
    }
}

/// Wraps an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn HttpHandler>
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    Arc::new(HandlerFn(f))
}

// ─────────────────────────────────────────────────────────────────────────────
// Body helpers
// ─────────────────────────────────────────────────────────────────────────────

/// A fully buffered response body.
#[must_use]
pub fn full_body(data: impl Into<Bytes>) -> ResponseBody {
    Full::new(data.into()).boxed()
}

/// An empty response body.
#[must_use]
pub fn empty_body() -> ResponseBody {
    Full::new(Bytes::new()).boxed()
}

/// A plain-text response carrying the status code's canonical reason.
#[must_use]
pub fn status_response(status: StatusCode) -> HttpResponse {
    let body = status.canonical_reason().unwrap_or("").to_string();
    let mut response = Response::new(full_body(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    #[tokio::test]
    async fn handler_fn_adapts_closures() {
        let handler = handler_fn(|_request| async { status_response(StatusCode::OK) });

        let request = Request::builder().body(RequestBody::Empty).unwrap();
        let response = handler.handle(request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn full_request_body_collects() {
        let body = RequestBody::full("payload");
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(collected, Bytes::from("payload"));
    }

    #[test]
    fn status_response_carries_reason() {
        let response = status_response(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
