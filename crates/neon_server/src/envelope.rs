//! The mandatory outer middleware applied to every composed route.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use http::StatusCode;
use http::header::{self, HeaderName, HeaderValue};
use uuid::Uuid;

use neon_core::http::{HttpHandler, HttpMiddleware, HttpRequest, HttpResponse, status_response};

/// Value of the `Server` response header.
pub const SERVER_NAME: &str = "neon";

/// The envelope wraps every route's composed handler: it stamps the
/// identification headers and isolates handler panics to the request that
/// caused them.
#[derive(Debug, Clone, Copy)]
pub struct Envelope {
    debug: bool,
}

impl Envelope {
    /// Creates the envelope; `debug` enables stack capture on panics.
    #[must_use]
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }
}

impl HttpMiddleware for Envelope {
    fn wrap(&self, next: Arc<dyn HttpHandler>) -> Arc<dyn HttpHandler> {
        Arc::new(EnvelopeHandler {
            next,
            debug: self.debug,
        })
    }
}

struct EnvelopeHandler {
    next: Arc<dyn HttpHandler>,
    debug: bool,
}

#[async_trait]
impl HttpHandler for EnvelopeHandler {
    async fn handle(&self, request: HttpRequest) -> HttpResponse {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let outcome = std::panic::AssertUnwindSafe(self.next.handle(request))
            .catch_unwind()
            .await;

        let mut response = match outcome {
            Ok(response) => response,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                if self.debug {
                    let backtrace = std::backtrace::Backtrace::force_capture();
                    tracing::error!(%method, path, panic = %message, %backtrace, "handler panicked");
                } else {
                    tracing::error!(%method, path, panic = %message, "handler panicked");
                }
                status_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };

        let headers = response.headers_mut();
        headers.insert(header::SERVER, HeaderValue::from_static(SERVER_NAME));
        if let Ok(id) = HeaderValue::from_str(&Uuid::new_v4().to_string()) {
            headers.insert(HeaderName::from_static("x-request-id"), id);
        }
        response
    }
}

fn panic_message(panic: &(dyn core::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
