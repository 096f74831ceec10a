//! The rest provider against a live local origin.

use core::time::Duration;
use std::sync::Arc;

use http::StatusCode;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use neon_core::contract::{FetcherProviderModule, ListenerModule};
use neon_core::http::{HttpRequest, full_body, handler_fn, status_response};
use neon_modules::{RestProvider, TcpListenerModule};

async fn start_origin(status: StatusCode, body: &'static str) -> (Arc<TcpListenerModule>, String) {
    let mut module = TcpListenerModule::default();
    module
        .init(json!({"address": "127.0.0.1", "port": 0}))
        .unwrap();
    module.register(Vec::new()).unwrap();

    let module = Arc::new(module);
    {
        let module = Arc::clone(&module);
        tokio::spawn(async move {
            module
                .serve(handler_fn(move |_request: HttpRequest| async move {
                    let mut response = status_response(status);
                    *response.body_mut() = full_body(body);
                    response
                }))
                .await
        });
    }

    let addr = loop {
        let sockets = module.listeners().unwrap();
        if let Some(socket) = sockets.first() {
            break socket.local_addr().unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    (module, format!("http://{addr}/feed"))
}

#[tokio::test(flavor = "multi_thread")]
async fn fetches_a_resource_from_the_origin() {
    let (origin, url) = start_origin(StatusCode::OK, "payload").await;

    let mut provider = RestProvider::default();
    provider.init(serde_json::Value::Null).unwrap();

    let ctx = CancellationToken::new();
    let resource = provider
        .fetch(&ctx, "feed", &json!({"url": url, "ttl": 60}))
        .await
        .unwrap();

    assert_eq!(resource.name(), "feed");
    assert_eq!(resource.ttl(), Duration::from_secs(60));
    assert_eq!(resource.chunks()[0].as_ref(), b"payload");

    origin.close().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn non_success_status_is_a_provider_error() {
    let (origin, url) = start_origin(StatusCode::BAD_GATEWAY, "").await;

    let mut provider = RestProvider::default();
    provider.init(serde_json::Value::Null).unwrap();

    let ctx = CancellationToken::new();
    let err = provider
        .fetch(&ctx, "feed", &json!({"url": url}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("provider request failed"));

    origin.close().unwrap();
}

#[tokio::test]
async fn missing_url_is_a_config_error() {
    let mut provider = RestProvider::default();
    provider.init(serde_json::Value::Null).unwrap();

    let ctx = CancellationToken::new();
    let err = provider.fetch(&ctx, "feed", &json!({})).await.unwrap_err();
    assert!(err.to_string().contains("invalid fetch config"));
}
