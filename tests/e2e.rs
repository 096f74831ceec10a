//! End-to-end serving over real sockets: config file → registry →
//! server → HTTP client.

use core::time::Duration;
use std::sync::Arc;

use uuid::Uuid;

use neon::default_registry;
use neon_config::Config;
use neon_fetcher::Fetcher;
use neon_server::Server;
use neon_store::Store;

const CONFIG: &str = r#"
store:
  storage:
    memory: {}
server:
  listeners:
    default:
      tcp:
        address: 127.0.0.1
        port: 0
  sites:
    main:
      listeners: [default]
      routes:
        /:
          middlewares:
            logger: {}
          handler:
            text:
              body: ok
"#;

#[tokio::test(flavor = "multi_thread")]
async fn minimal_config_serves_http_with_the_envelope_headers() {
    let config = Config::parse(CONFIG, "yaml").unwrap();
    let registry = default_registry().unwrap();

    let store = Arc::new(Store::init(&config.store, &registry).unwrap());
    let fetcher = Arc::new(Fetcher::init(&config.fetcher, &registry).unwrap());

    let mut server = Server::init(&config.server, &registry, store, fetcher, false).unwrap();
    server.register(Default::default()).unwrap();
    server.start().await.unwrap();

    // The tcp module binds during serve; wait for the ephemeral port.
    let addr = loop {
        let listeners = server.listeners().unwrap();
        if let Some(socket) = listeners.get("default").and_then(|sockets| sockets.first()) {
            break socket.local_addr().unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    let response = reqwest::get(format!("http://{addr}/")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["server"], "neon");
    let request_id = response.headers()["x-request-id"].to_str().unwrap();
    assert!(Uuid::parse_str(request_id).is_ok());
    assert_eq!(response.text().await.unwrap(), "ok");

    server.shutdown(Duration::from_secs(5)).await.unwrap();
}
