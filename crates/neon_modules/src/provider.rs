//! HTTP fetcher provider (`app.fetcher.provider.rest`).

use core::time::Duration;
use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use neon_core::contract::FetcherProviderModule;
use neon_core::error::{FetchError, ModuleError};
use neon_core::resource::Resource;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RestConfig {
    /// Request timeout in seconds.
    timeout: u64,
    /// Headers attached to every request.
    headers: HashMap<String, String>,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            headers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RestFetchConfig {
    url: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    /// Time-to-live of the fetched resource, in seconds.
    #[serde(default)]
    ttl: u64,
}

/// Pulls resources over HTTP GET.
#[derive(Default)]
pub struct RestProvider {
    client: Option<reqwest::Client>,
}

#[async_trait]
impl FetcherProviderModule for RestProvider {
    fn init(&mut self, config: Value) -> Result<(), ModuleError> {
        let config: RestConfig = match config {
            Value::Null => RestConfig::default(),
            other => serde_json::from_value(other)
                .map_err(|err| ModuleError::Config(err.to_string()))?,
        };

        let mut default_headers = reqwest::header::HeaderMap::new();
        for (name, value) in &config.headers {
            let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| ModuleError::Config(err.to_string()))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|err| ModuleError::Config(err.to_string()))?;
            default_headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .default_headers(default_headers)
            .build()
            .map_err(|err| ModuleError::Init(err.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    async fn fetch(
        &self,
        ctx: &CancellationToken,
        name: &str,
        config: &Value,
    ) -> Result<Resource, FetchError> {
        let config: RestFetchConfig = serde_json::from_value(config.clone())
            .map_err(|err| FetchError::Config(err.to_string()))?;
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| FetchError::Config("provider not initialized".to_string()))?;

        let mut request = client.get(&config.url);
        for (header, value) in &config.headers {
            request = request.header(header, value);
        }

        let response = tokio::select! {
            response = request.send() => {
                response.map_err(|err| FetchError::Provider(Box::new(err)))?
            }
            () = ctx.cancelled() => {
                return Err(FetchError::Provider(Box::new(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    "fetch cancelled",
                ))));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Provider(Box::new(std::io::Error::other(
                format!("unexpected status {status} from {}", config.url),
            ))));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| FetchError::Provider(Box::new(err)))?;
        tracing::debug!(name, url = config.url, bytes = body.len(), "resource fetched");

        Ok(Resource::new(name, Duration::from_secs(config.ttl)).with_chunk(body))
    }
}
