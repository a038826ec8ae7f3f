use crate::config::DEFAULT_COLLECTOR_URL;
use crate::dispatch::{DeliveryItem, Dispatcher};
use crate::error::DispatchError;
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use std::time::Duration;

/// Configuration for [`HttpCollector`].
#[derive(Clone, Debug)]
pub struct HttpCollectorConfig {
    /// Base URL without path, e.g. "http://127.0.0.1:3000"
    pub base_url: String,
    /// Per-request timeout. `None` leaves requests unbounded.
    pub timeout: Option<Duration>,
}

impl Default for HttpCollectorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_COLLECTOR_URL.to_string(),
            timeout: None,
        }
    }
}

/// [`Dispatcher`] talking to the collector's HTTP API.
///
/// Items are posted as JSON to `{base}/api/logs`; availability is checked
/// with `GET {base}/health`.
pub struct HttpCollector {
    client: Client,
    base_url: RwLock<String>,
}

impl HttpCollector {
    /// Construct a new collector client.
    ///
    /// **Parameters**
    /// - `config`: [`HttpCollectorConfig`] with the base URL and optional
    ///   request timeout.
    ///
    /// **Returns**
    /// - A ready-to-use [`HttpCollector`] that can be handed to
    ///   [`Shipper::with_dispatcher`](crate::shipper::Shipper::with_dispatcher).
    pub fn new(config: HttpCollectorConfig) -> Result<Self, DispatchError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: RwLock::new(normalize(&config.base_url)),
        })
    }

    pub fn base_url(&self) -> String {
        self.base_url.read().clone()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.read(), path)
    }
}

fn normalize(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

#[async_trait]
impl Dispatcher for HttpCollector {
    async fn send(&self, item: &DeliveryItem) -> Result<(), DispatchError> {
        let resp = self
            .client
            .post(self.endpoint("/api/logs"))
            .json(item)
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(format!("collector rejected log with status {}: {}", status, text).into())
        }
    }

    async fn probe(&self) -> bool {
        match self.client.get(self.endpoint("/health")).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::error!(status = %resp.status(), "collector health check failed");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "collector health check failed");
                false
            }
        }
    }

    fn set_base_url(&self, base_url: &str) {
        *self.base_url.write() = normalize(base_url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Payload;
    use mockito::Server;
    use serde_json::{json, Value};

    fn collector(url: String) -> HttpCollector {
        HttpCollector::new(HttpCollectorConfig {
            base_url: url,
            timeout: Some(Duration::from_secs(5)),
        })
        .unwrap()
    }

    fn item() -> DeliveryItem {
        let mut payload = Payload::new();
        payload.insert("level".into(), Value::from("ERROR"));
        payload.insert("message".into(), Value::from("disk full"));
        DeliveryItem::new("project-1", payload)
    }

    #[tokio::test]
    async fn posts_wire_body_to_api_logs() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/logs")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::Json(json!({
                "uuid": "project-1",
                "log": { "level": "ERROR", "message": "disk full" }
            })))
            .with_status(201)
            .create_async()
            .await;

        let collector = collector(format!("{}/", server.url()));
        collector.send(&item()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/logs")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let err = collector(server.url()).send(&item()).await.unwrap_err();
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("slow down"));
    }

    #[tokio::test]
    async fn probe_follows_health_status_and_base_url() {
        let mut up = Server::new_async().await;
        let _up = up.mock("GET", "/health").with_status(200).create_async().await;
        let mut down = Server::new_async().await;
        let _down = down.mock("GET", "/health").with_status(503).create_async().await;

        let collector = collector(up.url());
        assert!(collector.probe().await);

        collector.set_base_url(&down.url());
        assert_eq!(collector.base_url(), down.url());
        assert!(!collector.probe().await);
    }
}
