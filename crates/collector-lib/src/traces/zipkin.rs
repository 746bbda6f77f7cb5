//! Zipkin v2 HTTP client

use super::TraceSource;
use crate::error::Result;
use crate::models::Trace;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Configuration for the Zipkin client
#[derive(Debug, Clone)]
pub struct ZipkinConfig {
    /// Base URL of the Zipkin server (e.g., "http://zipkin:9411")
    pub base_url: String,
    /// How far back from `endTs` to search (default: 1 hour)
    pub lookback: Duration,
    /// How far before now `endTs` is placed (default: 2 minutes)
    pub drift: Duration,
    /// Maximum number of traces per query (default: 1000)
    pub limit: u32,
    /// Request timeout (default: 7 seconds)
    pub timeout: Duration,
    /// Optional span name filter
    pub span_name: Option<String>,
}

impl ZipkinConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

impl Default for ZipkinConfig {
    fn default() -> Self {
        Self {
            base_url: "http://10.10.0.68:30200".to_string(),
            lookback: Duration::from_millis(3_600_000),
            drift: Duration::from_millis(120_000),
            limit: 1000,
            timeout: Duration::from_secs(7),
            span_name: None,
        }
    }
}

/// Query parameters of `GET /api/v2/traces`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipkinQuery {
    pub end_ts: i64,
    pub lookback: u64,
    pub limit: u32,
    pub service_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_name: Option<String>,
}

/// Trace source backed by the Zipkin v2 API
pub struct ZipkinClient {
    client: Client,
    traces_url: Url,
    config: ZipkinConfig,
}

impl ZipkinClient {
    /// Create a new Zipkin client
    pub fn new(config: ZipkinConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        // Keep any path prefix of the base URL when joining
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let traces_url = Url::parse(&base)?.join("api/v2/traces")?;

        Ok(Self {
            client,
            traces_url,
            config,
        })
    }

    /// Endpoint queried for traces
    pub fn traces_url(&self) -> &Url {
        &self.traces_url
    }

    /// Build the query for `service` relative to `now_ms`
    pub fn query(&self, service: &str, now_ms: i64) -> ZipkinQuery {
        ZipkinQuery {
            end_ts: now_ms - self.config.drift.as_millis() as i64,
            lookback: self.config.lookback.as_millis() as u64,
            limit: self.config.limit,
            service_name: service.to_string(),
            span_name: self.config.span_name.clone(),
        }
    }
}

#[async_trait]
impl TraceSource for ZipkinClient {
    async fn fetch(&self, service: &str) -> Result<Vec<Trace>> {
        let query = self.query(service, chrono::Utc::now().timestamp_millis());

        let traces: Vec<Trace> = self
            .client
            .get(self.traces_url.clone())
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(
            service = %service,
            traces = traces.len(),
            end_ts = query.end_ts,
            "Fetched traces from Zipkin"
        );

        Ok(traces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use mockito::Matcher;

    const TRACES_BODY: &str = r#"[
        [
            {"traceId": "t1", "id": "s1", "name": "frame", "timestamp": 10, "duration": 2,
             "localEndpoint": {"serviceName": "render"}, "tags": {"FPS": "60"}},
            {"traceId": "t1", "id": "s2", "parentId": "s1", "name": "draw",
             "localEndpoint": {"serviceName": "render"}}
        ],
        [
            {"traceId": "t2", "id": "s3", "tags": {"frame.time": "16.6"}}
        ]
    ]"#;

    #[test]
    fn test_query_defaults() {
        let client = ZipkinClient::new(ZipkinConfig::default()).unwrap();
        let query = client.query("render", 1_000_000);

        assert_eq!(query.end_ts, 1_000_000 - 120_000);
        assert_eq!(query.lookback, 3_600_000);
        assert_eq!(query.limit, 1000);
        assert_eq!(query.service_name, "render");
        assert_eq!(query.span_name, None);
    }

    #[test]
    fn test_traces_url_keeps_path_prefix() {
        let plain = ZipkinClient::new(ZipkinConfig::new("http://zipkin:9411")).unwrap();
        assert_eq!(plain.traces_url().as_str(), "http://zipkin:9411/api/v2/traces");

        let prefixed = ZipkinClient::new(ZipkinConfig::new("http://gateway/zipkin")).unwrap();
        assert_eq!(
            prefixed.traces_url().as_str(),
            "http://gateway/zipkin/api/v2/traces"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = ZipkinClient::new(ZipkinConfig::new("not a url"));
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_fetch_sends_query_and_parses_traces() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v2/traces")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("serviceName".into(), "render".into()),
                Matcher::UrlEncoded("lookback".into(), "3600000".into()),
                Matcher::UrlEncoded("limit".into(), "1000".into()),
                Matcher::Regex("endTs=[0-9]+".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(TRACES_BODY)
            .create_async()
            .await;

        let client = ZipkinClient::new(ZipkinConfig::new(server.url())).unwrap();
        let traces = client.fetch("render").await.unwrap();

        mock.assert_async().await;
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0].len(), 2);
        assert_eq!(traces[0][1].parent_id.as_deref(), Some("s1"));
        assert!(traces[0][1].tags.is_none());
        assert_eq!(
            traces[1][0].tags.as_ref().unwrap().get("frame.time").unwrap(),
            "16.6"
        );
    }

    #[tokio::test]
    async fn test_fetch_sends_span_name_when_configured() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v2/traces")
            .match_query(Matcher::UrlEncoded("spanName".into(), "frame".into()))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let mut config = ZipkinConfig::new(server.url());
        config.span_name = Some("frame".to_string());
        let client = ZipkinClient::new(config).unwrap();

        let traces = client.fetch("render").await.unwrap();

        mock.assert_async().await;
        assert!(traces.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_maps_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v2/traces")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let client = ZipkinClient::new(ZipkinConfig::new(server.url())).unwrap();
        let result = client.fetch("render").await;

        assert!(matches!(result, Err(Error::TraceBackend(_))));
    }

    #[tokio::test]
    async fn test_fetch_rejects_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v2/traces")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("{\"not\": \"traces\"}")
            .create_async()
            .await;

        let client = ZipkinClient::new(ZipkinConfig::new(server.url())).unwrap();
        assert!(client.fetch("render").await.is_err());
    }
}
