use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::app::ports::SourcePort;
use crate::domain::Dataset;
use crate::error::{ConsolidatorError, Result};
use crate::infra::json_source::{dataset_from_records, parse_json};
use crate::observability::metrics;
use crate::pipeline::ingestion::{Limits, RateLimiter};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Crawls a list of JSON endpoints one at a time with a pause between
/// requests. Each response is an array, NDJSON, or an object holding the
/// records under `records_pointer`.
pub struct HttpJsonSource {
    name: String,
    urls: Vec<String>,
    client: Client,
    limiter: RateLimiter,
    records_pointer: Option<String>,
}

impl HttpJsonSource {
    pub fn new(urls: Vec<String>, limits: Limits, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("listing-consolidator/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            name: format!("http:{} urls", urls.len()),
            urls,
            client,
            limiter: RateLimiter::new(limits),
            records_pointer: None,
        })
    }

    /// JSON pointer (e.g. `/results`) to the record array inside each response.
    pub fn with_records_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.records_pointer = Some(pointer.into());
        self
    }

    fn records_from_body(&self, url: &str, body: &str) -> Result<Dataset> {
        let Some(pointer) = &self.records_pointer else {
            return parse_json(body);
        };
        let document: serde_json::Value = serde_json::from_str(body)?;
        match document.pointer(pointer) {
            Some(serde_json::Value::Array(records)) => dataset_from_records(records),
            Some(_) => Err(ConsolidatorError::Extraction(format!(
                "{}: '{}' does not point at an array",
                url, pointer
            ))),
            None => Ok(Dataset::new()),
        }
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let _permit = self.limiter.acquire().await;
        let started = Instant::now();
        let response = self.client.get(url).send().await.map_err(|e| {
            metrics::extract::request_error();
            ConsolidatorError::Extraction(format!("{} unreachable: {}", url, e))
        })?;
        let status = response.status();
        if !status.is_success() {
            metrics::extract::request_error();
            return Err(ConsolidatorError::Extraction(format!(
                "{} answered with status {}",
                url,
                status.as_u16()
            )));
        }
        let body = response.text().await.map_err(|e| {
            metrics::extract::request_error();
            ConsolidatorError::Extraction(format!("{}: failed to read body: {}", url, e))
        })?;
        metrics::extract::request_success();
        metrics::extract::request_duration(started.elapsed().as_secs_f64());
        debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

#[async_trait]
impl SourcePort for HttpJsonSource {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(urls = self.urls.len()))]
    async fn extract(&self) -> Result<Dataset> {
        let mut dataset = Dataset::new();
        for url in &self.urls {
            let body = self.fetch(url).await?;
            let page = self.records_from_body(url, &body).map_err(|e| match e {
                ConsolidatorError::Extraction(_) => e,
                other => ConsolidatorError::Extraction(format!("{}: malformed JSON: {}", url, other)),
            })?;
            if page.is_empty() {
                warn!("⚠️ {} returned no records", url);
            }
            dataset.append(page);
        }
        info!(
            "🌐 Crawled {} rows × {} columns from {} endpoints",
            dataset.row_count(),
            dataset.column_count(),
            self.urls.len()
        );
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> HttpJsonSource {
        HttpJsonSource::new(vec!["http://example.invalid".into()], Limits::default(), DEFAULT_TIMEOUT)
            .unwrap()
            .with_records_pointer("/data/results")
    }

    #[test]
    fn test_records_pointer_extracts_nested_array() {
        let body = r#"{"data": {"results": [{"prix": 1}, {"prix": 2}]}, "page": 1}"#;
        let dataset = source().records_from_body("u", body).unwrap();
        assert_eq!(dataset.row_count(), 2);
    }

    #[test]
    fn test_missing_pointer_is_empty_page() {
        let dataset = source().records_from_body("u", r#"{"data": {}}"#).unwrap();
        assert!(dataset.is_empty());
    }

    #[test]
    fn test_pointer_at_non_array_is_extraction_error() {
        let err = source()
            .records_from_body("u", r#"{"data": {"results": 3}}"#)
            .unwrap_err();
        assert!(matches!(err, ConsolidatorError::Extraction(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_extraction_error() {
        let source = HttpJsonSource::new(
            vec!["http://127.0.0.1:9/listings".into()],
            Limits {
                min_delay: Duration::ZERO,
                ..Limits::default()
            },
            Duration::from_millis(500),
        )
        .unwrap();
        let err = source.extract().await.unwrap_err();
        assert!(matches!(err, ConsolidatorError::Extraction(_)));
    }
}
