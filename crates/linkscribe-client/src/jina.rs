use std::time::Duration;

use linkscribe_core::error::AppError;
use linkscribe_core::pool::{PoolConfig, RatePool};
use linkscribe_core::retry::{RetryPolicy, retry};
use linkscribe_core::traits::PageExtractor;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

const DEFAULT_ENDPOINT: &str = "https://r.jina.ai";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for [`JinaExtractor`].
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Reader endpoint; the target URL is appended after a slash.
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Per-attempt wall-clock timeout.
    pub timeout: Duration,
    /// Concurrency and cool-down shared by every request of the run.
    pub pool: PoolConfig,
    pub retry: RetryPolicy,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            pool: PoolConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Readable-text extraction through the Jina Reader service.
///
/// Each attempt runs inside a shared [`RatePool`] slot; successful attempts
/// keep the slot for the configured cool-down, so the pool doubles as the
/// rate limiter for the upstream service. Transient failures are retried
/// with exponential backoff.
#[derive(Clone)]
pub struct JinaExtractor {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    timeout_secs: u64,
    pool: RatePool,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl JinaExtractor {
    pub fn new() -> Result<Self, AppError> {
        Self::with_config(ExtractionConfig::default())
    }

    pub fn with_config(config: ExtractionConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(concat!("linkscribe/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.filter(|key| !key.trim().is_empty()),
            timeout_secs: config.timeout.as_secs(),
            pool: RatePool::new(config.pool),
            retry: config.retry,
            cancel: CancellationToken::new(),
        })
    }

    /// Abort backoff waits when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn reader_url(&self, url: &str) -> String {
        format!("{}/{}", self.endpoint, url)
    }

    async fn fetch_once(&self, url: &str) -> Result<String, AppError> {
        self.pool.run(self.request(url)).await
    }

    async fn request(&self, url: &str) -> Result<String, AppError> {
        let mut request = self.client.get(self.reader_url(url));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::UpstreamStatus {
                status: status.as_u16(),
                message: format!("reader rejected {url}"),
            });
        }

        response.text().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else {
                AppError::HttpError(format!("Failed to read response body: {e}"))
            }
        })
    }
}

impl PageExtractor for JinaExtractor {
    async fn extract(&self, url: &str) -> Result<String, AppError> {
        tracing::debug!(%url, "Extracting page text");

        let text = retry(&self.retry, &self.cancel, "extract", || self.fetch_once(url))
            .await
            .map_err(|e| AppError::ExtractionFailed {
                url: url.to_string(),
                attempts: e.attempts,
                message: e.error.to_string(),
            })?;

        tracing::debug!(%url, bytes = text.len(), "Extracted page text");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_config(endpoint: &str) -> ExtractionConfig {
        ExtractionConfig {
            endpoint: endpoint.to_string(),
            api_key: None,
            timeout: Duration::from_secs(5),
            pool: PoolConfig::new(3),
            retry: RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(5), 3),
        }
    }

    #[test]
    fn reader_url_prefixes_target() {
        let extractor = JinaExtractor::with_config(ExtractionConfig {
            endpoint: "https://r.jina.ai/".into(),
            ..ExtractionConfig::default()
        })
        .unwrap();
        assert_eq!(
            extractor.reader_url("https://example.com/a?b=1"),
            "https://r.jina.ai/https://example.com/a?b=1"
        );
    }

    #[test]
    fn default_config_matches_reader_limits() {
        let config = ExtractionConfig::default();
        assert_eq!(config.endpoint, "https://r.jina.ai");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.pool.capacity, 3);
        assert_eq!(config.pool.hold, Duration::from_secs(2));
        assert_eq!(config.retry.max_attempts, 10);
    }

    #[tokio::test]
    async fn returns_reader_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex("example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Title: Example Domain"))
            .expect(1)
            .mount(&server)
            .await;

        let extractor = JinaExtractor::with_config(test_config(&server.uri())).unwrap();
        let text = extractor.extract("https://example.com").await.unwrap();

        assert_eq!(text, "Title: Example Domain");
    }

    #[tokio::test]
    async fn sends_bearer_key_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("Authorization", "Bearer jina-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let config = ExtractionConfig {
            api_key: Some("jina-key".into()),
            ..test_config(&server.uri())
        };
        let extractor = JinaExtractor::with_config(config).unwrap();

        assert_eq!(extractor.extract("https://example.com").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
            .mount(&server)
            .await;

        let extractor = JinaExtractor::with_config(test_config(&server.uri())).unwrap();

        assert_eq!(
            extractor.extract("https://example.com").await.unwrap(),
            "recovered"
        );
    }

    #[tokio::test]
    async fn gives_up_after_attempt_ceiling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let extractor = JinaExtractor::with_config(test_config(&server.uri())).unwrap();
        let err = extractor.extract("https://example.com").await.unwrap_err();

        match err {
            AppError::ExtractionFailed { url, attempts, .. } => {
                assert_eq!(url, "https://example.com");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected ExtractionFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let extractor = JinaExtractor::with_config(test_config(&server.uri())).unwrap();
        let err = extractor.extract("https://example.com/missing").await.unwrap_err();

        assert!(matches!(err, AppError::ExtractionFailed { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn slow_reader_times_out_and_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_secs(2)),
            )
            .expect(2)
            .mount(&server)
            .await;

        let config = ExtractionConfig {
            timeout: Duration::from_millis(200),
            retry: RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(5), 2),
            ..test_config(&server.uri())
        };
        let extractor = JinaExtractor::with_config(config).unwrap();
        let err = extractor.extract("https://example.com").await.unwrap_err();

        assert!(matches!(err, AppError::ExtractionFailed { attempts: 2, .. }));
    }
}
