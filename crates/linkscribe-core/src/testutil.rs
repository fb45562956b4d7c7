//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::AppError;
use crate::retry::RetryPolicy;
use crate::traits::{PageExtractor, TitleGenerator};

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Mock extractor serving canned page text per URL.
///
/// Unknown URLs fail with `ExtractionFailed`, as a real client does once
/// its retries are spent.
#[derive(Clone, Default)]
pub struct MockExtractor {
    pages: Arc<Mutex<HashMap<String, String>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    fail_all: bool,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extractor that fails on every URL.
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub fn with_page(self, url: &str, text: &str) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), text.to_string());
        self
    }

    /// Delay the response for `url`, to control completion order.
    pub fn with_delay(self, url: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl PageExtractor for MockExtractor {
    async fn extract(&self, url: &str) -> Result<String, AppError> {
        self.calls.lock().unwrap().push(url.to_string());

        let delay = self.delays.lock().unwrap().get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let page = self.pages.lock().unwrap().get(url).cloned();
        match page {
            Some(text) if !self.fail_all => Ok(text),
            _ => Err(AppError::ExtractionFailed {
                url: url.to_string(),
                attempts: 10,
                message: "mock extraction failure".into(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// MockTitleGenerator
// ---------------------------------------------------------------------------

/// Mock title generator.
///
/// Pops queued responses first; once the queue is empty it echoes the
/// excerpt back as the title.
#[derive(Clone)]
pub struct MockTitleGenerator {
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    policy: RetryPolicy,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl MockTitleGenerator {
    /// Generator that echoes its input.
    pub fn echo() -> Self {
        Self::with_responses(Vec::new())
    }

    pub fn new(title: &str) -> Self {
        Self::with_responses(vec![Ok(title.to_string())])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            policy: RetryPolicy::none(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl TitleGenerator for MockTitleGenerator {
    async fn generate_title(&self, text: &str) -> Result<String, AppError> {
        self.calls.lock().unwrap().push(text.to_string());

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(text.to_string())
        } else {
            responses.remove(0)
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Retry policy with millisecond delays for tests.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(5), max_attempts)
}
