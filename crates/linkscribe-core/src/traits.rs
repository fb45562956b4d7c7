use std::future::Future;

use crate::error::AppError;
use crate::retry::RetryPolicy;

/// Fetches a readable-text rendering of the page behind a URL.
///
/// Implementations own their retry and rate-limit policy; an `Err` means
/// the extraction is final for this run.
pub trait PageExtractor: Send + Sync + Clone {
    fn extract(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Summarizes a text excerpt into a short title using a language model.
///
/// Callers pre-truncate `text`. Implementations do not retry; they classify
/// failures so the caller can apply [`retry_policy`](Self::retry_policy).
pub trait TitleGenerator: Send + Sync + Clone {
    fn generate_title(&self, text: &str)
    -> impl Future<Output = Result<String, AppError>> + Send;

    /// Backoff policy the caller should apply around `generate_title`.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::none()
    }

    /// Provider label used in logs.
    fn name(&self) -> &str;
}
