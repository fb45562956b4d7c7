use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::pool::{PoolConfig, RatePool};
use crate::retry::retry;
use crate::traits::{PageExtractor, TitleGenerator};

/// Characters that may wrap a model's answer and are stripped from titles.
const TITLE_WRAPPERS: [char; 8] = ['"', '\'', '`', '*', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}'];

/// Configuration for [`TitleResolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Characters of extracted text sent to the model.
    pub excerpt_chars: usize,

    /// Optional bound on simultaneous model calls. `None` leaves it to the
    /// provider.
    pub title_concurrency: Option<usize>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            excerpt_chars: 1000,
            title_concurrency: None,
        }
    }
}

/// Resolves one URL to a title: extract → truncate → summarize → normalize.
///
/// Generic over the extraction client and the model backend. Resolution
/// never fails; any error degrades to the URL itself.
pub struct TitleResolver<E, G>
where
    E: PageExtractor,
    G: TitleGenerator,
{
    extractor: E,
    generator: G,
    config: ResolverConfig,
    title_pool: Option<RatePool>,
}

impl<E, G> TitleResolver<E, G>
where
    E: PageExtractor,
    G: TitleGenerator,
{
    pub fn new(extractor: E, generator: G) -> Self {
        Self::with_config(extractor, generator, ResolverConfig::default())
    }

    pub fn with_config(extractor: E, generator: G, config: ResolverConfig) -> Self {
        let title_pool = config
            .title_concurrency
            .map(|capacity| RatePool::new(PoolConfig::new(capacity)));

        Self {
            extractor,
            generator,
            config,
            title_pool,
        }
    }

    /// Resolve `url` to a title, falling back to `url` on any failure.
    pub async fn resolve(&self, url: &str, cancel: &CancellationToken) -> String {
        match self.try_resolve(url, cancel).await {
            Ok(title) => {
                tracing::info!(%url, %title, "Resolved title");
                title
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "Could not resolve title, keeping URL");
                url.to_string()
            }
        }
    }

    async fn try_resolve(&self, url: &str, cancel: &CancellationToken) -> Result<String, AppError> {
        // 1. Extract
        let text = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AppError::Cancelled),
            text = self.extractor.extract(url) => text?,
        };
        if text.trim().is_empty() {
            return Err(AppError::ExtractionFailed {
                url: url.to_string(),
                attempts: 1,
                message: "no readable text".into(),
            });
        }

        // 2. Truncate
        let excerpt = truncate_chars(&text, self.config.excerpt_chars);
        tracing::debug!(
            %url,
            extracted_bytes = text.len(),
            excerpt_bytes = excerpt.len(),
            "Extracted page text"
        );

        // 3. Summarize
        let policy = self.generator.retry_policy();
        let raw = retry(&policy, cancel, self.generator.name(), move || {
            self.generate(excerpt)
        })
        .await
        .map_err(|e| e.error)?;

        // 4. Normalize
        normalize_title(&raw)
            .ok_or_else(|| AppError::permanent(self.generator.name(), "model returned an empty title"))
    }

    async fn generate(&self, excerpt: &str) -> Result<String, AppError> {
        match &self.title_pool {
            Some(pool) => pool.run(self.generator.generate_title(excerpt)).await,
            None => self.generator.generate_title(excerpt).await,
        }
    }
}

/// First `max_chars` characters of `text`, cut on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Clean a raw model answer into a single-line link title.
///
/// Strips surrounding whitespace and quote/emphasis characters, collapses
/// internal whitespace, and removes square brackets. Returns `None` when
/// nothing is left.
pub fn normalize_title(raw: &str) -> Option<String> {
    let stripped = raw.trim().trim_matches(TITLE_WRAPPERS).trim();
    let title = stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(['[', ']'], "");
    let title = title.trim();

    (!title.is_empty()).then(|| title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;

    const URL: &str = "https://example.com";

    #[tokio::test]
    async fn happy_path_returns_title() {
        let resolver = TitleResolver::new(
            MockExtractor::new().with_page(URL, "Example Domain"),
            MockTitleGenerator::new("Example Domain"),
        );

        let title = resolver.resolve(URL, &CancellationToken::new()).await;
        assert_eq!(title, "Example Domain");
    }

    #[tokio::test]
    async fn strips_quotes_from_title() {
        let resolver = TitleResolver::new(
            MockExtractor::new().with_page(URL, "body"),
            MockTitleGenerator::new("  \"Example Domain\"\n"),
        );

        let title = resolver.resolve(URL, &CancellationToken::new()).await;
        assert_eq!(title, "Example Domain");
    }

    #[tokio::test]
    async fn extraction_failure_falls_back_to_url() {
        let generator = MockTitleGenerator::new("unused");
        let resolver = TitleResolver::new(MockExtractor::failing(), generator.clone());

        let title = resolver.resolve(URL, &CancellationToken::new()).await;
        assert_eq!(title, URL);
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_page_falls_back_without_model_call() {
        let generator = MockTitleGenerator::echo();
        let resolver = TitleResolver::new(
            MockExtractor::new().with_page(URL, "  \n "),
            generator.clone(),
        );

        assert_eq!(resolver.resolve(URL, &CancellationToken::new()).await, URL);
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn permanent_model_error_falls_back_without_retry() {
        let generator = MockTitleGenerator::with_error(AppError::permanent("mock", "blocked"))
            .with_policy(fast_retry(5));
        let resolver = TitleResolver::new(
            MockExtractor::new().with_page(URL, "body"),
            generator.clone(),
        );

        assert_eq!(resolver.resolve(URL, &CancellationToken::new()).await, URL);
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn transient_model_error_is_retried() {
        let generator = MockTitleGenerator::with_responses(vec![
            Err(AppError::transient("mock", "503")),
            Err(AppError::transient("mock", "503")),
            Ok("Recovered".into()),
        ])
        .with_policy(fast_retry(5));
        let resolver = TitleResolver::new(
            MockExtractor::new().with_page(URL, "body"),
            generator.clone(),
        );

        assert_eq!(resolver.resolve(URL, &CancellationToken::new()).await, "Recovered");
        assert_eq!(generator.call_count(), 3);
    }

    #[tokio::test]
    async fn exhausted_model_retries_fall_back() {
        let generator = MockTitleGenerator::with_responses(vec![
            Err(AppError::transient("mock", "503")),
            Err(AppError::transient("mock", "503")),
        ])
        .with_policy(fast_retry(2));
        let resolver = TitleResolver::new(
            MockExtractor::new().with_page(URL, "body"),
            generator.clone(),
        );

        assert_eq!(resolver.resolve(URL, &CancellationToken::new()).await, URL);
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test]
    async fn blank_title_falls_back() {
        let resolver = TitleResolver::new(
            MockExtractor::new().with_page(URL, "body"),
            MockTitleGenerator::new(" \"\" "),
        );

        assert_eq!(resolver.resolve(URL, &CancellationToken::new()).await, URL);
    }

    #[tokio::test]
    async fn excerpt_is_truncated() {
        let generator = MockTitleGenerator::echo();
        let long_text = "é".repeat(50);
        let resolver = TitleResolver::with_config(
            MockExtractor::new().with_page(URL, &long_text),
            generator.clone(),
            ResolverConfig {
                excerpt_chars: 10,
                title_concurrency: Some(1),
            },
        );

        let title = resolver.resolve(URL, &CancellationToken::new()).await;
        assert_eq!(title, "é".repeat(10));
        assert_eq!(generator.calls.lock().unwrap()[0].chars().count(), 10);
    }

    #[tokio::test]
    async fn cancelled_resolution_falls_back() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let resolver = TitleResolver::new(
            MockExtractor::new().with_page(URL, "body"),
            MockTitleGenerator::new("Title"),
        );

        assert_eq!(resolver.resolve(URL, &cancel).await, URL);
    }

    #[test]
    fn truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 2), "he");
        assert_eq!(truncate_chars("日本語テキスト", 3), "日本語");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn normalize_title_cleans_model_output() {
        assert_eq!(normalize_title("\"Example\"").as_deref(), Some("Example"));
        assert_eq!(normalize_title("**Bold Title**").as_deref(), Some("Bold Title"));
        assert_eq!(
            normalize_title("\u{201C}Curly\u{201D}").as_deref(),
            Some("Curly")
        );
        assert_eq!(
            normalize_title("Two\nLines  here").as_deref(),
            Some("Two Lines here")
        );
        assert_eq!(normalize_title("[Draft] Notes").as_deref(), Some("Draft Notes"));
        assert_eq!(normalize_title("Rust's Book").as_deref(), Some("Rust's Book"));
        assert_eq!(normalize_title("  \"  \" "), None);
    }
}
