use std::collections::{HashMap, HashSet};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::document::{Candidate, Document, Line};
use crate::resolve::TitleResolver;
use crate::traits::{PageExtractor, TitleGenerator};

/// Configuration for [`Annotator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatorConfig {
    /// Maximum resolutions in flight at once.
    pub max_in_flight: usize,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self { max_in_flight: 16 }
    }
}

/// Rewrites every bare URL in a document as `[title](url)`.
///
/// 1. Parse lines and mark code regions
/// 2. Collect valid bare URLs outside code regions
/// 3. Resolve each distinct URL once, concurrently
/// 4. Splice titles back in at their original positions
pub struct Annotator<E, G>
where
    E: PageExtractor,
    G: TitleGenerator,
{
    resolver: TitleResolver<E, G>,
    config: AnnotatorConfig,
}

impl<E, G> Annotator<E, G>
where
    E: PageExtractor,
    G: TitleGenerator,
{
    pub fn new(resolver: TitleResolver<E, G>) -> Self {
        Self::with_config(resolver, AnnotatorConfig::default())
    }

    pub fn with_config(resolver: TitleResolver<E, G>, config: AnnotatorConfig) -> Self {
        Self { resolver, config }
    }

    /// Annotate a document given as lines. Returns the same number of
    /// lines in the same order.
    pub async fn annotate(&self, lines: &[String], cancel: &CancellationToken) -> Vec<String> {
        let document = Document::from_lines(lines.iter().map(String::as_str));
        self.annotate_document(&document, cancel).await
    }

    /// Annotate a whole text, preserving line endings.
    pub async fn annotate_text(&self, text: &str, cancel: &CancellationToken) -> String {
        let document = Document::parse(text);
        self.annotate_document(&document, cancel).await.join("\n")
    }

    async fn annotate_document(
        &self,
        document: &Document,
        cancel: &CancellationToken,
    ) -> Vec<String> {
        let per_line: Vec<Vec<Candidate>> =
            document.lines().iter().map(Line::candidates).collect();

        let mut seen = HashSet::new();
        let unique: Vec<&str> = per_line
            .iter()
            .flatten()
            .map(|candidate| candidate.url.as_str())
            .filter(|url| seen.insert(*url))
            .collect();

        tracing::info!(
            lines = document.lines().len(),
            candidates = per_line.iter().map(Vec::len).sum::<usize>(),
            unique = unique.len(),
            "Resolving link titles"
        );

        let titles: HashMap<String, String> = stream::iter(unique)
            .map(|url| async move {
                let title = self.resolver.resolve(url, cancel).await;
                (url.to_string(), title)
            })
            .buffer_unordered(self.config.max_in_flight.max(1))
            .collect()
            .await;

        let fallbacks = titles.iter().filter(|(url, title)| url == title).count();
        tracing::info!(
            resolved = titles.len() - fallbacks,
            fallbacks,
            "Annotation complete"
        );

        document
            .lines()
            .iter()
            .zip(&per_line)
            .map(|(line, candidates)| {
                if candidates.is_empty() {
                    line.text.clone()
                } else {
                    line.rewrite(candidates, &titles)
                }
            })
            .collect()
    }
}
