//! Line model of a markdown document and bare-URL scanning.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

const FENCE: &str = "```";

/// `http(s)://` followed by non-whitespace. Brackets, angle brackets and
/// double quotes end a match so link text and autolinks stay separable.
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s\[\]<>"]+"#).expect("URL pattern is a valid regex")
});

/// An inline markdown link: `[text](target)`.
static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[[^\]\n]*\]\([^)\n]*\)").expect("link pattern is a valid regex")
});

/// A bare URL found in a line, with its byte span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub start: usize,
    pub end: usize,
    pub url: String,
}

/// One line of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub text: String,
    /// True for fence lines and everything between an opening and a
    /// closing fence.
    pub in_code: bool,
}

impl Line {
    /// Valid bare URLs in this line, in order. Code lines have none.
    pub fn candidates(&self) -> Vec<Candidate> {
        if self.in_code {
            return Vec::new();
        }
        scan_line(&self.text)
            .into_iter()
            .filter(|candidate| {
                let valid = is_valid_url(&candidate.url);
                if !valid {
                    tracing::debug!(url = %candidate.url, "Skipping malformed URL");
                }
                valid
            })
            .collect()
    }

    /// Replace each candidate span with `[title](url)`.
    ///
    /// Candidates without a title in `titles` are left as they are.
    pub fn rewrite(&self, candidates: &[Candidate], titles: &HashMap<String, String>) -> String {
        let mut out = String::with_capacity(self.text.len() + candidates.len() * 32);
        let mut cursor = 0;

        for candidate in candidates {
            out.push_str(&self.text[cursor..candidate.start]);
            match titles.get(&candidate.url) {
                Some(title) => {
                    let _ = write!(out, "[{title}]({})", candidate.url);
                }
                None => out.push_str(&candidate.url),
            }
            cursor = candidate.end;
        }

        out.push_str(&self.text[cursor..]);
        out
    }
}

/// A document as an ordered list of lines with code regions marked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    lines: Vec<Line>,
}

impl Document {
    /// Split on `\n` only, so `\r` and a trailing newline round-trip
    /// through [`render`](Self::render).
    pub fn parse(text: &str) -> Self {
        Self::from_lines(text.split('\n'))
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut in_code = false;
        let lines = lines
            .into_iter()
            .map(|text| {
                let text = text.into();
                let fence = is_fence(&text);
                if fence {
                    in_code = !in_code;
                }
                Line {
                    in_code: in_code || fence,
                    text,
                }
            })
            .collect();

        Self { lines }
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn render(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn is_fence(line: &str) -> bool {
    line.trim().starts_with(FENCE)
}

/// Every syntactic bare URL in `line`, valid or not.
///
/// URLs that are the target of an existing link (preceded by `](`) or that
/// sit anywhere inside an inline link are skipped, which makes annotation
/// idempotent.
pub fn scan_line(line: &str) -> Vec<Candidate> {
    let links: Vec<Range<usize>> = LINK_PATTERN.find_iter(line).map(|m| m.range()).collect();

    URL_PATTERN
        .find_iter(line)
        .filter_map(|m| {
            let start = m.start();
            let url = trim_url_tail(m.as_str());
            let end = start + url.len();

            if line[..start].ends_with("](") {
                return None;
            }
            if links.iter().any(|link| start < link.end && end > link.start) {
                return None;
            }

            Some(Candidate {
                start,
                end,
                url: url.to_string(),
            })
        })
        .collect()
}

/// Drop closing parentheses and sentence punctuation glued to a URL.
fn trim_url_tail(raw: &str) -> &str {
    raw.trim_end_matches([')', '.', ',', ';', ':', '!', '?', '\''])
}

/// A URL is valid when it parses and has a non-empty host.
pub fn is_valid_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|url| url.host_str().is_some_and(|host| !host.is_empty()))
        .unwrap_or(false)
}
