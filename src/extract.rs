//! Document URL extraction from rendered frame markup.
//!
//! Extraction is a pure text scan: no I/O, deterministic for a given input.
//! The pipeline only depends on the [`UrlMatcher`] capability so a different
//! target service can be swapped in without touching the orchestration.

use regex::Regex;

use crate::{ExtractError, Result};

/// Document-preview endpoint followed by a query string, ending before the
/// first quote, angle bracket or whitespace character.
pub const PREVIEW_URL_PATTERN: &str =
    r#"https://pdfnet\.lockton\.com/previewliabilityholder\.aspx\?[^"'<>\s]+"#;

/// Serialized markup of the target frame, captured once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSnapshot {
    pub markup: String,
}

/// A URL that matched the document-preview pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedUrl {
    pub document_url: String,
}

/// Finds the document link in frame markup.
pub trait UrlMatcher: Send + Sync {
    /// First match in `markup`, if any.
    fn extract(&self, markup: &str) -> Option<String>;

    /// Human-readable description of what is matched, for error reporting.
    fn describe(&self) -> String;
}

/// Regex-backed matcher. Multiple matches are not an error; the first wins.
#[derive(Debug, Clone)]
pub struct PreviewUrlMatcher {
    pattern: Regex,
}

impl PreviewUrlMatcher {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| ExtractError::Config(format!("Invalid URL pattern {pattern:?}: {e}")))?;
        Ok(Self { pattern })
    }
}

impl Default for PreviewUrlMatcher {
    fn default() -> Self {
        Self {
            pattern: Regex::new(PREVIEW_URL_PATTERN).expect("built-in pattern compiles"),
        }
    }
}

impl UrlMatcher for PreviewUrlMatcher {
    fn extract(&self, markup: &str) -> Option<String> {
        self.pattern.find(markup).map(|m| m.as_str().to_string())
    }

    fn describe(&self) -> String {
        self.pattern.as_str().to_string()
    }
}

/// Runs `matcher` over a snapshot, turning "no match" into an extraction error.
pub fn extract_document_url(
    matcher: &dyn UrlMatcher,
    snapshot: &FrameSnapshot,
) -> Result<ExtractedUrl> {
    matcher
        .extract(&snapshot.markup)
        .map(|document_url| ExtractedUrl { document_url })
        .ok_or_else(|| ExtractError::Extraction {
            pattern: matcher.describe(),
        })
}
