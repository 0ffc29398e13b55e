//! Link extraction strategies
//!
//! This module handles turning a fetched page body into raw outbound link strings:
//! - The [`LinkExtractor`] trait, also implemented for plain closures
//! - A regex anchor scanner (the default)
//! - A scraper-based HTML extractor
//! - A registry of named strategies backing the `parser-method` option
//!
//! Extractors return links exactly as written in the page. Resolution against the
//! page URL and canonicalization happen afterwards, in the parse pool.

use crate::url::CanonicalUrl;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::{Arc, LazyLock};

/// Name of the strategy used when none is configured
pub const DEFAULT_PARSER: &str = "regex";

/// Extracts raw link strings from a page body
pub trait LinkExtractor: Send + Sync {
    fn extract(&self, source: &CanonicalUrl, content: &str) -> Vec<String>;
}

impl<F> LinkExtractor for F
where
    F: Fn(&CanonicalUrl, &str) -> Vec<String> + Send + Sync,
{
    fn extract(&self, source: &CanonicalUrl, content: &str) -> Vec<String> {
        self(source, content)
    }
}

/// Looks up a registered extraction strategy by name
///
/// # Registered Names
///
/// * `regex` (alias `anchors`) - [`RegexExtractor`]
/// * `html` - [`HtmlExtractor`]
pub fn extractor_by_name(name: &str) -> Option<Arc<dyn LinkExtractor>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "regex" | "anchors" => Some(Arc::new(RegexExtractor)),
        "html" => Some(Arc::new(HtmlExtractor)),
        _ => None,
    }
}

/// Scans `<a href>` tags with a regular expression
///
/// Anchors carrying a `rel` attribute are skipped, so `nofollow`, `external` and
/// similar annotated links are never followed. Only quoted `href` values are
/// recognized.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexExtractor;

static ANCHOR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>"#)
        .expect("hardcoded regex pattern is valid")
});

static REL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\srel\s*=").expect("hardcoded regex pattern is valid"));

impl LinkExtractor for RegexExtractor {
    fn extract(&self, _source: &CanonicalUrl, content: &str) -> Vec<String> {
        ANCHOR_PATTERN
            .captures_iter(content)
            .filter(|caps| !REL_PATTERN.is_match(&caps[0]))
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|href| href.as_str().to_string())
            .collect()
    }
}

/// Parses the page as HTML and collects link targets
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - Empty and fragment-only (`#section`) hrefs
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlExtractor;

impl LinkExtractor for HtmlExtractor {
    fn extract(&self, _source: &CanonicalUrl, content: &str) -> Vec<String> {
        let document = Html::parse_document(content);
        let mut links = Vec::new();

        if let Ok(a_selector) = Selector::parse("a[href]") {
            for element in document.select(&a_selector) {
                if element.value().attr("download").is_some() {
                    continue;
                }
                if let Some(href) = element.value().attr("href").and_then(keep_href) {
                    links.push(href);
                }
            }
        }

        if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
            for element in document.select(&canonical_selector) {
                if let Some(href) = element.value().attr("href").and_then(keep_href) {
                    links.push(href);
                }
            }
        }

        links
    }
}

fn keep_href(href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    Some(href.to_string())
}
