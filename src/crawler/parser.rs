//! Document parsing
//!
//! Parsers turn a fetched body into a [`ParsedDocument`]: a title and the raw
//! link targets found in it. Links are returned as written; resolving them
//! against the page URL and normalizing happens on enqueue.

use crate::crawler::FetchResult;
use scraper::{Html, Selector};
use thiserror::Error;

/// What a parser extracted from a document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    /// The document title (from `<title>` for HTML)
    pub title: Option<String>,

    /// Link targets in document order, as written in the source
    pub links: Vec<String>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("No parser for media type {0}")]
    Unsupported(String),

    #[error("Malformed document: {0}")]
    Malformed(String),
}

/// Parses one family of media types
pub trait DocumentParser: Send + Sync {
    /// Media types this parser handles, lowercase and without parameters
    fn media_types(&self) -> &[&'static str];

    fn parse(&self, fetched: &FetchResult) -> Result<ParsedDocument, ParseError>;
}

/// HTML parser
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` anywhere in the document
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` and `data:` targets
/// - fragment-only links (same page anchors)
///
/// `rel="nofollow"` links are followed.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlParser;

impl DocumentParser for HtmlParser {
    fn media_types(&self) -> &[&'static str] {
        &["text/html", "application/xhtml+xml"]
    }

    fn parse(&self, fetched: &FetchResult) -> Result<ParsedDocument, ParseError> {
        Ok(parse_html(&fetched.body))
    }
}

/// Parses an HTML string
///
/// # Example
///
/// ```
/// use sumi_tide::crawler::parse_html;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let parsed = parse_html(html);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links, vec!["/page".to_string()]);
/// ```
pub fn parse_html(html: &str) -> ParsedDocument {
    let document = Html::parse_document(html);
    ParsedDocument {
        title: extract_title(&document),
        links: extract_links(&document),
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_links(document: &Html) -> Vec<String> {
    let mut links = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(href) = element.value().attr("href").filter(|h| is_followable(h)) {
                links.push(href.trim().to_string());
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href").filter(|h| is_followable(h)) {
                links.push(href.trim().to_string());
            }
        }
    }

    links
}

fn is_followable(href: &str) -> bool {
    let href = href.trim();
    let lower = href.to_ascii_lowercase();
    !(href.is_empty()
        || href.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:"))
}

/// Selects a parser by the fetched document's media type
#[derive(Default)]
pub struct ParserRegistry {
    parsers: Vec<Box<dyn DocumentParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in HTML parser
    pub fn with_defaults() -> Self {
        Self::new().register(HtmlParser)
    }

    /// Adds a parser; later registrations win for the same media type
    pub fn register(mut self, parser: impl DocumentParser + 'static) -> Self {
        self.parsers.push(Box::new(parser));
        self
    }

    pub fn supports(&self, media_type: &str) -> bool {
        self.find(media_type).is_some()
    }

    fn find(&self, media_type: &str) -> Option<&dyn DocumentParser> {
        self.parsers
            .iter()
            .rev()
            .find(|p| p.media_types().contains(&media_type))
            .map(|p| p.as_ref())
    }

    pub fn parse(&self, fetched: &FetchResult) -> Result<ParsedDocument, ParseError> {
        let media_type = fetched.media_type.as_deref().unwrap_or("unknown");
        let parser = self
            .find(media_type)
            .ok_or_else(|| ParseError::Unsupported(media_type.to_string()))?;
        parser.parse(fetched)
    }
}
