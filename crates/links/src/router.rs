//! First-match routing of free text to platform parsers.

use std::sync::Arc;

use acquire_engine::AcquisitionRecord;
use tracing::debug;

use crate::error::ParseError;
use crate::parser::LinkParser;

/// One recognized link paired with the parser that claimed it.
#[derive(Clone)]
pub struct RoutedLink {
    pub url: String,
    pub parser: Arc<dyn LinkParser>,
}

impl std::fmt::Debug for RoutedLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutedLink")
            .field("url", &self.url)
            .field("parser", &self.parser.name())
            .finish()
    }
}

/// Routes URLs to registered parsers in registration order; the
/// first parser whose `can_handle` matches wins.
#[derive(Default)]
pub struct LinkRouter {
    parsers: Vec<Arc<dyn LinkParser>>,
    /// Messages carrying this marker are the engine's own output
    /// echoed back; they are never re-parsed.
    echo_marker: Option<String>,
}

impl LinkRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_echo_marker(mut self, marker: impl Into<String>) -> Self {
        self.echo_marker = Some(marker.into());
        self
    }

    /// Register a parser. Order matters: earlier registrations win
    /// when several parsers claim the same URL.
    pub fn register(&mut self, parser: Arc<dyn LinkParser>) {
        debug!(parser = parser.name(), "registered link parser");
        self.parsers.push(parser);
    }

    /// First registered parser that recognizes `url`.
    pub fn parser_for(&self, url: &str) -> Option<&Arc<dyn LinkParser>> {
        self.parsers.iter().find(|p| p.can_handle(url))
    }

    /// Extract every routable link from free text, ordered by
    /// position in the text. A URL claimed by several parsers is
    /// reported once, paired with the earliest-registered claimant.
    pub fn extract(&self, text: &str) -> Vec<RoutedLink> {
        if let Some(marker) = &self.echo_marker {
            if text.contains(marker.as_str()) {
                return Vec::new();
            }
        }

        let mut found: Vec<(usize, RoutedLink)> = Vec::new();
        for parser in &self.parsers {
            for url in parser.extract_links(text) {
                if found.iter().any(|(_, l)| l.url == url) {
                    continue;
                }
                // extract_links only returns substrings of `text`.
                if let Some(position) = text.find(&url) {
                    found.push((
                        position,
                        RoutedLink {
                            url,
                            parser: Arc::clone(parser),
                        },
                    ));
                }
            }
        }
        found.sort_by_key(|(position, _)| *position);
        found.into_iter().map(|(_, link)| link).collect()
    }

    /// Route `url` and resolve it into an acquisition record.
    pub async fn resolve(&self, url: &str) -> Result<AcquisitionRecord, ParseError> {
        let parser = self
            .parser_for(url)
            .ok_or_else(|| ParseError::Unsupported(url.to_string()))?;
        debug!(parser = parser.name(), url = url, "resolving link");
        parser.resolve(url).await
    }
}
