//! The platform parser capability.
//!
//! Every supported platform implements [`LinkParser`]; the router
//! selects one by trying registered parsers in order and taking the
//! first whose `can_handle` matches. Parsers are a closed seam: they
//! produce an [`AcquisitionRecord`] with non-empty candidate lists
//! and whatever request shaping their platform's CDN requires.

use std::sync::LazyLock;

use acquire_engine::AcquisitionRecord;
use async_trait::async_trait;
use regex::Regex;
use url::Url;

use crate::error::ParseError;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"']+"#).unwrap());

#[async_trait]
pub trait LinkParser: Send + Sync {
    /// Stable parser name, used for logging and routing diagnostics.
    fn name(&self) -> &'static str;

    /// Whether this parser recognizes `url`.
    fn can_handle(&self, url: &str) -> bool;

    /// All URLs in `text` this parser can handle, in order of
    /// appearance.
    fn extract_links(&self, text: &str) -> Vec<String> {
        URL_PATTERN
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .filter(|u| Url::parse(u).is_ok() && self.can_handle(u))
            .collect()
    }

    /// Resolve one recognized URL into a full acquisition record.
    /// Implementations must omit items with no usable candidate URL
    /// rather than construct empty ones.
    async fn resolve(&self, url: &str) -> Result<AcquisitionRecord, ParseError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use acquire_engine::{AcquirePolicy, RequestContext};

    struct ClipParser;

    #[async_trait]
    impl LinkParser for ClipParser {
        fn name(&self) -> &'static str {
            "clip"
        }

        fn can_handle(&self, url: &str) -> bool {
            url.contains("clip.example.com")
        }

        async fn resolve(&self, url: &str) -> Result<AcquisitionRecord, ParseError> {
            Ok(AcquisitionRecord {
                source_url: url.to_string(),
                platform: "clip".into(),
                video_items: vec![],
                image_items: vec![],
                context: RequestContext::default(),
                policy: AcquirePolicy::default(),
                forced_cache: false,
            })
        }
    }

    #[test]
    fn default_extraction_keeps_only_handled_urls_in_order() {
        let text = "watch https://clip.example.com/v/1 and \
                    https://other.example.com/x then https://clip.example.com/v/2";
        let links = ClipParser.extract_links(text);
        assert_eq!(
            links,
            vec![
                "https://clip.example.com/v/1",
                "https://clip.example.com/v/2"
            ]
        );
    }

    #[test]
    fn extraction_ignores_non_url_text() {
        assert!(ClipParser.extract_links("no links here").is_empty());
        assert!(ClipParser.extract_links("ftp://clip.example.com/v/1").is_empty());
    }
}
