//! # Size Probe
//!
//! Determines a remote resource's byte size via a lightweight HEAD
//! request, with a header-only GET fallback when HEAD is
//! inconclusive. Probes never fail: an unknown size is a valid
//! answer, interpreted by the policy engine as "cannot pre-verify,
//! proceed and verify post-download".

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{self, HeaderMap};
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, warn};

use crate::config::PROBE_TIMEOUT;
use crate::types::MediaKind;

/// Number of leading body bytes inspected when a response carries no
/// Content-Type at all.
const EMPTY_CONTENT_TYPE_SNIFF_LEN: usize = 64;

/// Result of a size probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SizeResult {
    /// Declared size in bytes, when the server reported one.
    pub bytes: Option<u64>,
    /// The resource answered with an explicit access-denial status.
    /// Distinguished from transient failures because it feeds a
    /// different downstream policy (alternate-URL handling) than an
    /// unknown size does.
    pub access_denied: bool,
}

/// Result of validating a URL for direct-link delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Validation {
    pub valid: bool,
    pub access_denied: bool,
}

/// Probing seam; the engine depends on this trait so policy decisions
/// are testable without a network.
#[async_trait]
pub trait SizeSource: Send + Sync {
    /// Probe the declared size of `url`. `allow_get_fallback`
    /// disables the heavier content-fetching fallback probe.
    async fn probe(&self, url: &str, headers: &HeaderMap, allow_get_fallback: bool) -> SizeResult;

    /// Check whether `url` serves plausible media of `kind`.
    async fn validate(&self, url: &str, headers: &HeaderMap, kind: MediaKind) -> Validation;
}

/// HTTP implementation of [`SizeSource`].
#[derive(Debug, Clone)]
pub struct SizeProbe {
    client: Client,
}

enum ProbeStep {
    Denied,
    Size(Option<u64>),
    /// HEAD gave no verdict; a GET is required.
    Inconclusive,
}

impl SizeProbe {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn size_step(&self, method: Method, url: &str, headers: &HeaderMap) -> ProbeStep {
        let request = self
            .client
            .request(method.clone(), url)
            .headers(headers.clone())
            .timeout(PROBE_TIMEOUT);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(url = url, method = %method, error = %e, "size probe request failed");
                return ProbeStep::Inconclusive;
            }
        };

        if response.status() == StatusCode::FORBIDDEN {
            warn!(url = url, "media URL access denied (403 Forbidden)");
            return ProbeStep::Denied;
        }
        if !response.status().is_success() {
            debug!(url = url, status = %response.status(), "size probe got non-success status");
            return ProbeStep::Inconclusive;
        }

        match size_from_headers(response.headers()) {
            Some(bytes) => ProbeStep::Size(Some(bytes)),
            // A successful GET that still declares no length is
            // final; a HEAD without one may be lying.
            None if method == Method::GET => ProbeStep::Size(None),
            None => ProbeStep::Inconclusive,
        }
        // Dropping the response aborts any body transfer.
    }
}

#[async_trait]
impl SizeSource for SizeProbe {
    async fn probe(&self, url: &str, headers: &HeaderMap, allow_get_fallback: bool) -> SizeResult {
        match self.size_step(Method::HEAD, url, headers).await {
            ProbeStep::Denied => {
                return SizeResult {
                    bytes: None,
                    access_denied: true,
                };
            }
            ProbeStep::Size(bytes) => {
                if bytes.is_some() {
                    return SizeResult {
                        bytes,
                        access_denied: false,
                    };
                }
            }
            ProbeStep::Inconclusive => {}
        }

        if !allow_get_fallback {
            return SizeResult::default();
        }

        match self.size_step(Method::GET, url, headers).await {
            ProbeStep::Denied => SizeResult {
                bytes: None,
                access_denied: true,
            },
            ProbeStep::Size(bytes) => SizeResult {
                bytes,
                access_denied: false,
            },
            ProbeStep::Inconclusive => SizeResult::default(),
        }
    }

    async fn validate(&self, url: &str, headers: &HeaderMap, kind: MediaKind) -> Validation {
        // HEAD first; only fall back to GET when the headers alone
        // cannot decide (empty Content-Type needs a body sniff).
        let head = self
            .client
            .head(url)
            .headers(headers.clone())
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;

        match head {
            Ok(response) => {
                if response.status() == StatusCode::FORBIDDEN {
                    return Validation {
                        valid: false,
                        access_denied: true,
                    };
                }
                if !response.status().is_success() {
                    return Validation::default();
                }
                if let Some(content_type) = content_type_of(response.headers()) {
                    return Validation {
                        valid: media_content_type_ok(&content_type, kind),
                        access_denied: false,
                    };
                }
                // No Content-Type from HEAD; need a GET to sniff.
            }
            Err(e) => {
                debug!(url = url, error = %e, "validation HEAD failed, retrying with GET");
            }
        }

        let response = match self
            .client
            .get(url)
            .headers(headers.clone())
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(url = url, error = %e, "media URL validation failed");
                return Validation::default();
            }
        };

        if response.status() == StatusCode::FORBIDDEN {
            return Validation {
                valid: false,
                access_denied: true,
            };
        }
        if !response.status().is_success() {
            return Validation::default();
        }

        if let Some(content_type) = content_type_of(response.headers()) {
            return Validation {
                valid: media_content_type_ok(&content_type, kind),
                access_denied: false,
            };
        }

        // Empty Content-Type: read the first few bytes and reject
        // disguised JSON error payloads.
        let mut stream = response.bytes_stream();
        let preview = match stream.next().await {
            Some(Ok(chunk)) => chunk,
            _ => return Validation::default(),
        };
        let preview = &preview[..preview.len().min(EMPTY_CONTENT_TYPE_SNIFF_LEN)];
        Validation {
            valid: !looks_like_json_error(preview),
            access_denied: false,
        }
    }
}

/// Extract the declared size from response headers, preferring the
/// Content-Range total (authoritative for range responses) over
/// Content-Length.
pub fn size_from_headers(headers: &HeaderMap) -> Option<u64> {
    if let Some(range) = headers
        .get(header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(total) = range.rsplit('/').next() {
            if let Ok(bytes) = total.trim().parse::<u64>() {
                return Some(bytes);
            }
        }
    }

    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

pub(crate) fn content_type_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase())
        .filter(|v| !v.is_empty())
}

/// Whether a Content-Type is plausible for the given media kind.
///
/// Some CDNs serve video as `application/octet-stream`, so that is
/// accepted for videos; JSON and text bodies are error pages.
pub(crate) fn media_content_type_ok(content_type: &str, kind: MediaKind) -> bool {
    if content_type.contains("application/json") || content_type.contains("text/") {
        return false;
    }
    match kind {
        MediaKind::Video => {
            content_type.starts_with("video/")
                || content_type.contains("mp4")
                || content_type.contains("octet-stream")
        }
        MediaKind::Image => content_type.starts_with("image/"),
    }
}

/// Detect platform error payloads served without a Content-Type.
pub(crate) fn looks_like_json_error(preview: &[u8]) -> bool {
    if !preview.starts_with(b"{") {
        return false;
    }
    let text = String::from_utf8_lossy(preview);
    text.contains("error_code") || text.contains("error_response")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers_with(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn content_range_total_preferred_over_content_length() {
        let mut headers = headers_with(header::CONTENT_RANGE, "bytes 0-0/83886080");
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("1"));
        assert_eq!(size_from_headers(&headers), Some(83_886_080));
    }

    #[test]
    fn content_length_used_when_no_range() {
        let headers = headers_with(header::CONTENT_LENGTH, "52428800");
        assert_eq!(size_from_headers(&headers), Some(52_428_800));
    }

    #[test]
    fn unparseable_headers_give_unknown_size() {
        let headers = headers_with(header::CONTENT_RANGE, "bytes 0-0/*");
        assert_eq!(size_from_headers(&headers), None);
        assert_eq!(size_from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn video_content_types() {
        assert!(media_content_type_ok("video/mp4", MediaKind::Video));
        assert!(media_content_type_ok(
            "application/octet-stream",
            MediaKind::Video
        ));
        assert!(!media_content_type_ok("text/html", MediaKind::Video));
        assert!(!media_content_type_ok(
            "application/json",
            MediaKind::Video
        ));
        assert!(!media_content_type_ok("image/png", MediaKind::Video));
    }

    #[test]
    fn image_content_types() {
        assert!(media_content_type_ok("image/jpeg", MediaKind::Image));
        assert!(!media_content_type_ok("video/mp4", MediaKind::Image));
        assert!(!media_content_type_ok("text/plain", MediaKind::Image));
    }

    #[test]
    fn json_error_sniff() {
        assert!(looks_like_json_error(br#"{"error_code":403}"#));
        assert!(looks_like_json_error(br#"{"error_response":{"msg"#));
        assert!(!looks_like_json_error(br#"{"data":{"ok":true}}"#));
        assert!(!looks_like_json_error(b"\x00\x00\x00\x18ftypmp42"));
    }
}
