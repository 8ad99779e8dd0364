//! Shared HTTP client construction and per-kind request shaping.

use reqwest::Client;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use rustls::{ClientConfig, crypto::ring};
use rustls_platform_verifier::BuilderVerifierExt;
use std::sync::Arc;
use tracing::debug;

use crate::error::AcquireError;
use crate::types::{MediaKind, RequestContext};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const DEFAULT_ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7";

const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8";

/// Create a reqwest Client shared by probes and fetches.
///
/// Individual requests carry their own timeout (per timeout class),
/// so no overall timeout is set here.
pub fn create_client() -> Result<Client, AcquireError> {
    let provider = Arc::new(ring::default_provider());

    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .expect("failed to configure default TLS protocol versions")
        .with_platform_verifier()
        .expect("failed to initialize platform certificate verifier")
        .with_no_client_auth();

    Client::builder()
        .pool_max_idle_per_host(5)
        .user_agent(DEFAULT_USER_AGENT)
        .use_preconfigured_tls(tls_config)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(AcquireError::from)
}

/// Build the request headers for probing or fetching one media kind.
///
/// Context headers come from the parser that produced the record;
/// `extra_headers` are inserted last so they override the defaults.
pub fn request_headers(kind: MediaKind, ctx: &RequestContext) -> HeaderMap {
    let mut headers = HeaderMap::new();

    let user_agent = ctx.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
    insert_header(&mut headers, header::USER_AGENT.as_str(), user_agent);

    let accept = match kind {
        MediaKind::Video => "*/*",
        MediaKind::Image => IMAGE_ACCEPT,
    };
    insert_header(&mut headers, header::ACCEPT.as_str(), accept);
    insert_header(
        &mut headers,
        header::ACCEPT_LANGUAGE.as_str(),
        DEFAULT_ACCEPT_LANGUAGE,
    );

    if let Some(referer) = &ctx.referer {
        insert_header(&mut headers, header::REFERER.as_str(), referer);
    }
    if let Some(origin) = &ctx.origin {
        insert_header(&mut headers, header::ORIGIN.as_str(), origin);
    }

    for (name, value) in &ctx.extra_headers {
        insert_header(&mut headers, name, value);
    }

    headers
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) {
    match (name.parse::<HeaderName>(), HeaderValue::from_str(value)) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => {
            debug!(name = name, "skipping invalid request header");
        }
    }
}
