//! # Acquire Engine
//!
//! A library for acquiring remote media and deciding how it gets
//! delivered: by direct link, from a local cache download, or not at
//! all when size policy says so.
//!
//! ## Features
//!
//! - Size probing before transfer, with authoritative post-download
//!   verification
//! - Per-item skip / direct-link / cache-download policy decisions
//! - Fallback-URL retry with a bounded concurrency gate
//! - Atomic cache placement and guaranteed cleanup after delivery

pub mod acquirer;
pub mod aggregate;
pub mod cache;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod probe;
pub mod types;

pub use aggregate::{AggregateResult, RecordResult, aggregate};
pub use cache::{CacheStore, media_id, media_suffix};
pub use config::{AcquirePolicy, AcquirePolicyBuilder};
pub use engine::AcquisitionPolicyEngine;
pub use error::AcquireError;
pub use types::{AcquisitionOutcome, AcquisitionRecord, MediaItem, MediaKind, RequestContext};

// Re-export the seams the engine is generic over.
pub use acquirer::{AcquiredMedia, ExhaustedCandidates, RetryingAcquirer};
pub use fetch::{FetchedFile, Fetcher, TimeoutClass, Transfer};
pub use probe::{SizeProbe, SizeResult, SizeSource, Validation};

// Shared HTTP client construction
pub use client::{create_client, request_headers};
