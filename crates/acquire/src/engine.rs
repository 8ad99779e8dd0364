//! # Acquisition Policy Engine
//!
//! The decision core. For each media item in a record it chooses one
//! of skip / direct-link / cache-download, pre-verifies size against
//! the probed length, drives the retrying acquirer for cache
//! downloads, and post-verifies size against the authoritative
//! on-disk byte count.
//!
//! No error crosses an item boundary: one item's failure never aborts
//! its siblings or the enclosing record.

use std::sync::Arc;

use reqwest::header::HeaderMap;
use tracing::{info, warn};

use crate::acquirer::RetryingAcquirer;
use crate::aggregate::RecordResult;
use crate::cache::{self, CacheStore};
use crate::client::{create_client, request_headers};
use crate::config::AcquirePolicy;
use crate::error::AcquireError;
use crate::fetch::{Fetcher, TimeoutClass, Transfer};
use crate::probe::{SizeProbe, SizeResult, SizeSource};
use crate::types::{AcquisitionOutcome, AcquisitionRecord, MediaItem, MediaKind};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Why an item was routed to the cache; decides the transfer timeout
/// class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheCause {
    PreDownloadAll,
    ForcedCache,
    OverThreshold,
    /// Direct delivery of an image was access-denied; downloading
    /// with full request shaping usually still works.
    DeniedImage,
}

pub struct AcquisitionPolicyEngine<S: SizeSource, T: Transfer> {
    probe: S,
    transfer: Arc<T>,
}

impl AcquisitionPolicyEngine<SizeProbe, Fetcher> {
    /// Engine backed by a shared HTTP client for both probing and
    /// fetching.
    pub fn new_http() -> Result<Self, AcquireError> {
        let client = create_client()?;
        Ok(Self::new(
            SizeProbe::new(client.clone()),
            Fetcher::new(client),
        ))
    }
}

impl<S: SizeSource, T: Transfer> AcquisitionPolicyEngine<S, T> {
    pub fn new(probe: S, transfer: T) -> Self {
        Self {
            probe,
            transfer: Arc::new(transfer),
        }
    }

    /// Process one record to completion. Items are acquired
    /// concurrently, bounded by the record's configured transfer
    /// limit; outcomes come back in original display order.
    pub async fn process(&self, record: &mut AcquisitionRecord) -> RecordResult {
        let policy = record.policy.clone().normalize();
        let store = CacheStore::new(&policy.cache_dir);
        let media_id = cache::media_id(&record.platform, &record.source_url);
        let acquirer =
            RetryingAcquirer::new(Arc::clone(&self.transfer), policy.max_concurrent_downloads);

        // One availability verdict per record. Only consulted when
        // something could be routed to the cache, so a pure
        // direct-link configuration never touches the filesystem.
        let may_cache = policy.pre_download_all
            || record.forced_cache
            || policy.large_threshold_mb > 0.0
            || !record.image_items.is_empty();
        let cache_ok = may_cache && store.available().await;
        if may_cache && !cache_ok {
            warn!(
                cache_dir = %policy.cache_dir.display(),
                "cache unavailable, falling back to direct links for this record"
            );
        }

        info!(
            source_url = %record.source_url,
            platform = %record.platform,
            videos = record.video_items.len(),
            images = record.image_items.len(),
            "processing acquisition record"
        );

        let video_headers = request_headers(MediaKind::Video, &record.context);
        let image_headers = request_headers(MediaKind::Image, &record.context);
        let forced_cache = record.forced_cache;
        let video_count = record.video_items.len();

        let video_futures = record.video_items.iter_mut().enumerate().map(|(i, item)| {
            self.process_item(
                item,
                i,
                &video_headers,
                &policy,
                &store,
                &acquirer,
                &media_id,
                forced_cache,
                cache_ok,
            )
        });
        let image_futures = record.image_items.iter_mut().enumerate().map(|(i, item)| {
            self.process_item(
                item,
                video_count + i,
                &image_headers,
                &policy,
                &store,
                &acquirer,
                &media_id,
                forced_cache,
                cache_ok,
            )
        });

        let (video_outcomes, image_outcomes) = futures::join!(
            futures::future::join_all(video_futures),
            futures::future::join_all(image_futures),
        );

        let result = RecordResult::new(
            record.source_url.clone(),
            video_outcomes,
            image_outcomes,
            store,
        );
        info!(
            source_url = %record.source_url,
            failed_videos = result.summary.failed_video_count,
            failed_images = result.summary.failed_image_count,
            has_usable_media = result.summary.has_usable_media,
            "acquisition record processed"
        );
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_item(
        &self,
        item: &mut MediaItem,
        index: usize,
        headers: &HeaderMap,
        policy: &AcquirePolicy,
        store: &CacheStore,
        acquirer: &RetryingAcquirer<Arc<T>>,
        media_id: &str,
        forced_cache: bool,
        cache_ok: bool,
    ) -> AcquisitionOutcome {
        let kind = item.kind();
        let first = item.first_candidate().to_string();

        // Probe only when a size-dependent decision exists.
        let mut probed = SizeResult::default();
        if policy.max_media_size_mb > 0.0 || policy.large_threshold_mb > 0.0 {
            probed = self.probe.probe(&first, headers, true).await;
            item.probed_size_bytes = probed.bytes;
        }
        let probed_mb = probed.bytes.map(|b| b as f64 / BYTES_PER_MB);

        // Pre-check: an oversized probe verdict skips the item before
        // any transfer.
        if policy.max_media_size_mb > 0.0 {
            if let Some(mb) = probed_mb {
                if mb > policy.max_media_size_mb {
                    info!(
                        url = %first,
                        size_mb = mb,
                        limit_mb = policy.max_media_size_mb,
                        "item exceeds size limit, skipping"
                    );
                    return AcquisitionOutcome::SkippedOversize {
                        limit_mb: policy.max_media_size_mb,
                        actual_mb: Some(mb),
                    };
                }
            }
        }

        // Strategy selection; first matching rule wins.
        let mut cause = if policy.pre_download_all {
            Some(CacheCause::PreDownloadAll)
        } else if forced_cache {
            Some(CacheCause::ForcedCache)
        } else if policy.large_threshold_mb > 0.0
            && probed_mb.is_some_and(|mb| mb > policy.large_threshold_mb)
        {
            Some(CacheCause::OverThreshold)
        } else {
            None
        };

        if cause.is_none() {
            match kind {
                MediaKind::Video => {
                    return AcquisitionOutcome::ServedDirect { url: first };
                }
                MediaKind::Image => {
                    // Direct image links must actually serve an image.
                    // Access-denied is the one condition that reroutes
                    // to the cache instead of failing.
                    if probed.access_denied {
                        cause = Some(CacheCause::DeniedImage);
                    } else {
                        let validation = self.probe.validate(&first, headers, kind).await;
                        if validation.access_denied {
                            cause = Some(CacheCause::DeniedImage);
                        } else if validation.valid {
                            return AcquisitionOutcome::ServedDirect { url: first };
                        } else {
                            return AcquisitionOutcome::Failed {
                                reason: format!("direct image URL rejected: {first}"),
                            };
                        }
                    }
                }
            }
        }

        if !cache_ok {
            // Record-wide fallback: with no usable cache, every
            // cache-routed item degrades to its direct link rather
            // than failing the record.
            warn!(url = %first, "cache unavailable, serving direct link instead");
            return AcquisitionOutcome::ServedDirect { url: first };
        }

        let timeout = match (kind, cause) {
            (MediaKind::Image, _) => TimeoutClass::Image,
            (MediaKind::Video, Some(CacheCause::OverThreshold)) => TimeoutClass::Video,
            (MediaKind::Video, _) => TimeoutClass::MediumVideo,
        };

        let scratch = store.scratch_path(media_id, index);
        let acquired = match acquirer.acquire(item, &scratch, headers, timeout).await {
            Ok(acquired) => acquired,
            Err(exhausted) => {
                return AcquisitionOutcome::Failed {
                    reason: exhausted.reason,
                };
            }
        };

        let suffix = cache::media_suffix(
            kind,
            acquired.fetched.content_type.as_deref(),
            &acquired.winning_url,
        );
        let path = match store.place(&scratch, media_id, index, suffix).await {
            Ok(path) => path,
            Err(e) => {
                store.remove(&scratch).await;
                return AcquisitionOutcome::Failed {
                    reason: format!("cache placement failed: {e}"),
                };
            }
        };

        // Post-check: the on-disk byte count is authoritative, no
        // matter what the probe or the server declared.
        let size_bytes = store
            .size_of(&path)
            .await
            .unwrap_or(acquired.fetched.bytes_written);
        if policy.max_media_size_mb > 0.0 {
            let actual_mb = size_bytes as f64 / BYTES_PER_MB;
            if actual_mb > policy.max_media_size_mb {
                info!(
                    path = %path.display(),
                    size_mb = actual_mb,
                    limit_mb = policy.max_media_size_mb,
                    "downloaded item exceeds size limit, discarding"
                );
                store.remove(&path).await;
                return AcquisitionOutcome::SkippedOversize {
                    limit_mb: policy.max_media_size_mb,
                    actual_mb: Some(actual_mb),
                };
            }
        }

        AcquisitionOutcome::Cached { path, size_bytes }
    }
}
