//! # Result Aggregation
//!
//! Collects per-item outcomes into the record the external
//! message-composition stage consumes, and carries the cleanup handle
//! that releases cached files once delivery is done.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::cache::CacheStore;
use crate::types::AcquisitionOutcome;

/// Summary counts for one processed record.
///
/// `SkippedOversize` items are declined by policy, not failed; they
/// count toward totals but never toward the failed counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AggregateResult {
    pub total_video_count: usize,
    pub failed_video_count: usize,
    pub skipped_video_count: usize,
    pub total_image_count: usize,
    pub failed_image_count: usize,
    pub skipped_image_count: usize,
    /// At least one outcome carries deliverable media.
    pub has_usable_media: bool,
}

/// Pure function over finalized outcomes; touches neither network nor
/// filesystem. Computed exactly once, after every outcome is final.
pub fn aggregate(
    video_outcomes: &[AcquisitionOutcome],
    image_outcomes: &[AcquisitionOutcome],
) -> AggregateResult {
    let failed = |outcomes: &[AcquisitionOutcome]| outcomes.iter().filter(|o| o.is_failed()).count();
    let skipped = |outcomes: &[AcquisitionOutcome]| {
        outcomes
            .iter()
            .filter(|o| matches!(o, AcquisitionOutcome::SkippedOversize { .. }))
            .count()
    };
    let usable = video_outcomes
        .iter()
        .chain(image_outcomes)
        .any(AcquisitionOutcome::is_usable);

    AggregateResult {
        total_video_count: video_outcomes.len(),
        failed_video_count: failed(video_outcomes),
        skipped_video_count: skipped(video_outcomes),
        total_image_count: image_outcomes.len(),
        failed_image_count: failed(image_outcomes),
        skipped_image_count: skipped(image_outcomes),
        has_usable_media: usable,
    }
}

/// Everything the consumer needs from one processed record: per-item
/// outcomes in original display order, the summary counts, and the
/// handle that deletes the record's cached files after delivery.
#[derive(Debug, Clone)]
pub struct RecordResult {
    pub source_url: String,
    pub video_outcomes: Vec<AcquisitionOutcome>,
    pub image_outcomes: Vec<AcquisitionOutcome>,
    pub summary: AggregateResult,
    store: CacheStore,
    cleaned: Arc<AtomicBool>,
}

impl RecordResult {
    pub(crate) fn new(
        source_url: String,
        video_outcomes: Vec<AcquisitionOutcome>,
        image_outcomes: Vec<AcquisitionOutcome>,
        store: CacheStore,
    ) -> Self {
        let summary = aggregate(&video_outcomes, &image_outcomes);
        Self {
            source_url,
            video_outcomes,
            image_outcomes,
            summary,
            store,
            cleaned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Local paths of every cached outcome, in display order.
    pub fn cached_paths(&self) -> Vec<PathBuf> {
        self.video_outcomes
            .iter()
            .chain(&self.image_outcomes)
            .filter_map(|o| o.resolved_path().map(PathBuf::from))
            .collect()
    }

    /// Delete this record's cached files. Called by the consumer once
    /// delivery is complete or has failed. Idempotent: a second call
    /// is a no-op, and missing files are not errors.
    pub async fn cleanup(&self) {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            return;
        }
        let paths = self.cached_paths();
        if paths.is_empty() {
            return;
        }
        debug!(
            source_url = %self.source_url,
            files = paths.len(),
            "cleaning up cached media"
        );
        self.store.remove_all(&paths).await;
    }
}
