//! Core data model for acquisition records and per-item outcomes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::AcquirePolicy;
use crate::error::AcquireError;

/// Kind of a media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Video,
    Image,
}

/// One logical media unit (a single video or image) with one or more
/// candidate source URLs believed to reference identical content.
/// Earlier candidates are preferred.
#[derive(Debug, Clone)]
pub struct MediaItem {
    kind: MediaKind,
    candidates: Vec<String>,
    /// Set after a successful size probe.
    pub probed_size_bytes: Option<u64>,
}

impl MediaItem {
    /// Create a media item. Items with no usable candidate URL are
    /// never constructed; producers must omit them instead.
    pub fn new(kind: MediaKind, candidates: Vec<String>) -> Result<Self, AcquireError> {
        if candidates.is_empty() {
            return Err(AcquireError::NoCandidates);
        }
        Ok(Self {
            kind,
            candidates,
            probed_size_bytes: None,
        })
    }

    pub fn video(candidates: Vec<String>) -> Result<Self, AcquireError> {
        Self::new(MediaKind::Video, candidates)
    }

    pub fn image(candidates: Vec<String>) -> Result<Self, AcquireError> {
        Self::new(MediaKind::Image, candidates)
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Ordered candidate URLs; guaranteed non-empty.
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn first_candidate(&self) -> &str {
        &self.candidates[0]
    }
}

/// Request shaping supplied by the parser that produced a record:
/// some platforms require a specific Referer/Origin/User-Agent to
/// serve their media URLs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    pub referer: Option<String>,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
    /// Additional headers, inserted last so they win over defaults.
    pub extra_headers: Vec<(String, String)>,
}

/// The unit of work submitted to the engine: one parsed link's full
/// media set, with the effective policy resolved once up front.
#[derive(Debug, Clone)]
pub struct AcquisitionRecord {
    /// The original platform URL this record was parsed from.
    pub source_url: String,
    /// Platform tag used for cache naming.
    pub platform: String,
    /// Display-ordered media items; order is preserved through
    /// acquisition.
    pub video_items: Vec<MediaItem>,
    pub image_items: Vec<MediaItem>,
    pub context: RequestContext,
    /// Effective configuration snapshot; never mutated mid-record.
    pub policy: AcquirePolicy,
    /// Platforms whose direct links are unusable downstream must
    /// always be cache-downloaded regardless of size policy.
    pub forced_cache: bool,
}

/// Terminal outcome for one media item.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionOutcome {
    /// Item is delivered by URL; no download was performed.
    ServedDirect { url: String },
    /// Item was downloaded into the cache.
    Cached { path: PathBuf, size_bytes: u64 },
    /// Declined by size policy; distinct from a failed attempt.
    SkippedOversize {
        limit_mb: f64,
        /// The measurement that triggered the skip, when one was
        /// available (probed pre-download or measured post-download).
        actual_mb: Option<f64>,
    },
    /// All acquisition attempts exhausted.
    Failed { reason: String },
}

impl AcquisitionOutcome {
    /// Whether the outcome carries deliverable media.
    pub fn is_usable(&self) -> bool {
        matches!(
            self,
            AcquisitionOutcome::ServedDirect { .. } | AcquisitionOutcome::Cached { .. }
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, AcquisitionOutcome::Failed { .. })
    }

    /// Local path, present iff the item was cached.
    pub fn resolved_path(&self) -> Option<&Path> {
        match self {
            AcquisitionOutcome::Cached { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Direct URL, present iff the item is served by link.
    pub fn resolved_url(&self) -> Option<&str> {
        match self {
            AcquisitionOutcome::ServedDirect { url } => Some(url),
            _ => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            AcquisitionOutcome::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}
