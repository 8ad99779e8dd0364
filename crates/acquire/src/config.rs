//! Acquisition policy configuration.
//!
//! An [`AcquirePolicy`] is resolved once per record by the host
//! application's configuration layer and never mutated while the
//! record is being processed.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeout for a metadata-only size probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for downloading a single image.
pub const IMAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for downloading a forced-cache or below-threshold video.
pub const MEDIUM_VIDEO_FETCH_TIMEOUT: Duration = Duration::from_secs(120);
/// Timeout for downloading a large video into the cache.
pub const VIDEO_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Hard ceiling for the large-item threshold, imposed by the
/// delivery platform.
pub const MAX_LARGE_THRESHOLD_MB: f64 = 100.0;
/// Default large-item cache threshold.
pub const DEFAULT_LARGE_THRESHOLD_MB: f64 = 50.0;

pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 3;
pub const MAX_MAX_CONCURRENT_DOWNLOADS: usize = 10;

fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("media_acquire_cache")
}

/// Effective per-record configuration snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquirePolicy {
    /// Maximum allowed media size in MB; 0 = unlimited.
    pub max_media_size_mb: f64,

    /// Items whose probed size exceeds this threshold (MB) are
    /// cache-downloaded instead of served by direct link; 0 disables
    /// threshold caching. Capped at [`MAX_LARGE_THRESHOLD_MB`].
    pub large_threshold_mb: f64,

    /// Root directory for cached downloads.
    pub cache_dir: PathBuf,

    /// Download every item into the cache regardless of size.
    pub pre_download_all: bool,

    /// Maximum simultaneous in-flight transfers; clamped to
    /// 1..=[`MAX_MAX_CONCURRENT_DOWNLOADS`].
    pub max_concurrent_downloads: usize,
}

impl Default for AcquirePolicy {
    fn default() -> Self {
        Self {
            max_media_size_mb: 0.0,
            large_threshold_mb: DEFAULT_LARGE_THRESHOLD_MB,
            cache_dir: default_cache_dir(),
            pre_download_all: false,
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
        }
    }
}

impl AcquirePolicy {
    pub fn builder() -> AcquirePolicyBuilder {
        AcquirePolicyBuilder::new()
    }

    /// Clamp values to their platform limits. Applied by the builder
    /// and by hosts that deserialize a policy directly.
    pub fn normalize(mut self) -> Self {
        if self.large_threshold_mb > 0.0 {
            self.large_threshold_mb = self.large_threshold_mb.min(MAX_LARGE_THRESHOLD_MB);
        } else {
            self.large_threshold_mb = 0.0;
        }
        if self.max_media_size_mb < 0.0 {
            self.max_media_size_mb = 0.0;
        }
        self.max_concurrent_downloads = self
            .max_concurrent_downloads
            .clamp(1, MAX_MAX_CONCURRENT_DOWNLOADS);
        self
    }
}

/// Builder for [`AcquirePolicy`] with a fluent API.
#[derive(Debug, Clone, Default)]
pub struct AcquirePolicyBuilder {
    policy: AcquirePolicy,
}

impl AcquirePolicyBuilder {
    pub fn new() -> Self {
        Self {
            policy: AcquirePolicy::default(),
        }
    }

    /// Set the maximum media size in MB; 0 means unlimited.
    pub fn with_max_media_size_mb(mut self, mb: f64) -> Self {
        self.policy.max_media_size_mb = mb;
        self
    }

    /// Set the large-item cache threshold in MB; 0 disables it.
    pub fn with_large_threshold_mb(mut self, mb: f64) -> Self {
        self.policy.large_threshold_mb = mb;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.policy.cache_dir = dir.into();
        self
    }

    pub fn with_pre_download_all(mut self, enabled: bool) -> Self {
        self.policy.pre_download_all = enabled;
        self
    }

    pub fn with_max_concurrent_downloads(mut self, max: usize) -> Self {
        self.policy.max_concurrent_downloads = max;
        self
    }

    pub fn build(self) -> AcquirePolicy {
        self.policy.normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let policy = AcquirePolicy::builder().build();
        assert_eq!(policy.max_media_size_mb, 0.0);
        assert_eq!(policy.large_threshold_mb, DEFAULT_LARGE_THRESHOLD_MB);
        assert!(!policy.pre_download_all);
        assert_eq!(
            policy.max_concurrent_downloads,
            DEFAULT_MAX_CONCURRENT_DOWNLOADS
        );
    }

    #[test]
    fn threshold_capped_at_platform_ceiling() {
        let policy = AcquirePolicy::builder()
            .with_large_threshold_mb(500.0)
            .build();
        assert_eq!(policy.large_threshold_mb, MAX_LARGE_THRESHOLD_MB);

        let disabled = AcquirePolicy::builder().with_large_threshold_mb(0.0).build();
        assert_eq!(disabled.large_threshold_mb, 0.0);
    }

    #[test]
    fn partial_json_fills_defaults_and_normalizes() {
        let policy: AcquirePolicy = serde_json::from_str(
            r#"{"max_media_size_mb": 120.0, "large_threshold_mb": 250.0}"#,
        )
        .unwrap();
        let policy = policy.normalize();
        assert_eq!(policy.max_media_size_mb, 120.0);
        assert_eq!(policy.large_threshold_mb, MAX_LARGE_THRESHOLD_MB);
        assert!(!policy.pre_download_all);
        assert_eq!(
            policy.max_concurrent_downloads,
            DEFAULT_MAX_CONCURRENT_DOWNLOADS
        );
    }

    #[test]
    fn concurrency_clamped() {
        let policy = AcquirePolicy::builder()
            .with_max_concurrent_downloads(64)
            .build();
        assert_eq!(
            policy.max_concurrent_downloads,
            MAX_MAX_CONCURRENT_DOWNLOADS
        );

        let floor = AcquirePolicy::builder()
            .with_max_concurrent_downloads(0)
            .build();
        assert_eq!(floor.max_concurrent_downloads, 1);
    }
}
