//! # Retrying Acquirer
//!
//! Wraps a [`Transfer`] with the per-item fallback-URL retry policy
//! and a bounded concurrency gate.
//!
//! The retry rule is the central algorithmic contract of the engine:
//!
//! - one candidate URL: attempt it, and on failure attempt it exactly
//!   once more (two attempts total) to tolerate transient failures;
//! - several candidates: attempt each in order at most once, stopping
//!   at the first success. An alternate is more likely to succeed
//!   than a retry of the same failing URL, so no URL is attempted
//!   twice.
//!
//! Attempts within one item are strictly sequential; concurrency
//! happens across items, bounded by a shared admission gate around
//! the transfer call only (probes are never throttled by it).

use std::path::Path;
use std::sync::Arc;

use reqwest::header::HeaderMap;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::fetch::{FetchedFile, TimeoutClass, Transfer};
use crate::types::MediaItem;

/// Successful acquisition of one item, still at its scratch location.
#[derive(Debug, Clone)]
pub struct AcquiredMedia {
    pub fetched: FetchedFile,
    /// The candidate that won.
    pub winning_url: String,
    pub attempts: u32,
}

/// Terminal failure for one item: all candidates exhausted.
#[derive(Debug, Clone)]
pub struct ExhaustedCandidates {
    pub reason: String,
    pub attempts: u32,
}

pub struct RetryingAcquirer<T: Transfer> {
    transfer: T,
    gate: Arc<Semaphore>,
}

impl<T: Transfer> RetryingAcquirer<T> {
    pub fn new(transfer: T, max_concurrent: usize) -> Self {
        Self {
            transfer,
            gate: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Acquire one item into `scratch`, applying the retry policy.
    /// Never panics or propagates past this boundary: exhaustion is a
    /// typed result.
    pub async fn acquire(
        &self,
        item: &MediaItem,
        scratch: &Path,
        headers: &HeaderMap,
        timeout: TimeoutClass,
    ) -> Result<AcquiredMedia, ExhaustedCandidates> {
        let candidates = item.candidates();
        let mut attempts: u32 = 0;
        let mut last_error = String::new();

        // Single candidate: the same URL twice. Alternates: each once.
        let plan: Vec<&str> = if candidates.len() == 1 {
            vec![candidates[0].as_str(), candidates[0].as_str()]
        } else {
            candidates.iter().map(String::as_str).collect()
        };

        for url in plan {
            attempts += 1;
            match self.attempt(url, scratch, headers, item.kind(), timeout).await {
                Ok(fetched) => {
                    debug!(url = url, attempts = attempts, "candidate acquired");
                    return Ok(AcquiredMedia {
                        fetched,
                        winning_url: url.to_string(),
                        attempts,
                    });
                }
                Err(reason) => {
                    debug!(url = url, attempt = attempts, error = %reason, "candidate attempt failed");
                    last_error = reason;
                }
            }
        }

        warn!(
            url = item.first_candidate(),
            attempts = attempts,
            "all candidates exhausted"
        );
        Err(ExhaustedCandidates {
            reason: last_error,
            attempts,
        })
    }

    async fn attempt(
        &self,
        url: &str,
        scratch: &Path,
        headers: &HeaderMap,
        kind: crate::types::MediaKind,
        timeout: TimeoutClass,
    ) -> Result<FetchedFile, String> {
        // Admission control: only the transfer itself is gated.
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| "admission gate closed".to_string())?;

        self.transfer
            .fetch(url, scratch, headers, kind, timeout)
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AcquireError;
    use crate::types::MediaKind;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted transfer: fails for URLs on the deny list, records
    /// every attempt.
    struct ScriptedTransfer {
        attempts: Mutex<Vec<String>>,
        failing: Vec<String>,
    }

    impl ScriptedTransfer {
        fn new(failing: &[&str]) -> Self {
            Self {
                attempts: Mutex::new(Vec::new()),
                failing: failing.iter().map(|s| s.to_string()).collect(),
            }
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transfer for ScriptedTransfer {
        async fn fetch(
            &self,
            url: &str,
            scratch: &Path,
            _headers: &HeaderMap,
            _kind: MediaKind,
            _timeout: TimeoutClass,
        ) -> Result<FetchedFile, AcquireError> {
            self.attempts.lock().unwrap().push(url.to_string());
            if self.failing.iter().any(|f| f == url) {
                return Err(AcquireError::StatusCode(
                    reqwest::StatusCode::BAD_GATEWAY,
                ));
            }
            Ok(FetchedFile {
                scratch: scratch.to_path_buf(),
                bytes_written: 1024,
                content_type: Some("video/mp4".into()),
            })
        }
    }

    fn video(urls: &[&str]) -> MediaItem {
        MediaItem::video(urls.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    #[tokio::test]
    async fn single_candidate_success_is_one_attempt() {
        let transfer = ScriptedTransfer::new(&[]);
        let acquirer = RetryingAcquirer::new(transfer, 3);
        let item = video(&["https://cdn.example.com/only.mp4"]);

        let acquired = acquirer
            .acquire(
                &item,
                &PathBuf::from("/tmp/s.part"),
                &HeaderMap::new(),
                TimeoutClass::Video,
            )
            .await
            .unwrap();
        assert_eq!(acquired.attempts, 1);
        assert_eq!(acquired.winning_url, "https://cdn.example.com/only.mp4");
        assert_eq!(acquirer.transfer.attempts().len(), 1);
    }

    #[tokio::test]
    async fn single_candidate_failure_gets_exactly_two_attempts() {
        let transfer = ScriptedTransfer::new(&["https://cdn.example.com/only.mp4"]);
        let acquirer = RetryingAcquirer::new(transfer, 3);
        let item = video(&["https://cdn.example.com/only.mp4"]);

        let err = acquirer
            .acquire(
                &item,
                &PathBuf::from("/tmp/s.part"),
                &HeaderMap::new(),
                TimeoutClass::Video,
            )
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 2);
        assert_eq!(
            acquirer.transfer.attempts(),
            vec![
                "https://cdn.example.com/only.mp4",
                "https://cdn.example.com/only.mp4"
            ]
        );
    }

    #[tokio::test]
    async fn alternates_each_tried_once_stopping_at_first_success() {
        let transfer = ScriptedTransfer::new(&["https://a/1.mp4", "https://b/1.mp4"]);
        let acquirer = RetryingAcquirer::new(transfer, 3);
        let item = video(&["https://a/1.mp4", "https://b/1.mp4", "https://c/1.mp4"]);

        let acquired = acquirer
            .acquire(
                &item,
                &PathBuf::from("/tmp/s.part"),
                &HeaderMap::new(),
                TimeoutClass::Video,
            )
            .await
            .unwrap();
        assert_eq!(acquired.attempts, 3);
        assert_eq!(acquired.winning_url, "https://c/1.mp4");
        assert_eq!(
            acquirer.transfer.attempts(),
            vec!["https://a/1.mp4", "https://b/1.mp4", "https://c/1.mp4"]
        );
    }

    #[tokio::test]
    async fn alternates_never_retried_on_total_failure() {
        let transfer = ScriptedTransfer::new(&["https://a/1.mp4", "https://b/1.mp4"]);
        let acquirer = RetryingAcquirer::new(transfer, 3);
        let item = video(&["https://a/1.mp4", "https://b/1.mp4"]);

        let err = acquirer
            .acquire(
                &item,
                &PathBuf::from("/tmp/s.part"),
                &HeaderMap::new(),
                TimeoutClass::Video,
            )
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 2);
        let attempts = acquirer.transfer.attempts();
        assert_eq!(attempts.len(), 2);
        assert_ne!(attempts[0], attempts[1]);
    }

    /// Transfer that tracks the high-water mark of concurrent calls.
    struct GaugedTransfer {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Transfer for GaugedTransfer {
        async fn fetch(
            &self,
            _url: &str,
            scratch: &Path,
            _headers: &HeaderMap,
            _kind: MediaKind,
            _timeout: TimeoutClass,
        ) -> Result<FetchedFile, AcquireError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(FetchedFile {
                scratch: scratch.to_path_buf(),
                bytes_written: 1,
                content_type: None,
            })
        }
    }

    #[tokio::test]
    async fn gate_bounds_concurrent_transfers() {
        let acquirer = Arc::new(RetryingAcquirer::new(
            GaugedTransfer {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            },
            2,
        ));

        let mut handles = Vec::new();
        for i in 0..8 {
            let acquirer = Arc::clone(&acquirer);
            handles.push(tokio::spawn(async move {
                let item = MediaItem::video(vec![format!("https://cdn/{i}.mp4")]).unwrap();
                acquirer
                    .acquire(
                        &item,
                        &PathBuf::from(format!("/tmp/{i}.part")),
                        &HeaderMap::new(),
                        TimeoutClass::MediumVideo,
                    )
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(acquirer.transfer.peak.load(Ordering::SeqCst) <= 2);
    }
}
