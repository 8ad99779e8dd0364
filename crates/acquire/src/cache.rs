//! # Cache Store
//!
//! Owns the on-disk cache area: naming, atomic placement of completed
//! downloads, availability checks, and deletion. One store instance
//! is created per acquisition record, so the writability probe is
//! cached for that record's lifetime while still reacting to
//! configuration changes between records.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::types::MediaKind;

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    available: Arc<OnceLock<bool>>,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            available: Arc::new(OnceLock::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cheap writability probe of the cache root. The verdict is
    /// computed once per store instance.
    pub async fn available(&self) -> bool {
        if let Some(available) = self.available.get() {
            return *available;
        }
        let available = self.probe_writable().await;
        // A concurrent prober may have won the race; both computed
        // the same verdict.
        let _ = self.available.set(available);
        available
    }

    async fn probe_writable(&self) -> bool {
        if self.root.as_os_str().is_empty() {
            return false;
        }
        if let Err(e) = fs::create_dir_all(&self.root).await {
            warn!(root = %self.root.display(), error = %e, "cache root cannot be created");
            return false;
        }
        let probe_path = self.root.join(".probe_write");
        let result = async {
            let mut file = fs::File::create(&probe_path).await?;
            file.write_all(b"probe").await?;
            drop(file);
            fs::remove_file(&probe_path).await
        }
        .await;
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "cache root is not writable");
                false
            }
        }
    }

    /// Scratch location for an in-flight download. Lives under the
    /// cache root so the final rename stays on one filesystem.
    pub fn scratch_path(&self, media_id: &str, index: usize) -> PathBuf {
        self.root.join(format!("{media_id}_{index}.part"))
    }

    /// Atomically move a completed download into the cache under its
    /// deterministic final name `{media_id}_{index}{suffix}`. The
    /// partially written file is never visible under the final name.
    pub async fn place(
        &self,
        scratch: &Path,
        media_id: &str,
        index: usize,
        suffix: &str,
    ) -> std::io::Result<PathBuf> {
        let final_path = self.root.join(format!("{media_id}_{index}{suffix}"));
        fs::rename(scratch, &final_path).await?;
        debug!(path = %final_path.display(), "placed cached media");
        Ok(final_path)
    }

    /// Authoritative size of a placed file. Always preferred over a
    /// probe-declared size once a download has completed, because it
    /// reflects the true transferred payload.
    pub async fn size_of(&self, path: &Path) -> std::io::Result<u64> {
        Ok(fs::metadata(path).await?.len())
    }

    /// Best-effort delete; a missing file is not an error.
    pub async fn remove(&self, path: &Path) {
        match fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "removed cached file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to remove cached file");
            }
        }
    }

    pub async fn remove_all<I, P>(&self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            self.remove(path.as_ref()).await;
        }
    }
}

/// Generate the cache namespace for one record:
/// `{platform}_{hash8}_{timestamp}`. Hash and index namespacing
/// guarantee concurrent records never collide on final names.
pub fn media_id(platform: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let hash = hex::encode(hasher.finalize());
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{platform}_{}_{timestamp}", &hash[..8])
}

/// Derive a file suffix from the response Content-Type when known,
/// else from the URL, defaulting per media kind.
pub fn media_suffix(kind: MediaKind, content_type: Option<&str>, url: &str) -> &'static str {
    let (table, fallback): (&[(&str, &str)], &str) = match kind {
        MediaKind::Video => (
            &[
                ("mp4", ".mp4"),
                ("matroska", ".mkv"),
                ("mkv", ".mkv"),
                ("quicktime", ".mov"),
                ("mov", ".mov"),
                ("flv", ".flv"),
                ("webm", ".webm"),
                ("avi", ".avi"),
            ],
            ".mp4",
        ),
        MediaKind::Image => (
            &[
                ("jpeg", ".jpg"),
                ("jpg", ".jpg"),
                ("png", ".png"),
                ("webp", ".webp"),
                ("gif", ".gif"),
            ],
            ".jpg",
        ),
    };

    if let Some(content_type) = content_type {
        let content_type = content_type.to_ascii_lowercase();
        for (token, suffix) in table {
            if content_type.contains(token) {
                return suffix;
            }
        }
    }

    let url = url.to_ascii_lowercase();
    for (_, suffix) in table {
        if url.contains(*suffix) {
            return suffix;
        }
    }
    fallback
}
