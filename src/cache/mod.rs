use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::sources::TranscriptResult;

/// Default entry lifetime: 24 hours
pub const DEFAULT_TTL_SECONDS: u64 = 24 * 60 * 60;

/// One persisted transcript record.
///
/// Field names follow the store's on-disk contract: `videoId`, `transcript`,
/// `timestamp`, `length`, plus source metadata needed to rebuild a
/// `TranscriptResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(rename = "videoId")]
    pub video_id: String,
    pub transcript: String,
    /// Unix seconds at write time; TTL is enforced against this on read
    pub timestamp: i64,
    pub length: usize,
    #[serde(flatten)]
    pub meta: EntryMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMeta {
    pub source: crate::sources::SourceKind,
    pub language_code: String,
    pub is_auto_generated: bool,
}

impl CacheEntry {
    fn from_result(video_id: &str, result: &TranscriptResult) -> Self {
        Self {
            video_id: video_id.to_string(),
            transcript: result.text.clone(),
            timestamp: Utc::now().timestamp(),
            length: result.length_chars,
            meta: EntryMeta {
                source: result.source,
                language_code: result.language_code.clone(),
                is_auto_generated: result.is_auto_generated,
            },
        }
    }

    fn is_expired(&self, ttl_seconds: u64, now: i64) -> bool {
        now - self.timestamp >= ttl_seconds as i64
    }

    /// Rebuild the result handed back on a cache hit
    pub fn to_result(&self) -> TranscriptResult {
        TranscriptResult {
            text: self.transcript.clone(),
            source: self.meta.source,
            language_code: self.meta.language_code.clone(),
            is_auto_generated: self.meta.is_auto_generated,
            length_chars: self.length,
            resolved_at: chrono::DateTime::from_timestamp(self.timestamp, 0)
                .unwrap_or_else(Utc::now),
        }
    }
}

/// TTL-keyed persistent key/value store for transcripts.
///
/// Backed by a single JSON file; the whole map is rewritten on every change,
/// so last-writer-wins under concurrency and there is no read-modify-write
/// race on individual entries. Expired entries are purged lazily on the read
/// that discovers them; no background sweep is needed for correctness.
pub struct CacheStore {
    path: PathBuf,
    ttl_seconds: u64,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl CacheStore {
    /// Open (or create) the store at `path`
    pub fn open(path: &Path, ttl_seconds: u64) -> crate::Result<Self> {
        let entries = if path.exists() {
            let content = fs_err::read_to_string(path).context("Failed to read cache file")?;
            match serde_json::from_str(&content) {
                Ok(entries) => entries,
                // The cache is disposable; a corrupt or stale-schema file
                // is discarded rather than blocking startup
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "cache file unreadable, starting with an empty cache"
                    );
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            ttl_seconds,
            entries: RwLock::new(entries),
        })
    }

    /// Open the store at the platform cache directory
    pub fn open_default(ttl_seconds: u64) -> crate::Result<Self> {
        let cache_dir = dirs::cache_dir()
            .context("Could not determine cache directory")?
            .join("transcript-resolver");
        Self::open(&cache_dir.join("transcripts.json"), ttl_seconds)
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Look up a key, purging it if expired.
    ///
    /// An expired entry is treated as absent and deleted as a side effect of
    /// this read; it is never served.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = Utc::now().timestamp();

        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired(self.ttl_seconds, now) => {
                    return Some(entry.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // The entry exists but has expired; take the write lock and purge.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if entry.is_expired(self.ttl_seconds, now) {
                tracing::debug!(key, "purging expired cache entry");
                entries.remove(key);
                if let Err(e) = self.flush(&entries) {
                    tracing::warn!(error = %e, "failed to persist cache after purge");
                }
                return None;
            }
            // Replaced with a fresh entry between the two locks
            return Some(entry.clone());
        }
        None
    }

    /// Insert or overwrite a record. Idempotent: rewriting a key just resets
    /// its timestamp.
    pub async fn put(&self, key: &str, video_id: &str, result: &TranscriptResult) {
        let entry = CacheEntry::from_result(video_id, result);

        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), entry);
        if let Err(e) = self.flush(&entries) {
            tracing::warn!(error = %e, "failed to persist cache");
        }
    }

    /// Number of live (non-expired) entries
    pub async fn len(&self) -> usize {
        let now = Utc::now().timestamp();
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|e| !e.is_expired(self.ttl_seconds, now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn flush(&self, entries: &HashMap<String, CacheEntry>) -> crate::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        fs_err::write(&self.path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceKind;

    fn sample_result(text: &str) -> TranscriptResult {
        TranscriptResult::new(
            text.to_string(),
            SourceKind::RemoteProxy,
            "en".to_string(),
            false,
        )
    }

    fn store_in(dir: &tempfile::TempDir, ttl: u64) -> CacheStore {
        CacheStore::open(&dir.path().join("transcripts.json"), ttl).unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, DEFAULT_TTL_SECONDS);

        store
            .put("abc_transcript", "abcdefghijk", &sample_result("hello"))
            .await;

        let entry = store.get("abc_transcript").await.unwrap();
        assert_eq!(entry.transcript, "hello");
        assert_eq!(entry.video_id, "abcdefghijk");
        assert_eq!(entry.length, 5);
    }

    #[tokio::test]
    async fn test_missing_key_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, DEFAULT_TTL_SECONDS);
        assert!(store.get("nothing_here").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_never_served_and_purged_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, 60);

        store
            .put("old_transcript", "abcdefghijk", &sample_result("stale"))
            .await;

        // Age the entry past its TTL by hand
        {
            let mut entries = store.entries.write().await;
            entries.get_mut("old_transcript").unwrap().timestamp -= 120;
        }

        assert!(store.get("old_transcript").await.is_none());

        // The purge happened on the read, not just the serve
        let entries = store.entries.read().await;
        assert!(!entries.contains_key("old_transcript"));
    }

    #[tokio::test]
    async fn test_overwrite_resets_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir, DEFAULT_TTL_SECONDS);

        store
            .put("k_transcript", "abcdefghijk", &sample_result("one"))
            .await;
        {
            let mut entries = store.entries.write().await;
            entries.get_mut("k_transcript").unwrap().timestamp -= 1000;
        }
        let old_ts = store.get("k_transcript").await.unwrap().timestamp;

        store
            .put("k_transcript", "abcdefghijk", &sample_result("two"))
            .await;
        let entry = store.get("k_transcript").await.unwrap();

        assert_eq!(entry.transcript, "two");
        assert!(entry.timestamp > old_ts);
    }

    #[tokio::test]
    async fn test_corrupt_cache_file_is_discarded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcripts.json");
        fs_err::write(&path, "{not json at all").unwrap();

        let store = CacheStore::open(&path, DEFAULT_TTL_SECONDS).unwrap();
        assert!(store.get("anything").await.is_none());

        // The store is fully usable afterwards
        store
            .put("r_transcript", "abcdefghijk", &sample_result("recovered"))
            .await;
        assert!(store.get("r_transcript").await.is_some());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcripts.json");

        {
            let store = CacheStore::open(&path, DEFAULT_TTL_SECONDS).unwrap();
            store
                .put("p_transcript", "abcdefghijk", &sample_result("persisted"))
                .await;
        }

        let reopened = CacheStore::open(&path, DEFAULT_TTL_SECONDS).unwrap();
        let entry = reopened.get("p_transcript").await.unwrap();
        assert_eq!(entry.transcript, "persisted");
    }

    #[tokio::test]
    async fn test_entry_serializes_with_contract_field_names() {
        let entry = CacheEntry::from_result("abcdefghijk", &sample_result("hi"));
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["videoId"], "abcdefghijk");
        assert_eq!(json["transcript"], "hi");
        assert_eq!(json["length"], 2);
        assert!(json["timestamp"].is_i64());
    }
}
