//! Filesystem-based cache store.
//!
//! Stores cached completions as JSON files in `~/.config/densa/cache/`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One cached completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCompletion {
    pub model: String,
    pub response: String,
    pub created_at: String,
}

/// Filesystem-based cache store.
pub struct FileStore {
    cache_dir: Option<PathBuf>,
}

impl FileStore {
    /// Create a new file store using the default cache directory.
    pub fn new() -> Self {
        let cache_dir = dirs::config_dir().map(|d| d.join(crate::constants::CONFIG_DIR).join("cache"));
        Self { cache_dir }
    }

    /// Create a file store with a specific cache directory.
    pub fn new_with_dir(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir: Some(cache_dir),
        }
    }

    /// A store with no backing directory.
    pub fn none() -> Self {
        Self { cache_dir: None }
    }

    /// Get a cached completion by key.
    pub fn get(&self, key: &str) -> Option<CachedCompletion> {
        let path = self.key_path(key)?;
        if !path.exists() {
            return None;
        }

        let content = std::fs::read_to_string(&path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Store a completion by key.
    pub fn put(&self, key: &str, entry: &CachedCompletion) {
        let Some(path) = self.key_path(key) else {
            return;
        };

        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let content = match serde_json::to_string(entry) {
            Ok(c) => c,
            Err(_) => return,
        };

        if let Err(e) = std::fs::write(&path, content) {
            tracing::debug!(path = %path.display(), error = %e, "failed to write cache entry");
        }
    }

    /// Remove all cached entries.
    pub fn clear(&self) -> Result<CacheStats, std::io::Error> {
        let stats = self.stats();
        if let Some(ref dir) = self.cache_dir {
            if dir.exists() {
                std::fs::remove_dir_all(dir)?;
            }
        }
        stats
    }

    /// Compute statistics about the cache.
    pub fn stats(&self) -> Result<CacheStats, std::io::Error> {
        let Some(ref dir) = self.cache_dir else {
            return Ok(CacheStats::default());
        };

        if !dir.exists() {
            return Ok(CacheStats::default());
        }

        let mut entries: usize = 0;
        let mut total_bytes: u64 = 0;

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                entries += 1;
                total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }

        Ok(CacheStats {
            entries,
            total_bytes,
        })
    }

    /// Return the cache directory path.
    pub fn path(&self) -> Option<&PathBuf> {
        self.cache_dir.as_ref()
    }

    fn key_path(&self, key: &str) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| dir.join(format!("{key}.json")))
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached entries.
    pub entries: usize,
    /// Total size in bytes.
    pub total_bytes: u64,
}

impl CacheStats {
    /// Format total_bytes as a human-readable string.
    pub fn human_size(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = 1024 * KB;

        if self.total_bytes >= MB {
            format!("{:.1} MiB", self.total_bytes as f64 / MB as f64)
        } else if self.total_bytes >= KB {
            format!("{:.1} KiB", self.total_bytes as f64 / KB as f64)
        } else {
            format!("{} B", self.total_bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(response: &str) -> CachedCompletion {
        CachedCompletion {
            model: "test-model".into(),
            response: response.into(),
            created_at: "2026-01-01T00:00:00+00:00".into(),
        }
    }

    #[test]
    fn roundtrip_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new_with_dir(dir.path().to_path_buf());
        store.put("test-key", &entry("hello"));
        let cached = store.get("test-key").unwrap();
        assert_eq!(cached.response, "hello");
        assert_eq!(cached.model, "test-model");
    }

    #[test]
    fn cache_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new_with_dir(dir.path().to_path_buf());
        assert!(store.get("nonexistent").is_none());
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "not json").unwrap();
        let store = FileStore::new_with_dir(dir.path().to_path_buf());
        assert!(store.get("bad").is_none());
    }

    #[test]
    fn stats_with_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new_with_dir(dir.path().to_path_buf());
        store.put("key1", &entry("a"));
        store.put("key2", &entry("b"));

        let stats = store.stats().unwrap();
        assert_eq!(stats.entries, 2);
        assert!(stats.total_bytes > 0);
    }

    #[test]
    fn clear_removes_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let store = FileStore::new_with_dir(cache_dir.clone());
        store.put("key1", &entry("a"));
        assert!(store.get("key1").is_some());

        let stats = store.clear().unwrap();
        assert_eq!(stats.entries, 1);
        assert!(!cache_dir.exists());
    }

    #[test]
    fn store_without_dir_is_inert() {
        let store = FileStore::none();
        store.put("k", &entry("a"));
        assert!(store.get("k").is_none());
        assert!(store.path().is_none());
        assert_eq!(store.stats().unwrap(), CacheStats::default());
    }

    #[test]
    fn human_size_units() {
        let size = |total_bytes| CacheStats { entries: 1, total_bytes }.human_size();
        assert_eq!(size(500), "500 B");
        assert_eq!(size(2048), "2.0 KiB");
        assert_eq!(size(2 * 1024 * 1024), "2.0 MiB");
    }
}
