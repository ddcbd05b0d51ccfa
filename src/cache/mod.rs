//! Content-hash based completion cache.
//!
//! Caches raw LLM completions so re-running an analysis over the same
//! contributions with the same model and prompts skips the network.

pub mod store;

use sha2::{Digest, Sha256};

pub use store::{CacheStats, CachedCompletion, FileStore};

/// Compute a cache key from the model, sampling temperature and both prompts.
///
/// Fields are separated by a NUL byte so adjacent values can't collide.
pub fn cache_key(model: &str, temperature: f64, system_prompt: &str, user_prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0]);
    hasher.update(temperature.to_bits().to_le_bytes());
    hasher.update([0]);
    hasher.update(system_prompt.as_bytes());
    hasher.update([0]);
    hasher.update(user_prompt.as_bytes());
    hex::encode(hasher.finalize())
}

/// The cache engine for LLM completions.
pub struct CacheEngine {
    enabled: bool,
    store: FileStore,
}

impl CacheEngine {
    /// Create a cache engine over the default cache directory.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            store: FileStore::new(),
        }
    }

    /// Create a cache engine over a specific store.
    pub fn with_store(enabled: bool, store: FileStore) -> Self {
        Self { enabled, store }
    }

    /// A cache that never hits and never writes.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            store: FileStore::none(),
        }
    }

    /// Look up a cached completion.
    pub fn get(&self, key: &str) -> Option<String> {
        if !self.enabled {
            return None;
        }
        self.store.get(key).map(|entry| entry.response)
    }

    /// Store a completion.
    pub fn put(&self, key: &str, model: &str, response: &str) {
        if !self.enabled {
            return;
        }
        self.store.put(
            key,
            &CachedCompletion {
                model: model.to_string(),
                response: response.to_string(),
                created_at: chrono::Utc::now().to_rfc3339(),
            },
        );
    }

    /// Remove all cached entries.
    pub fn clear(&self) -> Result<CacheStats, std::io::Error> {
        self.store.clear()
    }

    /// Compute statistics about the cache.
    pub fn stats(&self) -> Result<CacheStats, std::io::Error> {
        self.store.stats()
    }

    /// Return the cache directory path.
    pub fn path(&self) -> Option<&std::path::PathBuf> {
        self.store.path()
    }
}
