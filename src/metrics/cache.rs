use super::{AnalyzerId, Metrics};
use crate::fs::FileSystem;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// File name used by [`FileCache`] inside its cache directory.
pub const CACHE_FILE: &str = "metrics-cache.json";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to access metric cache {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Corrupt metric cache {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Cache key: analyzer identity plus a stable identity of the input entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub analyzer: AnalyzerId,
    pub entity: String,
}

impl CacheKey {
    pub fn new(analyzer: &AnalyzerId, entity: impl Into<String>) -> Self {
        Self {
            analyzer: analyzer.clone(),
            entity: entity.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.analyzer, self.entity)
    }
}

/// Content cache for per-entity metric results. Never affects ordering.
pub trait MetricCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Metrics>;

    fn put(&self, key: CacheKey, metrics: Metrics);

    fn flush(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Metrics>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl MetricCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Metrics> {
        self.entries.read().get(&key.to_string()).cloned()
    }

    fn put(&self, key: CacheKey, metrics: Metrics) {
        self.entries.write().insert(key.to_string(), metrics);
    }
}

/// Persists entries as one JSON document inside a cache directory.
///
/// Only entries read or written since the cache was opened survive a flush,
/// so results for edited or deleted files do not pile up.
pub struct FileCache {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
    entries: RwLock<HashMap<String, Metrics>>,
    touched: RwLock<HashSet<String>>,
    dirty: AtomicBool,
}

impl FileCache {
    pub fn open(dir: &Path, fs: Arc<dyn FileSystem>) -> Result<Self, CacheError> {
        let path = dir.join(CACHE_FILE);
        let entries = if fs.exists(&path) {
            let content = fs.read_to_string(&path).map_err(|source| CacheError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&content).map_err(|source| CacheError::Corrupt {
                path: path.clone(),
                source,
            })?
        } else {
            HashMap::new()
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "opened metric cache");

        Ok(Self {
            path,
            fs,
            entries: RwLock::new(entries),
            touched: RwLock::new(HashSet::new()),
            dirty: AtomicBool::new(false),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl MetricCache for FileCache {
    fn get(&self, key: &CacheKey) -> Option<Metrics> {
        let key = key.to_string();
        let found = self.entries.read().get(&key).cloned();
        if found.is_some() {
            self.touched.write().insert(key);
        }
        found
    }

    fn put(&self, key: CacheKey, metrics: Metrics) {
        let key = key.to_string();
        self.touched.write().insert(key.clone());
        self.entries.write().insert(key, metrics);
        self.dirty.store(true, Ordering::Release);
    }

    /// Drops entries nothing asked for, then writes the rest. A run that used
    /// no entry at all leaves the file untouched.
    fn flush(&self) -> Result<(), CacheError> {
        let pruned = {
            let touched = self.touched.read();
            if touched.is_empty() {
                return Ok(());
            }
            let mut entries = self.entries.write();
            let before = entries.len();
            entries.retain(|key, _| touched.contains(key));
            before - entries.len()
        };
        if !self.dirty.swap(false, Ordering::AcqRel) && pruned == 0 {
            return Ok(());
        }
        tracing::debug!(path = %self.path.display(), pruned, "writing metric cache");
        let json = {
            let entries = self.entries.read();
            serde_json::to_string(&*entries).map_err(|source| CacheError::Corrupt {
                path: self.path.clone(),
                source,
            })?
        };
        self.fs
            .write(&self.path, &json)
            .map_err(|source| CacheError::Io {
                path: self.path.clone(),
                source,
            })
    }
}
