//! Persistence of intermediate artifacts between runs.
//!
//! Loading the corpus and fitting the encoders are the slow steps of every
//! analysis, and their inputs rarely change. Each artifact is stored under a
//! key; a present artifact is returned as-is, a missing one is computed and
//! written. Deleting the file (or calling [`ArtifactCache::invalidate`])
//! forces a recompute.

use crate::error::{io_error, AnalysisError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Keyed memoisation of serialisable artifacts.
pub trait ArtifactCache {
    /// Return the artifact stored under `key`, or compute, store and return it.
    fn get_or_compute<T, F>(&self, key: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>;

    fn contains(&self, key: &str) -> bool;

    /// Drop the artifact under `key`. Returns whether one existed.
    fn invalidate(&self, key: &str) -> Result<bool>;
}

/// Artifacts as compact JSON files named `{key}_{task_name}.json`.
///
/// There is no locking: two processes sharing a directory may both miss and
/// both write.
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    dir: PathBuf,
    task_name: String,
}

impl JsonFileCache {
    pub fn new(dir: impl Into<PathBuf>, task_name: &str) -> Self {
        JsonFileCache {
            dir: dir.into(),
            task_name: task_name.to_string(),
        }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}_{}.json", key, self.task_name))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactCache for JsonFileCache {
    fn get_or_compute<T, F>(&self, key: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        let path = self.path_for(key);
        if path.exists() {
            log::info!("Loading cached {} from {}", key, path.display());
            let bytes = std::fs::read(&path).map_err(io_error(&path))?;
            return serde_json::from_slice(&bytes).map_err(|source| AnalysisError::Cache {
                key: key.to_string(),
                source,
            });
        }

        log::info!("No cached {}; computing", key);
        let value = compute()?;
        let bytes = serde_json::to_vec(&value).map_err(|source| AnalysisError::Cache {
            key: key.to_string(),
            source,
        })?;
        std::fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        std::fs::write(&path, bytes).map_err(io_error(&path))?;
        log::debug!("Wrote {}", path.display());
        Ok(value)
    }

    fn contains(&self, key: &str) -> bool {
        self.path_for(key).exists()
    }

    fn invalidate(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).map_err(io_error(&path))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonFileCache::new(dir.path(), "task");
        let calls = Cell::new(0);

        let first: Vec<u32> = cache
            .get_or_compute("numbers", || {
                calls.set(calls.get() + 1);
                Ok(vec![1, 2, 3])
            })
            .unwrap();
        assert!(cache.contains("numbers"));
        assert!(dir.path().join("numbers_task.json").exists());

        let second: Vec<u32> = cache
            .get_or_compute("numbers", || {
                calls.set(calls.get() + 1);
                Ok(vec![9])
            })
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_invalidate_forces_recompute() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonFileCache::new(dir.path(), "task");

        let _: String = cache.get_or_compute("name", || Ok("old".to_string())).unwrap();
        assert!(cache.invalidate("name").unwrap());
        assert!(!cache.invalidate("name").unwrap());

        let value: String = cache.get_or_compute("name", || Ok("new".to_string())).unwrap();
        assert_eq!(value, "new");
    }

    #[test]
    fn test_failed_compute_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonFileCache::new(dir.path().join("nested"), "task");

        let result: Result<u8> =
            cache.get_or_compute("broken", || Err(AnalysisError::NotFitted));
        assert!(result.is_err());
        assert!(!cache.contains("broken"));
    }

    #[test]
    fn test_corrupt_artifact_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonFileCache::new(dir.path(), "task");
        std::fs::write(cache.path_for("bad"), "{not json").unwrap();

        let result: Result<Vec<u8>> = cache.get_or_compute("bad", || Ok(vec![]));
        assert!(matches!(result, Err(AnalysisError::Cache { .. })));
    }
}
